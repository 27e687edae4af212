mod inspect;

pub use crate::inspect::InspectReader;
