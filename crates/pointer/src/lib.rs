//! Pointers describe content that lives somewhere else, and the info file
//! format that records them in a working tree.

pub mod error;
mod hash;
mod info;
mod pointer;

pub use crate::hash::ContentHash;
pub use crate::info::Info;
pub use crate::pointer::{Pointer, PointerKind};
