pub mod digest;
pub mod error;
pub mod links;
mod path;
pub mod tier;
pub mod tree;

pub use crate::digest::digest;
pub use crate::links::{LinkCapability, LinkHandle, SystemLinks};
pub use crate::path::{absolutize, relative_within, validate as validate_path};
pub use crate::tier::{CacheTier, LocalTier, ReadOnlyTier, Scratch, Slot, SlotMeta, TierStats};
use std::sync::Arc;

pub type TierHandle = Arc<dyn CacheTier>;
