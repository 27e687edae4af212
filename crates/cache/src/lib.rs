//! The cache hierarchy and the entry store built on top of it.
//!
//! [`CacheHierarchy`] knows where content can come from: the Disk, Bus and
//! Lan tiers, and finally the origin. [`EntryStore`] makes sure each piece of
//! content is materialized once per process, however many tasks want it.

mod entry;
pub mod error;
mod hierarchy;
mod store;

pub use crate::entry::CacheEntry;
pub use crate::hierarchy::CacheHierarchy;
pub use crate::store::EntryStore;
