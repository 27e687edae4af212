use lfx_pointer::{ContentHash, Info, Pointer};
use lfx_storage::Slot;
use std::path::PathBuf;

/// Materialized content, ready to be aliased into a working tree.
///
/// The bytes under `path` are shared by every alias and must never be
/// modified in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub hash: ContentHash,
    /// File for plain downloads, directory for expanded kinds.
    pub path: PathBuf,
    /// The pointer enriched with hash and sizes.
    pub info: Info,
}

impl CacheEntry {
    pub fn new(pointer: &Pointer, slot: &Slot) -> Self {
        Self {
            hash: slot.hash,
            path: slot.content(),
            info: Info::resolved(pointer, slot.hash, slot.meta.size, slot.meta.content_size),
        }
    }
}
