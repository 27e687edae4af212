//! Cache tier trait and implementations.
//!
//! A tier is a content-addressed directory. Every entry occupies one slot:
//!
//! ```text
//! <root>/<shard>/<hash>/content     file, or directory for expanded content
//! <root>/<shard>/<hash>/meta.json   sizes recorded when the entry was made
//! <root>/.scratch/<random>/         materializations still in progress
//! ```
//!
//! A slot only ever appears by renaming a complete scratch directory into
//! place, so a reader either sees the whole entry or no entry at all.

mod local;
mod ro;

pub use self::local::LocalTier;
pub use self::ro::ReadOnlyTier;
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use lfx_pointer::ContentHash;
use lfx_progress::ProgressHandle;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;
use tempfile::TempDir;

pub(crate) const SCRATCH_DIR: &str = ".scratch";
pub(crate) const CONTENT: &str = "content";
pub(crate) const META: &str = "meta.json";

pub type HashStream<'a> = Pin<Box<dyn Stream<Item = Result<ContentHash>> + Send + 'a>>;

/// Sizes recorded alongside cached content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMeta {
    /// Bytes fetched from the origin.
    pub size: u64,
    /// Bytes on disk after expansion, for directory content.
    pub content_size: Option<u64>,
}

impl SlotMeta {
    /// Bytes the slot occupies.
    pub fn footprint(&self) -> u64 {
        self.content_size.unwrap_or(self.size)
    }
}

/// A published cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub hash: ContentHash,
    /// The slot directory itself.
    pub dir: PathBuf,
    pub meta: SlotMeta,
}

impl Slot {
    /// The cached file or directory.
    pub fn content(&self) -> PathBuf {
        self.dir.join(CONTENT)
    }
}

/// Private working directory inside a tier, deleted on drop unless committed.
#[derive(Debug)]
pub struct Scratch {
    pub(crate) dir: TempDir,
}

impl Scratch {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the content must be placed before committing.
    pub fn content(&self) -> PathBuf {
        self.dir.path().join(CONTENT)
    }
}

/// Entry count and bytes for one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierStats {
    pub entries: u64,
    pub bytes: u64,
}

/// One level of the cache hierarchy.
///
/// Implementations must make [`commit`](Self::commit) atomic: concurrent
/// readers never observe a partially written slot, and two writers racing to
/// publish the same hash both succeed with one of them winning.
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Name used for logging (`disk`, `bus`, `lan`).
    fn name(&self) -> &str;

    fn root(&self) -> &Path;

    /// Whether writes take effect. Read-only tiers accept and ignore them.
    fn is_writable(&self) -> bool {
        true
    }

    /// Look up a slot. Returns `None` when the tier has no complete entry.
    async fn get(&self, hash: &ContentHash) -> Result<Option<Slot>>;

    /// Allocate a scratch directory on the same volume as the slots.
    async fn scratch(&self) -> Result<Scratch>;

    /// Publish the content staged in `scratch` under `hash`.
    ///
    /// If another writer published the same hash first, its slot is returned
    /// and `scratch` is discarded.
    async fn commit(&self, hash: &ContentHash, scratch: Scratch, meta: SlotMeta) -> Result<Slot>;

    /// Copy a slot from another tier into this one. Returns `None` when the
    /// tier ignored the write.
    async fn put(&self, source: &Slot, progress: &ProgressHandle) -> Result<Option<Slot>>;

    /// Delete a slot. Missing slots are not an error.
    async fn remove(&self, hash: &ContentHash) -> Result<()>;

    /// Stream every published hash.
    fn list_stream(&self) -> HashStream<'_>;

    async fn list(&self) -> Result<Vec<ContentHash>> {
        self.list_stream().try_collect().await
    }

    async fn stats(&self) -> Result<TierStats> {
        let mut stats = TierStats::default();
        let mut hashes = self.list_stream();
        while let Some(hash) = hashes.try_next().await? {
            if let Some(slot) = self.get(&hash).await? {
                stats.entries += 1;
                stats.bytes += slot.meta.footprint();
            }
        }
        Ok(stats)
    }

    /// Remove scratch directories left behind by interrupted work that are
    /// older than `grace`. Completed slots are never touched. Returns the
    /// number of scratch directories removed.
    async fn clean(&self, grace: Duration) -> Result<u64>;

    /// Remove everything the tier holds.
    async fn clear(&self) -> Result<()>;
}
