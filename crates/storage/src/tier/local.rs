//! Local filesystem cache tier.
//!
//! Serves both the private per-user disk cache and the shared bus cache (a
//! directory on a network share). Everything is plain files, so any number
//! of processes on any number of machines can share one root.

use crate::error::{ErrorKind, Result};
use crate::tier::{CONTENT, CacheTier, HashStream, META, SCRATCH_DIR, Scratch, Slot, SlotMeta};
use crate::tree;
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use lfx_pointer::ContentHash;
use lfx_progress::{ProgressHandle, ProgressKind};
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::instrument;

/// A cache tier rooted at a local (or locally mounted) directory.
///
/// # Examples
///
/// ```no_run
/// use lfx_storage::tier::LocalTier;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let disk = LocalTier::new("disk", "/home/me/.cache/lfx")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalTier {
    name: String,
    root: PathBuf,
}

impl LocalTier {
    /// Open a tier, creating its root directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute or is not a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Only happens once per process at start-up; not worth an async constructor.
            sync_create_dir(&root).map_err(|e| ErrorKind::from_io(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    /// Open a tier without creating anything. A missing root behaves as an
    /// empty tier; used for mirrors this process must never write to.
    pub fn existing(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { name: name.into(), root })
    }

    fn slot_dir(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(hash.shard()).join(hash.to_hex())
    }

    fn scratch_root(&self) -> PathBuf {
        self.root.join(SCRATCH_DIR)
    }

    async fn read_meta(dir: &Path) -> Result<Option<SlotMeta>> {
        let path = dir.join(META);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => exn::bail!(ErrorKind::from_io(e, &path)),
        };
        let meta = serde_json::from_slice(&bytes).or_raise(|| ErrorKind::CorruptSlot(dir.to_path_buf()))?;
        Ok(Some(meta))
    }

    fn published(&self, scratch: Scratch, hash: &ContentHash, dir: PathBuf, meta: SlotMeta) -> Slot {
        // Already moved; nothing left for the guard to delete.
        let _ = scratch.dir.keep();
        tracing::debug!(tier = %self.name, %hash, "Published cache entry");
        Slot { hash: *hash, dir, meta }
    }

    /// Parses `<shard>/<hash>` directory names, ignoring anything else.
    fn parse_slot_name(shard: &str, name: &str) -> Option<ContentHash> {
        let hash: ContentHash = name.parse().ok()?;
        (hash.shard() == shard).then_some(hash)
    }
}

#[async_trait]
impl CacheTier for LocalTier {
    fn name(&self) -> &str {
        &self.name
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn get(&self, hash: &ContentHash) -> Result<Option<Slot>> {
        let dir = self.slot_dir(hash);
        let Some(meta) = Self::read_meta(&dir).await? else {
            // Published slots always carry their meta; a bare directory is
            // what an interrupted removal leaves behind.
            if fs::try_exists(&dir).await.map_err(ErrorKind::Io)? {
                exn::bail!(ErrorKind::CorruptSlot(dir));
            }
            return Ok(None);
        };
        if !fs::try_exists(dir.join(CONTENT)).await.map_err(ErrorKind::Io)? {
            exn::bail!(ErrorKind::CorruptSlot(dir));
        }
        Ok(Some(Slot { hash: *hash, dir, meta }))
    }

    async fn scratch(&self) -> Result<Scratch> {
        let scratch_root = self.scratch_root();
        fs::create_dir_all(&scratch_root).await.map_err(|e| ErrorKind::from_io(e, &scratch_root))?;
        let dir = tempfile::Builder::new()
            .prefix("lfx-")
            .tempdir_in(&scratch_root)
            .map_err(|e| ErrorKind::from_io(e, &scratch_root))?;
        Ok(Scratch { dir })
    }

    #[instrument(level = "debug", skip(self, scratch), fields(tier = %self.name))]
    async fn commit(&self, hash: &ContentHash, scratch: Scratch, meta: SlotMeta) -> Result<Slot> {
        let content = scratch.content();
        if !fs::try_exists(&content).await.map_err(ErrorKind::Io)? {
            exn::bail!(ErrorKind::NotFound(content));
        }
        let json = serde_json::to_vec(&meta).or_raise(|| ErrorKind::CorruptSlot(scratch.path().to_path_buf()))?;
        let meta_path = scratch.path().join(META);
        fs::write(&meta_path, json).await.map_err(|e| ErrorKind::from_io(e, &meta_path))?;

        let dir = self.slot_dir(hash);
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent).await.map_err(|e| ErrorKind::from_io(e, parent))?;
        }
        // Renaming a directory onto an existing, non-empty one fails, so
        // exactly one writer publishes and the losers fall through below.
        let renamed = fs::rename(scratch.path(), &dir).await;
        let rename_err = match renamed {
            Ok(()) => return Ok(self.published(scratch, hash, dir, meta)),
            Err(rename_err) => rename_err,
        };
        match self.get(hash).await {
            Ok(Some(existing)) => {
                tracing::debug!(tier = %self.name, %hash, "Cache entry published concurrently, discarding ours");
                Ok(existing)
            },
            Ok(None) => exn::bail!(ErrorKind::from_io(rename_err, dir)),
            Err(err) => {
                tracing::warn!(tier = %self.name, %hash, error = %err, "Replacing unreadable cache slot");
                let stale = dir.clone();
                tokio::task::spawn_blocking(move || tree::remove(&stale)).await.or_raise(|| ErrorKind::Task)??;
                let retried = fs::rename(scratch.path(), &dir).await;
                retried.map_err(|e| ErrorKind::from_io(e, &dir))?;
                Ok(self.published(scratch, hash, dir, meta))
            },
        }
    }

    async fn put(&self, source: &Slot, progress: &ProgressHandle) -> Result<Option<Slot>> {
        // An unreadable slot here is replaced by the commit below.
        if let Ok(Some(existing)) = self.get(&source.hash).await {
            return Ok(Some(existing));
        }
        let scratch = self.scratch().await?;
        let from = source.content();
        let to = scratch.content();
        let sink = progress.clone();
        tokio::task::spawn_blocking(move || tree::copy(&from, &to, &mut |n| sink.report(ProgressKind::Copy, n)))
            .await
            .or_raise(|| ErrorKind::Task)??;
        self.commit(&source.hash, scratch, source.meta).await.map(Some)
    }

    async fn remove(&self, hash: &ContentHash) -> Result<()> {
        let dir = self.slot_dir(hash);
        tokio::task::spawn_blocking(move || tree::remove(&dir)).await.or_raise(|| ErrorKind::Task)?
    }

    fn list_stream(&self) -> HashStream<'_> {
        let root = self.root.clone();
        Box::pin(stream! {
            let mut shards = match fs::read_dir(&root).await {
                Ok(shards) => shards,
                // A tier that was never written to is simply empty.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
                Err(e) => {
                    yield Err(exn::Exn::from(ErrorKind::from_io(e, &root)));
                    return;
                },
            };
            'shards: loop {
                let shard = match shards.next_entry().await {
                    Ok(Some(shard)) => shard,
                    Ok(None) => break 'shards,
                    Err(e) => { yield Err(exn::Exn::from(ErrorKind::from_io(e, &root))); continue 'shards; },
                };
                let Some(shard_name) = shard.file_name().to_str().map(str::to_string) else {
                    continue 'shards;
                };
                if shard_name == SCRATCH_DIR || !shard.file_type().await.is_ok_and(|t| t.is_dir()) {
                    continue 'shards;
                }
                let mut slots = match fs::read_dir(shard.path()).await {
                    Ok(slots) => slots,
                    Err(e) => { yield Err(exn::Exn::from(ErrorKind::from_io(e, shard.path()))); continue 'shards; },
                };
                'slots: loop {
                    match slots.next_entry().await {
                        Ok(Some(slot)) => {
                            if let Some(hash) = slot.file_name().to_str().and_then(|n| Self::parse_slot_name(&shard_name, n)) {
                                yield Ok(hash);
                            }
                        },
                        Ok(None) => break 'slots,
                        Err(e) => yield Err(exn::Exn::from(ErrorKind::from_io(e, shard.path()))),
                    }
                }
            }
        })
    }

    #[instrument(level = "debug", skip(self), fields(tier = %self.name))]
    async fn clean(&self, grace: Duration) -> Result<u64> {
        let scratch_root = self.scratch_root();
        let mut entries = match fs::read_dir(&scratch_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => exn::bail!(ErrorKind::from_io(e, &scratch_root)),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
            let path = entry.path();
            let walked = path.clone();
            let modified = tokio::task::spawn_blocking(move || tree::last_modified(&walked))
                .await
                .or_raise(|| ErrorKind::Task)?;
            let Ok(modified) = modified else {
                // Finished (or abandoned and removed) while being inspected.
                continue;
            };
            let age = modified.elapsed().unwrap_or_default();
            if age < grace {
                tracing::debug!(path = %path.display(), "Scratch directory is recent, leaving it");
                continue;
            }
            let target = path.clone();
            tokio::task::spawn_blocking(move || tree::remove(&target)).await.or_raise(|| ErrorKind::Task)??;
            tracing::info!(tier = %self.name, path = %path.display(), "Removed orphaned scratch directory");
            removed += 1;
        }
        Ok(removed)
    }

    #[instrument(level = "debug", skip(self), fields(tier = %self.name))]
    async fn clear(&self) -> Result<()> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => exn::bail!(ErrorKind::from_io(e, &self.root)),
        };
        while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
            let path = entry.path();
            tokio::task::spawn_blocking(move || tree::remove(&path)).await.or_raise(|| ErrorKind::Task)??;
        }
        tracing::info!(tier = %self.name, root = %self.root.display(), "Cleared cache tier");
        Ok(())
    }
}
