//! Lookup-then-populate over the cache tiers, falling back to the origin.

use crate::error::{Error, ErrorKind, Result};
use exn::Exn;
use lfx_pointer::{ContentHash, Pointer, PointerKind};
use lfx_progress::ProgressHandle;
use lfx_storage::{CacheTier, ReadOnlyTier, Scratch, Slot, SlotMeta, TierHandle};
use lfx_transport::TransportHandle;
use lfx_transport::expand;
use std::iter;
use std::sync::Arc;
use tracing::instrument;

/// Name of the raw payload inside a scratch directory, next to `content`.
const DOWNLOAD: &str = "download";

/// Tiers ordered nearest to farthest: Disk, then Bus, then Lan.
///
/// Disk is always present and always writable. Bus is optional and written
/// to after every origin fetch. Lan is optional and never written to, which
/// [`with_lan`](Self::with_lan) enforces by wrapping it in a
/// [`ReadOnlyTier`].
pub struct CacheHierarchy {
    disk: TierHandle,
    bus: Option<TierHandle>,
    lan: Option<TierHandle>,
    transport: TransportHandle,
}

impl CacheHierarchy {
    pub fn new(disk: TierHandle, transport: TransportHandle) -> Self {
        Self { disk, bus: None, lan: None, transport }
    }

    pub fn with_bus(mut self, bus: TierHandle) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_lan(mut self, lan: TierHandle) -> Self {
        self.lan = Some(Arc::new(ReadOnlyTier::new(lan)));
        self
    }

    pub fn disk(&self) -> &TierHandle {
        &self.disk
    }

    /// Every configured tier, nearest first.
    pub fn tiers(&self) -> impl Iterator<Item = &TierHandle> {
        iter::once(&self.disk).chain(self.bus.iter()).chain(self.lan.iter())
    }

    /// Find `hash` in the nearest tier that has it, promoting hits from
    /// farther tiers into Disk.
    ///
    /// Never fails: unreadable or corrupt entries are logged and treated as
    /// misses, and a failed promotion still returns the farther slot.
    #[instrument(level = "debug", skip(self, progress))]
    pub async fn lookup(&self, hash: &ContentHash, progress: &ProgressHandle) -> Option<Slot> {
        for (depth, tier) in self.tiers().enumerate() {
            // Disk is trusted; anything that crossed a network share is not.
            let Some(slot) = look_in(tier, hash, depth > 0).await else {
                continue;
            };
            tracing::debug!(tier = tier.name(), %hash, "Cache hit");
            if depth == 0 {
                return Some(slot);
            }
            return Some(self.promote(tier, slot, progress).await);
        }
        None
    }

    async fn promote(&self, from: &TierHandle, slot: Slot, progress: &ProgressHandle) -> Slot {
        match self.disk.put(&slot, progress).await {
            Ok(Some(promoted)) => {
                tracing::debug!(from = from.name(), hash = %slot.hash, "Promoted cache entry to disk");
                promoted
            },
            Ok(None) => slot,
            Err(err) => {
                tracing::warn!(from = from.name(), hash = %slot.hash, error = ?err, "Promotion failed; using entry in place");
                slot
            },
        }
    }

    /// Produce the cached slot for `pointer`: from a tier when its hash is
    /// known and cached anywhere, otherwise from the origin.
    #[instrument(level = "debug", skip(self, pointer, progress), fields(url = %pointer.url()))]
    pub async fn materialize(&self, pointer: &Pointer, progress: &ProgressHandle) -> Result<Slot> {
        if let Some(hash) = pointer.hash()
            && let Some(slot) = self.lookup(hash, progress).await
        {
            return Ok(slot);
        }
        self.fetch(pointer, progress).await
    }

    /// Download, expand, hash and publish. The content is staged in a Disk
    /// scratch directory, so dropping this future mid-way leaves nothing
    /// visible behind.
    async fn fetch(&self, pointer: &Pointer, progress: &ProgressHandle) -> Result<Slot> {
        let url = pointer.url().to_string();
        let scratch = self.disk.scratch().await.map_err(storage(&self.disk))?;
        let download = scratch.path().join(DOWNLOAD);
        let content = scratch.content();

        let size = self.transport.download(pointer.url(), &download, progress).await.map_err(|err| {
            let reason = (*err).to_string();
            if err.is_fetch() {
                err.raise(ErrorKind::FetchFailed { url: url.clone(), reason })
            } else {
                err.raise(ErrorKind::Storage { tier: self.disk.name().to_string(), reason })
            }
        })?;

        let content_size = match pointer.kind() {
            PointerKind::File => {
                tokio::fs::rename(&download, &content).await.map_err(io(&self.disk))?;
                None
            },
            PointerKind::Zip => Some(expanded(expand::zip(&download, &content, progress).await, &url)?),
            PointerKind::Exe => {
                let args = pointer.launch_args().unwrap_or_default();
                Some(expanded(expand::exe(&download, args, &content, progress).await, &url)?)
            },
        };
        if pointer.kind().is_expanded() {
            tokio::fs::remove_file(&download).await.map_err(io(&self.disk))?;
        }

        let hash = lfx_storage::digest(&content).await.map_err(storage(&self.disk))?;
        if let Some(expected) = pointer.hash()
            && *expected != hash
        {
            tracing::warn!(%url, %expected, actual = %hash, "Origin content changed since the pointer was recorded");
        }
        self.publish(hash, scratch, SlotMeta { size, content_size }, progress).await
    }

    async fn publish(&self, hash: ContentHash, scratch: Scratch, meta: SlotMeta, progress: &ProgressHandle) -> Result<Slot> {
        let slot = self.disk.commit(&hash, scratch, meta).await.map_err(storage(&self.disk))?;
        if let Some(bus) = self.bus.as_ref().filter(|bus| bus.is_writable()) {
            // The local copy is already usable; a bus outage only costs teammates a download.
            if let Err(err) = bus.put(&slot, progress).await {
                tracing::warn!(tier = bus.name(), %hash, error = ?err, "Could not share cache entry");
            }
        }
        Ok(slot)
    }
}

async fn look_in(tier: &TierHandle, hash: &ContentHash, verify: bool) -> Option<Slot> {
    let slot = match tier.get(hash).await {
        Ok(Some(slot)) => slot,
        Ok(None) => return None,
        Err(err) => {
            discard(tier, hash, &(*err).to_string()).await;
            return None;
        },
    };
    if verify {
        match lfx_storage::digest(&slot.content()).await {
            Ok(actual) if actual == *hash => {},
            Ok(actual) => {
                discard(tier, hash, &format!("content hashes to {actual}")).await;
                return None;
            },
            Err(err) => {
                discard(tier, hash, &(*err).to_string()).await;
                return None;
            },
        }
    }
    Some(slot)
}

/// Log a corrupt entry and drop it from tiers that accept writes.
async fn discard(tier: &TierHandle, hash: &ContentHash, reason: &str) {
    let kind = ErrorKind::CacheCorruption { tier: tier.name().to_string(), hash: hash.to_string() };
    tracing::warn!(error = %kind, reason, "Treating cache entry as missing");
    if tier.is_writable()
        && let Err(err) = tier.remove(hash).await
    {
        tracing::warn!(tier = tier.name(), %hash, error = ?err, "Could not remove corrupt cache entry");
    }
}

fn storage(tier: &TierHandle) -> impl FnOnce(lfx_storage::error::Error) -> Error + '_ {
    move |err| {
        let reason = (*err).to_string();
        err.raise(ErrorKind::Storage { tier: tier.name().to_string(), reason })
    }
}

fn io(tier: &TierHandle) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |err| {
        let reason = err.to_string();
        Exn::new(err).raise(ErrorKind::Storage { tier: tier.name().to_string(), reason })
    }
}

fn expanded(result: lfx_transport::error::Result<u64>, url: &str) -> Result<u64> {
    result.map_err(|err| {
        let reason = (*err).to_string();
        err.raise(ErrorKind::ExpandFailed { url: url.to_string(), reason })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lfx_progress::{NoProgress, ProgressAggregator, ProgressKind};
    use lfx_storage::LocalTier;
    use lfx_transport::{MockTransport, zip_bytes};
    use std::path::Path;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        disk: TierHandle,
        bus: TierHandle,
        lan: TierHandle,
        transport: Arc<MockTransport>,
    }

    impl Fixture {
        fn new(transport: MockTransport) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let tier = |name: &str| -> TierHandle { Arc::new(LocalTier::new(name, dir.path().join(name)).unwrap()) };
            Self {
                disk: tier("disk"),
                bus: tier("bus"),
                lan: tier("lan"),
                transport: Arc::new(transport),
                _dir: dir,
            }
        }

        fn hierarchy(&self) -> CacheHierarchy {
            CacheHierarchy::new(self.disk.clone(), self.transport.clone())
                .with_bus(self.bus.clone())
                .with_lan(self.lan.clone())
        }
    }

    async fn seed(tier: &TierHandle, data: &[u8]) -> ContentHash {
        let hash = ContentHash::of(data);
        let scratch = tier.scratch().await.unwrap();
        std::fs::write(scratch.content(), data).unwrap();
        let meta = SlotMeta { size: data.len() as u64, content_size: None };
        tier.commit(&hash, scratch, meta).await.unwrap();
        hash
    }

    fn read(path: &Path) -> Vec<u8> {
        std::fs::read(path).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_file_publishes_to_disk_and_bus() {
        let fx = Fixture::new(MockTransport::new().with("https://example.com/a.bin", vec![7u8; 100]));
        let pointer = Pointer::file("https://example.com/a.bin").unwrap();
        let progress = Arc::new(ProgressAggregator::new());
        let handle: ProgressHandle = progress.clone();

        let slot = fx.hierarchy().materialize(&pointer, &handle).await.unwrap();
        assert_eq!(slot.hash, ContentHash::of(&[7u8; 100]));
        assert_eq!(slot.meta, SlotMeta { size: 100, content_size: None });
        assert_eq!(read(&slot.content()), vec![7u8; 100]);
        assert!(fx.disk.get(&slot.hash).await.unwrap().is_some());
        assert!(fx.bus.get(&slot.hash).await.unwrap().is_some());
        assert!(fx.lan.get(&slot.hash).await.unwrap().is_none());
        assert_eq!(progress.snapshot().get(ProgressKind::Download).unwrap().progress, 100);
    }

    #[tokio::test]
    async fn test_fetch_zip_expands_into_directory() {
        let archive = zip_bytes(&[("bin/tool", &b"tool"[..]), ("lib/core", &b"core!"[..])]);
        let fx = Fixture::new(MockTransport::new().with("https://example.com/pkg.zip", archive.clone()));
        let pointer = Pointer::zip("https://example.com/pkg.zip").unwrap();

        let slot = fx.hierarchy().materialize(&pointer, &NoProgress::handle()).await.unwrap();
        assert!(slot.content().is_dir());
        assert_eq!(read(&slot.content().join("bin/tool")), b"tool");
        assert_eq!(slot.meta, SlotMeta { size: archive.len() as u64, content_size: Some(9) });
        // The raw archive is not kept next to the content.
        assert!(!slot.dir.join(DOWNLOAD).exists());
        assert_eq!(slot.hash, lfx_storage::digest(&slot.content()).await.unwrap());
    }

    #[tokio::test]
    async fn test_known_hash_on_disk_skips_network() {
        let fx = Fixture::new(MockTransport::new());
        let hash = seed(&fx.disk, b"cached").await;
        let pointer = Pointer::file("https://example.com/a.bin").unwrap().with_hash(hash);

        let slot = fx.hierarchy().materialize(&pointer, &NoProgress::handle()).await.unwrap();
        assert_eq!(read(&slot.content()), b"cached");
        assert_eq!(fx.transport.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_bus_hit_is_promoted_to_disk() {
        let fx = Fixture::new(MockTransport::new());
        let hash = seed(&fx.bus, b"shared").await;
        let progress = Arc::new(ProgressAggregator::new());
        let handle: ProgressHandle = progress.clone();

        let slot = fx.hierarchy().lookup(&hash, &handle).await.unwrap();
        assert!(slot.dir.starts_with(fx.disk.root()));
        assert!(fx.disk.get(&hash).await.unwrap().is_some());
        assert_eq!(progress.snapshot().get(ProgressKind::Copy).unwrap().progress, 6);
    }

    #[tokio::test]
    async fn test_lan_hit_is_promoted_but_never_written() {
        let fx = Fixture::new(MockTransport::new().with("https://example.com/a.bin", b"fresh".to_vec()));
        let hash = seed(&fx.lan, b"mirrored").await;
        let hierarchy = fx.hierarchy();

        let slot = hierarchy.lookup(&hash, &NoProgress::handle()).await.unwrap();
        assert!(slot.dir.starts_with(fx.disk.root()));

        // A fresh download goes to disk and bus only.
        let pointer = Pointer::file("https://example.com/a.bin").unwrap();
        let fetched = hierarchy.materialize(&pointer, &NoProgress::handle()).await.unwrap();
        assert!(fx.lan.get(&fetched.hash).await.unwrap().is_none());
        assert!(fx.bus.get(&fetched.hash).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_bus_entry_is_a_miss() {
        let fx = Fixture::new(MockTransport::new().with("https://example.com/a.bin", b"genuine".to_vec()));
        let hash = ContentHash::of(b"genuine");
        // Publish the wrong bytes under the right name.
        let scratch = fx.bus.scratch().await.unwrap();
        std::fs::write(scratch.content(), b"tampered").unwrap();
        fx.bus.commit(&hash, scratch, SlotMeta { size: 8, content_size: None }).await.unwrap();

        let hierarchy = fx.hierarchy();
        assert!(hierarchy.lookup(&hash, &NoProgress::handle()).await.is_none());
        assert!(fx.bus.get(&hash).await.unwrap().is_none());

        let pointer = Pointer::file("https://example.com/a.bin").unwrap().with_hash(hash);
        let slot = hierarchy.materialize(&pointer, &NoProgress::handle()).await.unwrap();
        assert_eq!(read(&slot.content()), b"genuine");
        assert_eq!(fx.transport.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_origin_is_fetch_failure() {
        let fx = Fixture::new(MockTransport::new());
        let pointer = Pointer::file("https://example.com/gone.bin").unwrap();
        let err = fx.hierarchy().materialize(&pointer, &NoProgress::handle()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::FetchFailed { url, .. } if url == "https://example.com/gone.bin"));
        assert!(fx.disk.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_garbage_archive_is_expand_failure() {
        let fx = Fixture::new(MockTransport::new().with("https://example.com/bad.zip", b"not a zip".to_vec()));
        let pointer = Pointer::zip("https://example.com/bad.zip").unwrap();
        let err = fx.hierarchy().materialize(&pointer, &NoProgress::handle()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ExpandFailed { .. }));
        // The scratch directory went away with the failed attempt.
        assert_eq!(fx.disk.clean(std::time::Duration::ZERO).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_changed_origin_is_accepted() {
        let fx = Fixture::new(MockTransport::new().with("https://example.com/a.bin", b"v2".to_vec()));
        let pointer = Pointer::file("https://example.com/a.bin").unwrap().with_hash(ContentHash::of(b"v1"));
        let slot = fx.hierarchy().materialize(&pointer, &NoProgress::handle()).await.unwrap();
        assert_eq!(slot.hash, ContentHash::of(b"v2"));
    }

    #[tokio::test]
    async fn test_slot_missing_meta_is_refetched() {
        let fx = Fixture::new(MockTransport::new().with("https://example.com/a.bin", b"payload".to_vec()));
        // Disk only, so that no other tier can serve the entry.
        let hierarchy = CacheHierarchy::new(fx.disk.clone(), fx.transport.clone());
        let pointer = Pointer::file("https://example.com/a.bin").unwrap();
        let slot = hierarchy.materialize(&pointer, &NoProgress::handle()).await.unwrap();
        std::fs::remove_file(slot.dir.join("meta.json")).unwrap();

        let again = hierarchy.materialize(&pointer.with_hash(slot.hash), &NoProgress::handle()).await.unwrap();
        assert_eq!(again, slot);
        assert_eq!(fx.transport.fetch_count(), 2);
        assert_eq!(fx.disk.get(&slot.hash).await.unwrap(), Some(slot));
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_underlying_reason() {
        let fx = Fixture::new(MockTransport::new().with("https://example.com/a.bin", b"payload".to_vec()));
        // A file where the scratch directory should be.
        std::fs::write(fx.disk.root().join(".scratch"), b"").unwrap();
        let pointer = Pointer::file("https://example.com/a.bin").unwrap();
        let err = fx.hierarchy().materialize(&pointer, &NoProgress::handle()).await.unwrap_err();
        let ErrorKind::Storage { tier, reason } = &*err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(tier, "disk");
        assert!(reason.starts_with("I/O error"), "{reason}");
    }
}
