//! Read-only cache tier.
//!
//! Wraps another tier and drops every write, logging an
//! [`info event`](tracing::Event) instead. Used for the lan mirror, which is
//! populated out of band and must never be written by clients.

use async_trait::async_trait;
use lfx_pointer::ContentHash;
use lfx_progress::ProgressHandle;
use std::path::Path;
use std::time::Duration;

use crate::error::{ErrorKind, Result};
use crate::tier::{CacheTier, HashStream, Scratch, Slot, SlotMeta};
use crate::TierHandle;

#[derive(Clone)]
pub struct ReadOnlyTier {
    inner: TierHandle,
}
impl ReadOnlyTier {
    pub fn new(inner: TierHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CacheTier for ReadOnlyTier {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn root(&self) -> &Path {
        self.inner.root()
    }

    fn is_writable(&self) -> bool {
        false
    }

    async fn get(&self, hash: &ContentHash) -> Result<Option<Slot>> {
        self.inner.get(hash).await
    }

    async fn scratch(&self) -> Result<Scratch> {
        exn::bail!(ErrorKind::ReadOnly(self.name().to_string()))
    }

    async fn commit(&self, _hash: &ContentHash, _scratch: Scratch, _meta: SlotMeta) -> Result<Slot> {
        exn::bail!(ErrorKind::ReadOnly(self.name().to_string()))
    }

    async fn put(&self, source: &Slot, _progress: &ProgressHandle) -> Result<Option<Slot>> {
        tracing::info!(tier = self.name(), hash = %source.hash, "Skipping write to read-only tier");
        Ok(None)
    }

    async fn remove(&self, hash: &ContentHash) -> Result<()> {
        tracing::info!(tier = self.name(), %hash, "Skipping delete from read-only tier");
        Ok(())
    }

    fn list_stream(&self) -> HashStream<'_> {
        self.inner.list_stream()
    }

    async fn clean(&self, _grace: Duration) -> Result<u64> {
        tracing::info!(tier = self.name(), "Skipping clean of read-only tier");
        Ok(0)
    }

    async fn clear(&self) -> Result<()> {
        tracing::info!(tier = self.name(), "Skipping clear of read-only tier");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::LocalTier;
    use lfx_progress::NoProgress;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reads_through_and_ignores_writes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let inner = LocalTier::new("lan", temp_dir.path()).unwrap();
        let scratch = inner.scratch().await.unwrap();
        std::fs::write(scratch.content(), b"mirrored").unwrap();
        let hash = ContentHash::of(b"mirrored");
        let slot = inner.commit(&hash, scratch, SlotMeta { size: 8, content_size: None }).await.unwrap();

        let lan = ReadOnlyTier::new(Arc::new(inner));
        assert!(!lan.is_writable());
        assert_eq!(lan.get(&hash).await.unwrap(), Some(slot.clone()));
        assert_eq!(lan.put(&slot, &NoProgress::handle()).await.unwrap(), None);
        lan.remove(&hash).await.unwrap();
        lan.clear().await.unwrap();
        assert_eq!(lan.list().await.unwrap(), vec![hash]);

        let err = lan.scratch().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ReadOnly(_)));
    }
}
