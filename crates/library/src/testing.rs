use crate::Context;
use lfx_cache::CacheHierarchy;
use lfx_progress::ProgressAggregator;
use lfx_storage::{LocalTier, TierHandle};
use lfx_transport::MockTransport;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// An enlistment at `<tmp>/repo` with its disk cache at `<tmp>/cache`.
pub(crate) struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    pub disk: TierHandle,
    pub transport: Arc<MockTransport>,
}

impl Fixture {
    pub fn new(transport: MockTransport) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo");
        std::fs::create_dir_all(&root).unwrap();
        let disk: TierHandle = Arc::new(LocalTier::new("disk", dir.path().join("cache")).unwrap());
        Self { _dir: dir, root, disk, transport: Arc::new(transport) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn build(&self, progress: Option<Arc<ProgressAggregator>>) -> Context {
        let hierarchy = CacheHierarchy::new(self.disk.clone(), self.transport.clone());
        Context::from_parts(hierarchy, self.root.join("lfx"), self.root.join(".lfx"), progress).with_parallelism(4)
    }

    pub fn context(&self) -> Context {
        self.build(None)
    }

    pub fn context_with_progress(&self) -> Context {
        self.build(Some(Arc::new(ProgressAggregator::new())))
    }

    /// Write an info file for content path `relative`.
    pub fn track(&self, relative: &str, text: &str) {
        let path = self.root.join(".lfx").join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }
}
