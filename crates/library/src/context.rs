use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use lfx_cache::{CacheHierarchy, EntryStore};
use lfx_config::Environment;
use lfx_progress::{NoProgress, ProgressAggregator, ProgressHandle};
use lfx_storage::{LinkHandle, LocalTier, SystemLinks, TierHandle};
use lfx_transport::TransportHandle;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Everything a command needs: the entry store over the configured tiers,
/// the enlistment's content and info directories, and the progress
/// aggregator when progress is being reported.
pub struct Context {
    pub store: EntryStore,
    pub content_dir: PathBuf,
    pub info_dir: PathBuf,
    pub links: LinkHandle,
    pub parallelism: usize,
    pub scratch_grace: Duration,
    /// `None` when running quietly.
    pub progress: Option<Arc<ProgressAggregator>>,
}

impl Context {
    /// Open the tiers named by `env` and wire them to `transport`.
    ///
    /// The Lan tier is opened without creating its root: it is somebody
    /// else's mirror.
    pub fn new(env: &Environment, transport: TransportHandle, progress: Option<Arc<ProgressAggregator>>) -> Result<Self> {
        let disk: TierHandle = Arc::new(LocalTier::new("disk", &env.disk_cache_dir).or_raise(|| ErrorKind::Config)?);
        let mut hierarchy = CacheHierarchy::new(disk, transport);
        if let Some(dir) = &env.bus_cache_dir {
            hierarchy = hierarchy.with_bus(Arc::new(LocalTier::new("bus", dir).or_raise(|| ErrorKind::Config)?));
        }
        if let Some(dir) = &env.lan_cache_dir {
            hierarchy = hierarchy.with_lan(Arc::new(LocalTier::existing("lan", dir).or_raise(|| ErrorKind::Config)?));
        }
        Ok(Self::from_parts(hierarchy, env.content_dir.clone(), env.info_dir.clone(), progress)
            .with_parallelism(env.parallelism)
            .with_scratch_grace(env.scratch_grace))
    }

    pub fn from_parts(
        hierarchy: CacheHierarchy,
        content_dir: PathBuf,
        info_dir: PathBuf,
        progress: Option<Arc<ProgressAggregator>>,
    ) -> Self {
        let handle: ProgressHandle = match &progress {
            Some(aggregator) => aggregator.clone(),
            None => NoProgress::handle(),
        };
        Self {
            store: EntryStore::new(hierarchy, handle),
            content_dir,
            info_dir,
            links: SystemLinks::handle(),
            parallelism: lfx_config::default_parallelism(),
            scratch_grace: Duration::from_secs(lfx_config::DEFAULT_SCRATCH_GRACE_SECS),
            progress,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_scratch_grace(mut self, grace: Duration) -> Self {
        self.scratch_grace = grace;
        self
    }

    pub fn with_links(mut self, links: LinkHandle) -> Self {
        self.links = links;
        self
    }

    pub fn hierarchy(&self) -> &CacheHierarchy {
        self.store.hierarchy()
    }

    /// Drive every known progress total to completion and render once more.
    pub fn finish_progress(&self) {
        if let Some(progress) = &self.progress {
            progress.finish();
        }
    }
}
