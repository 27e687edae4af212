//! Byte-level progress shared by many concurrent workers.
//!
//! Producers (downloads, archive expansion, copies between cache tiers) call
//! [`ProgressSink::report`] from whichever task or thread they run on. The
//! [`ProgressAggregator`] folds those reports into per-kind atomic counters and
//! hands snapshots to an optional renderer.

use derive_more::Display;
use std::fmt::{self, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

mod size;

pub use crate::size::HumanBytes;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressKind {
    Download,
    Expand,
    Copy,
}
impl ProgressKind {
    /// Every kind, in display order.
    pub const ALL: [ProgressKind; 3] = [Self::Download, Self::Expand, Self::Copy];

    fn index(self) -> usize {
        match self {
            Self::Download => 0,
            Self::Expand => 1,
            Self::Copy => 2,
        }
    }
}

/// Observer for byte-producing work.
pub trait ProgressSink: Send + Sync {
    /// Record `bytes` more bytes of `kind` work. Called concurrently.
    fn report(&self, kind: ProgressKind, bytes: u64);
}

pub type ProgressHandle = Arc<dyn ProgressSink>;

/// Sink that discards everything; used for quiet operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;
impl ProgressSink for NoProgress {
    fn report(&self, _kind: ProgressKind, _bytes: u64) {}
}

impl NoProgress {
    pub fn handle() -> ProgressHandle {
        Arc::new(Self)
    }
}

#[derive(Default)]
struct Counter {
    progress: AtomicU64,
    total: AtomicU64,
    has_total: AtomicBool,
}

type Renderer = Box<dyn Fn(&Snapshot) + Send + Sync>;

pub struct ProgressAggregator {
    counters: [Counter; 3],
    renderer: Option<Renderer>,
    interval: Duration,
    // Serializes rendering only; counters never wait on it.
    last_render: Mutex<Option<Instant>>,
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self {
            counters: Default::default(),
            renderer: None,
            interval: Duration::from_millis(100),
            last_render: Mutex::new(None),
        }
    }

    /// Attach a renderer invoked with fresh snapshots, at most once per
    /// `interval` while work is being reported, and always on [`finish`](Self::finish).
    pub fn with_renderer(mut self, interval: Duration, renderer: impl Fn(&Snapshot) + Send + Sync + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self.interval = interval;
        self
    }

    /// Add to the expected total for `kind`. Totals are only ever increased.
    pub fn add_total(&self, kind: ProgressKind, bytes: u64) {
        let counter = &self.counters[kind.index()];
        counter.total.fetch_add(bytes, Ordering::Relaxed);
        counter.has_total.store(true, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        let entries = ProgressKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let counter = &self.counters[kind.index()];
                let progress = counter.progress.load(Ordering::Relaxed);
                let total = counter.has_total.load(Ordering::Relaxed).then(|| counter.total.load(Ordering::Relaxed));
                (progress > 0 || total.is_some_and(|t| t > 0)).then_some(Entry { kind, progress, total })
            })
            .collect();
        Snapshot { entries }
    }

    /// Bring every kind with a known total up to 100% and render once more.
    ///
    /// Progress never moves backwards: a kind that overshot its estimated
    /// total keeps its larger value.
    pub fn finish(&self) {
        for counter in &self.counters {
            if counter.has_total.load(Ordering::Relaxed) {
                counter.progress.fetch_max(counter.total.load(Ordering::Relaxed), Ordering::Relaxed);
            }
        }
        tracing::info!(summary = %self.snapshot(), "Transfers finished");
        if let Some(renderer) = &self.renderer {
            let mut last = self.last_render.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            renderer(&self.snapshot());
            *last = Some(Instant::now());
        }
    }

    fn maybe_render(&self) {
        let Some(renderer) = &self.renderer else {
            return;
        };
        // Someone else is rendering; their snapshot is recent enough.
        let Ok(mut last) = self.last_render.try_lock() else {
            return;
        };
        if last.is_some_and(|at| at.elapsed() < self.interval) {
            return;
        }
        renderer(&self.snapshot());
        *last = Some(Instant::now());
    }
}

impl ProgressSink for ProgressAggregator {
    fn report(&self, kind: ProgressKind, bytes: u64) {
        if bytes == 0 {
            return;
        }
        self.counters[kind.index()].progress.fetch_add(bytes, Ordering::Relaxed);
        self.maybe_render();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub kind: ProgressKind,
    pub progress: u64,
    pub total: Option<u64>,
}

impl Entry {
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(0) | None => None,
            Some(total) => Some((self.progress as f64 / total as f64 * 100.0).min(100.0)),
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, HumanBytes(self.progress))?;
        if let Some(percent) = self.percent() {
            write!(f, " ({percent:.2}%)")?;
        }
        Ok(())
    }
}

/// Point-in-time view of every kind that has seen work or has a total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub entries: Vec<Entry>,
}

impl Snapshot {
    pub fn get(&self, kind: ProgressKind) -> Option<&Entry> {
        self.entries.iter().find(|e| e.kind == kind)
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}
