//! Per-process resolution of pointers to cache entries.
//!
//! Concurrent resolutions of the same content share one materialization.
//! Gates are keyed by content hash when the pointer carries one, and by the
//! pointer's `(kind, url, launch_args)` identity until its hash is learned.

use crate::entry::CacheEntry;
use crate::error::{ErrorKind, Result};
use crate::hierarchy::CacheHierarchy;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use lfx_pointer::{ContentHash, Pointer};
use lfx_progress::ProgressHandle;
use lfx_storage::Slot;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::instrument;

type Materialization = BoxFuture<'static, std::result::Result<Slot, ErrorKind>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GateKey {
    Hash(ContentHash),
    Pointer(Pointer),
}

#[derive(Default)]
struct State {
    resolved: HashMap<ContentHash, Slot>,
    identities: HashMap<Pointer, ContentHash>,
    // Weak, so that when every waiter gives up the materialization is
    // dropped and its scratch directory cleaned up.
    inflight: HashMap<GateKey, WeakShared<Materialization>>,
}

struct Inner {
    hierarchy: CacheHierarchy,
    progress: ProgressHandle,
    state: Mutex<State>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        // No invariant spans a panic: every critical section is a few map operations.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resolves pointers to [`CacheEntry`] values, materializing each piece of
/// content at most once per process no matter how many tasks ask for it.
///
/// Cloning is cheap; clones share the memo table and in-flight gates.
#[derive(Clone)]
pub struct EntryStore {
    inner: Arc<Inner>,
}

impl EntryStore {
    pub fn new(hierarchy: CacheHierarchy, progress: ProgressHandle) -> Self {
        Self {
            inner: Arc::new(Inner { hierarchy, progress, state: Mutex::new(State::default()) }),
        }
    }

    pub fn hierarchy(&self) -> &CacheHierarchy {
        &self.inner.hierarchy
    }

    /// Resolve `pointer`, fetching from the origin only when no tier holds
    /// its content.
    ///
    /// Every caller waiting on the same materialization observes the same
    /// outcome. A failure is not remembered: the next call tries again.
    #[instrument(level = "debug", skip(self, pointer), fields(url = %pointer.url()))]
    pub async fn resolve(&self, pointer: &Pointer) -> Result<CacheEntry> {
        let flight = {
            let mut state = self.inner.state();
            // What this process learned wins over a recorded hash, which may
            // predate a change at the origin.
            let known = state.identities.get(pointer).copied().or_else(|| pointer.hash().copied());
            if let Some(slot) = known.and_then(|hash| state.resolved.get(&hash)) {
                return Ok(CacheEntry::new(pointer, slot));
            }
            let key = match known {
                Some(hash) => GateKey::Hash(hash),
                None => GateKey::Pointer(pointer.clone()),
            };
            match state.inflight.get(&key).and_then(WeakShared::upgrade) {
                Some(flight) => {
                    tracing::debug!("Joining in-flight materialization");
                    flight
                },
                None => {
                    let target = match known {
                        Some(hash) => pointer.with_hash(hash),
                        None => pointer.clone(),
                    };
                    let flight = self.launch(key.clone(), target).boxed().shared();
                    if let Some(weak) = flight.downgrade() {
                        state.inflight.insert(key, weak);
                    }
                    flight
                },
            }
        };
        match flight.await {
            Ok(slot) => Ok(CacheEntry::new(pointer, &slot)),
            Err(kind) => Err(exn::Exn::from(kind)),
        }
    }

    fn launch(&self, key: GateKey, pointer: Pointer) -> impl Future<Output = std::result::Result<Slot, ErrorKind>> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        async move {
            let result = inner.hierarchy.materialize(&pointer, &inner.progress).await;
            let mut state = inner.state();
            state.inflight.remove(&key);
            match result {
                Ok(slot) => {
                    state.identities.insert(pointer, slot.hash);
                    state.resolved.insert(slot.hash, slot.clone());
                    Ok(slot)
                },
                Err(err) => {
                    // Waiters only receive the kind; keep the full tree in the log.
                    tracing::debug!(error = ?err, url = %pointer.url(), "Materialization failed");
                    Err((*err).clone())
                },
            }
        }
    }
}
