use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::future::Shared;
use futures::FutureExt;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;
use tracing::Instrument;

use crate::metrics::FETCHES;
use crate::metrics::FETCHES_COALESCED;
use crate::ConfigKey;
use crate::FetchError;
use crate::Payload;
use crate::Result;

/// Result shared by every caller of one fetch: the payload, or `None` when
/// the fetch failed.
pub type FetchOutcome = Option<Arc<Payload>>;

type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

struct InFlightFetch {
    id: u64,
    shared: SharedFetch,
}

/// Removes the in-flight marker when the fetch task ends, whether it
/// returned, failed or panicked.
struct InFlightGuard {
    in_flight: Arc<DashMap<ConfigKey, InFlightFetch>>,
    key: ConfigKey,
    id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove_if(&self.key, |_, fetch| fetch.id == self.id);
        trace!(key = %self.key, id = self.id, "in-flight fetch settled");
    }
}

/// Collapses concurrent fetches of the same key into one.
///
/// The first caller for a key spawns the work as a task; later callers await
/// the same shared result until it settles. Because the work runs in its own
/// task, a caller dropping its future never aborts a fetch others wait on.
/// No retry happens here: the marker is removed as soon as the task ends, so
/// the next call after a failure starts a fresh attempt.
#[derive(Default)]
pub struct FetchCoordinator {
    in_flight: Arc<DashMap<ConfigKey, InFlightFetch>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl FetchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Awaits the in-flight fetch for `key`, starting it with `work` if there
    /// is none. `work` is only invoked when a new fetch starts.
    pub async fn fetch<F, Fut>(
        &self,
        key: &ConfigKey,
        work: F,
    ) -> FetchOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Payload>>> + Send + 'static,
    {
        let (shared, _) = self.join_or_start(key, work);
        shared.await
    }

    /// Starts a fetch for `key` unless one is already running, without
    /// waiting for it. Failures are logged by the fetch task. Returns whether
    /// a new fetch was started.
    pub fn refresh_in_background<F, Fut>(
        &self,
        key: &ConfigKey,
        work: F,
    ) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Payload>>> + Send + 'static,
    {
        let (_, started) = self.join_or_start(key, work);
        started
    }

    pub fn is_in_flight(
        &self,
        key: &ConfigKey,
    ) -> bool {
        self.in_flight.contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    fn join_or_start<F, Fut>(
        &self,
        key: &ConfigKey,
        work: F,
    ) -> (SharedFetch, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Payload>>> + Send + 'static,
    {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(existing) => {
                FETCHES_COALESCED.inc();
                trace!(%key, "joining in-flight fetch");
                (existing.get().shared.clone(), false)
            }
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let guard = InFlightGuard {
                    in_flight: self.in_flight.clone(),
                    key: key.clone(),
                    id,
                };
                debug!(%key, id, "starting fetch");

                let fut = work();
                let handle = tokio::spawn(async move {
                    let guard = guard;
                    match fut.await {
                        Ok(payload) => {
                            FETCHES.with_label_values(&["ok"]).inc();
                            Some(payload)
                        }
                        Err(e) => {
                            FETCHES.with_label_values(&["error"]).inc();
                            warn!(key = %guard.key, "feature fetch failed: {}", e);
                            None
                        }
                    }
                }
                .in_current_span());

                let task_key = key.clone();
                let shared = async move {
                    match handle.await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            FETCHES.with_label_values(&["error"]).inc();
                            let e = FetchError::from(e);
                            error!(key = %task_key, "{}", e);
                            None
                        }
                    }
                }
                .boxed()
                .shared();

                slot.insert(InFlightFetch {
                    id,
                    shared: shared.clone(),
                });
                (shared, true)
            }
        }
    }
}
