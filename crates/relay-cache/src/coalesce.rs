//! Load coalescing with stampede protection.
//!
//! A `LoadCoalescer` runs at most one load per key at a time. Callers that
//! arrive while a load is in flight wait on the same shared completion
//! instead of starting their own.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

/// Result shared by every participant of a load.
pub type LoadResult = Result<(), LoadError>;

/// Failure of a coalesced load, cloned to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// Fetching the source failed.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The fetched body could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Writing to the store failed.
    #[error("store failed: {0}")]
    Store(String),
}

/// How a caller took part in a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participation {
    /// The caller started the load.
    Led,
    /// The caller waited on a load another caller started.
    Joined,
}

/// Outcome of `LoadCoalescer::run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// How the caller took part.
    pub participation: Participation,
    /// Result of the shared load.
    pub result: LoadResult,
}

impl LoadReport {
    /// Whether the shared load succeeded.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Whether the caller joined an existing load.
    pub fn joined(&self) -> bool {
        self.participation == Participation::Joined
    }
}

type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;
type InFlight = Arc<Mutex<HashMap<String, SharedLoad>>>;

/// Tracks in-flight loads keyed by string.
#[derive(Clone, Default)]
pub struct LoadCoalescer {
    in_flight: InFlight,
}

impl LoadCoalescer {
    /// Create a coalescer with nothing in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `load` for `key`, or wait on the load already running for it.
    ///
    /// The in-flight marker is removed before any participant is woken, so a
    /// caller that inspects state after `run` returns never sees a finished
    /// load as still in flight. `load` is only invoked when this caller leads.
    pub async fn run<F, Fut>(&self, key: &str, load: F) -> LoadReport
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LoadResult> + Send + 'static,
    {
        let (shared, participation) = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(key) {
                Some(existing) => (existing.clone(), Participation::Joined),
                None => {
                    let registry = Arc::clone(&self.in_flight);
                    let owned_key = key.to_string();
                    let pending = load();
                    let shared = async move {
                        let result = pending.await;
                        lock(&registry).remove(&owned_key);
                        result
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key.to_string(), shared.clone());
                    (shared, Participation::Led)
                }
            }
        };

        debug!(key, ?participation, "awaiting coalesced load");
        let result = shared.await;
        LoadReport {
            participation,
            result,
        }
    }

    /// Whether a load for `key` is currently in flight.
    pub fn is_in_flight(&self, key: &str) -> bool {
        lock(&self.in_flight).contains_key(key)
    }

    /// Number of loads currently in flight.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }
}

impl std::fmt::Debug for LoadCoalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadCoalescer")
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

fn lock(in_flight: &InFlight) -> std::sync::MutexGuard<'_, HashMap<String, SharedLoad>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_load(
        counter: &Arc<AtomicUsize>,
        result: LoadResult,
    ) -> impl FnOnce() -> BoxFuture<'static, LoadResult> {
        let counter = Arc::clone(counter);
        move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                result
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_load() {
        let coalescer = LoadCoalescer::new();
        let loads = Arc::new(AtomicUsize::new(0));

        let reports = futures::future::join_all((0..5).map(|_| {
            coalescer.run("/resources/bar.json", counting_load(&loads, Ok(())))
        }))
        .await;

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(reports.iter().filter(|r| !r.joined()).count(), 1);
        assert!(reports.iter().all(LoadReport::is_ok));
        assert_eq!(coalescer.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reaches_every_waiter() {
        let coalescer = LoadCoalescer::new();
        let loads = Arc::new(AtomicUsize::new(0));
        let failure = Err(LoadError::Fetch("connection refused".to_string()));

        let (a, b) = tokio::join!(
            coalescer.run("k", counting_load(&loads, failure.clone())),
            coalescer.run("k", counting_load(&loads, Ok(()))),
        );

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(a.result, failure);
        assert_eq!(b.result, failure);
        assert!(b.joined());
        assert!(!coalescer.is_in_flight("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_loads_run_again() {
        let coalescer = LoadCoalescer::new();
        let loads = Arc::new(AtomicUsize::new(0));

        coalescer.run("k", counting_load(&loads, Ok(()))).await;
        let second = coalescer.run("k", counting_load(&loads, Ok(()))).await;

        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert!(!second.joined());
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_do_not_coalesce() {
        let coalescer = LoadCoalescer::new();
        let loads = Arc::new(AtomicUsize::new(0));

        tokio::join!(
            coalescer.run("a", counting_load(&loads, Ok(()))),
            coalescer.run("b", counting_load(&loads, Ok(()))),
        );

        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_cleared_before_waiters_wake() {
        let coalescer = LoadCoalescer::new();
        let loads = Arc::new(AtomicUsize::new(0));
        let observer = coalescer.clone();

        let (_, seen_in_flight) = tokio::join!(
            coalescer.run("k", counting_load(&loads, Ok(()))),
            async {
                observer.run("k", counting_load(&loads, Ok(()))).await;
                observer.is_in_flight("k")
            }
        );

        assert!(!seen_in_flight);
    }
}
