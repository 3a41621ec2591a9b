//! Process-wide concurrency control.
//!
//! Three coordination tools live here:
//! - a semaphore bounding in-flight LLM calls,
//! - a per-profile mutex table serializing completions,
//! - a per-key single-flight so concurrent story requests for one route
//!   share a single computation, success or failure.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};

use crate::infrastructure::ports::{
    CompletionRequest, CompletionResponse, LlmError, LlmPort,
};
use trailweaver_domain::ProfileId;

// =============================================================================
// LLM concurrency cap
// =============================================================================

/// LlmPort wrapper that holds a semaphore permit for the duration of each
/// call. The permit is tied to the future, so cancellation releases it.
pub struct GatedLlmClient {
    inner: Arc<dyn LlmPort>,
    permits: Arc<Semaphore>,
}

impl GatedLlmClient {
    pub fn new(inner: Arc<dyn LlmPort>, max_concurrency: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }
}

#[async_trait]
impl LlmPort for GatedLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| LlmError::RequestFailed("LLM semaphore closed".to_string()))?;
        self.inner.complete(request).await
    }
}

// =============================================================================
// Per-profile serialization
// =============================================================================

/// Mutex table keyed by profile id. At most one completion per profile is in
/// flight; additional callers wait rather than race.
#[derive(Default)]
pub struct ProfileLocks {
    locks: DashMap<ProfileId, Arc<Mutex<()>>>,
}

impl ProfileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, profile_id: ProfileId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(profile_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

// =============================================================================
// Per-key single-flight
// =============================================================================

/// Concurrent callers for the same key share one underlying computation and
/// observe the same result, success or failure.
pub struct SingleFlight<K, T>
where
    K: Eq + Hash,
{
    inflight: DashMap<K, (u64, Shared<BoxFuture<'static, T>>)>,
    counter: AtomicU64,
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            inflight: DashMap::new(),
            counter: AtomicU64::new(0),
        }
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `make()` under the key, or join an in-flight run.
    ///
    /// The leader removes the entry once the computation settles, so a later
    /// call starts fresh.
    pub async fn run<F>(&self, key: K, make: F) -> T
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        use dashmap::mapref::entry::Entry;

        let (token, shared, leader) = match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let (token, shared) = entry.get().clone();
                (token, shared, false)
            }
            Entry::Vacant(entry) => {
                let token = self.counter.fetch_add(1, Ordering::Relaxed);
                let shared = make().shared();
                entry.insert((token, shared.clone()));
                (token, shared, true)
            }
        };

        let result = shared.await;

        if leader {
            // Only remove our own entry; a racing newer flight keeps its slot.
            self.inflight
                .remove_if(&key, |_, (entry_token, _)| *entry_token == token);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingLlm {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl LlmPort for CountingLlm {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(CompletionResponse {
                content: "ok".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn semaphore_bounds_in_flight_llm_calls() {
        let counting = Arc::new(CountingLlm {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let gated = Arc::new(GatedLlmClient::new(counting.clone(), 2));

        let calls: Vec<_> = (0..6)
            .map(|_| {
                let gated = Arc::clone(&gated);
                tokio::spawn(async move { gated.complete(CompletionRequest::text("x")).await })
            })
            .collect();
        for call in calls {
            call.await.expect("join").expect("complete");
        }

        assert!(counting.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn profile_locks_serialize_critical_sections() {
        let locks = Arc::new(ProfileLocks::new());
        let overlap = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let overlap = Arc::clone(&overlap);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let _guard = locks.lock(ProfileId::new(1)).await;
                    let now = overlap.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    overlap.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("join");
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_profiles_do_not_block_each_other() {
        let locks = ProfileLocks::new();
        let _one = locks.lock(ProfileId::new(1)).await;
        // A second profile's lock must be immediately available.
        let _two = locks.lock(ProfileId::new(2)).await;
    }

    #[tokio::test]
    async fn single_flight_shares_one_execution() {
        let flights: Arc<SingleFlight<i64, Result<String, String>>> =
            Arc::new(SingleFlight::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let flights = Arc::clone(&flights);
                let executions = Arc::clone(&executions);
                tokio::spawn(async move {
                    flights
                        .run(7, move || {
                            async move {
                                executions.fetch_add(1, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(20)).await;
                                Ok("done".to_string())
                            }
                            .boxed()
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.expect("join"), Ok("done".to_string()));
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_flight_shares_failures_too() {
        let flights: Arc<SingleFlight<i64, Result<String, String>>> =
            Arc::new(SingleFlight::new());

        let first = flights.run(1, || {
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err::<String, _>("boom".to_string())
            }
            .boxed()
        });
        let second = flights.run(1, || {
            async move { Ok::<_, String>("should not run".to_string()) }.boxed()
        });
        let (a, b) = tokio::join!(first, second);

        // Both callers observe the leader's failure.
        assert_eq!(a, Err("boom".to_string()));
        assert_eq!(b, Err("boom".to_string()));
    }

    #[tokio::test]
    async fn single_flight_resets_after_completion() {
        let flights: SingleFlight<i64, Result<i32, String>> = SingleFlight::new();

        let first = flights
            .run(1, || async move { Ok::<_, String>(1) }.boxed())
            .await;
        let second = flights
            .run(1, || async move { Ok::<_, String>(2) }.boxed())
            .await;

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(2));
    }
}
