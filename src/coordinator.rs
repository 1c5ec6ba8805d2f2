use futures::future::{BoxFuture, FutureExt, Shared};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::collector::Collector;
use crate::models::{now_millis, Snapshot};
use crate::store::SnapshotStore;
use crate::utils::error::AppError;

/// Outcome shared by every caller that joined one refresh run.
pub type RefreshOutcome = Result<Arc<Snapshot>, Arc<AppError>>;

type InFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

pub const DEFAULT_FAILURE_BACKOFF: Duration = Duration::from_secs(60);

// last_failure value while the most recent run succeeded
const NO_FAILURE: i64 = 0;

/// Ensures at most one collector run is in flight. Concurrent callers join
/// the running refresh and all observe its outcome.
pub struct RefreshCoordinator {
    collector: Collector,
    store: Arc<SnapshotStore>,
    // (generation, handle); the spawned run only clears its own generation
    in_flight: Arc<Mutex<Option<(u64, InFlight)>>>,
    generation: AtomicU64,
    runs: Arc<AtomicU64>,
    failure_backoff: Duration,
    // millis of the last total failure, NO_FAILURE after a success
    last_failure: Arc<AtomicI64>,
}

fn lock_slot(slot: &Mutex<Option<(u64, InFlight)>>) -> MutexGuard<'_, Option<(u64, InFlight)>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RefreshCoordinator {
    pub fn new(collector: Collector, store: Arc<SnapshotStore>) -> Self {
        Self {
            collector,
            store,
            in_flight: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
            runs: Arc::new(AtomicU64::new(0)),
            failure_backoff: DEFAULT_FAILURE_BACKOFF,
            last_failure: Arc::new(AtomicI64::new(NO_FAILURE)),
        }
    }

    /// How long background refreshes hold off after every source failed.
    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff;
        self
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Number of collector runs started so far.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn is_refreshing(&self) -> bool {
        lock_slot(&self.in_flight).is_some()
    }

    /// Runs a refresh, or joins the one already in flight, and waits for it.
    /// Ignores freshness and the failure backoff.
    pub async fn trigger_refresh(&self) -> RefreshOutcome {
        let refresh = {
            let mut slot = lock_slot(&self.in_flight);
            match slot.as_ref() {
                Some((_, running)) => {
                    tracing::debug!("Joining in-flight refresh");
                    running.clone()
                }
                None => self.start(&mut slot),
            }
        };
        refresh.await
    }

    /// Starts a background refresh unless one is running, the snapshot is
    /// fresh for `ttl`, or the last run failed within the backoff window.
    /// Freshness is checked under the same lock that starts the run, so a
    /// read racing a refresh that just settled does not start another.
    /// Returns whether a run is now in flight.
    pub fn refresh_in_background(&self, ttl: Duration) -> bool {
        let mut slot = lock_slot(&self.in_flight);
        if slot.is_some() {
            return true;
        }

        let now = now_millis();
        if self.store.is_fresh_at(now, ttl) {
            return false;
        }
        if self.in_failure_backoff(now) {
            tracing::debug!("Last refresh failed recently, not retrying yet");
            return false;
        }

        let refresh = self.start(&mut slot);
        drop(slot);
        tokio::spawn(async move {
            match refresh.await {
                Ok(snapshot) => tracing::debug!(
                    listings = snapshot.listings.len(),
                    "Background refresh finished"
                ),
                Err(e) => tracing::warn!(error = %e, "Background refresh failed"),
            }
        });
        true
    }

    fn in_failure_backoff(&self, now: i64) -> bool {
        let failed_at = self.last_failure.load(Ordering::SeqCst);
        let backoff_ms = i64::try_from(self.failure_backoff.as_millis()).unwrap_or(i64::MAX);
        failed_at != NO_FAILURE && now.saturating_sub(failed_at) < backoff_ms
    }

    // caller holds the slot lock and has checked that it is empty
    fn start(&self, slot: &mut MutexGuard<'_, Option<(u64, InFlight)>>) -> InFlight {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let collector = self.collector.clone();
        let store = self.store.clone();
        let runs = self.runs.clone();
        let last_failure = self.last_failure.clone();
        let release = self.in_flight.clone();

        // spawned so the run completes even if every caller goes away
        let task = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(run_refresh(collector, store, runs))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    tracing::error!("Refresh panicked");
                    Err(Arc::new(AppError::Internal("refresh panicked".to_string())))
                });
            let failed_at = if outcome.is_ok() { NO_FAILURE } else { now_millis() };
            last_failure.store(failed_at, Ordering::SeqCst);

            let mut slot = lock_slot(&release);
            if matches!(slot.as_ref(), Some((current, _)) if *current == generation) {
                *slot = None;
            }
            outcome
        });

        let handle = async move {
            task.await.unwrap_or_else(|e| {
                Err(Arc::new(AppError::Internal(format!("refresh task failed: {}", e))))
            })
        }
        .boxed()
        .shared();

        **slot = Some((generation, handle.clone()));
        handle
    }
}

async fn run_refresh(
    collector: Collector,
    store: Arc<SnapshotStore>,
    runs: Arc<AtomicU64>,
) -> RefreshOutcome {
    let run = runs.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::counter!("refresh_runs_total").increment(1);
    tracing::info!(run, sources = collector.source_count(), "Refreshing listings");

    let snapshot = collector.collect().await;

    if snapshot.all_sources_failed() {
        metrics::counter!("refresh_failures_total").increment(1);
        let failed = snapshot.errors.len();
        tracing::error!(run, failed, "Every source failed, keeping previous snapshot");
        return Err(Arc::new(AppError::TotalRefreshFailure { failed }));
    }

    if !snapshot.errors.is_empty() {
        tracing::warn!(run, failed = snapshot.errors.len(), "Refresh finished with partial failures");
    }
    Ok(store.replace(snapshot).await)
}
