use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::models::{now_millis, Snapshot};
use crate::persistence::{self, SnapshotPersistence};

// stamp for a snapshot that holds no data, never fresh
const NEVER_FETCHED: i64 = i64::MIN;

/// Holds the current snapshot and mirrors every replacement to durable
/// storage. Readers get an `Arc` and never observe a partial update.
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
    // fetched_at of `current`, readable without awaiting the lock
    fetched_at: AtomicI64,
    persistence: Option<Arc<dyn SnapshotPersistence>>,
}

fn freshness_stamp(snapshot: &Snapshot) -> i64 {
    if snapshot.has_data() {
        snapshot.fetched_at
    } else {
        NEVER_FETCHED
    }
}

impl SnapshotStore {
    pub fn new(persistence: Arc<dyn SnapshotPersistence>) -> Self {
        Self::with_snapshot(Snapshot::empty(), Some(persistence))
    }

    /// A store without a durable mirror.
    pub fn in_memory(snapshot: Snapshot) -> Self {
        Self::with_snapshot(snapshot, None)
    }

    fn with_snapshot(snapshot: Snapshot, persistence: Option<Arc<dyn SnapshotPersistence>>) -> Self {
        metrics::gauge!("snapshot_listings").set(snapshot.listings.len() as f64);
        Self {
            fetched_at: AtomicI64::new(freshness_stamp(&snapshot)),
            current: RwLock::new(Arc::new(snapshot)),
            persistence,
        }
    }

    /// Opens the configured storage and restores from it. Storage that
    /// cannot be opened leaves the service running from memory alone.
    pub async fn open(storage: &str) -> Self {
        match persistence::open(storage).await {
            Ok(persistence) => Self::load(persistence).await,
            Err(e) => {
                tracing::warn!(storage, error = %e, "Snapshot storage unavailable, keeping snapshots in memory only");
                Self::in_memory(Snapshot::empty())
            }
        }
    }

    pub fn is_durable(&self) -> bool {
        self.persistence.is_some()
    }

    /// Restores the persisted snapshot. Unreadable or missing storage yields
    /// an empty (never fetched) snapshot instead of an error.
    pub async fn load(persistence: Arc<dyn SnapshotPersistence>) -> Self {
        let snapshot = match persistence.load().await {
            Ok(Some(snapshot)) => {
                tracing::info!(
                    storage = %persistence.describe(),
                    listings = snapshot.listings.len(),
                    fetched_at = snapshot.fetched_at,
                    "Loaded persisted snapshot"
                );
                snapshot
            }
            Ok(None) => {
                tracing::info!(storage = %persistence.describe(), "No persisted snapshot, starting empty");
                Snapshot::empty()
            }
            Err(e) => {
                tracing::warn!(storage = %persistence.describe(), error = %e, "Failed to read persisted snapshot, starting empty");
                Snapshot::empty()
            }
        };
        Self::with_snapshot(snapshot, Some(persistence))
    }

    pub async fn current(&self) -> Arc<Snapshot> {
        self.current.read().await.clone()
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.is_fresh_at(now_millis(), ttl)
    }

    pub fn is_fresh_at(&self, now_ms: i64, ttl: Duration) -> bool {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.fetched_at.load(Ordering::SeqCst)) < ttl_ms
    }

    /// Swaps in `snapshot`, then writes it through to durable storage.
    /// Write failures are logged and otherwise ignored.
    pub async fn replace(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        {
            let mut current = self.current.write().await;
            *current = snapshot.clone();
            self.fetched_at.store(freshness_stamp(&snapshot), Ordering::SeqCst);
        }
        metrics::gauge!("snapshot_listings").set(snapshot.listings.len() as f64);

        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.save(&snapshot).await {
                tracing::warn!(storage = %persistence.describe(), error = %e, "Failed to persist snapshot");
            }
        }

        snapshot
    }
}
