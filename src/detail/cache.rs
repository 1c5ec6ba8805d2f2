use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::models::DetailRecord;

struct CachedDetail {
    stored_at: Instant,
    record: Arc<DetailRecord>,
}

pub const DEFAULT_MAX_ENTRIES: usize = 1_000;

/// Detail records keyed by `provider|normalized_url`, bounded in both age
/// and count. Every insert sweeps expired entries; at capacity the oldest
/// entry makes room.
pub struct DetailCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, CachedDetail>>,
}

impl DetailCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_max_entries(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CachedDetail>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<Arc<DetailRecord>> {
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.record.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, record: DetailRecord) -> Arc<DetailRecord> {
        let record = Arc::new(record);
        let ttl = self.ttl;
        let mut entries = self.entries();
        entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);

        while entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(oldest) => {
                    entries.remove(&oldest);
                    metrics::counter!("detail_cache_evictions_total").increment(1);
                }
                None => break,
            }
        }

        entries.insert(
            key,
            CachedDetail {
                stored_at: Instant::now(),
                record: record.clone(),
            },
        );
        record
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
