use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::Listing;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    Ok,
    Error,
}

/// Per-source outcome of one refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceStatus {
    pub id: String,
    pub name: String,
    pub count: usize,
    pub status: SourceState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceError {
    pub id: String,
    pub message: String,
}

/// The aggregated result of one refresh. Replaced as a whole, never patched.
///
/// `fetched_at` is milliseconds since the Unix epoch. Zero means the snapshot
/// was never fetched and is always stale.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub listings: Vec<Listing>,
    #[serde(default)]
    pub fetched_at: i64,
    #[serde(default)]
    pub sources: Vec<SourceStatus>,
    #[serde(default)]
    pub errors: Vec<SourceError>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_data(&self) -> bool {
        self.fetched_at > 0
    }

    pub fn fetched_at_utc(&self) -> Option<DateTime<Utc>> {
        if !self.has_data() {
            return None;
        }
        Utc.timestamp_millis_opt(self.fetched_at).single()
    }

    /// `now - fetched_at < ttl`, evaluated at `now_ms`.
    pub fn is_fresh_at(&self, now_ms: i64, ttl: Duration) -> bool {
        if !self.has_data() {
            return false;
        }
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.fetched_at) < ttl_ms
    }

    /// True when sources were registered and none of them produced data.
    pub fn all_sources_failed(&self) -> bool {
        !self.sources.is_empty()
            && self.sources.iter().all(|s| s.status == SourceState::Error)
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
