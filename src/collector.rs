use futures::future::join_all;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::models::{now_millis, Listing, Snapshot, SourceError, SourceState, SourceStatus};
use crate::sources::registry::{ListingSourceRef, SourceRegistry};
use crate::utils::text::collation_key;

const GENERIC_FAILURE: &str = "Unknown error while fetching listings";

enum TaskOutcome {
    Fulfilled(Vec<Listing>),
    Rejected(String),
}

/// Runs every registered listing source concurrently and merges whatever
/// succeeded into one snapshot. One source failing never affects another.
#[derive(Clone)]
pub struct Collector {
    sources: Vec<ListingSourceRef>,
}

impl Collector {
    pub fn new(sources: Vec<ListingSourceRef>) -> Self {
        Self { sources }
    }

    pub fn from_registry(registry: &SourceRegistry) -> Self {
        Self::new(registry.listing_sources().to_vec())
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub async fn collect(&self) -> Snapshot {
        let started = Instant::now();

        let handles = self.sources.iter().map(|source| {
            let source = source.clone();
            tokio::spawn(async move {
                let task_started = Instant::now();
                let result = source.fetch_listings().await;
                debug!(
                    source = source.id(),
                    ok = result.is_ok(),
                    elapsed_ms = task_started.elapsed().as_millis() as u64,
                    "Source task settled"
                );
                result
            })
        });

        // join_all keeps registry order regardless of completion order
        let outcomes: Vec<TaskOutcome> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(Ok(listings)) => TaskOutcome::Fulfilled(listings),
                Ok(Err(err)) => TaskOutcome::Rejected(failure_message(&format!("{:#}", err))),
                Err(join_err) if join_err.is_panic() => {
                    TaskOutcome::Rejected("Source task panicked".to_string())
                }
                Err(join_err) => TaskOutcome::Rejected(failure_message(&join_err.to_string())),
            })
            .collect();

        let snapshot = merge(&self.sources, outcomes);
        info!(
            listings = snapshot.listings.len(),
            failed = snapshot.errors.len(),
            sources = snapshot.sources.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Collected listings"
        );
        snapshot
    }
}

fn failure_message(message: &str) -> String {
    let message = message.trim();
    if message.is_empty() {
        GENERIC_FAILURE.to_string()
    } else {
        message.to_string()
    }
}

fn merge(sources: &[ListingSourceRef], outcomes: Vec<TaskOutcome>) -> Snapshot {
    let mut listings = Vec::new();
    let mut statuses = Vec::with_capacity(sources.len());
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (source, outcome) in sources.iter().zip(outcomes) {
        match outcome {
            TaskOutcome::Fulfilled(items) => {
                let mut count = 0;
                for listing in items {
                    if seen.insert(listing.id.clone()) {
                        listings.push(listing);
                        count += 1;
                    } else {
                        debug!(source = source.id(), id = %listing.id, "Dropping duplicate listing id");
                    }
                }
                statuses.push(SourceStatus {
                    id: source.id().to_string(),
                    name: source.name().to_string(),
                    count,
                    status: SourceState::Ok,
                });
            }
            TaskOutcome::Rejected(message) => {
                warn!(source = source.id(), error = %message, "Source failed");
                statuses.push(SourceStatus {
                    id: source.id().to_string(),
                    name: source.name().to_string(),
                    count: 0,
                    status: SourceState::Error,
                });
                errors.push(SourceError {
                    id: source.id().to_string(),
                    message,
                });
            }
        }
    }

    listings.sort_by_cached_key(|l: &Listing| (collation_key(&l.title), l.title.clone(), l.id.clone()));

    Snapshot {
        listings,
        fetched_at: now_millis(),
        sources: statuses,
        errors,
    }
}
