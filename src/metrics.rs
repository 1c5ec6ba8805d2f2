use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::utils::error::{AppError, Result};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Installs the global Prometheus recorder. Fails if a recorder is
    /// already installed.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| AppError::Internal(format!("prometheus: install recorder: {}", e)))?;

        describe_counter!("refresh_runs_total", "Collector runs started");
        describe_counter!("refresh_failures_total", "Refreshes where every source failed");
        describe_gauge!("snapshot_listings", "Listings in the current snapshot");
        describe_counter!("detail_cache_hits_total", "Detail lookups served from cache");
        describe_counter!("detail_cache_misses_total", "Detail lookups sent upstream");
        describe_counter!("detail_cache_evictions_total", "Live detail entries dropped to stay under capacity");

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
