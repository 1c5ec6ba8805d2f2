use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Deserialize;

use super::{ApiError, AppState, CarsResponse, DetailResponse, HealthResponse, SnapshotHealth};
use crate::models::{now_millis, Snapshot};

pub const DATA_STALE_HEADER: HeaderName = HeaderName::from_static("x-data-stale");

#[derive(Debug, Default, Deserialize)]
pub struct CarsQuery {
    pub refresh: Option<String>,
}

impl CarsQuery {
    /// `refresh=true` or `refresh=1`; anything else reads the cache.
    pub fn wants_refresh(&self) -> bool {
        self.refresh
            .as_deref()
            .map(|v| v.trim().eq_ignore_ascii_case("true") || v.trim() == "1")
            .unwrap_or(false)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DetailQuery {
    pub url: Option<String>,
    pub source: Option<String>,
}

pub async fn list_cars(
    State(state): State<AppState>,
    Query(query): Query<CarsQuery>,
) -> Result<Response, ApiError> {
    if query.wants_refresh() {
        tracing::info!("Forced refresh requested");
        return match state.coordinator.trigger_refresh().await {
            Ok(snapshot) => Ok(cars_response(&snapshot, false)),
            Err(e) => {
                let current = state.store().current().await;
                if current.has_data() {
                    tracing::warn!(error = %e, "Forced refresh failed, serving previous snapshot");
                    Ok(cars_response(&current, true))
                } else {
                    tracing::error!(error = %e, "Forced refresh failed with nothing to serve");
                    Err(ApiError::from(e.as_ref()))
                }
            }
        };
    }

    let snapshot = state.store().current().await;
    let ttl = state.config.cache.snapshot_ttl();
    let fresh = snapshot.is_fresh_at(now_millis(), ttl);
    if !fresh && state.coordinator.refresh_in_background(ttl) {
        tracing::debug!(fetched_at = snapshot.fetched_at, "Serving stale snapshot, refreshing in background");
    }

    Ok(cars_response(&snapshot, !fresh))
}

fn cars_response(snapshot: &Snapshot, stale: bool) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if stale {
        headers.insert(DATA_STALE_HEADER, HeaderValue::from_static("true"));
    }

    (headers, Json(CarsResponse::from_snapshot(snapshot, Utc::now()))).into_response()
}

pub async fn car_detail(
    State(state): State<AppState>,
    Query(query): Query<DetailQuery>,
) -> Result<Response, ApiError> {
    let url = query.url.unwrap_or_default();
    let lookup = state.details.fetch(&url, query.source.as_deref()).await?;

    Ok(Json(DetailResponse {
        data: &lookup.record,
        cached: lookup.cached,
    })
    .into_response())
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.store().current().await;

    Json(HealthResponse::healthy(SnapshotHealth {
        fetched_at: snapshot.fetched_at,
        count: snapshot.listings.len(),
        fresh: snapshot.is_fresh_at(now_millis(), state.config.cache.snapshot_ttl()),
    }))
}
