use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{DetailRecord, Listing, Snapshot, SourceError, SourceStatus};
use crate::utils::error::AppError;

/// Body of `GET /api/cars`. Borrows from the snapshot it renders.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarsResponse<'a> {
    pub updated_at: DateTime<Utc>,
    pub count: usize,
    pub sources: &'a [SourceStatus],
    pub errors: &'a [SourceError],
    pub data: &'a [Listing],
}

impl<'a> CarsResponse<'a> {
    /// `updated_at` falls back to `now` for a snapshot that was never fetched.
    pub fn from_snapshot(snapshot: &'a Snapshot, now: DateTime<Utc>) -> Self {
        Self {
            updated_at: snapshot.fetched_at_utc().unwrap_or(now),
            count: snapshot.listings.len(),
            sources: &snapshot.sources,
            errors: &snapshot.errors,
            data: &snapshot.listings,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DetailResponse<'a> {
    pub data: &'a DetailRecord,
    pub cached: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotHealth {
    pub fetched_at: i64,
    pub count: usize,
    pub fresh: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub snapshot: SnapshotHealth,
}

impl HealthResponse {
    pub fn healthy(snapshot: SnapshotHealth) -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            snapshot,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Errors as the HTTP layer reports them: a status code and `{ "error": .. }`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    InternalServerError(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) | ApiError::InternalServerError(msg) => msg,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalServerError(msg.into())
    }
}

impl From<&AppError> for ApiError {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::Validation(msg) => ApiError::BadRequest(msg.clone()),
            other => ApiError::InternalServerError(other.to_string()),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::from(&err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.message().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
