use axum::{middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{AppConfig, DetailService, RefreshCoordinator, SnapshotStore};

pub mod handlers;
pub mod middleware;
pub mod responses;

pub use handlers::{car_detail, health_check, list_cars, DATA_STALE_HEADER};
pub use responses::*;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RefreshCoordinator>,
    pub details: Arc<DetailService>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        coordinator: Arc<RefreshCoordinator>,
        details: Arc<DetailService>,
        config: AppConfig,
    ) -> Self {
        Self {
            coordinator,
            details,
            config,
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        self.coordinator.store()
    }
}

pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout);

    Router::new()
        // Health check
        .route("/health", get(health_check))

        // API routes
        .nest("/api", api_routes())

        // Add middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)))
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive())
                .layer(axum_middleware::from_fn(middleware::security_headers))
                .layer(axum_middleware::from_fn_with_state(timeout, middleware::request_timeout))
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/cars", get(list_cars))
        .route("/cars/detail", get(car_detail))
}

pub async fn serve(config: AppConfig, state: AppState) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", config.server.host, config.server.port)
    ).await?;

    tracing::info!(
        "Server starting on {}:{}",
        config.server.host,
        config.server.port
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
