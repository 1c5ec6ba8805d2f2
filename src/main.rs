use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use scan_car::{
    metrics::Metrics, web, AppConfig, Collector, DetailService, RefreshCoordinator,
    RefreshScheduler, SnapshotStore, SourceRegistry,
};

#[derive(Parser)]
#[command(name = "scan-car", version, about = "Used-car listing aggregator")]
struct Cli {
    /// Directory holding default.toml and the per-environment overrides
    #[arg(long, default_value = "config")]
    config_dir: String,

    /// Run one refresh, persist it and exit
    #[arg(long)]
    refresh_now: bool,

    /// Serve without the cron trigger
    #[arg(long)]
    no_scheduler: bool,
}

fn init_tracing(config: &AppConfig) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("scan_car=debug".parse()?);

    match config.logging.directory.as_deref() {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir))?;
            let file_appender = tracing_appender::rolling::daily(dir, &config.logging.file_prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}

async fn serve_metrics(config: &AppConfig) -> Result<()> {
    let metrics = Metrics::init()?;
    let addr = format!("{}:{}", config.server.host, config.metrics.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind metrics listener on {}", addr))?;
    info!("Metrics available on {}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, metrics.router()).await {
            tracing::error!(error = %e, "Metrics server stopped");
        }
    });
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::from_dir(&cli.config_dir).context("Failed to load configuration")?;
    // _guard must live until main() returns to flush the file writer
    let _guard = init_tracing(&config)?;

    info!("Starting scan-car...");

    if config.metrics.enabled {
        serve_metrics(&config).await?;
    }

    let registry = SourceRegistry::from_config(&config)?;
    info!(sources = ?registry.list_source_ids(), "Registered sources");

    let store = Arc::new(SnapshotStore::open(&config.cache.storage).await);
    info!(durable = store.is_durable(), "Snapshot store ready");
    let coordinator = Arc::new(
        RefreshCoordinator::new(Collector::from_registry(&registry), store)
            .with_failure_backoff(config.cache.refresh_backoff()),
    );
    let details = Arc::new(DetailService::from_registry(&registry, &config.cache));

    if cli.refresh_now {
        let snapshot = coordinator
            .trigger_refresh()
            .await
            .map_err(|e| anyhow::anyhow!("Refresh failed: {}", e))?;
        info!(
            listings = snapshot.listings.len(),
            failed_sources = snapshot.errors.len(),
            "Refresh complete"
        );
        return Ok(());
    }

    let mut scheduler = None;
    if config.scheduler.enabled && !cli.no_scheduler {
        let mut refresh_scheduler =
            RefreshScheduler::new(Arc::clone(&coordinator), config.scheduler.clone()).await?;
        refresh_scheduler.start().await?;
        refresh_scheduler.refresh_on_start(config.cache.snapshot_ttl());
        scheduler = Some(refresh_scheduler);
    }

    let state = web::AppState::new(coordinator, details, config.clone());
    web::serve(config, state).await?;

    if let Some(mut scheduler) = scheduler {
        scheduler.shutdown().await?;
    }
    info!("Shutting down...");

    Ok(())
}
