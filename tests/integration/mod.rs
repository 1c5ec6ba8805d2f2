// Integration tests for scan-car
// These tests verify that all components work together correctly

pub mod api_tests;
pub mod provider_tests;
pub mod refresh_tests;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;

use scan_car::{
    config::{
        CacheConfig, LoggingConfig, MetricsConfig, SchedulerConfig, ScraperConfig, ServerConfig,
        SourcesConfig,
    },
    models::{DetailRecord, Listing, Snapshot, SourceState, SourceStatus},
    persistence::{FileSnapshotPersistence, SnapshotPersistence},
    sources::registry::{DetailSourceRef, ListingSourceRef},
    sources::{DetailSource, ListingSource, ProviderProfile},
    web::{create_router, AppState},
    AppConfig, Collector, DetailService, RefreshCoordinator, SnapshotStore,
};

/// Test configuration for integration tests
pub fn get_test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            request_timeout: 10,
        },
        cache: CacheConfig {
            snapshot_ttl_secs: 7200,
            detail_ttl_secs: 1800,
            detail_max_entries: 100,
            storage: "snapshot.json".to_string(),
            refresh_backoff_secs: 60,
        },
        scheduler: SchedulerConfig {
            enabled: true,
            cron: "*/15 * * * *".to_string(),
            timezone: "Asia/Ho_Chi_Minh".to_string(),
            refresh_on_start: true,
        },
        scraper: get_test_scraper_config(),
        sources: SourcesConfig {
            enabled: vec!["bonbanh".to_string()],
        },
        metrics: MetricsConfig {
            enabled: false,
            port: 9090,
        },
        logging: LoggingConfig {
            directory: None,
            file_prefix: "scan-car-test.log".to_string(),
        },
    }
}

/// No retries, short timeouts: upstream failures should surface immediately.
pub fn get_test_scraper_config() -> ScraperConfig {
    ScraperConfig {
        user_agent: "ScanCar-Test/1.0".to_string(),
        request_timeout: 5,
        retry_attempts: 0,
        retry_delay_ms: 1,
        pool_workers: 2,
        pool_request_timeout_ms: 5_000,
        pool_result_ttl_secs: 0,
    }
}

pub fn listings(source: &str, titles: &[&str]) -> Vec<Listing> {
    titles
        .iter()
        .enumerate()
        .map(|(i, title)| Listing::new(source, source, i.to_string(), *title))
        .collect()
}

pub enum Behavior {
    Listings(Vec<Listing>),
    Fail(String),
    Slow(Duration, Vec<Listing>),
}

/// Listing source double that counts how often it was asked.
pub struct FakeSource {
    id: String,
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn new(id: &str, behavior: Behavior) -> Self {
        Self {
            id: id.to_string(),
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn ok(id: &str, titles: &[&str]) -> Self {
        Self::new(id, Behavior::Listings(listings(id, titles)))
    }

    pub fn failing(id: &str, message: &str) -> Self {
        Self::new(id, Behavior::Fail(message.to_string()))
    }

    pub fn slow(id: &str, delay: Duration, titles: &[&str]) -> Self {
        Self::new(id, Behavior::Slow(delay, listings(id, titles)))
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl ListingSource for FakeSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    async fn fetch_listings(&self) -> anyhow::Result<Vec<Listing>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Listings(listings) => Ok(listings.clone()),
            Behavior::Fail(message) => Err(anyhow::anyhow!(message.clone())),
            Behavior::Slow(delay, listings) => {
                tokio::time::sleep(*delay).await;
                Ok(listings.clone())
            }
        }
    }
}

/// Detail source double for `bonbanh.com` that counts upstream calls.
pub struct CountingDetailSource {
    profile: ProviderProfile,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl CountingDetailSource {
    pub fn bonbanh(fail: bool) -> Self {
        Self {
            profile: ProviderProfile::new(
                "bonbanh",
                "Bonbanh",
                Url::parse("https://bonbanh.com/").unwrap(),
                &["bonbanh.com", "www.bonbanh.com"],
            ),
            fail,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl DetailSource for CountingDetailSource {
    fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    async fn fetch_detail(&self, url: &Url) -> anyhow::Result<DetailRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("Bonbanh returned HTTP 502");
        }
        let mut record = DetailRecord::new("bonbanh", "Bonbanh", url.as_str());
        record.title = "Toyota Vios 2020".to_string();
        Ok(record)
    }
}

/// A snapshot with data, fetched `age` ago.
pub fn aged_snapshot(titles: &[&str], age: Duration) -> Snapshot {
    let listings = listings("persisted", titles);
    Snapshot {
        sources: vec![SourceStatus {
            id: "persisted".to_string(),
            name: "persisted".to_string(),
            count: listings.len(),
            status: SourceState::Ok,
        }],
        listings,
        fetched_at: chrono::Utc::now().timestamp_millis() - age.as_millis() as i64,
        errors: Vec::new(),
    }
}

pub struct TestApp {
    pub state: AppState,
    pub storage: Arc<FileSnapshotPersistence>,
    // keeps the snapshot file alive for the duration of the test
    _dir: TempDir,
}

impl TestApp {
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.state.coordinator
    }

    pub async fn current(&self) -> Arc<Snapshot> {
        self.state.store().current().await
    }
}

/// Builds the full stack over a temporary snapshot file, optionally
/// pre-populated as if written by a previous process.
pub async fn create_test_app(
    sources: Vec<ListingSourceRef>,
    details: Vec<DetailSourceRef>,
    persisted: Option<Snapshot>,
    config: AppConfig,
) -> anyhow::Result<TestApp> {
    let dir = TempDir::new()?;
    let storage = Arc::new(FileSnapshotPersistence::new(dir.path().join("snapshot.json")));
    if let Some(snapshot) = persisted {
        storage.save(&snapshot).await?;
    }

    let store = Arc::new(SnapshotStore::load(storage.clone()).await);
    let coordinator = Arc::new(
        RefreshCoordinator::new(Collector::new(sources), store)
            .with_failure_backoff(config.cache.refresh_backoff()),
    );
    let details = Arc::new(DetailService::new(details, config.cache.detail_ttl()));

    Ok(TestApp {
        state: AppState::new(coordinator, details, config),
        storage,
        _dir: dir,
    })
}

/// Helper to make GET requests to the test app
pub async fn get(app: Router, uri: &str) -> anyhow::Result<Response> {
    let request = Request::builder().uri(uri).body(Body::empty())?;
    Ok(app.oneshot(request).await?)
}

pub async fn body_json(response: Response) -> anyhow::Result<serde_json::Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub async fn get_json(app: Router, uri: &str) -> anyhow::Result<(StatusCode, serde_json::Value)> {
    let response = get(app, uri).await?;
    let status = response.status();
    Ok((status, body_json(response).await?))
}

pub fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Helper to wait for async operations
pub async fn wait_for_condition<F, Fut>(mut condition: F, timeout_seconds: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_secs(timeout_seconds);

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    false
}
