use super::*;

const HOUR: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn test_health_check() -> anyhow::Result<()> {
    let app = create_test_app(Vec::new(), Vec::new(), None, get_test_config()).await?;

    let (status, body) = get_json(app.router(), "/health").await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["snapshot"]["fetchedAt"], 0);
    assert_eq!(body["snapshot"]["fresh"], false);
    Ok(())
}

#[tokio::test]
async fn test_scenario_b_stale_snapshot_served_with_one_background_refresh() -> anyhow::Result<()> {
    let source = FakeSource::slow("fresh", Duration::from_millis(150), &["Hyundai Tucson"]);
    let calls = source.calls();
    let persisted = aged_snapshot(&["Toyota Innova", "Toyota Fortuner"], 3 * HOUR);
    let app = create_test_app(vec![Arc::new(source)], Vec::new(), Some(persisted.clone()), get_test_config()).await?;

    // several readers during the same staleness window
    for _ in 0..3 {
        let response = get(app.router(), "/api/cars").await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-data-stale"], "true");
        assert_eq!(response.headers()["cache-control"], "no-store");

        let body = body_json(response).await?;
        assert_eq!(body["count"], 2);
        assert_eq!(body["data"][0]["source"], "persisted");
    }

    let coordinator = Arc::clone(app.coordinator());
    assert!(wait_for_condition(|| {
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.runs() == 1 && !coordinator.is_refreshing() }
    }, 5).await);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // once the refresh lands, reads are fresh again
    let response = get(app.router(), "/api/cars").await?;
    assert!(response.headers().get("x-data-stale").is_none());
    let body = body_json(response).await?;
    assert_eq!(body["data"][0]["title"], "Hyundai Tucson");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_reads_within_ttl_are_idempotent() -> anyhow::Result<()> {
    let source = FakeSource::ok("one", &["VinFast VF8"]);
    let calls = source.calls();
    let app = create_test_app(vec![Arc::new(source)], Vec::new(), None, get_test_config()).await?;
    app.coordinator().trigger_refresh().await.unwrap();

    let first = get(app.router(), "/api/cars").await?;
    assert!(first.headers().get("x-data-stale").is_none());
    let first = body_json(first).await?;
    let second = body_json(get(app.router(), "/api/cars").await?).await?;

    assert_eq!(first["updatedAt"], second["updatedAt"]);
    assert_eq!(first["data"], second["data"]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.coordinator().runs(), 1);
    Ok(())
}

#[tokio::test]
async fn test_forced_refresh_returns_new_snapshot() -> anyhow::Result<()> {
    let source = FakeSource::ok("one", &["Mitsubishi Xpander"]);
    let calls = source.calls();
    let persisted = aged_snapshot(&["Old"], Duration::from_secs(10));
    let app = create_test_app(vec![Arc::new(source)], Vec::new(), Some(persisted), get_test_config()).await?;

    let response = get(app.router(), "/api/cars?refresh=true").await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-data-stale").is_none());

    let body = body_json(response).await?;
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["title"], "Mitsubishi Xpander");
    assert_eq!(body["sources"][0]["status"], "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_forced_refresh_total_failure_without_data_is_500() -> anyhow::Result<()> {
    let app = create_test_app(
        vec![Arc::new(FakeSource::failing("down", "connection refused"))],
        Vec::new(),
        None,
        get_test_config(),
    )
    .await?;

    let (status, body) = get_json(app.router(), "/api/cars?refresh=true").await?;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "All 1 sources failed to refresh");
    Ok(())
}

#[tokio::test]
async fn test_forced_refresh_total_failure_serves_previous_data() -> anyhow::Result<()> {
    let persisted = aged_snapshot(&["Chevrolet Colorado"], 3 * HOUR);
    let app = create_test_app(
        vec![Arc::new(FakeSource::failing("down", "connection refused"))],
        Vec::new(),
        Some(persisted.clone()),
        get_test_config(),
    )
    .await?;

    let response = get(app.router(), "/api/cars?refresh=true").await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-data-stale"], "true");

    let body = body_json(response).await?;
    assert_eq!(body["data"][0]["title"], "Chevrolet Colorado");
    assert_eq!(
        body["updatedAt"],
        serde_json::to_value(persisted.fetched_at_utc().unwrap())?
    );
    Ok(())
}

#[tokio::test]
async fn test_partial_failure_is_reported_in_body() -> anyhow::Result<()> {
    let app = create_test_app(
        vec![
            Arc::new(FakeSource::ok("up", &["Nissan Navara"])),
            Arc::new(FakeSource::failing("down", "Chợ Tốt API returned HTTP 503")),
        ],
        Vec::new(),
        None,
        get_test_config(),
    )
    .await?;

    let (status, body) = get_json(app.router(), "/api/cars?refresh=1").await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["errors"][0]["id"], "down");
    assert_eq!(body["errors"][0]["message"], "Chợ Tốt API returned HTTP 503");
    assert_eq!(body["sources"][1]["status"], "error");
    Ok(())
}

#[tokio::test]
async fn test_unopenable_storage_still_serves() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "regular file")?;
    let mut config = get_test_config();
    config.cache.storage = format!("sqlite:{}/scan_car.db", blocker.display());

    let store = Arc::new(SnapshotStore::open(&config.cache.storage).await);
    assert!(!store.is_durable());

    let source = FakeSource::ok("one", &["Kia Seltos"]);
    let coordinator = Arc::new(RefreshCoordinator::new(Collector::new(vec![Arc::new(source)]), store));
    let details = Arc::new(DetailService::new(Vec::new(), config.cache.detail_ttl()));
    let router = create_router(AppState::new(coordinator, details, config));

    let (status, body) = get_json(router.clone(), "/api/cars").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    let (status, body) = get_json(router, "/api/cars?refresh=true").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["title"], "Kia Seltos");
    Ok(())
}

#[tokio::test]
async fn test_stale_reads_after_total_failure_do_not_rescrape() -> anyhow::Result<()> {
    let source = FakeSource::failing("down", "connection refused");
    let calls = source.calls();
    let persisted = aged_snapshot(&["Ford Ranger"], 3 * HOUR);
    let app = create_test_app(vec![Arc::new(source)], Vec::new(), Some(persisted), get_test_config()).await?;

    assert!(app.coordinator().trigger_refresh().await.is_err());

    for _ in 0..5 {
        let response = get(app.router(), "/api/cars").await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-data-stale"], "true");
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.coordinator().runs(), 1);
    Ok(())
}
