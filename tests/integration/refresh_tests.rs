use super::*;
use futures::future::join_all;
use scan_car::AppError;

#[tokio::test]
async fn test_partial_failures_over_every_subset() -> anyhow::Result<()> {
    let ids = ["alpha", "beta", "gamma"];
    let sizes = [1usize, 2, 3];

    for mask in 0u8..8 {
        let sources: Vec<ListingSourceRef> = ids
            .iter()
            .zip(sizes)
            .enumerate()
            .map(|(i, (id, size))| -> ListingSourceRef {
                if mask & (1 << i) != 0 {
                    Arc::new(FakeSource::failing(id, "upstream down"))
                } else {
                    let titles: Vec<String> = (0..size).map(|n| format!("{} xe {}", id, n)).collect();
                    let titles: Vec<&str> = titles.iter().map(String::as_str).collect();
                    Arc::new(FakeSource::ok(id, &titles))
                }
            })
            .collect();
        let app = create_test_app(sources, Vec::new(), None, get_test_config()).await?;

        let outcome = app.coordinator().trigger_refresh().await;

        if mask == 0b111 {
            let err = outcome.unwrap_err();
            assert!(matches!(*err, AppError::TotalRefreshFailure { failed: 3 }));
            assert!(!app.current().await.has_data(), "store must not be replaced");
            continue;
        }

        let snapshot = outcome.unwrap();
        let expected_count: usize = (0..3).filter(|i| mask & (1 << i) == 0).map(|i| sizes[i]).sum();
        let failed: Vec<&str> = (0..3).filter(|i| mask & (1 << i) != 0).map(|i| ids[i]).collect();

        assert_eq!(snapshot.listings.len(), expected_count, "mask {:03b}", mask);
        assert_eq!(snapshot.sources.len(), 3);
        assert_eq!(
            snapshot.errors.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            failed,
            "mask {:03b}",
            mask
        );
        for (i, status) in snapshot.sources.iter().enumerate() {
            assert_eq!(status.id, ids[i]);
            let expected = if mask & (1 << i) != 0 { SourceState::Error } else { SourceState::Ok };
            assert_eq!(status.status, expected);
        }
    }

    Ok(())
}

#[tokio::test]
async fn test_scenario_a_two_sources_and_a_timeout() -> anyhow::Result<()> {
    let sources: Vec<ListingSourceRef> = vec![
        Arc::new(FakeSource::ok("first", &["Kia Morning", "Kia Seltos", "Kia K3", "Kia Carnival", "Kia Sonet"])),
        Arc::new(FakeSource::ok("second", &["Mazda 2", "Mazda 3", "Mazda CX-5"])),
        Arc::new(FakeSource::failing("third", "timeout")),
    ];
    let app = create_test_app(sources, Vec::new(), None, get_test_config()).await?;

    let snapshot = app.coordinator().trigger_refresh().await.unwrap();

    assert_eq!(snapshot.listings.len(), 8);
    assert_eq!(
        snapshot.sources.iter().map(|s| (s.id.as_str(), s.count, s.status)).collect::<Vec<_>>(),
        vec![
            ("first", 5, SourceState::Ok),
            ("second", 3, SourceState::Ok),
            ("third", 0, SourceState::Error),
        ]
    );
    assert_eq!(snapshot.errors.len(), 1);
    assert_eq!(snapshot.errors[0].id, "third");
    assert_eq!(snapshot.errors[0].message, "timeout");

    // sorted by title, not by source
    let titles: Vec<&str> = snapshot.listings.iter().map(|l| l.title.as_str()).collect();
    assert_eq!(&titles[..3], &["Kia Carnival", "Kia K3", "Kia Morning"]);
    assert!(titles[5..].iter().all(|t| t.starts_with("Mazda")));

    Ok(())
}

#[tokio::test]
async fn test_concurrent_triggers_share_one_run() -> anyhow::Result<()> {
    let source = FakeSource::slow("slow", Duration::from_millis(100), &["Ford Ranger"]);
    let calls = source.calls();
    let app = create_test_app(vec![Arc::new(source)], Vec::new(), None, get_test_config()).await?;

    let coordinator = Arc::clone(app.coordinator());
    let outcomes = join_all((0..16).map(|_| {
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.trigger_refresh().await }
    }))
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.runs(), 1);

    let first = outcomes[0].as_ref().unwrap();
    for outcome in &outcomes {
        assert!(Arc::ptr_eq(first, outcome.as_ref().unwrap()));
    }

    // a later trigger starts a new run
    coordinator.trigger_refresh().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    Ok(())
}

#[tokio::test]
async fn test_total_failure_keeps_previous_snapshot() -> anyhow::Result<()> {
    let persisted = aged_snapshot(&["Honda City"], Duration::from_secs(60));
    let app = create_test_app(
        vec![Arc::new(FakeSource::failing("down", "HTTP 503"))],
        Vec::new(),
        Some(persisted.clone()),
        get_test_config(),
    )
    .await?;

    assert!(app.coordinator().trigger_refresh().await.is_err());

    let current = app.current().await;
    assert_eq!(current.fetched_at, persisted.fetched_at);
    assert_eq!(current.listings, persisted.listings);

    Ok(())
}

#[tokio::test]
async fn test_refresh_is_mirrored_and_survives_restart() -> anyhow::Result<()> {
    let app = create_test_app(
        vec![Arc::new(FakeSource::ok("one", &["Suzuki XL7", "Suzuki Ertiga"]))],
        Vec::new(),
        None,
        get_test_config(),
    )
    .await?;

    let snapshot = app.coordinator().trigger_refresh().await.unwrap();

    // a new process reading the same storage sees the same snapshot
    let restarted = SnapshotStore::load(app.storage.clone()).await;
    let restored = restarted.current().await;
    assert_eq!(restored.fetched_at, snapshot.fetched_at);
    assert_eq!(restored.listings, snapshot.listings);
    assert!(restarted.is_fresh(Duration::from_secs(60)));

    Ok(())
}

#[tokio::test]
async fn test_missing_storage_starts_empty_and_stale() -> anyhow::Result<()> {
    let app = create_test_app(Vec::new(), Vec::new(), None, get_test_config()).await?;

    let current = app.current().await;
    assert_eq!(current.fetched_at, 0);
    assert!(!app.state.store().is_fresh(Duration::from_secs(u32::MAX as u64)));

    Ok(())
}
