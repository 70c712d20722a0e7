//! Broadcaster and dashboard integration tests

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use signalcast::dashboard::{create_router, Broadcaster, DashboardMemory, MarketUpdate};
    use signalcast::engine::{Engine, EngineConfig, EngineObserver, EngineState};
    use signalcast::oracle::{StaticSentiment, SyntheticSource};
    use std::sync::Arc;
    use std::time::Duration;

    fn engine(broadcaster: Broadcaster) -> Engine {
        let config = EngineConfig {
            symbols: ["BTCUSDT", "ETHUSDT", "SOLUSDT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sample_size: 2,
            cycle_interval: Duration::from_millis(5),
            ..EngineConfig::default()
        };
        Engine::new(
            config,
            Arc::new(SyntheticSource::new(21, 2.0).unwrap()),
            Arc::new(StaticSentiment(0.5)),
            broadcaster,
            StdRng::seed_from_u64(21),
        )
    }

    // ============================================================================
    // Fan-out
    // ============================================================================

    #[tokio::test]
    async fn test_every_subscriber_receives_each_cycle() {
        let broadcaster = Broadcaster::new(8);
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();
        let mut engine = engine(broadcaster);

        for expected_cycle in 1..=3u64 {
            let report = engine.run_cycle().await.unwrap();
            assert_eq!(report.delivered, 2);

            for sub in [&mut first, &mut second] {
                let text = sub.rx.recv().await.unwrap();
                let update: MarketUpdate = serde_json::from_str(&text).unwrap();
                assert_eq!(update.kind, "market_update");
                assert_eq!(update.cycle, expected_cycle);
                assert_eq!(update.market, "crypto");
                assert_eq!(update.signals.len(), 2);
                assert_eq!(update.sentiment.value, 0.5);
                let total: f64 = update.portfolio.values().sum();
                assert!((total - 1.0).abs() < 1e-6);
            }
        }
    }

    #[tokio::test]
    async fn test_failed_subscriber_does_not_affect_others() {
        let broadcaster = Broadcaster::new(8);
        let mut alive = broadcaster.subscribe();
        let gone = broadcaster.subscribe();
        drop(gone);
        let mut engine = engine(broadcaster.clone());

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped_subscribers, 1);
        assert_eq!(broadcaster.subscriber_count(), 1);
        assert!(alive.rx.recv().await.is_some());

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.dropped_subscribers, 0);
        assert!(alive.rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_only_new_updates() {
        let broadcaster = Broadcaster::new(8);
        let mut engine = engine(broadcaster.clone());
        engine.run_cycle().await.unwrap();
        engine.run_cycle().await.unwrap();

        let mut late = broadcaster.subscribe();
        engine.run_cycle().await.unwrap();
        let update: MarketUpdate = serde_json::from_str(&late.rx.recv().await.unwrap()).unwrap();
        assert_eq!(update.cycle, 3);
        assert!(late.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_subscribers_is_not_an_error() {
        let mut engine = engine(Broadcaster::default());
        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.delivered, 0);
        assert_eq!(report.dropped_subscribers, 0);
    }

    // ============================================================================
    // Dashboard memory and HTTP
    // ============================================================================

    #[tokio::test]
    async fn test_dashboard_memory_tracks_engine() {
        let memory = Arc::new(DashboardMemory::new());
        let mut engine =
            engine(Broadcaster::default()).with_observer(memory.clone() as Arc<dyn EngineObserver>);

        engine.tick().await.unwrap();
        engine.tick().await.unwrap();

        let state = memory.get_state().await.unwrap();
        assert_eq!(state.cycle, 2);
        let health = memory.get_health().await;
        assert_eq!(health.state, EngineState::Running);
        assert_eq!(health.cycles, 2);
        assert_eq!(health.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_http_state_endpoint_serves_latest_update() {
        let memory = Arc::new(DashboardMemory::new());
        let broadcaster = Broadcaster::default();
        let mut engine =
            engine(broadcaster.clone()).with_observer(memory.clone() as Arc<dyn EngineObserver>);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(memory.clone(), broadcaster);
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let client = reqwest::Client::new();
        let empty: serde_json::Value = client
            .get(format!("http://{}/api/state", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(empty["success"], false);

        engine.tick().await.unwrap();

        let body: serde_json::Value = client
            .get(format!("http://{}/api/state", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["cycle"], 1);
        assert_eq!(body["data"]["type"], "market_update");

        let health: serde_json::Value = client
            .get(format!("http://{}/api/health", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["data"]["state"], "RUNNING");

        let portfolio: serde_json::Value = client
            .get(format!("http://{}/api/portfolio", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(portfolio["data"].as_object().unwrap().len(), 2);

        // Two of three symbols per cycle: at least one is scored on cycle 2
        engine.tick().await.unwrap();
        let stats: serde_json::Value = client
            .get(format!("http://{}/api/stats", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let stats = stats["data"].as_array().unwrap();
        assert!(!stats.is_empty());
        let total: u64 = stats
            .iter()
            .map(|s| s["total_signals"].as_u64().unwrap())
            .sum();
        assert_eq!(total as usize, engine.learner().total_outcomes());
        for entry in stats {
            let win_rate = entry["win_rate"].as_f64().unwrap();
            assert!((0.0..=1.0).contains(&win_rate));
        }

        server.abort();
    }

    // ============================================================================
    // Shutdown
    // ============================================================================

    #[tokio::test]
    async fn test_shutdown_closes_all_subscribers() {
        let broadcaster = Broadcaster::new(64);
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();
        let mut engine = engine(broadcaster.clone());

        let (tx, rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(async move { engine.run(rx).await });

        assert!(a.rx.recv().await.is_some());
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(broadcaster.subscriber_count(), 0);
        // Drain whatever was buffered, then end-of-stream
        while a.rx.recv().await.is_some() {}
        while b.rx.recv().await.is_some() {}
    }
}
