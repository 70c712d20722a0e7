//! SignalCast binary
//!
//! Wires the configured collaborators into the engine, serves the dashboard
//! and stops cleanly on Ctrl-C.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use signalcast::config::{AppConfig, LoggingConfig};
use signalcast::dashboard::{self, Broadcaster, DashboardMemory};
use signalcast::engine::{Engine, EngineObserver};
use signalcast::oracle::{
    BinanceTickerSource, FearGreedSentiment, ObservationSource, SentimentSource, StaticSentiment,
    SyntheticSource,
};
use signalcast::persistence::CsvPersistence;

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn build_source(config: &AppConfig, seed: u64) -> Result<Arc<dyn ObservationSource>> {
    let source: Arc<dyn ObservationSource> = match config.oracle.source.as_str() {
        "binance" => Arc::new(
            BinanceTickerSource::new(
                &config.oracle.rest_url,
                Duration::from_millis(config.bot.fetch_timeout_ms),
            )
            .context("Failed to build Binance client")?,
        ),
        _ => Arc::new(
            SyntheticSource::new(seed.wrapping_add(1), config.oracle.synthetic_max_change_pct)
                .context("Failed to build synthetic source")?,
        ),
    };
    Ok(source)
}

fn build_sentiment(config: &AppConfig) -> Result<Arc<dyn SentimentSource>> {
    let source: Arc<dyn SentimentSource> = match config.sentiment.source.as_str() {
        "fear_greed" => Arc::new(
            FearGreedSentiment::new(
                &config.sentiment.url,
                Duration::from_millis(config.sentiment.timeout_ms),
            )
            .context("Failed to build sentiment client")?,
        ),
        _ => Arc::new(StaticSentiment(0.0)),
    };
    Ok(source)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging);

    info!("📡 SignalCast {} starting", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config);

    let seed = config.bot.rng_seed.unwrap_or_else(rand::random);
    info!(seed, "🎲 RNG seeded");

    let source = build_source(&config, seed)?;
    let sentiment = build_sentiment(&config)?;
    let broadcaster = Broadcaster::new(config.dashboard.subscriber_buffer);
    let memory = Arc::new(DashboardMemory::new());

    let mut engine = Engine::new(
        config.to_engine_config(),
        source,
        sentiment,
        broadcaster.clone(),
        StdRng::seed_from_u64(seed),
    )
    .with_observer(memory.clone() as Arc<dyn EngineObserver>);

    if config.persistence.csv_enabled {
        let persistence = CsvPersistence::new(&config.persistence.data_dir)
            .context("Failed to initialise CSV persistence")?;
        if config.persistence.warm_start_days > 0 {
            match persistence.load_evaluation_history(config.persistence.warm_start_days) {
                Ok(history) => {
                    engine.warm_start(&history);
                }
                Err(e) => warn!("Failed to load evaluation history: {:#}", e),
            }
        }
        engine = engine.with_sink(Arc::new(persistence));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = if config.dashboard.enabled {
        let bind_addr = config.dashboard.bind_addr.clone();
        let memory = memory.clone();
        let broadcaster = broadcaster.clone();
        let shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = dashboard::start_server(&bind_addr, memory, broadcaster, shutdown).await {
                error!("Dashboard server error: {:#}", e);
            }
        }))
    } else {
        None
    };

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Keep the sender alive; dropping it would stop the engine
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("🛑 Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    engine.run(shutdown_rx).await;

    if let Some(server) = server {
        let _ = tokio::time::timeout(Duration::from_secs(5), server).await;
    }

    info!(
        cycles = engine.cycle(),
        accuracy = engine.accuracy(),
        "👋 SignalCast stopped"
    );
    Ok(())
}
