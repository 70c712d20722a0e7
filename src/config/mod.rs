//! Configuration management for SignalCast
//!
//! Loads defaults, optional `config/default` and `config/local` files, then
//! environment variables (`SIGNALCAST__SECTION__KEY`) via .env

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::engine::EngineConfig;
use crate::features::FeatureConfig;
use crate::risk::RiskConfig as RiskAllocatorConfig;
use crate::strategy::{BiasConfig, KalmanConfig, SignalConfig};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub features: FeaturesConfig,
    pub strategy: StrategyConfig,
    pub learning: LearningConfig,
    pub risk: RiskConfig,
    pub oracle: OracleConfig,
    pub sentiment: SentimentConfig,
    pub persistence: PersistenceConfig,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Version tag for logging
    pub tag: String,
    /// Market label carried in every broadcast
    pub market: String,
    /// Tracked universe
    pub symbols: Vec<String>,
    /// Symbols sampled per cycle
    pub sample_size: usize,
    pub cycle_interval_ms: u64,
    /// Per-request fetch timeout in milliseconds
    pub fetch_timeout_ms: u64,
    /// Consecutive unhealthy cycles before DEGRADED
    pub degraded_threshold: u32,
    /// Cycle sleep while DEGRADED
    pub degraded_backoff_ms: u64,
    /// Fixed RNG seed for reproducible runs; entropy when absent
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeaturesConfig {
    pub rsi_period: usize,
    /// Momentum lookback in observations
    pub momentum_lookback: usize,
    /// Prices kept per symbol
    pub price_history_len: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Probability of a random action (0.0 - 1.0)
    pub exploration_rate: f64,
    pub baseline_min: f64,
    pub baseline_max: f64,
    pub buy_rsi: f64,
    pub sell_rsi: f64,
    pub sentiment_sensitivity: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LearningConfig {
    pub learning_rate: f64,
    /// Bias decay applied after each per-event step
    pub penalty_decay: f64,
    pub replay_weight: f64,
    pub replay_interval_cycles: u64,
    pub replay_capacity: usize,
    pub accuracy_window: usize,
    pub bias_limit: f64,
    pub process_noise: f64,
    pub measurement_noise: f64,
    pub weight_min: f64,
    pub weight_max: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Per-symbol risk floor before normalization
    pub min_risk: f64,
    /// Per-symbol risk cap before normalization
    pub max_risk: f64,
    pub bear_multiplier: f64,
    pub bull_multiplier: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// "synthetic" or "binance"
    pub source: String,
    /// Binance REST base URL
    pub rest_url: String,
    /// Bound for synthetic changes (fallback and synthetic source)
    pub synthetic_max_change_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentimentConfig {
    /// "none" or "fear_greed"
    pub source: String,
    pub url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory
    pub data_dir: String,
    /// Enable CSV logging
    pub csv_enabled: bool,
    /// Records queued while the sink fails
    pub max_pending_records: usize,
    /// Days of evaluation history replayed into accuracy and stats at
    /// startup (0 disables)
    pub warm_start_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub bind_addr: String,
    /// Per-subscriber channel capacity
    pub subscriber_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl AppConfig {
    fn builder() -> Result<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            // Bot defaults
            .set_default("bot.tag", env!("CARGO_PKG_VERSION"))?
            .set_default("bot.market", "crypto")?
            .set_default(
                "bot.symbols",
                vec!["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT", "XRPUSDT", "ADAUSDT"],
            )?
            .set_default("bot.sample_size", 4)?
            .set_default("bot.cycle_interval_ms", 4000)?
            .set_default("bot.fetch_timeout_ms", 1500)?
            .set_default("bot.degraded_threshold", 3)?
            .set_default("bot.degraded_backoff_ms", 10_000)?
            // Features defaults
            .set_default("features.rsi_period", 14)?
            .set_default("features.momentum_lookback", 5)?
            .set_default("features.price_history_len", 120)?
            // Strategy defaults
            .set_default("strategy.exploration_rate", 0.15)?
            .set_default("strategy.baseline_min", 75.0)?
            .set_default("strategy.baseline_max", 95.0)?
            .set_default("strategy.buy_rsi", 55.0)?
            .set_default("strategy.sell_rsi", 45.0)?
            .set_default("strategy.sentiment_sensitivity", 0.2)?
            // Learning defaults
            .set_default("learning.learning_rate", 0.05)?
            .set_default("learning.penalty_decay", 0.95)?
            .set_default("learning.replay_weight", 0.8)?
            .set_default("learning.replay_interval_cycles", 60)?
            .set_default("learning.replay_capacity", 500)?
            .set_default("learning.accuracy_window", 2000)?
            .set_default("learning.bias_limit", 0.3)?
            .set_default("learning.process_noise", 0.01)?
            .set_default("learning.measurement_noise", 0.05)?
            .set_default("learning.weight_min", 0.5)?
            .set_default("learning.weight_max", 1.5)?
            // Risk defaults
            .set_default("risk.min_risk", 0.05)?
            .set_default("risk.max_risk", 0.45)?
            .set_default("risk.bear_multiplier", 0.6)?
            .set_default("risk.bull_multiplier", 1.2)?
            // Oracle defaults
            .set_default("oracle.source", "synthetic")?
            .set_default("oracle.rest_url", crate::oracle::sources::BINANCE_REST_URL)?
            .set_default("oracle.synthetic_max_change_pct", 2.0)?
            // Sentiment defaults
            .set_default("sentiment.source", "none")?
            .set_default("sentiment.url", crate::oracle::sentiment::FEAR_GREED_URL)?
            .set_default("sentiment.timeout_ms", 1500)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.csv_enabled", true)?
            .set_default("persistence.max_pending_records", 10_000)?
            .set_default("persistence.warm_start_days", 1)?
            // Dashboard defaults
            .set_default("dashboard.enabled", true)?
            .set_default("dashboard.bind_addr", "0.0.0.0:8080")?
            .set_default("dashboard.subscriber_buffer", 64)?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?;
        Ok(builder)
    }

    /// Built-in defaults only, no files or environment
    pub fn defaults() -> Result<Self> {
        let config = Self::builder()?
            .build()
            .context("Failed to build configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (SIGNALCAST__*)
            .add_source(
                Environment::with_prefix("SIGNALCAST")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("bot.symbols")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;

        Ok(app_config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.bot.symbols.is_empty() {
            bail!("bot.symbols must not be empty");
        }
        if self.bot.sample_size == 0 {
            bail!("bot.sample_size must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.strategy.exploration_rate) {
            bail!(
                "strategy.exploration_rate must be within [0, 1], got {}",
                self.strategy.exploration_rate
            );
        }
        if self.features.rsi_period == 0
            || self.features.rsi_period > self.features.price_history_len
        {
            bail!(
                "features.rsi_period {} must be within [1, features.price_history_len = {}]",
                self.features.rsi_period,
                self.features.price_history_len
            );
        }
        if self.strategy.baseline_min > self.strategy.baseline_max {
            bail!("strategy.baseline_min must not exceed strategy.baseline_max");
        }
        if self.learning.replay_interval_cycles == 0 {
            bail!("learning.replay_interval_cycles must be at least 1");
        }
        if self.learning.process_noise <= 0.0 || self.learning.measurement_noise <= 0.0 {
            bail!("learning noise parameters must be positive");
        }
        if !(0.0..=1.0).contains(&self.learning.penalty_decay) {
            bail!("learning.penalty_decay must be within [0, 1]");
        }
        if self.learning.weight_min > self.learning.weight_max {
            bail!("learning.weight_min must not exceed learning.weight_max");
        }
        if self.risk.min_risk < 0.0 || self.risk.min_risk > self.risk.max_risk {
            bail!(
                "risk floor {} must be non-negative and not exceed cap {}",
                self.risk.min_risk,
                self.risk.max_risk
            );
        }
        let max_change = self.oracle.synthetic_max_change_pct;
        if !max_change.is_finite() || max_change < 0.0 {
            bail!(
                "oracle.synthetic_max_change_pct must be finite and non-negative, got {}",
                max_change
            );
        }
        match self.oracle.source.as_str() {
            "synthetic" | "binance" => {}
            other => bail!("unknown oracle.source '{}'", other),
        }
        match self.sentiment.source.as_str() {
            "none" | "fear_greed" => {}
            other => bail!("unknown sentiment.source '{}'", other),
        }
        Ok(())
    }

    /// Bridge into the engine's component configs
    pub fn to_engine_config(&self) -> EngineConfig {
        let mut symbols: Vec<String> = Vec::with_capacity(self.bot.symbols.len());
        for symbol in &self.bot.symbols {
            let symbol = symbol.trim().to_uppercase();
            if !symbol.is_empty() && !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }

        EngineConfig {
            market: self.bot.market.clone(),
            symbols,
            sample_size: self.bot.sample_size,
            cycle_interval: Duration::from_millis(self.bot.cycle_interval_ms),
            fetch_timeout: Duration::from_millis(self.bot.fetch_timeout_ms),
            replay_interval_cycles: self.learning.replay_interval_cycles,
            degraded_threshold: self.bot.degraded_threshold,
            degraded_backoff: Duration::from_millis(self.bot.degraded_backoff_ms),
            synthetic_max_change_pct: self.oracle.synthetic_max_change_pct,
            accuracy_window: self.learning.accuracy_window,
            max_pending_records: self.persistence.max_pending_records,
            signal: SignalConfig {
                exploration_rate: self.strategy.exploration_rate,
                baseline_min: self.strategy.baseline_min,
                baseline_max: self.strategy.baseline_max,
                buy_rsi: self.strategy.buy_rsi,
                sell_rsi: self.strategy.sell_rsi,
                sentiment_sensitivity: self.strategy.sentiment_sensitivity,
                features: FeatureConfig {
                    rsi_period: self.features.rsi_period,
                    momentum_lookback: self.features.momentum_lookback,
                    price_history_len: self.features.price_history_len,
                },
            },
            kalman: KalmanConfig {
                process_noise: self.learning.process_noise,
                measurement_noise: self.learning.measurement_noise,
                weight_min: self.learning.weight_min,
                weight_max: self.learning.weight_max,
            },
            bias: BiasConfig {
                learning_rate: self.learning.learning_rate,
                decay: self.learning.penalty_decay,
                replay_weight: self.learning.replay_weight,
                bias_limit: self.learning.bias_limit,
                replay_capacity: self.learning.replay_capacity,
            },
            risk: RiskAllocatorConfig {
                min_risk: self.risk.min_risk,
                max_risk: self.risk.max_risk,
                bear_multiplier: self.risk.bear_multiplier,
                bull_multiplier: self.risk.bull_multiplier,
                ..RiskAllocatorConfig::default()
            },
        }
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "bot={} market={} symbols={:?} sample={} interval_ms={} source={} sentiment={} epsilon={:.2}",
            self.bot.tag,
            self.bot.market,
            self.bot.symbols,
            self.bot.sample_size,
            self.bot.cycle_interval_ms,
            self.oracle.source,
            self.sentiment.source,
            self.strategy.exploration_rate
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize_and_validate() {
        let config = AppConfig::defaults().unwrap();
        config.validate().unwrap();
        assert_eq!(config.bot.symbols.len(), 6);
        assert_eq!(config.bot.sample_size, 4);
        assert_eq!(config.bot.rng_seed, None);
        assert_eq!(config.oracle.source, "synthetic");
        assert_eq!(config.learning.replay_interval_cycles, 60);
        assert!(config.dashboard.enabled);
        assert_eq!(config.persistence.warm_start_days, 1);
    }

    #[test]
    fn engine_config_matches_component_defaults() {
        let engine = AppConfig::defaults().unwrap().to_engine_config();
        assert_eq!(engine.sample_size, 4);
        assert_eq!(engine.cycle_interval, Duration::from_millis(4000));
        assert_eq!(engine.signal.exploration_rate, 0.15);
        assert_eq!(engine.signal.features.rsi_period, 14);
        assert_eq!(engine.kalman.measurement_noise, 0.05);
        assert_eq!(engine.bias.decay, 0.95);
        assert_eq!(engine.bias.replay_weight, 0.8);
        assert_eq!(engine.risk.max_risk, 0.45);
        assert_eq!(engine.risk.positive_sentiment_multiplier, 1.1);
    }

    #[test]
    fn engine_config_dedups_symbols() {
        let mut config = AppConfig::defaults().unwrap();
        config.bot.symbols = vec!["btcusdt".into(), "BTCUSDT".into(), " ".into(), "ETHUSDT".into()];
        let engine = config.to_engine_config();
        assert_eq!(engine.symbols, vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let base = AppConfig::defaults().unwrap();

        let mut config = base.clone();
        config.strategy.exploration_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.bot.symbols.clear();
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.risk.min_risk = 0.6;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.learning.replay_interval_cycles = 0;
        assert!(config.validate().is_err());

        let mut config = base;
        config.oracle.source = "kraken".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unusable_feature_and_fallback_settings() {
        let base = AppConfig::defaults().unwrap();

        let mut config = base.clone();
        config.oracle.synthetic_max_change_pct = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.oracle.synthetic_max_change_pct = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.features.price_history_len = 10;
        config.features.rsi_period = 14;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("rsi_period"), "{}", err);

        let mut config = base;
        config.features.price_history_len = 14;
        config.features.rsi_period = 14;
        config.validate().unwrap();
    }
}
