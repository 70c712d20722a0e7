//! Signal Engine
//!
//! Drives the per-cycle pipeline:
//! 1. Sample symbols and fetch observations concurrently (synthetic fallback)
//! 2. Classify the market regime and refresh sentiment
//! 3. Score each symbol's pending signal, update Kalman weight and bias
//! 4. Generate and stash the next signal per symbol
//! 5. Periodic replay correction of the biases
//! 6. Risk allocation, broadcast, persistence
//!
//! All learning state is owned by the engine task; nothing here is shared.

mod health;

pub use health::{EngineState, HealthSnapshot, HealthTracker, Transition};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::FutureExt;
use rand::rngs::StdRng;
use rand::Rng;
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::dashboard::{Broadcaster, MarketUpdate, SignalPayload, MARKET_UPDATE_TYPE};
use crate::error::SourceError;
use crate::features::RegimeDetector;
use crate::oracle::{ObservationSource, SentimentSource};
use crate::persistence::{EvaluationRecord, RecordSink};
use crate::risk::{PortfolioAllocation, RiskAllocator, RiskConfig};
use crate::strategy::{
    evaluate_outcome, AccuracyWindow, BiasConfig, BiasStats, ConfidenceBiasLearner,
    KalmanConfig, KalmanWeightTracker, SignalConfig, SignalGenerator, SignalInput,
};
use crate::types::{Observation, Outcome, RegimeState, SentimentState, Signal, SymbolState};

/// Price used for the synthetic fallback when a symbol has no history
const SYNTHETIC_START_PRICE: f64 = 100.0;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub market: String,
    /// Tracked universe, in display order
    pub symbols: Vec<String>,
    /// Symbols sampled per cycle
    pub sample_size: usize,
    pub cycle_interval: Duration,
    /// Per-request timeout for observation and sentiment fetches
    pub fetch_timeout: Duration,
    /// Replay correction runs every N cycles (0 disables)
    pub replay_interval_cycles: u64,
    /// Consecutive unhealthy cycles before DEGRADED
    pub degraded_threshold: u32,
    /// Sleep between cycles while DEGRADED
    pub degraded_backoff: Duration,
    /// Bound of the synthetic fallback change, in percent
    pub synthetic_max_change_pct: f64,
    pub accuracy_window: usize,
    /// Max evaluation records queued while the sink is failing
    pub max_pending_records: usize,
    pub signal: SignalConfig,
    pub kalman: KalmanConfig,
    pub bias: BiasConfig,
    pub risk: RiskConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            market: "crypto".to_string(),
            symbols: ["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT", "XRPUSDT", "ADAUSDT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sample_size: 4,
            cycle_interval: Duration::from_millis(4000),
            fetch_timeout: Duration::from_millis(1500),
            replay_interval_cycles: 60,
            degraded_threshold: 3,
            degraded_backoff: Duration::from_millis(10_000),
            synthetic_max_change_pct: 2.0,
            accuracy_window: crate::strategy::replay::DEFAULT_ACCURACY_WINDOW,
            max_pending_records: 10_000,
            signal: SignalConfig::default(),
            kalman: KalmanConfig::default(),
            bias: BiasConfig::default(),
            risk: RiskConfig::default(),
        }
    }
}

/// Receives engine output as it is produced
#[async_trait]
pub trait EngineObserver: Send + Sync {
    async fn on_update(&self, _update: &MarketUpdate) {}

    async fn on_health(&self, _health: &HealthSnapshot) {}

    /// Per-symbol outcome statistics, ordered by symbol
    async fn on_stats(&self, _stats: &[BiasStats]) {}
}

/// Summary of one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub sampled: usize,
    /// Sampled symbols served by the synthetic fallback
    pub fallbacks: usize,
    /// Pending signals scored this cycle
    pub evaluated: usize,
    pub signals: usize,
    pub replayed: bool,
    pub sentiment_stale: bool,
    pub delivered: usize,
    pub dropped_subscribers: usize,
    pub persisted: usize,
    pub pending_records: usize,
}

impl CycleReport {
    /// A cycle where every sampled observation was synthetic
    pub fn all_synthetic(&self) -> bool {
        self.sampled > 0 && self.fallbacks == self.sampled
    }
}

pub struct Engine {
    config: EngineConfig,
    source: Arc<dyn ObservationSource>,
    sentiment_source: Arc<dyn SentimentSource>,
    broadcaster: Broadcaster,
    sink: Option<Arc<dyn RecordSink>>,
    observer: Option<Arc<dyn EngineObserver>>,
    rng: StdRng,

    generator: SignalGenerator,
    kalman: KalmanWeightTracker,
    learner: ConfidenceBiasLearner,
    allocator: RiskAllocator,

    states: BTreeMap<String, SymbolState>,
    regime: RegimeState,
    sentiment: SentimentState,
    accuracy: AccuracyWindow,
    portfolio: PortfolioAllocation,
    pending_records: VecDeque<EvaluationRecord>,
    cycle: u64,
    health: HealthTracker,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn ObservationSource>,
        sentiment_source: Arc<dyn SentimentSource>,
        broadcaster: Broadcaster,
        rng: StdRng,
    ) -> Self {
        Self {
            generator: SignalGenerator::new(config.signal.clone()),
            kalman: KalmanWeightTracker::new(config.kalman.clone()),
            learner: ConfidenceBiasLearner::new(config.bias.clone()),
            allocator: RiskAllocator::new(config.risk.clone()),
            accuracy: AccuracyWindow::new(config.accuracy_window),
            health: HealthTracker::new(config.degraded_threshold),
            states: BTreeMap::new(),
            regime: RegimeState::default(),
            sentiment: SentimentState::default(),
            portfolio: PortfolioAllocation::new(),
            pending_records: VecDeque::new(),
            cycle: 0,
            sink: None,
            observer: None,
            config,
            source,
            sentiment_source,
            broadcaster,
            rng,
        }
    }

    /// Persist evaluation records to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn symbol_state(&self, symbol: &str) -> Option<&SymbolState> {
        self.states.get(symbol)
    }

    pub fn states(&self) -> impl Iterator<Item = &SymbolState> {
        self.states.values()
    }

    pub fn regime(&self) -> RegimeState {
        self.regime
    }

    pub fn sentiment(&self) -> SentimentState {
        self.sentiment
    }

    /// Rolling accuracy fraction over the evaluation window
    pub fn accuracy(&self) -> f64 {
        self.accuracy.accuracy()
    }

    pub fn portfolio(&self) -> &PortfolioAllocation {
        &self.portfolio
    }

    pub fn health(&self) -> &HealthSnapshot {
        self.health.snapshot()
    }

    pub fn state(&self) -> EngineState {
        self.health.state()
    }

    pub fn pending_record_count(&self) -> usize {
        self.pending_records.len()
    }

    pub fn learner(&self) -> &ConfidenceBiasLearner {
        &self.learner
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Mean confidence bias over all tracked symbols
    pub fn bias_avg(&self) -> f64 {
        if self.states.is_empty() {
            return 0.0;
        }
        self.states.values().map(|s| s.confidence_bias).sum::<f64>() / self.states.len() as f64
    }

    /// Seed the accuracy window and outcome statistics from persisted
    /// evaluations, oldest first. Biases and weights start fresh.
    pub fn warm_start(&mut self, records: &[EvaluationRecord]) -> usize {
        let mut restored = 0;
        for record in records {
            if !self.config.symbols.contains(&record.symbol) {
                continue;
            }
            self.accuracy.record(record.success);
            self.learner.restore_outcome(&record.symbol, record.success);
            restored += 1;
        }
        if restored > 0 {
            info!(
                restored,
                skipped = records.len() - restored,
                accuracy = self.accuracy.accuracy(),
                "📂 Warm start from evaluation history"
            );
        }
        restored
    }

    // ─────────────────────────────────────────────────────────────────
    // Cycle
    // ─────────────────────────────────────────────────────────────────

    /// Run one full cycle
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.cycle += 1;
        let cycle = self.cycle;
        let mut report = CycleReport {
            cycle,
            ..Default::default()
        };

        let symbols = self.sample_symbols();
        report.sampled = symbols.len();

        let fetched = self.fetch_observations(&symbols).await;
        let mut observations: Vec<(String, Observation)> = Vec::with_capacity(fetched.len());
        for (symbol, result) in fetched {
            let observation = match result {
                Ok(observation) => observation,
                Err(err) => {
                    warn!(symbol = %symbol, source = self.source.name(), error = %err, "⚠️ Observation failed, using synthetic fallback");
                    report.fallbacks += 1;
                    self.synthetic_observation(&symbol)
                }
            };
            observations.push((symbol, observation));
        }

        let changes: Vec<f64> = observations.iter().map(|(_, o)| o.change_pct).collect();
        self.regime = RegimeDetector::classify(&changes);

        report.sentiment_stale = !self.refresh_sentiment().await;

        let price_history_len = self.config.signal.features.price_history_len;
        let mut evaluated: Vec<(Signal, Outcome)> = Vec::new();
        let mut emitted: Vec<Signal> = Vec::with_capacity(observations.len());

        for (symbol, observation) in &observations {
            let state = self
                .states
                .entry(symbol.clone())
                .or_insert_with(|| SymbolState::new(symbol));

            // Score last cycle's signal against the change observed after it
            if let Some(previous) = state.pending_signal.take() {
                let outcome = evaluate_outcome(&previous, observation.change_pct);
                let step = self
                    .kalman
                    .update(state.kalman_mean, state.kalman_var, outcome.success);
                state.kalman_mean = step.mean;
                state.kalman_var = step.var;
                state.weight = step.weight;
                state.confidence_bias = self.learner.record_outcome(state.confidence_bias, &outcome);
                self.accuracy.record(outcome.success);

                debug!(
                    symbol = %symbol,
                    action = %previous.action,
                    success = outcome.success,
                    weight = state.weight,
                    bias = state.confidence_bias,
                    "Signal evaluated"
                );
                evaluated.push((previous, outcome));
            }

            state.push_price(observation.price, price_history_len);
            let window = state.price_window();
            let signal = self.generator.generate(
                &SignalInput {
                    symbol,
                    observation: *observation,
                    window: &window,
                    weight: state.weight,
                    bias: state.confidence_bias,
                    sentiment: self.sentiment.value,
                },
                &mut self.rng,
            );
            state.pending_signal = Some(signal.clone());
            emitted.push(signal);
        }
        report.evaluated = evaluated.len();
        report.signals = emitted.len();

        let interval = self.config.replay_interval_cycles;
        if interval > 0 && cycle % interval == 0 {
            self.apply_replay();
            report.replayed = true;
        }

        for signal in &emitted {
            if let Some(state) = self.states.get_mut(&signal.symbol) {
                state.risk_allocation = self.allocator.risk(
                    signal.adjusted_confidence,
                    state.weight,
                    self.regime.label,
                    self.sentiment.value,
                );
            }
        }
        self.portfolio = self.allocator.normalize_states(self.states.values());

        // Queued before delivery so a failed broadcast keeps them
        let records = self.build_records(&evaluated);
        self.queue_records(records);

        let update = self.compose_update(&emitted);
        let delivery = self
            .broadcaster
            .broadcast(&update)
            .context("Failed to serialize market update")?;
        report.delivered = delivery.delivered;
        report.dropped_subscribers = delivery.dropped;
        if let Some(observer) = &self.observer {
            observer.on_update(&update).await;
            observer.on_stats(&self.learner.export_stats()).await;
        }

        report.persisted = self.flush_records().await;
        report.pending_records = self.pending_records.len();

        debug!(
            cycle,
            sampled = report.sampled,
            fallbacks = report.fallbacks,
            evaluated = report.evaluated,
            regime = %self.regime.label,
            accuracy = self.accuracy.accuracy(),
            subscribers = report.delivered,
            "🔄 Cycle complete"
        );

        Ok(report)
    }

    /// Uniform sample without replacement, kept in universe order
    fn sample_symbols(&mut self) -> Vec<String> {
        let universe = &self.config.symbols;
        let amount = self.config.sample_size.min(universe.len());
        if amount == universe.len() {
            return universe.clone();
        }
        let mut picked = rand::seq::index::sample(&mut self.rng, universe.len(), amount).into_vec();
        picked.sort_unstable();
        picked.into_iter().map(|i| universe[i].clone()).collect()
    }

    async fn fetch_observations(
        &self,
        symbols: &[String],
    ) -> Vec<(String, Result<Observation, SourceError>)> {
        let timeout = self.config.fetch_timeout;
        let source = self.source.as_ref();

        join_all(symbols.iter().map(|symbol| async move {
            let result = match tokio::time::timeout(timeout, source.fetch(symbol)).await {
                Ok(Ok(observation)) if observation.is_valid() => Ok(observation),
                Ok(Ok(observation)) => Err(SourceError::InvalidObservation {
                    symbol: symbol.clone(),
                    price: observation.price,
                    change_pct: observation.change_pct,
                }),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(SourceError::Timeout(timeout.as_millis() as u64)),
            };
            (symbol.clone(), result)
        }))
        .await
    }

    fn synthetic_observation(&mut self, symbol: &str) -> Observation {
        let last = self
            .states
            .get(symbol)
            .and_then(SymbolState::last_price)
            .unwrap_or(SYNTHETIC_START_PRICE);
        let bound = self.config.synthetic_max_change_pct.abs();
        let change_pct = if bound.is_finite() && bound > 0.0 {
            self.rng.gen_range(-bound..=bound)
        } else {
            0.0
        };
        Observation {
            price: last * (1.0 + change_pct / 100.0),
            change_pct,
            synthetic: true,
        }
    }

    /// Returns false when the previous sentiment was kept
    async fn refresh_sentiment(&mut self) -> bool {
        let source = self.sentiment_source.name();
        match tokio::time::timeout(self.config.fetch_timeout, self.sentiment_source.fetch()).await
        {
            Ok(Ok(value)) if value.is_finite() => {
                self.sentiment = SentimentState::from_value(value);
                true
            }
            Ok(Ok(value)) => {
                warn!(source, value, "⚠️ Non-finite sentiment ignored");
                false
            }
            Ok(Err(err)) => {
                warn!(source, error = %err, "⚠️ Sentiment fetch failed, keeping previous value");
                false
            }
            Err(_) => {
                warn!(source, "⚠️ Sentiment fetch timed out, keeping previous value");
                false
            }
        }
    }

    fn apply_replay(&mut self) {
        let adjustments = self.learner.replay_adjustments();
        for (symbol, delta) in &adjustments {
            if let Some(state) = self.states.get_mut(symbol) {
                state.confidence_bias = self.learner.apply_adjustment(state.confidence_bias, *delta);
            }
        }
        info!(
            cycle = self.cycle,
            symbols = adjustments.len(),
            buffered = self.learner.replay_buffer().len(),
            "🧠 Replay correction applied"
        );
    }

    fn compose_update(&self, emitted: &[Signal]) -> MarketUpdate {
        let signals = emitted
            .iter()
            .map(|signal| {
                let (weight, risk) = self
                    .states
                    .get(&signal.symbol)
                    .map(|s| (s.weight, s.risk_allocation))
                    .unwrap_or_default();
                SignalPayload::from_signal(signal, weight, risk)
            })
            .collect();

        MarketUpdate {
            kind: MARKET_UPDATE_TYPE.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            cycle: self.cycle,
            market: self.config.market.clone(),
            regime_label: self.regime.label,
            regime_score: self.regime.score,
            ai_accuracy: self.accuracy.accuracy() * 100.0,
            bias_avg: self.bias_avg(),
            sentiment: self.sentiment.into(),
            portfolio: self.portfolio.clone(),
            signals,
        }
    }

    fn build_records(&self, evaluated: &[(Signal, Outcome)]) -> Vec<EvaluationRecord> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        evaluated
            .iter()
            .filter_map(|(signal, outcome)| {
                let state = self.states.get(&signal.symbol)?;
                Some(EvaluationRecord {
                    timestamp,
                    symbol: signal.symbol.clone(),
                    price: signal.price,
                    change_pct: signal.change_pct,
                    action: signal.action.to_string(),
                    adjusted_confidence: signal.adjusted_confidence,
                    bias: state.confidence_bias,
                    weight: state.weight,
                    risk_allocation: state.risk_allocation,
                    regime_label: self.regime.label.to_string(),
                    sentiment_value: self.sentiment.value,
                    reward: outcome.reward,
                    success: outcome.success,
                })
            })
            .collect()
    }

    /// Queue records for the sink, dropping the oldest beyond the bound
    fn queue_records(&mut self, records: Vec<EvaluationRecord>) {
        if self.sink.is_none() {
            return;
        }

        self.pending_records.extend(records);
        let mut dropped = 0usize;
        while self.pending_records.len() > self.config.max_pending_records {
            self.pending_records.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "⚠️ Persistence backlog full, dropped oldest records");
        }
    }

    /// Write as many queued records as the sink accepts, oldest first
    async fn flush_records(&mut self) -> usize {
        let Some(sink) = self.sink.clone() else {
            return 0;
        };

        let mut written = 0;
        while let Some(record) = self.pending_records.front().cloned() {
            match sink.append(&record).await {
                Ok(()) => {
                    self.pending_records.pop_front();
                    written += 1;
                }
                Err(err) => {
                    warn!(
                        pending = self.pending_records.len(),
                        error = %format!("{:#}", err),
                        "⚠️ Persistence failed, will retry next cycle"
                    );
                    break;
                }
            }
        }
        written
    }

    // ─────────────────────────────────────────────────────────────────
    // Supervision
    // ─────────────────────────────────────────────────────────────────

    /// Run one cycle with panic isolation and update engine health.
    ///
    /// A cycle is unhealthy when it errors, panics, or only produced
    /// synthetic observations.
    pub async fn tick(&mut self) -> Result<CycleReport, String> {
        let result = match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
            Ok(Ok(report)) if report.all_synthetic() => {
                self.record_unhealthy("all observations synthetic".to_string());
                Ok(report)
            }
            Ok(Ok(report)) => {
                self.record_healthy();
                Ok(report)
            }
            Ok(Err(err)) => {
                let message = format!("{:#}", err);
                error!(cycle = self.cycle, error = %message, "❌ Cycle failed");
                self.record_unhealthy(message.clone());
                Err(message)
            }
            Err(panic) => {
                let message = format!("panic: {}", panic_message(panic.as_ref()));
                error!(cycle = self.cycle, error = %message, "❌ Cycle panicked");
                self.record_unhealthy(message.clone());
                Err(message)
            }
        };

        if let Some(observer) = &self.observer {
            observer.on_health(self.health.snapshot()).await;
        }
        result
    }

    fn record_healthy(&mut self) {
        if let Some(t) = self.health.record_success(self.accuracy.accuracy()) {
            info!(from = %t.from, to = %t.to, "✅ Engine state changed");
        }
    }

    fn record_unhealthy(&mut self, reason: String) {
        let consecutive = self.health.snapshot().consecutive_failures + 1;
        warn!(cycle = self.cycle, consecutive, reason = %reason, "⚠️ Unhealthy cycle");
        if let Some(t) = self.health.record_failure(reason, self.accuracy.accuracy()) {
            warn!(
                from = %t.from,
                to = %t.to,
                backoff_ms = self.config.degraded_backoff.as_millis() as u64,
                "🚨 Engine degraded, backing off"
            );
        }
    }

    /// Run cycles until `shutdown` flips to true or its sender is dropped.
    ///
    /// Subscribers are closed on exit.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            market = %self.config.market,
            symbols = self.config.symbols.len(),
            sample_size = self.config.sample_size,
            source = self.source.name(),
            "🚀 Engine started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let _ = self.tick().await;

            let delay = match self.health.state() {
                EngineState::Degraded => self.config.degraded_backoff,
                _ => self.config.cycle_interval,
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let closed = self.broadcaster.close_all();
        info!(
            cycles = self.cycle,
            closed_subscribers = closed,
            pending_records = self.pending_records.len(),
            "🛑 Engine stopped"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
