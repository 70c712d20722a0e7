//! Signal Strategy
//!
//! Produces a directional action and a calibrated confidence per symbol:
//! - RSI / momentum rule with epsilon-greedy exploration
//! - Confidence scaled by Kalman reliability weight and sentiment
//! - Learned per-symbol bias applied on top, bounded to [50, 99.9]

pub mod calibrator;
pub mod kalman;
pub mod replay;

pub use calibrator::{evaluate_outcome, BiasConfig, BiasStats, ConfidenceBiasLearner};
pub use kalman::{KalmanConfig, KalmanStep, KalmanWeightTracker};
pub use replay::{AccuracyWindow, ReplayBuffer};

use rand::Rng;

use crate::features::{FeatureConfig, Features, NEUTRAL_RSI};
use crate::types::{Action, Observation, Signal};

/// Upper bound for any confidence score
pub const MAX_CONFIDENCE: f64 = 99.9;
/// Lower bound for the adjusted confidence
pub const MIN_ADJUSTED_CONFIDENCE: f64 = 50.0;

/// Signal generator configuration
#[derive(Debug, Clone)]
pub struct SignalConfig {
    /// Probability of replacing the rule with a uniformly random action
    pub exploration_rate: f64,
    /// Baseline confidence at neutral RSI
    pub baseline_min: f64,
    /// Baseline confidence at extreme RSI
    pub baseline_max: f64,
    /// RSI above this (with positive momentum) is a BUY
    pub buy_rsi: f64,
    /// RSI below this is a SELL
    pub sell_rsi: f64,
    /// Confidence scale per unit of sentiment
    pub sentiment_sensitivity: f64,
    pub features: FeatureConfig,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            exploration_rate: 0.15,
            baseline_min: 75.0,
            baseline_max: 95.0,
            buy_rsi: 55.0,
            sell_rsi: 45.0,
            sentiment_sensitivity: 0.2,
            features: FeatureConfig::default(),
        }
    }
}

/// Everything the generator needs for one symbol
#[derive(Debug, Clone)]
pub struct SignalInput<'a> {
    pub symbol: &'a str,
    pub observation: Observation,
    /// Recent prices including the current one, oldest first
    pub window: &'a [f64],
    pub weight: f64,
    pub bias: f64,
    pub sentiment: f64,
}

/// Stateless signal generator; randomness comes from the caller's RNG.
#[derive(Debug, Clone, Default)]
pub struct SignalGenerator {
    config: SignalConfig,
}

impl SignalGenerator {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Deterministic rule: RSI > buy & momentum > 0 -> BUY, RSI < sell -> SELL
    pub fn decide(&self, features: &Features) -> Action {
        if features.rsi > self.config.buy_rsi && features.momentum > 0.0 {
            Action::Buy
        } else if features.rsi < self.config.sell_rsi {
            Action::Sell
        } else {
            Action::Hold
        }
    }

    /// Baseline confidence in [baseline_min, baseline_max], growing with RSI extremity
    pub fn baseline(&self, rsi: f64) -> f64 {
        let conviction = ((rsi - NEUTRAL_RSI).abs() / NEUTRAL_RSI).clamp(0.0, 1.0);
        self.config.baseline_min + (self.config.baseline_max - self.config.baseline_min) * conviction
    }

    /// Returns (raw, adjusted) confidence
    pub fn confidence(&self, baseline: f64, weight: f64, bias: f64, sentiment: f64) -> (f64, f64) {
        let raw = (baseline * weight * (1.0 + sentiment * self.config.sentiment_sensitivity))
            .min(MAX_CONFIDENCE);
        let adjusted = (raw * (1.0 + bias)).clamp(MIN_ADJUSTED_CONFIDENCE, MAX_CONFIDENCE);
        (raw, adjusted)
    }

    /// Epsilon-greedy action selection.
    ///
    /// Always consumes one uniform draw; consumes a second only when exploring.
    pub fn choose_action<R: Rng + ?Sized>(&self, features: &Features, rng: &mut R) -> Action {
        let draw: f64 = rng.gen();
        if draw < self.config.exploration_rate {
            Action::ALL[rng.gen_range(0..Action::ALL.len())]
        } else {
            self.decide(features)
        }
    }

    pub fn generate<R: Rng + ?Sized>(&self, input: &SignalInput<'_>, rng: &mut R) -> Signal {
        let features = Features::compute(input.window, &self.config.features);
        let action = self.choose_action(&features, rng);
        let baseline = self.baseline(features.rsi);
        let (raw_confidence, adjusted_confidence) =
            self.confidence(baseline, input.weight, input.bias, input.sentiment);

        tracing::debug!(
            symbol = input.symbol,
            rsi = features.rsi,
            momentum = features.momentum,
            action = %action,
            adjusted_confidence,
            "Signal generated"
        );

        Signal {
            symbol: input.symbol.to_string(),
            price: input.observation.price,
            change_pct: input.observation.change_pct,
            action,
            raw_confidence,
            adjusted_confidence,
            timestamp: chrono::Utc::now().timestamp_millis(),
            synthetic: input.observation.synthetic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn input<'a>(window: &'a [f64], weight: f64, bias: f64, sentiment: f64) -> SignalInput<'a> {
        SignalInput {
            symbol: "BTCUSDT",
            observation: Observation::new(*window.last().unwrap_or(&100.0), 0.5),
            window,
            weight,
            bias,
            sentiment,
        }
    }

    fn greedy() -> SignalGenerator {
        SignalGenerator::new(SignalConfig {
            exploration_rate: 0.0,
            ..SignalConfig::default()
        })
    }

    #[test]
    fn test_rule_buy_sell_hold() {
        let gen = greedy();
        assert_eq!(gen.decide(&Features { rsi: 60.0, momentum: 0.1 }), Action::Buy);
        assert_eq!(gen.decide(&Features { rsi: 60.0, momentum: -0.1 }), Action::Hold);
        assert_eq!(gen.decide(&Features { rsi: 40.0, momentum: 0.5 }), Action::Sell);
        assert_eq!(gen.decide(&Features { rsi: 50.0, momentum: 0.5 }), Action::Hold);
    }

    #[test]
    fn test_rising_window_generates_buy() {
        let gen = greedy();
        let window: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let signal = gen.generate(&input(&window, 1.0, 0.0, 0.0), &mut rng);
        assert_eq!(signal.action, Action::Buy);
        // RSI 100 -> full conviction baseline
        assert!((signal.raw_confidence - 95.0).abs() < 1e-9);
        assert!((signal.adjusted_confidence - 95.0).abs() < 1e-9);
    }

    #[test]
    fn test_baseline_range() {
        let gen = SignalGenerator::default();
        assert_eq!(gen.baseline(50.0), 75.0);
        assert_eq!(gen.baseline(100.0), 95.0);
        assert_eq!(gen.baseline(0.0), 95.0);
        assert!((gen.baseline(75.0) - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_bounds() {
        let gen = SignalGenerator::default();

        let (raw, adjusted) = gen.confidence(95.0, 1.5, 0.3, 1.0);
        assert_eq!(raw, 99.9);
        assert_eq!(adjusted, 99.9);

        let (raw, adjusted) = gen.confidence(75.0, 0.5, -0.3, -1.0);
        assert!((raw - 30.0).abs() < 1e-9);
        assert_eq!(adjusted, 50.0);

        let (raw, adjusted) = gen.confidence(80.0, 1.0, 0.1, 0.5);
        assert!((raw - 88.0).abs() < 1e-9);
        assert!((adjusted - 96.8).abs() < 1e-9);
    }

    #[test]
    fn test_full_exploration_is_seed_reproducible() {
        let gen = SignalGenerator::new(SignalConfig {
            exploration_rate: 1.0,
            ..SignalConfig::default()
        });
        let window = [100.0, 101.0];
        let features = Features::compute(&window, &gen.config().features);

        let mut a = StdRng::seed_from_u64(99);
        let mut b = StdRng::seed_from_u64(99);
        let seq_a: Vec<Action> = (0..32).map(|_| gen.choose_action(&features, &mut a)).collect();
        let seq_b: Vec<Action> = (0..32).map(|_| gen.choose_action(&features, &mut b)).collect();
        assert_eq!(seq_a, seq_b);
        // 32 uniform picks over 3 actions cover more than one action
        assert!(seq_a.iter().any(|a| *a != seq_a[0]));
    }

    #[test]
    fn test_adjusted_confidence_invariant() {
        let gen = SignalGenerator::default();
        let mut rng = StdRng::seed_from_u64(3);
        for i in 0..500 {
            let weight = 0.5 + (i % 11) as f64 * 0.1;
            let bias = -0.3 + (i % 7) as f64 * 0.1;
            let sentiment = -1.0 + (i % 5) as f64 * 0.5;
            let window: Vec<f64> = (0..16).map(|k| 100.0 + ((k * i) % 9) as f64).collect();
            let signal = gen.generate(&input(&window, weight, bias, sentiment), &mut rng);
            assert!((50.0..=99.9).contains(&signal.adjusted_confidence));
        }
    }
}
