//! Confidence Bias Calibrator
//!
//! Learns a bounded per-symbol confidence bias from signal outcomes on two
//! time scales:
//! - Fast: every scored signal nudges the bias by `learning_rate * reward`,
//!   then decays it toward zero.
//! - Slow: every replay interval, the mean buffered reward per symbol is
//!   applied again at `learning_rate * replay_weight`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::replay::{ReplayBuffer, DEFAULT_REPLAY_CAPACITY};
use crate::types::{Outcome, Signal};

/// Bias learner configuration
#[derive(Debug, Clone)]
pub struct BiasConfig {
    pub learning_rate: f64,
    /// Multiplicative decay applied after each per-event step
    pub decay: f64,
    /// Scale of the batched replay correction
    pub replay_weight: f64,
    /// Bias is kept within [-bias_limit, bias_limit]
    pub bias_limit: f64,
    pub replay_capacity: usize,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            decay: 0.95,
            replay_weight: 0.8,
            bias_limit: 0.3,
            replay_capacity: DEFAULT_REPLAY_CAPACITY,
        }
    }
}

/// Outcome statistics for one symbol
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BiasStats {
    pub symbol: String,
    pub total_signals: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub last_updated: i64,
}

impl BiasStats {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, success: bool) {
        if success {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.total_signals += 1;
        self.win_rate = self.wins as f64 / self.total_signals as f64;
        self.last_updated = chrono::Utc::now().timestamp();
    }
}

/// Per-symbol bias learner.
///
/// Bias values live in `SymbolState`; the learner owns the replay buffer and
/// outcome statistics.
#[derive(Debug, Clone)]
pub struct ConfidenceBiasLearner {
    config: BiasConfig,
    replay: ReplayBuffer,
    stats_by_symbol: HashMap<String, BiasStats>,
}

impl ConfidenceBiasLearner {
    pub fn new(config: BiasConfig) -> Self {
        let replay = ReplayBuffer::new(config.replay_capacity);
        Self {
            config,
            replay,
            stats_by_symbol: HashMap::new(),
        }
    }

    pub fn config(&self) -> &BiasConfig {
        &self.config
    }

    pub fn clamp(&self, bias: f64) -> f64 {
        bias.clamp(-self.config.bias_limit, self.config.bias_limit)
    }

    /// Per-event step without side effects
    pub fn step(&self, bias: f64, success: bool) -> f64 {
        let reward = if success { 1.0 } else { -1.0 };
        self.clamp((bias + self.config.learning_rate * reward) * self.config.decay)
    }

    /// Apply a scored outcome: returns the new bias and buffers the reward.
    pub fn record_outcome(&mut self, bias: f64, outcome: &Outcome) -> f64 {
        let updated = self.step(bias, outcome.success);
        self.replay.push(&outcome.symbol, f64::from(outcome.reward));
        self.stats_by_symbol
            .entry(outcome.symbol.clone())
            .or_insert_with(|| BiasStats::new(&outcome.symbol))
            .record(outcome.success);
        updated
    }

    /// Count a persisted outcome in the statistics only; bias and replay
    /// buffer are left untouched.
    pub fn restore_outcome(&mut self, symbol: &str, success: bool) {
        self.stats_by_symbol
            .entry(symbol.to_string())
            .or_insert_with(|| BiasStats::new(symbol))
            .record(success);
    }

    /// Pre-clip bias deltas from the replay buffer, one per buffered symbol.
    pub fn replay_adjustments(&self) -> BTreeMap<String, f64> {
        self.replay
            .mean_reward_by_symbol()
            .into_iter()
            .map(|(symbol, mean_reward)| {
                let delta = self.config.learning_rate * mean_reward * self.config.replay_weight;
                (symbol, delta)
            })
            .collect()
    }

    pub fn apply_adjustment(&self, bias: f64, delta: f64) -> f64 {
        self.clamp(bias + delta)
    }

    pub fn replay_buffer(&self) -> &ReplayBuffer {
        &self.replay
    }

    pub fn get_stats(&self, symbol: &str) -> Option<&BiasStats> {
        self.stats_by_symbol.get(symbol)
    }

    pub fn export_stats(&self) -> Vec<BiasStats> {
        let mut stats: Vec<BiasStats> = self.stats_by_symbol.values().cloned().collect();
        stats.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        stats
    }

    pub fn total_outcomes(&self) -> usize {
        self.stats_by_symbol.values().map(|s| s.total_signals).sum()
    }
}

impl Default for ConfidenceBiasLearner {
    fn default() -> Self {
        Self::new(BiasConfig::default())
    }
}

fn direction_of(change_pct: f64) -> i8 {
    if change_pct > 0.0 {
        1
    } else if change_pct < 0.0 {
        -1
    } else {
        0
    }
}

/// Score a pending signal against the change observed after it was emitted.
pub fn evaluate_outcome(signal: &Signal, realized_change_pct: f64) -> Outcome {
    let expected_direction = signal.action.direction();
    let realized_direction = direction_of(realized_change_pct);
    let success = expected_direction == realized_direction;
    Outcome {
        symbol: signal.symbol.clone(),
        expected_direction,
        realized_direction,
        success,
        reward: if success { 1 } else { -1 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn signal(symbol: &str, action: Action) -> Signal {
        Signal {
            symbol: symbol.to_string(),
            price: 100.0,
            change_pct: 0.0,
            action,
            raw_confidence: 80.0,
            adjusted_confidence: 80.0,
            timestamp: 0,
            synthetic: false,
        }
    }

    fn outcome(symbol: &str, success: bool) -> Outcome {
        Outcome {
            symbol: symbol.to_string(),
            expected_direction: 1,
            realized_direction: if success { 1 } else { -1 },
            success,
            reward: if success { 1 } else { -1 },
        }
    }

    #[test]
    fn test_evaluate_outcome_directions() {
        let buy = evaluate_outcome(&signal("A", Action::Buy), 0.8);
        assert!(buy.success);
        assert_eq!(buy.reward, 1);

        let sell = evaluate_outcome(&signal("A", Action::Sell), 0.8);
        assert!(!sell.success);
        assert_eq!(sell.expected_direction, -1);
        assert_eq!(sell.realized_direction, 1);
        assert_eq!(sell.reward, -1);

        let hold = evaluate_outcome(&signal("A", Action::Hold), 0.0);
        assert!(hold.success);
        assert!(!evaluate_outcome(&signal("A", Action::Hold), -0.1).success);
    }

    #[test]
    fn test_per_event_step() {
        let learner = ConfidenceBiasLearner::default();
        assert!((learner.step(0.0, true) - 0.0475).abs() < 1e-12);
        assert!((learner.step(0.0, false) + 0.0475).abs() < 1e-12);
    }

    #[test]
    fn test_successes_saturate_at_upper_bound() {
        let mut learner = ConfidenceBiasLearner::default();
        let mut bias = 0.0;
        for _ in 0..40 {
            let next = learner.record_outcome(bias, &outcome("A", true));
            assert!(next >= bias);
            bias = next;
        }
        assert_eq!(bias, 0.3);
    }

    #[test]
    fn test_failures_saturate_at_lower_bound() {
        let mut learner = ConfidenceBiasLearner::default();
        let mut bias = 0.0;
        for _ in 0..40 {
            bias = learner.record_outcome(bias, &outcome("A", false));
        }
        assert_eq!(bias, -0.3);
    }

    #[test]
    fn test_replay_delta_matches_formula() {
        let mut learner = ConfidenceBiasLearner::default();
        for success in [true, true, true, false] {
            learner.record_outcome(0.0, &outcome("X", success));
        }
        let deltas = learner.replay_adjustments();
        // mean reward 0.5 -> 0.05 * 0.5 * 0.8
        assert!((deltas["X"] - 0.02).abs() < 1e-12);
        assert!((learner.apply_adjustment(0.1, deltas["X"]) - 0.12).abs() < 1e-12);
        assert_eq!(learner.apply_adjustment(0.295, 0.02), 0.3);
    }

    #[test]
    fn test_record_outcome_buffers_and_tracks_stats() {
        let mut learner = ConfidenceBiasLearner::default();
        learner.record_outcome(0.0, &outcome("A", true));
        learner.record_outcome(0.0, &outcome("A", false));
        learner.record_outcome(0.0, &outcome("B", true));

        assert_eq!(learner.replay_buffer().len(), 3);
        let stats = learner.get_stats("A").unwrap();
        assert_eq!(stats.total_signals, 2);
        assert_eq!(stats.wins, 1);
        assert!((stats.win_rate - 0.5).abs() < 1e-12);
        assert_eq!(learner.total_outcomes(), 3);
        assert_eq!(learner.export_stats()[0].symbol, "A");
    }

    #[test]
    fn test_restored_outcomes_only_touch_stats() {
        let mut learner = ConfidenceBiasLearner::default();
        learner.restore_outcome("B", true);
        learner.restore_outcome("A", false);
        learner.restore_outcome("A", true);

        assert!(learner.replay_buffer().is_empty());
        assert!(learner.replay_adjustments().is_empty());
        let stats = learner.export_stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].symbol, "A");
        assert_eq!(stats[0].total_signals, 2);
        assert_eq!(stats[1].wins, 1);
    }

    #[test]
    fn test_bias_invariant_under_random_outcomes() {
        let mut learner = ConfidenceBiasLearner::default();
        let mut rng = StdRng::seed_from_u64(42);
        let mut bias = 0.0;
        for i in 0..5_000 {
            bias = learner.record_outcome(bias, &outcome("A", rng.gen_bool(0.6)));
            assert!((-0.3..=0.3).contains(&bias));
            if i % 60 == 0 {
                for (_, delta) in learner.replay_adjustments() {
                    bias = learner.apply_adjustment(bias, delta);
                    assert!((-0.3..=0.3).contains(&bias));
                }
            }
        }
    }
}
