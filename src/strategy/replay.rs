//! Reward replay and rolling accuracy
//!
//! `ReplayBuffer` keeps the most recent (symbol, reward) pairs for the batched
//! bias correction. `AccuracyWindow` tracks engine health for observability only.

use std::collections::{BTreeMap, VecDeque};

pub const DEFAULT_REPLAY_CAPACITY: usize = 500;
pub const DEFAULT_ACCURACY_WINDOW: usize = 2000;

/// Bounded FIFO of (symbol, reward) pairs
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    entries: VecDeque<(String, f64)>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a reward, evicting the oldest entry when full
    pub fn push(&mut self, symbol: &str, reward: f64) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((symbol.to_string(), reward));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mean buffered reward per symbol, ordered by symbol
    pub fn mean_reward_by_symbol(&self) -> BTreeMap<String, f64> {
        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for (symbol, reward) in &self.entries {
            let entry = sums.entry(symbol.clone()).or_insert((0.0, 0));
            entry.0 += reward;
            entry.1 += 1;
        }
        sums.into_iter()
            .map(|(symbol, (sum, n))| (symbol, sum / n as f64))
            .collect()
    }
}

impl Default for ReplayBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_CAPACITY)
    }
}

/// Rolling window of evaluation results
#[derive(Debug, Clone)]
pub struct AccuracyWindow {
    results: VecDeque<bool>,
    capacity: usize,
    hits: usize,
}

impl AccuracyWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            results: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            hits: 0,
        }
    }

    pub fn record(&mut self, success: bool) {
        if self.results.len() == self.capacity {
            if let Some(true) = self.results.pop_front() {
                self.hits -= 1;
            }
        }
        self.results.push_back(success);
        if success {
            self.hits += 1;
        }
    }

    /// Fraction of successes in the window; 0.0 when empty
    pub fn accuracy(&self) -> f64 {
        if self.results.is_empty() {
            0.0
        } else {
            self.hits as f64 / self.results.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl Default for AccuracyWindow {
    fn default() -> Self {
        Self::new(DEFAULT_ACCURACY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_buffer_evicts_oldest() {
        let mut buffer = ReplayBuffer::new(3);
        buffer.push("A", 1.0);
        buffer.push("B", -1.0);
        buffer.push("C", 1.0);
        buffer.push("D", -1.0);

        assert_eq!(buffer.len(), 3);
        let symbols: Vec<String> = buffer.mean_reward_by_symbol().into_keys().collect();
        assert_eq!(symbols, vec!["B", "C", "D"]);
    }

    #[test]
    fn test_default_capacity_is_500() {
        let mut buffer = ReplayBuffer::default();
        for i in 0..750 {
            buffer.push("X", if i % 2 == 0 { 1.0 } else { -1.0 });
        }
        assert_eq!(buffer.len(), 500);
    }

    #[test]
    fn test_mean_reward_by_symbol() {
        let mut buffer = ReplayBuffer::new(10);
        for r in [1.0, 1.0, 1.0, -1.0] {
            buffer.push("X", r);
        }
        buffer.push("Y", -1.0);

        let means = buffer.mean_reward_by_symbol();
        assert!((means["X"] - 0.5).abs() < 1e-12);
        assert!((means["Y"] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_accuracy_window_rolls() {
        let mut window = AccuracyWindow::new(4);
        assert_eq!(window.accuracy(), 0.0);

        for r in [true, true, false, false] {
            window.record(r);
        }
        assert!((window.accuracy() - 0.5).abs() < 1e-12);

        // Two oldest hits roll out
        window.record(false);
        window.record(false);
        assert_eq!(window.accuracy(), 0.0);
        assert_eq!(window.len(), 4);
    }
}
