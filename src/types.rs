//! Core types used throughout SignalCast
//!
//! Defines the per-symbol learning state, signals, outcomes and the
//! process-wide regime/sentiment snapshots.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Initial Kalman mean for a freshly tracked symbol
pub const DEFAULT_KALMAN_MEAN: f64 = 1.0;
/// Initial Kalman variance for a freshly tracked symbol
pub const DEFAULT_KALMAN_VAR: f64 = 0.05;
/// Initial reliability weight
pub const DEFAULT_WEIGHT: f64 = 1.0;
/// Initial confidence bias
pub const DEFAULT_BIAS: f64 = 0.0;
/// Initial (pre-normalization) risk allocation
pub const DEFAULT_RISK_ALLOCATION: f64 = 0.33;

/// Trading action emitted by the signal generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Default for Action {
    fn default() -> Self {
        Action::Hold
    }
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Buy, Action::Sell, Action::Hold];

    /// Expected price direction: +1 for BUY, -1 for SELL, 0 for HOLD
    pub fn direction(&self) -> i8 {
        match self {
            Action::Buy => 1,
            Action::Sell => -1,
            Action::Hold => 0,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

/// A single price/percent-change observation for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub price: f64,
    pub change_pct: f64,
    /// True when the observation was generated locally after a source failure
    #[serde(default)]
    pub synthetic: bool,
}

impl Observation {
    pub fn new(price: f64, change_pct: f64) -> Self {
        Self {
            price,
            change_pct,
            synthetic: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0 && self.change_pct.is_finite()
    }
}

/// Directional signal with a calibrated confidence score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub price: f64,
    pub change_pct: f64,
    pub action: Action,
    /// Confidence before the learned bias, in percent
    pub raw_confidence: f64,
    /// Confidence after the learned bias, in [50, 99.9]
    pub adjusted_confidence: f64,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    #[serde(default)]
    pub synthetic: bool,
}

/// Scored result of a previously emitted signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub symbol: String,
    pub expected_direction: i8,
    pub realized_direction: i8,
    pub success: bool,
    /// +1 on success, -1 otherwise
    pub reward: i8,
}

/// Coarse market-state classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegimeLabel {
    Bull,
    Bear,
    Sideways,
}

impl Default for RegimeLabel {
    fn default() -> Self {
        RegimeLabel::Sideways
    }
}

impl fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegimeLabel::Bull => write!(f, "Bull"),
            RegimeLabel::Bear => write!(f, "Bear"),
            RegimeLabel::Sideways => write!(f, "Sideways"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RegimeState {
    pub label: RegimeLabel,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SentimentTrend {
    Positive,
    Negative,
    Neutral,
}

impl Default for SentimentTrend {
    fn default() -> Self {
        SentimentTrend::Neutral
    }
}

impl fmt::Display for SentimentTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentimentTrend::Positive => write!(f, "Positive"),
            SentimentTrend::Negative => write!(f, "Negative"),
            SentimentTrend::Neutral => write!(f, "Neutral"),
        }
    }
}

/// Process-wide sentiment snapshot, value in [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SentimentState {
    pub value: f64,
    pub trend: SentimentTrend,
}

impl SentimentState {
    /// Label a raw sentiment value: >0.2 Positive, <-0.2 Negative, else Neutral
    pub fn from_value(value: f64) -> Self {
        let value = value.clamp(-1.0, 1.0);
        let trend = if value > 0.2 {
            SentimentTrend::Positive
        } else if value < -0.2 {
            SentimentTrend::Negative
        } else {
            SentimentTrend::Neutral
        };
        Self { value, trend }
    }
}

/// Learning state for one tracked symbol.
///
/// Created lazily on first observation and kept for the lifetime of the engine.
#[derive(Debug, Clone)]
pub struct SymbolState {
    pub symbol: String,
    pub kalman_mean: f64,
    pub kalman_var: f64,
    pub weight: f64,
    pub confidence_bias: f64,
    pub risk_allocation: f64,
    /// Recent prices, oldest first
    pub price_history: VecDeque<f64>,
    /// Last emitted signal, waiting to be scored against the next observation
    pub pending_signal: Option<Signal>,
}

impl SymbolState {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            kalman_mean: DEFAULT_KALMAN_MEAN,
            kalman_var: DEFAULT_KALMAN_VAR,
            weight: DEFAULT_WEIGHT,
            confidence_bias: DEFAULT_BIAS,
            risk_allocation: DEFAULT_RISK_ALLOCATION,
            price_history: VecDeque::new(),
            pending_signal: None,
        }
    }

    pub fn last_price(&self) -> Option<f64> {
        self.price_history.back().copied()
    }

    /// Append a price, evicting the oldest beyond `capacity`
    pub fn push_price(&mut self, price: f64, capacity: usize) {
        self.price_history.push_back(price);
        while self.price_history.len() > capacity.max(1) {
            self.price_history.pop_front();
        }
    }

    pub fn price_window(&self) -> Vec<f64> {
        self.price_history.iter().copied().collect()
    }
}
