//! Feature Engine - Indicator features for signal generation
//!
//! Computes deterministic features from a symbol's recent price window:
//! - RSI (simple average gain / average loss)
//! - Short-horizon normalized momentum (percent slope)
//!
//! Market-wide regime classification lives in [`regime`].

pub mod regime;
pub use regime::RegimeDetector;

/// Neutral RSI returned when there is not enough data or no movement
pub const NEUTRAL_RSI: f64 = 50.0;

/// Feature configuration
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    /// RSI period
    pub rsi_period: usize,
    /// Number of trailing prices used for the momentum slope
    pub momentum_lookback: usize,
    /// Maximum prices retained per symbol
    pub price_history_len: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            momentum_lookback: 5,
            price_history_len: 120,
        }
    }
}

/// Features derived from one price window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Features {
    pub rsi: f64,
    pub momentum: f64,
}

impl Features {
    pub fn compute(window: &[f64], config: &FeatureConfig) -> Self {
        Self {
            rsi: rsi(window, config.rsi_period),
            momentum: momentum(window, config.momentum_lookback),
        }
    }
}

/// Relative Strength Index over the trailing `period` price changes.
///
/// Returns 50 with fewer than `period` samples or a flat window, and 100 when
/// the window has gains but no losses.
pub fn rsi(window: &[f64], period: usize) -> f64 {
    if period == 0 || window.len() < period || window.len() < 2 {
        return NEUTRAL_RSI;
    }

    let span = (period + 1).min(window.len());
    let tail = &window[window.len() - span..];

    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in tail.windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            gains += change;
        } else {
            losses += change.abs();
        }
    }
    let n = (span - 1) as f64;
    let avg_gain = gains / n;
    let avg_loss = losses / n;

    if avg_loss == 0.0 && avg_gain == 0.0 {
        return NEUTRAL_RSI;
    }
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Percent price slope over the trailing `lookback` prices.
///
/// `(last - first) / first * 100`; zero with fewer than two prices.
pub fn momentum(window: &[f64], lookback: usize) -> f64 {
    let span = lookback.min(window.len());
    if span < 2 {
        return 0.0;
    }
    let tail = &window[window.len() - span..];
    let first = tail[0];
    let last = tail[span - 1];
    if first <= 0.0 || !first.is_finite() || !last.is_finite() {
        return 0.0;
    }
    (last - first) / first * 100.0
}
