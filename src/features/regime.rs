//! Market regime detection
//!
//! Classifies the sampled universe as Bull / Bear / Sideways from the batch of
//! percent changes observed in one cycle.

use crate::types::{RegimeLabel, RegimeState};

/// Scores above this are Bull
pub const BULL_THRESHOLD: f64 = 3.0;
/// Scores below this are Bear
pub const BEAR_THRESHOLD: f64 = -3.0;

/// Stateless regime classifier.
///
/// `score = mean*10 + momentum*0.5 - volatility*0.3`, where momentum is the sum
/// of the signs of the changes and volatility is their population standard
/// deviation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegimeDetector;

impl RegimeDetector {
    pub fn classify(changes: &[f64]) -> RegimeState {
        let changes: Vec<f64> = changes.iter().copied().filter(|c| c.is_finite()).collect();
        if changes.is_empty() {
            return RegimeState {
                label: RegimeLabel::Sideways,
                score: 0.0,
            };
        }

        let n = changes.len() as f64;
        let avg = changes.iter().sum::<f64>() / n;
        let variance = changes.iter().map(|c| (c - avg).powi(2)).sum::<f64>() / n;
        let volatility = variance.sqrt();
        let momentum: f64 = changes.iter().map(|c| sign(*c)).sum();

        let score = avg * 10.0 + momentum * 0.5 - volatility * 0.3;
        let label = if score > BULL_THRESHOLD {
            RegimeLabel::Bull
        } else if score < BEAR_THRESHOLD {
            RegimeLabel::Bear
        } else {
            RegimeLabel::Sideways
        };

        RegimeState { label, score }
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bull_reference_batch() {
        let regime = RegimeDetector::classify(&[2.0, 2.5, 3.0, 1.5]);
        assert_eq!(regime.label, RegimeLabel::Bull);
        assert!((regime.score - 24.32).abs() < 0.05, "score={}", regime.score);
    }

    #[test]
    fn test_bear_batch() {
        let regime = RegimeDetector::classify(&[-1.0, -2.0, -0.5]);
        assert_eq!(regime.label, RegimeLabel::Bear);
        assert!(regime.score < BEAR_THRESHOLD);
    }

    #[test]
    fn test_mixed_batch_is_sideways() {
        let regime = RegimeDetector::classify(&[1.0, -1.0]);
        assert_eq!(regime.label, RegimeLabel::Sideways);
        assert!((regime.score - (-0.3)).abs() < 1e-12);
    }

    #[test]
    fn test_empty_batch_is_neutral() {
        let regime = RegimeDetector::classify(&[]);
        assert_eq!(regime.label, RegimeLabel::Sideways);
        assert_eq!(regime.score, 0.0);
    }

    #[test]
    fn test_classification_is_pure() {
        let batch = [0.4, -0.2, 0.9, 0.0];
        assert_eq!(RegimeDetector::classify(&batch), RegimeDetector::classify(&batch));
    }
}
