//! Risk Allocator - Portfolio risk fractions
//!
//! Implements:
//! - Confidence x reliability base risk per symbol
//! - Regime and sentiment multipliers
//! - Per-symbol floor/cap before normalization
//! - Normalization into portfolio fractions summing to 1

use std::collections::BTreeMap;

use crate::types::{RegimeLabel, SymbolState};

/// Risk configuration
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Per-symbol risk floor (pre-normalization)
    pub min_risk: f64,
    /// Per-symbol risk cap (pre-normalization)
    pub max_risk: f64,
    pub bear_multiplier: f64,
    pub bull_multiplier: f64,
    /// Sentiment above this scales risk up
    pub positive_sentiment_threshold: f64,
    /// Sentiment below this scales risk down
    pub negative_sentiment_threshold: f64,
    pub positive_sentiment_multiplier: f64,
    pub negative_sentiment_multiplier: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_risk: 0.05,
            max_risk: 0.45,
            bear_multiplier: 0.6,
            bull_multiplier: 1.2,
            positive_sentiment_threshold: 0.3,
            negative_sentiment_threshold: -0.3,
            positive_sentiment_multiplier: 1.1,
            negative_sentiment_multiplier: 0.8,
        }
    }
}

/// Portfolio fractions by symbol
pub type PortfolioAllocation = BTreeMap<String, f64>;

#[derive(Debug, Clone, Default)]
pub struct RiskAllocator {
    config: RiskConfig,
}

impl RiskAllocator {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn regime_multiplier(&self, regime: RegimeLabel) -> f64 {
        match regime {
            RegimeLabel::Bear => self.config.bear_multiplier,
            RegimeLabel::Bull => self.config.bull_multiplier,
            RegimeLabel::Sideways => 1.0,
        }
    }

    pub fn sentiment_multiplier(&self, sentiment: f64) -> f64 {
        if sentiment > self.config.positive_sentiment_threshold {
            self.config.positive_sentiment_multiplier
        } else if sentiment < self.config.negative_sentiment_threshold {
            self.config.negative_sentiment_multiplier
        } else {
            1.0
        }
    }

    /// Pre-normalization risk for one symbol, in [min_risk, max_risk]
    pub fn risk(
        &self,
        adjusted_confidence: f64,
        weight: f64,
        regime: RegimeLabel,
        sentiment: f64,
    ) -> f64 {
        let base = (adjusted_confidence / 100.0) * weight;
        let scaled = base * self.regime_multiplier(regime) * self.sentiment_multiplier(sentiment);
        if !scaled.is_finite() {
            return self.config.min_risk;
        }
        scaled.clamp(self.config.min_risk, self.config.max_risk)
    }

    /// Normalize risks into fractions of the whole portfolio.
    ///
    /// Empty input yields an empty allocation; a zero total yields zeros.
    pub fn normalize<'a, I>(&self, risks: I) -> PortfolioAllocation
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let risks: Vec<(&str, f64)> = risks.into_iter().collect();
        let total: f64 = risks.iter().map(|(_, r)| r.max(0.0)).sum();
        let denominator = if total > 0.0 { total } else { 1.0 };

        risks
            .into_iter()
            .map(|(symbol, risk)| (symbol.to_string(), risk.max(0.0) / denominator))
            .collect()
    }

    pub fn normalize_states<'a, I>(&self, states: I) -> PortfolioAllocation
    where
        I: IntoIterator<Item = &'a SymbolState>,
    {
        self.normalize(
            states
                .into_iter()
                .map(|s| (s.symbol.as_str(), s.risk_allocation)),
        )
    }
}
