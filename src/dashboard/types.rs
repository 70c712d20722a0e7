//! Dashboard API types
//!
//! Wire formats for the websocket broadcast and the REST endpoints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{Action, RegimeLabel, SentimentState, SentimentTrend, Signal};

pub const MARKET_UPDATE_TYPE: &str = "market_update";

/// Per-cycle broadcast payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketUpdate {
    /// Always "market_update"
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: i64,
    pub cycle: u64,
    pub market: String,
    pub regime_label: RegimeLabel,
    pub regime_score: f64,
    /// Rolling accuracy in percent
    pub ai_accuracy: f64,
    pub bias_avg: f64,
    pub sentiment: SentimentPayload,
    pub portfolio: BTreeMap<String, f64>,
    pub signals: Vec<SignalPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentPayload {
    pub value: f64,
    pub trend: SentimentTrend,
}

impl From<SentimentState> for SentimentPayload {
    fn from(state: SentimentState) -> Self {
        Self {
            value: state.value,
            trend: state.trend,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPayload {
    pub symbol: String,
    pub price: f64,
    pub change_pct: f64,
    pub action: Action,
    pub confidence: f64,
    pub weight: f64,
    pub risk_allocation: f64,
    #[serde(default)]
    pub synthetic: bool,
}

impl SignalPayload {
    pub fn from_signal(signal: &Signal, weight: f64, risk_allocation: f64) -> Self {
        Self {
            symbol: signal.symbol.clone(),
            price: signal.price,
            change_pct: signal.change_pct,
            action: signal.action,
            confidence: signal.adjusted_confidence,
            weight,
            risk_allocation,
            synthetic: signal.synthetic,
        }
    }
}

/// API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
