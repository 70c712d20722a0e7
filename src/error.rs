//! Collaborator error types

use thiserror::Error;

/// Failure of an external observation or sentiment source.
///
/// Never fatal to a cycle: the engine degrades to a fallback value.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("invalid observation for {symbol}: price={price} change={change_pct}")]
    InvalidObservation {
        symbol: String,
        price: f64,
        change_pct: f64,
    },

    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("invalid source configuration: {0}")]
    Config(String),
}
