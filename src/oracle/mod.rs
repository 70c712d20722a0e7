//! Oracle module - Observation and sentiment collaborators
//!
//! The engine only depends on the [`ObservationSource`] and [`SentimentSource`]
//! traits; concrete feeds live in [`sources`] and [`sentiment`].

pub mod sentiment;
pub mod sources;

pub use sentiment::{FearGreedSentiment, SentimentSource, StaticSentiment};
pub use sources::{BinanceTickerSource, SyntheticSource};

use async_trait::async_trait;

use crate::error::SourceError;
use crate::types::Observation;

/// Per-symbol price/percent-change feed
#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &'static str;

    /// Fetch the latest observation for one symbol
    async fn fetch(&self, symbol: &str) -> Result<Observation, SourceError>;
}
