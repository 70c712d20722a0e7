//! Sentiment sources
//!
//! A sentiment source returns a scalar in [-1, 1]. Failures are reported to the
//! engine, which keeps the previous sentiment state.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::SourceError;

pub const FEAR_GREED_URL: &str = "https://api.alternative.me/fng/?limit=1";

#[async_trait]
pub trait SentimentSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> Result<f64, SourceError>;
}

/// Fixed sentiment value; used when no sentiment feed is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSentiment(pub f64);

#[async_trait]
impl SentimentSource for StaticSentiment {
    fn name(&self) -> &'static str {
        "Static"
    }

    async fn fetch(&self) -> Result<f64, SourceError> {
        Ok(self.0)
    }
}

#[derive(Debug, Deserialize)]
struct FearGreedResponse {
    data: Vec<FearGreedEntry>,
}

#[derive(Debug, Deserialize)]
struct FearGreedEntry {
    value: String,
}

/// Crypto Fear & Greed index mapped from [0, 100] to [-1, 1]
pub struct FearGreedSentiment {
    client: reqwest::Client,
    url: String,
}

impl FearGreedSentiment {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    fn parse(body: FearGreedResponse) -> Result<f64, SourceError> {
        let entry = body
            .data
            .first()
            .ok_or_else(|| SourceError::Parse("empty fear & greed data".to_string()))?;
        let index: f64 = entry
            .value
            .parse()
            .map_err(|_| SourceError::Parse(format!("fear & greed value '{}'", entry.value)))?;
        Ok(((index - 50.0) / 50.0).clamp(-1.0, 1.0))
    }
}

#[async_trait]
impl SentimentSource for FearGreedSentiment {
    fn name(&self) -> &'static str {
        "FearGreed"
    }

    async fn fetch(&self) -> Result<f64, SourceError> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Status {
                status: response.status().as_u16(),
                url: self.url.clone(),
            });
        }
        let body: FearGreedResponse = response.json().await?;
        Self::parse(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fear_greed_mapping() {
        let raw = r#"{"name":"Fear and Greed Index","data":[{"value":"75","value_classification":"Greed"}]}"#;
        let body: FearGreedResponse = serde_json::from_str(raw).unwrap();
        assert!((FearGreedSentiment::parse(body).unwrap() - 0.5).abs() < 1e-12);

        let fear: FearGreedResponse = serde_json::from_str(r#"{"data":[{"value":"0"}]}"#).unwrap();
        assert_eq!(FearGreedSentiment::parse(fear).unwrap(), -1.0);
    }

    #[test]
    fn test_fear_greed_empty_is_error() {
        let body: FearGreedResponse = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert!(FearGreedSentiment::parse(body).is_err());
    }

    #[test]
    fn test_static_sentiment() {
        let value = tokio_test::block_on(StaticSentiment(-0.4).fetch()).unwrap();
        assert_eq!(value, -0.4);
    }
}
