//! Binance REST ticker source
//!
//! Polls `/api/v3/ticker/24hr` for the last price and 24h percent change.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::SourceError;
use crate::oracle::ObservationSource;
use crate::types::Observation;

pub const BINANCE_REST_URL: &str = "https://api.binance.com";

#[derive(Debug, Clone, Deserialize)]
struct Ticker24h {
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "priceChangePercent")]
    price_change_percent: String,
}

impl Ticker24h {
    fn into_observation(self, symbol: &str) -> Result<Observation, SourceError> {
        let price: f64 = self
            .last_price
            .parse()
            .map_err(|_| SourceError::Parse(format!("{}: lastPrice '{}'", symbol, self.last_price)))?;
        let change_pct: f64 = self.price_change_percent.parse().map_err(|_| {
            SourceError::Parse(format!(
                "{}: priceChangePercent '{}'",
                symbol, self.price_change_percent
            ))
        })?;
        Ok(Observation::new(price, change_pct))
    }
}

/// Binance spot ticker client
pub struct BinanceTickerSource {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceTickerSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn ticker_url(&self) -> String {
        format!("{}/api/v3/ticker/24hr", self.base_url)
    }
}

#[async_trait]
impl ObservationSource for BinanceTickerSource {
    fn name(&self) -> &'static str {
        "Binance"
    }

    async fn fetch(&self, symbol: &str) -> Result<Observation, SourceError> {
        let url = self.ticker_url();
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let ticker: Ticker24h = response.json().await?;
        ticker.into_observation(symbol)
    }
}
