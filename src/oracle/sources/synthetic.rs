//! Local random-walk source for offline runs and demos

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::SourceError;
use crate::oracle::ObservationSource;
use crate::types::Observation;

const START_PRICE: f64 = 100.0;

/// Seeded random walk per symbol; each fetch moves the price by up to
/// `max_change_pct` percent.
pub struct SyntheticSource {
    state: Mutex<(StdRng, HashMap<String, f64>)>,
    max_change_pct: f64,
}

impl SyntheticSource {
    pub fn new(seed: u64, max_change_pct: f64) -> Result<Self, SourceError> {
        if !max_change_pct.is_finite() {
            return Err(SourceError::Config(format!(
                "max_change_pct must be finite, got {}",
                max_change_pct
            )));
        }
        Ok(Self {
            state: Mutex::new((StdRng::seed_from_u64(seed), HashMap::new())),
            max_change_pct: max_change_pct.abs().max(f64::EPSILON),
        })
    }
}

#[async_trait]
impl ObservationSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "Synthetic"
    }

    async fn fetch(&self, symbol: &str) -> Result<Observation, SourceError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| SourceError::Unavailable("synthetic state poisoned".to_string()))?;
        let (rng, prices) = &mut *guard;

        let change_pct = rng.gen_range(-self.max_change_pct..=self.max_change_pct);
        let price = prices.entry(symbol.to_string()).or_insert(START_PRICE);
        *price *= 1.0 + change_pct / 100.0;

        Ok(Observation::new(*price, change_pct))
    }
}
