//! Kalman reliability tracker
//!
//! Scalar Kalman filter treating "probability the model is reliable" as a
//! hidden state, observed noisily through binary signal outcomes.
//!
//! - Predict: var += process_noise
//! - Update:  K = var / (var + measurement_noise), mean += K * (o - mean)
//! - Weight:  clamp(mean, weight_min, weight_max)

/// Kalman tracker configuration
#[derive(Debug, Clone)]
pub struct KalmanConfig {
    /// Process noise added to the variance each step
    pub process_noise: f64,
    /// Observation noise of a single outcome
    pub measurement_noise: f64,
    /// Lower bound for the derived weight
    pub weight_min: f64,
    /// Upper bound for the derived weight
    pub weight_max: f64,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            process_noise: 0.01,
            measurement_noise: 0.05,
            weight_min: 0.5,
            weight_max: 1.5,
        }
    }
}

/// Posterior after one update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanStep {
    pub mean: f64,
    pub var: f64,
    pub gain: f64,
    pub weight: f64,
}

/// Stateless filter; per-symbol (mean, var) lives in `SymbolState`.
#[derive(Debug, Clone, Default)]
pub struct KalmanWeightTracker {
    config: KalmanConfig,
}

impl KalmanWeightTracker {
    pub fn new(config: KalmanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KalmanConfig {
        &self.config
    }

    /// Fold one outcome into the belief `(mean, var)`.
    pub fn update(&self, mean: f64, var: f64, success: bool) -> KalmanStep {
        let observation = if success { 1.0 } else { 0.0 };

        let predicted_mean = mean;
        let predicted_var = var.max(f64::MIN_POSITIVE) + self.config.process_noise;

        let gain = predicted_var / (predicted_var + self.config.measurement_noise);
        let mean = predicted_mean + gain * (observation - predicted_mean);
        let var = ((1.0 - gain) * predicted_var).max(f64::MIN_POSITIVE);

        KalmanStep {
            mean,
            var,
            gain,
            weight: self.weight_for(mean),
        }
    }

    pub fn weight_for(&self, mean: f64) -> f64 {
        mean.clamp(self.config.weight_min, self.config.weight_max)
    }
}
