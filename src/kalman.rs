//! One-dimensional Kalman smoothing for a noisy temperature series.

use crate::config::FilterConfig;

/// Running estimate for one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Kalman {
    measurement_error: f64,
    process_variance: f64,
    estimation_error: f64,
    estimate: f64,
}

impl Kalman {
    /// Where every estimate starts before the first sample.
    pub const INITIAL_ESTIMATE: f64 = 25.0;

    /// `measurement_error` is how much readings are expected to scatter,
    /// `process_variance` how quickly the real temperature moves (0.001 to 1,
    /// 0.01 is a good start).
    pub fn new(measurement_error: f64, process_variance: f64) -> Self {
        Self {
            measurement_error,
            process_variance,
            // Self-corrects after a few samples.
            estimation_error: measurement_error,
            estimate: Self::INITIAL_ESTIMATE,
        }
    }

    /// Folds in one finite sample and returns the new estimate.
    pub fn update(&mut self, measurement: f64) -> f64 {
        let gain = self.estimation_error / (self.estimation_error + self.measurement_error);
        let previous = self.estimate;
        self.estimate = previous + gain * (measurement - previous);
        self.estimation_error = (1.0 - gain) * self.estimation_error
            + (previous - self.estimate).abs() * self.process_variance;
        self.estimate
    }

    pub fn value(&self) -> f64 {
        self.estimate
    }
}

impl From<FilterConfig> for Kalman {
    fn from(config: FilterConfig) -> Self {
        Self::new(config.measurement_error, config.process_variance)
    }
}
