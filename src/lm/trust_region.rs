//! Damping control for the Levenberg-Marquardt algorithm.
//!
//! The damping parameter is adapted from the agreement between the predicted
//! and the actual reduction in the sum of squares.

use super::config::LmConfig;

/// Trust region implementation for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone)]
pub struct TrustRegion {
    /// Current value of the damping parameter
    pub lambda: f64,

    /// Minimum allowed value for the damping parameter
    pub lambda_min: f64,

    /// Maximum allowed value for the damping parameter
    pub lambda_max: f64,

    /// Factor to increase lambda by when step is rejected
    pub lambda_increase_factor: f64,

    /// Factor to decrease lambda by when step is accepted
    pub lambda_decrease_factor: f64,

    /// Minimum gain ratio required to accept a step
    pub min_gain_ratio: f64,

    /// Gain ratio above which to decrease lambda
    pub good_gain_ratio: f64,
}

impl Default for TrustRegion {
    fn default() -> Self {
        Self {
            lambda: 1e-3,
            lambda_min: 1e-10,
            lambda_max: 1e10,
            lambda_increase_factor: 10.0,
            lambda_decrease_factor: 0.1,
            min_gain_ratio: 1e-3,
            good_gain_ratio: 0.25,
        }
    }
}

impl TrustRegion {
    /// Creates a TrustRegion following the damping schedule of `config`.
    pub fn from_config(config: &LmConfig) -> Self {
        Self {
            lambda: config.initial_lambda,
            lambda_min: config.min_lambda,
            lambda_max: config.max_lambda,
            lambda_increase_factor: config.lambda_up_factor,
            lambda_decrease_factor: config.lambda_down_factor,
            ..Self::default()
        }
    }

    /// Updates the damping parameter based on the gain ratio.
    ///
    /// Returns whether the step that produced `gain_ratio` is accepted.
    pub fn update_lambda(&mut self, gain_ratio: f64) -> bool {
        if gain_ratio > self.min_gain_ratio {
            if gain_ratio > self.good_gain_ratio {
                self.lambda = (self.lambda * self.lambda_decrease_factor).max(self.lambda_min);
            }
            true
        } else {
            self.increase_lambda();
            false
        }
    }

    /// Increases the damping after a failed step.
    pub fn increase_lambda(&mut self) {
        self.lambda = (self.lambda * self.lambda_increase_factor).min(self.lambda_max);
    }

    /// Whether the damping has hit its ceiling.
    pub fn is_saturated(&self) -> bool {
        self.lambda >= self.lambda_max
    }

    /// Calculates the gain ratio between actual and predicted reduction.
    ///
    /// # Arguments
    ///
    /// * `current_cost` - The current cost function value
    /// * `new_cost` - The new cost function value after the step
    /// * `predicted_reduction` - The predicted reduction in cost
    pub fn gain_ratio(current_cost: f64, new_cost: f64, predicted_reduction: f64) -> f64 {
        let actual_reduction = current_cost - new_cost;

        if !new_cost.is_finite() {
            return f64::NEG_INFINITY;
        }

        if predicted_reduction.abs() < 1e-300 {
            if actual_reduction >= 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            actual_reduction / predicted_reduction
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_lambda() {
        let mut region = TrustRegion::default();

        assert!(region.update_lambda(0.9));
        assert!((region.lambda - 1e-4).abs() < 1e-18);

        // Accepted, but not good enough to relax the damping
        assert!(region.update_lambda(0.1));
        assert!((region.lambda - 1e-4).abs() < 1e-18);

        assert!(!region.update_lambda(-1.0));
        assert!((region.lambda - 1e-3).abs() < 1e-15);
    }

    #[test]
    fn test_saturation() {
        let config = LmConfig {
            initial_lambda: 1.0,
            max_lambda: 100.0,
            ..LmConfig::default()
        };
        let mut region = TrustRegion::from_config(&config);
        region.increase_lambda();
        assert!(!region.is_saturated());
        region.increase_lambda();
        region.increase_lambda();
        assert!(region.is_saturated());
        assert_eq!(region.lambda, 100.0);
    }

    #[test]
    fn test_gain_ratio() {
        assert_eq!(TrustRegion::gain_ratio(10.0, 5.0, 10.0), 0.5);
        assert_eq!(TrustRegion::gain_ratio(10.0, 10.0, 0.0), 1.0);
        assert_eq!(TrustRegion::gain_ratio(10.0, 11.0, 0.0), 0.0);
        assert_eq!(
            TrustRegion::gain_ratio(10.0, f64::INFINITY, 1.0),
            f64::NEG_INFINITY
        );
    }
}
