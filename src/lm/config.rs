//! Configuration options for the Levenberg-Marquardt algorithm.
//!
//! This module defines the iteration budget, convergence tolerances and damping
//! schedule of the optimizer. The configuration is serde-(de)serializable so it
//! can be carried inside an analysis configuration file.

use serde::{Deserialize, Serialize};

/// Method for calculating the Jacobian matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiffMethod {
    /// Use the problem's `jacobian` method (analytical when the problem
    /// provides one, forward differences otherwise)
    #[default]
    Analytical,

    /// Always use forward finite differences
    FiniteDifference,

    /// Always use central finite differences
    CentralDifference,
}

/// Configuration options for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Maximum number of iterations. Default: 100
    pub max_iterations: usize,

    /// Tolerance for relative change in the sum of squares. Default: 1e-8
    pub ftol: f64,

    /// Tolerance for relative change in parameter values. Default: 1e-8
    pub xtol: f64,

    /// Tolerance for gradient norm. Default: 1e-8
    pub gtol: f64,

    /// Initial value for the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor by which to increase lambda. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor by which to decrease lambda. Default: 0.1
    pub lambda_down_factor: f64,

    /// Minimum value for lambda. Default: 1e-10
    pub min_lambda: f64,

    /// Maximum value for lambda. Default: 1e10
    pub max_lambda: f64,

    /// Method to use for calculating the Jacobian. Default: Analytical
    pub diff_method: DiffMethod,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            min_lambda: 1e-10,
            max_lambda: 1e10,
            diff_method: DiffMethod::default(),
        }
    }
}
