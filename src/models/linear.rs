//! Linear energy calibration model, `E(ch) = a·ch + b`.

use crate::error::{GammaCalError, Result};
use crate::problem::Problem;
use ndarray::{Array1, Array2};

/// Least-squares problem fitting a straight line through `(x, y)` pairs.
#[derive(Debug, Clone)]
pub struct LinearProblem {
    x_data: Array1<f64>,
    y_data: Array1<f64>,
}

impl LinearProblem {
    /// Create a problem over matching abscissa and ordinate values.
    pub fn new(x_data: Array1<f64>, y_data: Array1<f64>) -> Result<Self> {
        if x_data.len() != y_data.len() {
            return Err(GammaCalError::DimensionMismatch(format!(
                "Expected x and y data to have the same length, got {} and {}",
                x_data.len(),
                y_data.len()
            )));
        }
        Ok(Self { x_data, y_data })
    }
}

/// `a·x + b`
pub fn line(x: f64, slope: f64, intercept: f64) -> f64 {
    slope * x + intercept
}

impl Problem for LinearProblem {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        if params.len() != 2 {
            return Err(GammaCalError::DimensionMismatch(format!(
                "Expected 2 parameters, got {}",
                params.len()
            )));
        }

        let (a, b) = (params[0], params[1]);
        Ok(self
            .x_data
            .iter()
            .zip(self.y_data.iter())
            .map(|(&x, &y)| line(x, a, b) - y)
            .collect())
    }

    fn parameter_count(&self) -> usize {
        2
    }

    fn residual_count(&self) -> usize {
        self.x_data.len()
    }

    fn jacobian(&self, _params: &Array1<f64>) -> Result<Array2<f64>> {
        let n = self.x_data.len();
        let mut jac = Array2::zeros((n, 2));

        for i in 0..n {
            jac[[i, 0]] = self.x_data[i]; // d/da
            jac[[i, 1]] = 1.0; // d/db
        }

        Ok(jac)
    }

    fn has_custom_jacobian(&self) -> bool {
        true
    }
}
