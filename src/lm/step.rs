//! Step calculation for the Levenberg-Marquardt algorithm.
//!
//! This module computes the damped Gauss-Newton step, which blends the
//! Gauss-Newton and gradient descent directions through the damping parameter.

use crate::error::{GammaCalError, Result};
use crate::lm::trust_region::TrustRegion;
use crate::utils::matrix_convert::{
    nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};
use ndarray::{Array1, Array2};

/// Floor for the diagonal scaling so a parameter with zero sensitivity is still damped.
const MIN_DIAGONAL: f64 = 1e-10;

/// Result of a Levenberg-Marquardt step calculation.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// The calculated step vector
    pub step: Array1<f64>,

    /// The predicted reduction in the sum of squares
    pub predicted_reduction: f64,

    /// The damping parameter used to calculate the step
    pub lambda: f64,
}

/// Handles step calculation for the Levenberg-Marquardt algorithm.
pub struct LmStep;

impl LmStep {
    /// Calculates the Levenberg-Marquardt step.
    ///
    /// Solves `(JᵀJ + λ·diag(JᵀJ)) δ = −Jᵀr`, using Cholesky and falling back to
    /// LU when the damped normal matrix is not numerically positive definite.
    ///
    /// # Arguments
    ///
    /// * `jacobian` - The Jacobian matrix at the current position
    /// * `residuals` - The residuals at the current position
    /// * `trust_region` - The trust region controller
    pub fn calculate_step(
        jacobian: &Array2<f64>,
        residuals: &Array1<f64>,
        trust_region: &TrustRegion,
    ) -> Result<StepResult> {
        let j_t_j = jacobian.t().dot(jacobian);
        let j_t_r = jacobian.t().dot(residuals);

        let mut augmented_j_t_j = j_t_j.clone();
        for i in 0..augmented_j_t_j.nrows() {
            augmented_j_t_j[[i, i]] += trust_region.lambda * j_t_j[[i, i]].max(MIN_DIAGONAL);
        }

        let step = LmStep::solve(&augmented_j_t_j, &-&j_t_r)?;
        let predicted_reduction = LmStep::predicted_reduction(&j_t_j, &j_t_r, &step);

        Ok(StepResult {
            step,
            predicted_reduction,
            lambda: trust_region.lambda,
        })
    }

    /// Solves the linear system `a * x = b`.
    fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
        let a_mat = ndarray_to_nalgebra(a);
        let b_vec = ndarray_vec_to_nalgebra(b);

        let solution = match a_mat.clone().cholesky() {
            Some(cholesky) => Some(cholesky.solve(&b_vec)),
            None => a_mat.lu().solve(&b_vec),
        };

        match solution {
            Some(x) if x.iter().all(|v| v.is_finite()) => Ok(nalgebra_vec_to_ndarray(&x)),
            _ => Err(GammaCalError::LinearAlgebra(
                "Damped normal equations could not be solved".to_string(),
            )),
        }
    }

    /// Predicted reduction of `‖r‖²` under the linearised model:
    /// `‖r‖² − ‖r + Jδ‖² = −(2 δ·Jᵀr + δᵀ JᵀJ δ)`.
    fn predicted_reduction(j_t_j: &Array2<f64>, j_t_r: &Array1<f64>, step: &Array1<f64>) -> f64 {
        -(2.0 * step.dot(j_t_r) + step.dot(&j_t_j.dot(step)))
    }
}
