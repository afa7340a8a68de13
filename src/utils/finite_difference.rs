//! Finite difference methods for numerical differentiation.
//!
//! This module provides functions for computing Jacobians using finite
//! difference approximations when a problem has no analytical derivative.

use crate::error::{GammaCalError, Result};
use crate::problem::Problem;
use ndarray::{Array1, Array2};

/// Default step size for finite differences.
const DEFAULT_EPSILON: f64 = 1e-8;

/// Step size for parameter `value`, scaled to the parameter magnitude.
fn scaled_step(value: f64, eps: f64) -> f64 {
    if value.abs() > eps {
        value.abs() * eps
    } else {
        eps
    }
}

/// Compute the Jacobian matrix using forward finite differences.
///
/// The Jacobian is the matrix of partial derivatives of the residuals with
/// respect to the parameters: J[i,j] = ∂residual[i]/∂param[j].
///
/// # Arguments
///
/// * `problem` - The problem to evaluate
/// * `params` - The parameter values at which to evaluate the Jacobian
/// * `epsilon` - The step size for finite differences (optional)
pub fn jacobian(
    problem: &dyn Problem,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let n_params = params.len();
    let n_residuals = problem.residual_count();

    let residuals = problem.eval(params)?;
    if residuals.len() != n_residuals {
        return Err(GammaCalError::DimensionMismatch(format!(
            "Expected {} residuals, got {}",
            n_residuals,
            residuals.len()
        )));
    }

    let mut jac = Array2::zeros((n_residuals, n_params));

    for j in 0..n_params {
        let mut params_perturbed = params.clone();
        let eps_j = scaled_step(params[j], eps);
        params_perturbed[j] += eps_j;

        let residuals_perturbed = problem.eval(&params_perturbed)?;
        for i in 0..n_residuals {
            jac[[i, j]] = (residuals_perturbed[i] - residuals[i]) / eps_j;
        }
    }

    Ok(jac)
}

/// Compute the Jacobian matrix using central finite differences.
///
/// Twice as many residual evaluations as [`jacobian`], with second-order
/// accuracy in the step size.
pub fn jacobian_central(
    problem: &dyn Problem,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON.sqrt());
    let n_params = params.len();
    let n_residuals = problem.residual_count();

    let mut jac = Array2::zeros((n_residuals, n_params));

    for j in 0..n_params {
        let eps_j = scaled_step(params[j], eps);

        let mut params_forward = params.clone();
        params_forward[j] += eps_j;
        let mut params_backward = params.clone();
        params_backward[j] -= eps_j;

        let forward = problem.eval(&params_forward)?;
        let backward = problem.eval(&params_backward)?;
        if forward.len() != n_residuals || backward.len() != n_residuals {
            return Err(GammaCalError::DimensionMismatch(format!(
                "Expected {} residuals, got {} and {}",
                n_residuals,
                forward.len(),
                backward.len()
            )));
        }

        for i in 0..n_residuals {
            jac[[i, j]] = (forward[i] - backward[i]) / (2.0 * eps_j);
        }
    }

    Ok(jac)
}
