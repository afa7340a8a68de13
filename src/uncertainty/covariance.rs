//! # Covariance Matrix Calculations
//!
//! This module provides functions for calculating covariance matrices from
//! Jacobian matrices in nonlinear least-squares optimization.

use crate::error::{GammaCalError, Result};
use crate::utils::matrix_convert::ndarray_to_nalgebra;
use ndarray::{Array1, Array2};

/// Calculate the parameter covariance matrix from the Jacobian at the solution.
///
/// The covariance matrix is estimated as:
///   covar = s² · inv(Jᵀ J),   s² = chisqr / (n_residuals − n_params)
///
/// The inverse is taken through the singular value decomposition of `J`.
/// When `J` is rank deficient, or there are no degrees of freedom left, the
/// covariance is undefined and every entry is `+∞`.
pub fn calculate_covariance(jacobian: &Array2<f64>, chisqr: f64) -> Result<Array2<f64>> {
    let (n_residuals, n_params) = jacobian.dim();
    let undefined = Array2::from_elem((n_params, n_params), f64::INFINITY);

    if n_residuals <= n_params || !chisqr.is_finite() {
        return Ok(undefined);
    }

    let svd = ndarray_to_nalgebra(jacobian).svd(false, true);
    let v_t = svd.v_t.ok_or_else(|| {
        GammaCalError::LinearAlgebra("SVD did not produce right singular vectors".to_string())
    })?;
    let singular_values = &svd.singular_values;

    let s_max = singular_values.iter().copied().fold(0.0, f64::max);
    let threshold = f64::EPSILON * n_residuals.max(n_params) as f64 * s_max;
    if s_max == 0.0 || singular_values.iter().any(|&s| s <= threshold) {
        return Ok(undefined);
    }

    let redchi = chisqr / (n_residuals - n_params) as f64;

    // inv(JᵀJ) = V · diag(1/s²) · Vᵀ
    let mut covar = Array2::zeros((n_params, n_params));
    for i in 0..n_params {
        for j in 0..n_params {
            covar[[i, j]] = singular_values
                .iter()
                .enumerate()
                .map(|(k, s)| v_t[(k, i)] * v_t[(k, j)] / (s * s))
                .sum::<f64>()
                * redchi;
        }
    }

    Ok(covar)
}

/// Whether every entry of the covariance matrix is finite.
pub fn is_defined(covar: &Array2<f64>) -> bool {
    covar.iter().all(|v| v.is_finite())
}

/// Calculate correlation matrix from covariance matrix.
///
/// correl[i,j] = covar[i,j] / sqrt(covar[i,i] * covar[j,j])
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    let mut correl = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..n {
            if i == j {
                correl[[i, j]] = 1.0;
            } else {
                let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
                correl[[i, j]] = if denom > 0.0 && denom.is_finite() {
                    covar[[i, j]] / denom
                } else {
                    f64::NAN
                };
            }
        }
    }

    correl
}

/// Extract standard errors from the covariance matrix.
///
/// Standard errors are the square roots of the diagonal elements. An infinite
/// variance gives an infinite standard error, and a negative or NaN variance
/// gives NaN.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar
        .diag()
        .mapv(|v| if v >= 0.0 { v.sqrt() } else { f64::NAN })
}
