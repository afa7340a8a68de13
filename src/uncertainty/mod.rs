//! # Parameter Uncertainties
//!
//! Covariance, standard errors and correlations of fitted parameters,
//! following the curve-fitting convention of scaling `inv(JᵀJ)` by the
//! reduced chi-square.

mod covariance;

pub use covariance::{
    calculate_correlation, calculate_covariance, is_defined, standard_errors_from_covariance,
};
