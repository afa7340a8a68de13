//! Model functions fitted by the analysis.
//!
//! Each model comes with a [`Problem`](crate::problem::Problem)
//! implementation carrying its analytical Jacobian.

mod gaussian;
mod linear;

pub use gaussian::{gaussian, GaussianParams, GaussianProblem, FWHM_PER_SIGMA};
pub use linear::{line, LinearProblem};
