//! Levenberg-Marquardt algorithm implementation.
//!
//! This module provides the nonlinear least-squares optimizer shared by the
//! photopeak fits and the energy calibration.

pub mod algorithm;
pub mod config;
pub mod convergence;
pub mod step;
pub mod trust_region;

// Re-export key types
pub use algorithm::{LevenbergMarquardt, LmResult};
pub use config::{DiffMethod, LmConfig};
pub use convergence::{ConvergenceCriteria, ConvergenceStatus};
pub use step::{LmStep, StepResult};
pub use trust_region::TrustRegion;
