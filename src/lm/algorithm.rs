//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! This module contains the core implementation of the Levenberg-Marquardt
//! algorithm for nonlinear least-squares optimization.

use log::{debug, trace};
use ndarray::{Array1, Array2};
use std::fmt;

use crate::error::{GammaCalError, Result};
use crate::problem::Problem;
use crate::utils::finite_difference;

use super::config::{DiffMethod, LmConfig};
use super::convergence::{ConvergenceCriteria, ConvergenceStatus};
use super::step::LmStep;
use super::trust_region::TrustRegion;

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Sum of squared residuals
    pub cost: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// Number of function evaluations
    pub func_evals: usize,

    /// Whether the optimization succeeded
    pub success: bool,

    /// Termination state of the iteration
    pub status: ConvergenceStatus,

    /// A message describing the result
    pub message: String,

    /// The Jacobian matrix at the solution
    pub jacobian: Array2<f64>,
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    /// The configuration used by this optimizer.
    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for change in residual norm.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the tolerance for change in parameter values.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the tolerance for gradient norm.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    /// Set the method used for calculating the Jacobian.
    pub fn with_differentiation_method(mut self, method: DiffMethod) -> Self {
        self.config.diff_method = method;
        self
    }

    /// Minimize the sum of squared residuals for the given problem.
    ///
    /// Running out of iterations, or failing to find any cost-reducing step,
    /// is reported through `success == false` rather than as an error; errors
    /// are reserved for invalid problems and failed residual evaluations.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to solve
    /// * `initial_params` - Initial guess for the parameter values
    pub fn minimize<P: Problem>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
    ) -> Result<LmResult> {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(GammaCalError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }
        if problem.residual_count() == 0 {
            return Err(GammaCalError::InvalidInput(
                "Cannot fit a problem without residuals".to_string(),
            ));
        }

        let criteria = ConvergenceCriteria::new(
            self.config.xtol,
            self.config.ftol,
            self.config.gtol,
            self.config.max_iterations,
        );
        let mut region = TrustRegion::from_config(&self.config);

        let mut params = initial_params;
        let mut residuals = problem.eval(&params)?;
        let mut func_evals = 1;
        if residuals.len() != problem.residual_count() {
            return Err(GammaCalError::DimensionMismatch(format!(
                "Expected {} residuals, got {}",
                problem.residual_count(),
                residuals.len()
            )));
        }
        let mut cost = sum_of_squares(&residuals);
        let mut iterations = 0;

        let (status, detail) = if !cost.is_finite() {
            (
                ConvergenceStatus::NumericalError,
                "non-finite residuals at the initial guess".to_string(),
            )
        } else {
            loop {
                let jacobian = self.jacobian(problem, &params, &mut func_evals)?;
                let gradient = jacobian.t().dot(&residuals);
                let gradient_norm = gradient.iter().map(|g| g.abs()).fold(0.0, f64::max);

                if gradient_norm < self.config.gtol {
                    break (
                        ConvergenceStatus::GradientConvergence,
                        format!("||g|| = {:.2e} < {:.2e}", gradient_norm, self.config.gtol),
                    );
                }
                if iterations >= self.config.max_iterations {
                    break (
                        ConvergenceStatus::MaxIterationsReached,
                        format!("{} iterations", self.config.max_iterations),
                    );
                }

                // Retry with stronger damping until a step is accepted.
                let mut expected_gain: Option<f64> = None;
                let accepted = loop {
                    let step = match LmStep::calculate_step(&jacobian, &residuals, &region) {
                        Ok(step) => step,
                        Err(GammaCalError::LinearAlgebra(message)) => {
                            trace!("lambda = {:.2e}: {}", region.lambda, message);
                            if region.is_saturated() {
                                break None;
                            }
                            region.increase_lambda();
                            continue;
                        }
                        Err(e) => return Err(e),
                    };
                    if expected_gain.is_none() {
                        expected_gain = Some(step.predicted_reduction);
                    }

                    let new_params = &params + &step.step;
                    let new_residuals = problem.eval(&new_params)?;
                    func_evals += 1;
                    let new_cost = sum_of_squares(&new_residuals);

                    let gain = TrustRegion::gain_ratio(cost, new_cost, step.predicted_reduction);
                    trace!(
                        "iteration {}: lambda = {:.2e}, cost {:.6e} -> {:.6e}, gain = {:.3}",
                        iterations,
                        step.lambda,
                        cost,
                        new_cost,
                        gain
                    );
                    if region.update_lambda(gain) {
                        break Some((new_params, new_residuals, new_cost));
                    }
                    if region.is_saturated() {
                        break None;
                    }
                };

                let Some((new_params, new_residuals, new_cost)) = accepted else {
                    // Nothing left to gain under the linear model means we sit at the minimum.
                    let relative_gain = expected_gain
                        .map(|gain| gain / cost.max(f64::MIN_POSITIVE))
                        .filter(|gain| *gain <= self.config.ftol);
                    if let Some(relative_gain) = relative_gain {
                        break (
                            ConvergenceStatus::FunctionValueConvergence,
                            format!("expected relative gain {:.2e}", relative_gain),
                        );
                    }
                    break (
                        ConvergenceStatus::NumericalError,
                        "no step reduces the cost, and lambda reached maximum".to_string(),
                    );
                };

                iterations += 1;
                let status = criteria.check(
                    &params,
                    &new_params,
                    cost,
                    new_cost,
                    gradient_norm,
                    iterations,
                );

                params = new_params;
                residuals = new_residuals;
                cost = new_cost;

                if status.is_terminated() {
                    break (status, format!("cost = {:.6e}", cost));
                }
            }
        };

        let jacobian = self.jacobian(problem, &params, &mut func_evals)?;
        let message = format!("{} ({})", status.description(), detail);
        debug!(
            "Levenberg-Marquardt finished after {} iterations: {}",
            iterations, message
        );

        Ok(LmResult {
            params,
            residuals,
            cost,
            iterations,
            func_evals,
            success: status.is_converged(),
            status,
            message,
            jacobian,
        })
    }

    /// Evaluate the Jacobian with the configured differentiation method.
    fn jacobian<P: Problem>(
        &self,
        problem: &P,
        params: &Array1<f64>,
        func_evals: &mut usize,
    ) -> Result<Array2<f64>> {
        let n_params = params.len();
        let jacobian = match self.config.diff_method {
            DiffMethod::Analytical => {
                if !problem.has_custom_jacobian() {
                    *func_evals += n_params + 1;
                }
                problem.jacobian(params)?
            }
            DiffMethod::FiniteDifference => {
                *func_evals += n_params + 1;
                finite_difference::jacobian(problem, params, None)?
            }
            DiffMethod::CentralDifference => {
                *func_evals += 2 * n_params;
                finite_difference::jacobian_central(problem, params, None)?
            }
        };

        if jacobian.dim() != (problem.residual_count(), n_params) {
            return Err(GammaCalError::DimensionMismatch(format!(
                "Expected Jacobian of shape [{}, {}], got {:?}",
                problem.residual_count(),
                n_params,
                jacobian.shape()
            )));
        }

        Ok(jacobian)
    }
}

fn sum_of_squares(residuals: &Array1<f64>) -> f64 {
    residuals.iter().map(|r| r.powi(2)).sum()
}
