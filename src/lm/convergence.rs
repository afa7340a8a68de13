//! Convergence criteria for the Levenberg-Marquardt iteration.
//!
//! This module defines the criteria used to determine when an optimization
//! has converged to a solution, or has to give up.

use ndarray::Array1;

/// Possible convergence states for an optimization algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// The algorithm is still running.
    Running,

    /// The algorithm has converged due to a small parameter change.
    ParameterConvergence,

    /// The algorithm has converged due to a small function value change.
    FunctionValueConvergence,

    /// The algorithm has converged due to a small gradient.
    GradientConvergence,

    /// The algorithm has terminated due to reaching the maximum number of iterations.
    MaxIterationsReached,

    /// The algorithm has terminated due to a numerical error.
    NumericalError,
}

impl ConvergenceStatus {
    /// Returns true if the optimization has terminated (either converged or failed).
    pub fn is_terminated(&self) -> bool {
        !matches!(self, ConvergenceStatus::Running)
    }

    /// Returns true if the optimization has converged.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::ParameterConvergence
                | ConvergenceStatus::FunctionValueConvergence
                | ConvergenceStatus::GradientConvergence
        )
    }

    /// Returns a description of the convergence status.
    pub fn description(&self) -> String {
        match self {
            ConvergenceStatus::Running => "Optimization is still running".to_string(),
            ConvergenceStatus::ParameterConvergence => {
                "Converged: small parameter change".to_string()
            }
            ConvergenceStatus::FunctionValueConvergence => {
                "Converged: small function value change".to_string()
            }
            ConvergenceStatus::GradientConvergence => "Converged: small gradient".to_string(),
            ConvergenceStatus::MaxIterationsReached => {
                "Terminated: maximum iterations reached".to_string()
            }
            ConvergenceStatus::NumericalError => "Terminated: numerical error".to_string(),
        }
    }
}

/// Criteria for determining when an optimization algorithm has converged.
#[derive(Debug, Clone)]
pub struct ConvergenceCriteria {
    /// Tolerance for change in parameter values.
    pub xtol: f64,

    /// Tolerance for change in function value.
    pub ftol: f64,

    /// Tolerance for gradient norm.
    pub gtol: f64,

    /// Maximum number of iterations.
    pub max_iterations: usize,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            xtol: 1e-8,
            ftol: 1e-8,
            gtol: 1e-8,
            max_iterations: 100,
        }
    }
}

impl ConvergenceCriteria {
    /// Creates a new set of convergence criteria with the given tolerances.
    pub fn new(xtol: f64, ftol: f64, gtol: f64, max_iterations: usize) -> Self {
        Self {
            xtol,
            ftol,
            gtol,
            max_iterations,
        }
    }

    /// Checks whether the optimization has converged after an accepted step.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameter values before the step
    /// * `new_params` - The parameter values after the step
    /// * `cost` - The sum of squares before the step
    /// * `new_cost` - The sum of squares after the step
    /// * `gradient_norm` - The norm of the gradient before the step
    /// * `iterations` - The number of iterations so far, including this one
    pub fn check(
        &self,
        params: &Array1<f64>,
        new_params: &Array1<f64>,
        cost: f64,
        new_cost: f64,
        gradient_norm: f64,
        iterations: usize,
    ) -> ConvergenceStatus {
        if !new_cost.is_finite() || new_params.iter().any(|p| !p.is_finite()) {
            return ConvergenceStatus::NumericalError;
        }

        if gradient_norm < self.gtol {
            return ConvergenceStatus::GradientConvergence;
        }

        // An exact fit cannot improve any further.
        if new_cost == 0.0 {
            return ConvergenceStatus::FunctionValueConvergence;
        }

        let param_change = new_params
            .iter()
            .zip(params.iter())
            .map(|(a, b)| (a - b).abs() / (b.abs().max(1.0)))
            .fold(0.0, f64::max);
        if param_change < self.xtol {
            return ConvergenceStatus::ParameterConvergence;
        }

        let cost_change = (cost - new_cost).abs() / cost.max(1e-10);
        if cost_change < self.ftol {
            return ConvergenceStatus::FunctionValueConvergence;
        }

        if iterations >= self.max_iterations {
            return ConvergenceStatus::MaxIterationsReached;
        }

        ConvergenceStatus::Running
    }
}
