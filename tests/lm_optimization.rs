//! Integration tests for the Levenberg-Marquardt optimizer on the fitting models.

use crate::test_helpers::{peak_counts, with_poisson_noise, Peak};
use approx::assert_relative_eq;
use gammacal_rs::lm::{DiffMethod, LevenbergMarquardt, LmConfig};
use gammacal_rs::models::{GaussianParams, GaussianProblem, LinearProblem};
use gammacal_rs::uncertainty::{calculate_correlation, calculate_covariance, is_defined};
use gammacal_rs::{GammaCalError, Problem, Result};
use ndarray::{array, Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Exponential decay with no analytical Jacobian: y = a·exp(−k·x)
struct DecayProblem {
    x: Array1<f64>,
    y: Array1<f64>,
}

impl Problem for DecayProblem {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        if params.len() != 2 {
            return Err(GammaCalError::DimensionMismatch(format!(
                "Expected 2 parameters, got {}",
                params.len()
            )));
        }
        Ok(self
            .x
            .iter()
            .zip(self.y.iter())
            .map(|(&x, &y)| params[0] * (-params[1] * x).exp() - y)
            .collect())
    }

    fn parameter_count(&self) -> usize {
        2
    }

    fn residual_count(&self) -> usize {
        self.x.len()
    }
}

#[test]
fn test_linear_fit_with_noise() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let x = Array1::linspace(0.0, 1000.0, 50);
    let y = x.mapv(|x| 0.75 * x + 12.0 + rng.gen_range(-2.0..2.0));
    let problem = LinearProblem::new(x, y).unwrap();

    let result = LevenbergMarquardt::new()
        .minimize(&problem, array![1.0, 1.0])
        .unwrap();

    assert!(result.success, "{}", result.message);
    assert_relative_eq!(result.params[0], 0.75, epsilon = 0.01);
    assert_relative_eq!(result.params[1], 12.0, epsilon = 2.0);

    let covar = calculate_covariance(&result.jacobian, result.cost).unwrap();
    assert!(is_defined(&covar));
    // Slope and intercept of a line over positive x are anti-correlated
    let correl = calculate_correlation(&covar);
    assert!(correl[[0, 1]] < 0.0);
    assert_relative_eq!(correl[[0, 1]], correl[[1, 0]], epsilon = 1e-12);
}

#[test]
fn test_differentiation_methods_agree_on_a_gaussian() {
    let expected = peak_counts(80, &[Peak::new(600.0, 41.0, 3.5)], 0.0);
    let y = Array1::from_vec(with_poisson_noise(&expected, 5));
    let x = Array1::range(0.0, 80.0, 1.0);
    let slice = |a: &Array1<f64>| a.slice(ndarray::s![28..56]).to_owned();
    let problem = GaussianProblem::new(slice(&x), slice(&y)).unwrap();
    let guess = GaussianParams::initial_guess(28, 56).to_array();

    let means: Vec<f64> = [
        DiffMethod::Analytical,
        DiffMethod::FiniteDifference,
        DiffMethod::CentralDifference,
    ]
    .into_iter()
    .map(|method| {
        let result = LevenbergMarquardt::with_config(LmConfig {
            max_iterations: 500,
            diff_method: method,
            ..LmConfig::default()
        })
        .minimize(&problem, guess.clone())
        .unwrap();
        assert!(result.success, "{:?}: {}", method, result.message);
        result.params[1]
    })
    .collect();

    for mean in &means {
        assert!((mean - 41.0).abs() < 0.5);
        assert_relative_eq!(*mean, means[0], epsilon = 1e-3);
    }
}

#[test]
fn test_finite_difference_default_jacobian() {
    let x = Array1::linspace(0.0, 4.0, 30);
    let y = x.mapv(|x: f64| 3.0 * (-0.8 * x).exp());
    let problem = DecayProblem { x, y };
    assert!(!problem.has_custom_jacobian());

    let jacobian = problem.jacobian(&array![3.0, 0.8]).unwrap();
    assert_eq!(jacobian.dim(), (30, 2));
    assert_relative_eq!(jacobian[[0, 0]], 1.0, epsilon = 1e-6);

    let result = LevenbergMarquardt::new()
        .minimize(&problem, array![1.0, 0.1])
        .unwrap();
    assert!(result.success, "{}", result.message);
    assert_relative_eq!(result.params[0], 3.0, epsilon = 1e-4);
    assert_relative_eq!(result.params[1], 0.8, epsilon = 1e-4);
    assert!(result.func_evals > result.iterations);
}

#[test]
fn test_gaussian_jacobian_is_rank_deficient() {
    let x = Array1::range(0.0, 40.0, 1.0);
    let problem = GaussianProblem::new(x, Array1::zeros(40)).unwrap();
    let jacobian: Array2<f64> = problem.jacobian(&array![100.0, 20.0, 4.0, 0.5]).unwrap();

    // d/dB equals A · d/dA
    for row in jacobian.rows() {
        assert_relative_eq!(row[3], 100.0 * row[0], max_relative = 1e-12);
    }
    let covar = calculate_covariance(&jacobian, 1.0).unwrap();
    assert!(!is_defined(&covar));
}

#[test]
fn test_bad_initial_guess_length() {
    let problem = LinearProblem::new(array![1.0, 2.0], array![1.0, 2.0]).unwrap();
    let err = LevenbergMarquardt::new()
        .minimize(&problem, array![1.0])
        .unwrap_err();
    assert!(matches!(err, GammaCalError::DimensionMismatch(_)));
}
