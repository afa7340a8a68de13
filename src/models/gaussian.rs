//! Gaussian photopeak model.
//!
//! The peak shape is
//!
//! ```text
//! f(x) = A · exp(−(x − m)² / (2 s²) + B)
//! ```
//!
//! with the baseline term `B` inside the exponent. `B` therefore scales the
//! peak instead of offsetting it, and only the product `A · e^B` is determined
//! by the data.

use crate::error::{GammaCalError, Result};
use crate::problem::Problem;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// 2·sqrt(2·ln 2), the FWHM of a unit-sigma Gaussian.
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949;

/// Parameters of the Gaussian photopeak model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianParams {
    /// Amplitude `A`
    pub amplitude: f64,
    /// Mean `m`, the peak centroid in channels
    pub mean: f64,
    /// Width `s`; only its magnitude is meaningful
    pub sigma: f64,
    /// Exponent offset `B`
    pub baseline: f64,
}

impl GaussianParams {
    /// Number of model parameters.
    pub const COUNT: usize = 4;

    /// Starting point for fitting the channel range `[start, stop)`:
    /// amplitude 100, centred in the range, sigma half the range width.
    pub fn initial_guess(start: usize, stop: usize) -> Self {
        Self {
            amplitude: 100.0,
            mean: (start + stop) as f64 / 2.0,
            sigma: (stop as f64 - start as f64) / 2.0,
            baseline: 0.0,
        }
    }

    /// Evaluate the model at one channel.
    pub fn evaluate(&self, x: f64) -> f64 {
        gaussian(x, self.amplitude, self.mean, self.sigma, self.baseline)
    }

    /// Evaluate the model at every channel of `x`.
    pub fn evaluate_all(&self, x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|x| self.evaluate(x))
    }

    /// Height of the peak at its centroid, `A · e^B`.
    pub fn peak_height(&self) -> f64 {
        self.amplitude * self.baseline.exp()
    }

    /// Full width at half maximum.
    pub fn fwhm(&self) -> f64 {
        FWHM_PER_SIGMA * self.sigma.abs()
    }

    /// Parameters in optimizer order `[A, m, s, B]`.
    pub fn to_array(&self) -> Array1<f64> {
        Array1::from_vec(vec![self.amplitude, self.mean, self.sigma, self.baseline])
    }

    /// Build from optimizer order `[A, m, s, B]`.
    pub fn from_array(params: &Array1<f64>) -> Result<Self> {
        if params.len() != Self::COUNT {
            return Err(GammaCalError::DimensionMismatch(format!(
                "Expected {} Gaussian parameters, got {}",
                Self::COUNT,
                params.len()
            )));
        }
        Ok(Self {
            amplitude: params[0],
            mean: params[1],
            sigma: params[2],
            baseline: params[3],
        })
    }
}

/// `A · exp(−(x − m)² / (2 s²) + B)`
pub fn gaussian(x: f64, amplitude: f64, mean: f64, sigma: f64, baseline: f64) -> f64 {
    let dx = x - mean;
    amplitude * (-(dx * dx) / (2.0 * sigma * sigma) + baseline).exp()
}

/// Least-squares problem fitting [`gaussian`] to one region of a spectrum.
#[derive(Debug, Clone)]
pub struct GaussianProblem {
    x_data: Array1<f64>,
    y_data: Array1<f64>,
}

impl GaussianProblem {
    /// Create a problem over matching channel and count slices.
    pub fn new(x_data: Array1<f64>, y_data: Array1<f64>) -> Result<Self> {
        if x_data.len() != y_data.len() {
            return Err(GammaCalError::DimensionMismatch(format!(
                "x and y data must have the same length, got {} and {}",
                x_data.len(),
                y_data.len()
            )));
        }
        Ok(Self { x_data, y_data })
    }

    /// The channels of the region.
    pub fn x_data(&self) -> &Array1<f64> {
        &self.x_data
    }
}

impl Problem for GaussianProblem {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let peak = GaussianParams::from_array(params)?;
        Ok(self
            .x_data
            .iter()
            .zip(self.y_data.iter())
            .map(|(&x, &y)| peak.evaluate(x) - y)
            .collect())
    }

    fn parameter_count(&self) -> usize {
        GaussianParams::COUNT
    }

    fn residual_count(&self) -> usize {
        self.x_data.len()
    }

    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        let peak = GaussianParams::from_array(params)?;
        let (a, m, s) = (peak.amplitude, peak.mean, peak.sigma);
        let s2 = s * s;

        let mut jac = Array2::zeros((self.x_data.len(), GaussianParams::COUNT));
        for (i, &x) in self.x_data.iter().enumerate() {
            let dx = x - m;
            let exp_term = (-(dx * dx) / (2.0 * s2) + peak.baseline).exp();
            let value = a * exp_term;

            // d/dA
            jac[[i, 0]] = exp_term;
            // d/dm
            jac[[i, 1]] = value * dx / s2;
            // d/ds
            jac[[i, 2]] = value * dx * dx / (s2 * s);
            // d/dB
            jac[[i, 3]] = value;
        }

        Ok(jac)
    }

    fn has_custom_jacobian(&self) -> bool {
        true
    }
}
