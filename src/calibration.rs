//! Linear energy calibration.
//!
//! Fitted photopeak centroids (channels) are paired with reference energies
//! (keV) and a straight line `E(ch) = a·ch + b` is fitted through them with
//! the same Levenberg-Marquardt optimizer used for the peaks.

use crate::error::{GammaCalError, Result};
use crate::lm::{LevenbergMarquardt, LmConfig};
use crate::models::{line, LinearProblem};
use crate::peak_fit::SpectrumFit;
use crate::report::FitReporter;
use crate::uncertainty::calculate_covariance;
use log::{debug, info, warn};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A linear channel-to-energy calibration.
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationResult {
    /// keV per channel
    pub slope: f64,

    /// Energy at channel zero, in keV
    pub intercept: f64,

    /// 2×2 covariance of `[slope, intercept]`; all `+∞` when undefined
    pub covariance: Array2<f64>,

    /// The calibration evaluated at each centroid
    pub fitted_values: Vec<f64>,

    /// Reference energy minus fitted value, per point
    pub residuals: Vec<f64>,

    /// Centroids the line was fitted through
    pub centroids: Vec<f64>,

    /// Reference energies, paired with `centroids`
    pub energies: Vec<f64>,

    /// Coefficient of determination; `None` when the reference energies have
    /// no spread
    pub r_squared: Option<f64>,
}

impl CalibrationResult {
    /// Energy at `channel`.
    pub fn energy_at(&self, channel: f64) -> f64 {
        line(channel, self.slope, self.intercept)
    }

    /// R², or `DegenerateInput` when it is undefined.
    pub fn r_squared_checked(&self) -> Result<f64> {
        self.r_squared.ok_or_else(|| {
            GammaCalError::DegenerateInput(
                "R² is undefined when all reference energies are equal".to_string(),
            )
        })
    }

    /// The calibration line as `E = a·Ch + b`.
    pub fn equation(&self) -> String {
        format!("E = {:.2}·Ch + {:.2}", self.slope, self.intercept)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for CalibrationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.equation())?;
        match self.r_squared {
            Some(r_squared) => write!(f, "R² = {:.4}", r_squared),
            None => write!(f, "R² = undefined"),
        }
    }
}

/// Explicit pairing of a fitted ROI with its known energy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferencePeak {
    /// Index of the ROI in the spectrum fit
    pub roi_index: usize,
    /// Known energy of the photopeak, in keV
    pub energy_kev: f64,
}

impl ReferencePeak {
    pub fn new(roi_index: usize, energy_kev: f64) -> Self {
        Self {
            roi_index,
            energy_kev,
        }
    }
}

/// Fits linear energy calibrations.
pub struct CalibrationFitter {
    optimizer: LevenbergMarquardt,
    reporter: Option<Box<dyn FitReporter>>,
}

impl fmt::Debug for CalibrationFitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalibrationFitter")
            .field("optimizer", &self.optimizer)
            .field("reporter", &self.reporter.is_some())
            .finish()
    }
}

impl Default for CalibrationFitter {
    fn default() -> Self {
        Self::with_config(LmConfig::default())
    }
}

impl CalibrationFitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LmConfig) -> Self {
        Self {
            optimizer: LevenbergMarquardt::with_config(config),
            reporter: None,
        }
    }

    /// Send every finished calibration to `reporter`.
    pub fn with_reporter(mut self, reporter: impl FitReporter + 'static) -> Self {
        self.reporter = Some(Box::new(reporter));
        self
    }

    /// Fit `E = a·ch + b` through `centroids[i]` ↦ `energies[i]`.
    ///
    /// # Errors
    ///
    /// * `DimensionMismatch` if the slices differ in length
    /// * `DegenerateInput` with fewer than two points, or when every centroid
    ///   is the same channel
    /// * `InvalidInput` for non-finite values
    /// * `FitConvergence` if the optimizer gives up
    pub fn calibrate(&self, centroids: &[f64], energies: &[f64]) -> Result<CalibrationResult> {
        if centroids.len() != energies.len() {
            return Err(GammaCalError::DimensionMismatch(format!(
                "{} centroids cannot be paired with {} reference energies",
                centroids.len(),
                energies.len()
            )));
        }
        if centroids.len() < 2 {
            return Err(GammaCalError::DegenerateInput(format!(
                "a calibration line needs at least 2 points, got {}",
                centroids.len()
            )));
        }
        if centroids.iter().chain(energies).any(|v| !v.is_finite()) {
            return Err(GammaCalError::InvalidInput(
                "centroids and energies must be finite".to_string(),
            ));
        }
        if centroids.iter().all(|&c| c == centroids[0]) {
            return Err(GammaCalError::DegenerateInput(format!(
                "all centroids sit at channel {}",
                centroids[0]
            )));
        }

        let x = Array1::from_vec(centroids.to_vec());
        let y = Array1::from_vec(energies.to_vec());
        let problem = LinearProblem::new(x, y)?;

        let result = self
            .optimizer
            .minimize(&problem, Array1::from_vec(vec![1.0, 1.0]))?;
        if !result.success {
            return Err(GammaCalError::FitConvergence(format!(
                "energy calibration: {}",
                result.message
            )));
        }
        let (slope, intercept) = (result.params[0], result.params[1]);

        let fitted_values: Vec<f64> = centroids
            .iter()
            .map(|&c| line(c, slope, intercept))
            .collect();
        let residuals: Vec<f64> = energies
            .iter()
            .zip(&fitted_values)
            .map(|(e, f)| e - f)
            .collect();
        let r_squared = coefficient_of_determination(energies, &residuals);
        let covariance = calculate_covariance(&result.jacobian, result.cost)?;

        debug!(
            "Calibration converged after {} iterations: {}",
            result.iterations, result.message
        );
        if r_squared.is_none() {
            warn!("R² is undefined: every reference energy equals {}", energies[0]);
        }

        let calibration = CalibrationResult {
            slope,
            intercept,
            covariance,
            fitted_values,
            residuals,
            centroids: centroids.to_vec(),
            energies: energies.to_vec(),
            r_squared,
        };
        info!("{}", calibration.equation());

        if let Some(reporter) = &self.reporter {
            reporter.report_calibration(&calibration);
        }
        Ok(calibration)
    }

    /// Calibrate with the fitted centroids of every ROI, in ROI order.
    pub fn calibrate_spectrum(
        &self,
        fit: &SpectrumFit,
        energies: &[f64],
    ) -> Result<CalibrationResult> {
        self.calibrate(&fit.centroids(), energies)
    }

    /// Calibrate with explicitly paired ROIs and energies.
    ///
    /// Each ROI may be used once; an index past the last ROI or a repeated
    /// index is `InvalidInput`.
    pub fn calibrate_pairs(
        &self,
        fit: &SpectrumFit,
        peaks: &[ReferencePeak],
    ) -> Result<CalibrationResult> {
        let mut seen = HashSet::with_capacity(peaks.len());
        let mut centroids = Vec::with_capacity(peaks.len());

        for peak in peaks {
            let roi_fit = fit.get(peak.roi_index).ok_or_else(|| {
                GammaCalError::InvalidInput(format!(
                    "ROI index {} is out of range for {} fitted ROIs",
                    peak.roi_index,
                    fit.len()
                ))
            })?;
            if !seen.insert(peak.roi_index) {
                return Err(GammaCalError::InvalidInput(format!(
                    "ROI index {} is paired more than once",
                    peak.roi_index
                )));
            }
            centroids.push(roi_fit.centroid());
        }

        let energies: Vec<f64> = peaks.iter().map(|p| p.energy_kev).collect();
        self.calibrate(&centroids, &energies)
    }
}

/// `1 − SS_res / SS_tot`, undefined when the energies have no spread.
fn coefficient_of_determination(energies: &[f64], residuals: &[f64]) -> Option<f64> {
    let mean = energies.iter().sum::<f64>() / energies.len() as f64;
    let ss_tot: f64 = energies.iter().map(|e| (e - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return None;
    }
    let ss_res: f64 = residuals.iter().map(|r| r * r).sum();
    Some(1.0 - ss_res / ss_tot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_two_point_calibration() {
        let calibration = CalibrationFitter::new()
            .calibrate(&[20.0, 115.0], &[122.0, 662.0])
            .unwrap();

        assert_relative_eq!(calibration.slope, 540.0 / 95.0, max_relative = 1e-6);
        assert_relative_eq!(calibration.energy_at(20.0), 122.0, epsilon = 1e-4);
        assert_relative_eq!(calibration.energy_at(115.0), 662.0, epsilon = 1e-4);
        assert_relative_eq!(calibration.r_squared.unwrap(), 1.0, epsilon = 1e-9);
        // No degrees of freedom left for an uncertainty estimate
        assert!(calibration.covariance.iter().all(|v| v.is_infinite()));
    }

    #[test]
    fn test_noisy_calibration_has_covariance() {
        let centroids = [102.4, 301.7, 498.9, 702.2, 899.5];
        let energies = [122.0, 356.1, 591.2, 830.4, 1062.3];

        let calibration = CalibrationFitter::new()
            .calibrate(&centroids, &energies)
            .unwrap();

        let r_squared = calibration.r_squared_checked().unwrap();
        assert!(r_squared > 0.999 && r_squared < 1.0);
        assert!(calibration.covariance.iter().all(|v| v.is_finite()));
        assert!(calibration.covariance[[0, 0]] > 0.0);
        let residual_sum: f64 = calibration.residuals.iter().sum();
        assert_relative_eq!(residual_sum, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_display() {
        let calibration = CalibrationFitter::new()
            .calibrate(&[0.0, 100.0], &[10.0, 210.0])
            .unwrap();
        assert_eq!(calibration.to_string(), "E = 2.00·Ch + 10.00\nR² = 1.0000");
    }

    #[test]
    fn test_flat_energies_leave_r_squared_undefined() {
        let calibration = CalibrationFitter::new()
            .calibrate(&[10.0, 20.0, 30.0], &[500.0, 500.0, 500.0])
            .unwrap();

        assert!(calibration.r_squared.is_none());
        let err = calibration.r_squared_checked().unwrap_err();
        assert!(matches!(err, GammaCalError::DegenerateInput(_)));
        assert_relative_eq!(calibration.slope, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rejected_inputs() {
        let fitter = CalibrationFitter::new();

        let err = fitter.calibrate(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(err, GammaCalError::DimensionMismatch(_)));

        let err = fitter.calibrate(&[1.0], &[1.0]).unwrap_err();
        assert!(matches!(err, GammaCalError::DegenerateInput(_)));

        let err = fitter.calibrate(&[5.0, 5.0], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, GammaCalError::DegenerateInput(_)));

        let err = fitter.calibrate(&[1.0, f64::NAN], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, GammaCalError::InvalidInput(_)));
    }

    #[test]
    fn test_coefficient_of_determination() {
        assert_eq!(coefficient_of_determination(&[1.0, 1.0], &[0.0, 0.0]), None);
        let r2 = coefficient_of_determination(&[0.0, 2.0], &[0.5, -0.5]).unwrap();
        assert_relative_eq!(r2, 0.75, epsilon = 1e-12);
    }
}
