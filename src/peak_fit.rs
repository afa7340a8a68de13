//! Per-ROI Gaussian photopeak fitting.
//!
//! [`PeakFitEngine`] fits the [`GaussianParams`] model to the counts of a
//! single region of interest with the Levenberg-Marquardt optimizer, and
//! [`PeakFitEngine::fit_spectrum`] does so for every region a spectrum
//! declares. Fits are independent of each other, so they can run on the rayon
//! pool; the results always come back in ROI order.

use crate::error::{GammaCalError, Result};
use crate::lm::{LevenbergMarquardt, LmConfig};
use crate::models::{GaussianParams, GaussianProblem};
use crate::spectrum::{Roi, Spectrum};
use crate::uncertainty::{calculate_covariance, is_defined, standard_errors_from_covariance};
use log::{debug, info};
use ndarray::{s, Array1, Array2};
use rayon::prelude::*;
use serde::Serialize;

/// Iteration budget of the photopeak fits unless configured otherwise.
pub const DEFAULT_MAX_ITERATIONS: usize = 500;

/// The outcome of fitting one region of interest.
#[derive(Debug, Clone, Serialize)]
pub struct RoiFitResult {
    /// The fitted channel range
    pub roi: Roi,

    /// Optimal model parameters
    pub params: GaussianParams,

    /// 4×4 parameter covariance in `[A, m, s, B]` order; all `+∞` when undefined
    pub covariance: Array2<f64>,

    /// The fitted model evaluated at every channel of the region
    pub fit_curve: Array1<f64>,

    /// Optimizer iterations used
    pub iterations: usize,

    /// Sum of squared residuals at the optimum
    pub cost: f64,

    /// Termination message of the optimizer
    pub message: String,
}

impl RoiFitResult {
    /// Fitted peak centroid, in channels.
    pub fn centroid(&self) -> f64 {
        self.params.mean
    }

    /// Whether the covariance is finite everywhere.
    ///
    /// The amplitude and the exponent offset of the model trade off against
    /// each other exactly, so for this model the covariance is normally
    /// undefined and this returns false.
    pub fn is_reliable(&self) -> bool {
        is_defined(&self.covariance)
    }

    /// One-sigma parameter uncertainties in `[A, m, s, B]` order.
    pub fn standard_errors(&self) -> Array1<f64> {
        standard_errors_from_covariance(&self.covariance)
    }
}

/// Results of fitting every ROI of a spectrum, in ROI order.
#[derive(Debug, Clone, Serialize)]
pub struct SpectrumFit {
    fits: Vec<RoiFitResult>,
}

impl SpectrumFit {
    /// Wrap per-ROI results that are already in ROI order.
    pub fn new(fits: Vec<RoiFitResult>) -> Self {
        Self { fits }
    }

    pub fn roi_fits(&self) -> &[RoiFitResult] {
        &self.fits
    }

    pub fn get(&self, index: usize) -> Option<&RoiFitResult> {
        self.fits.get(index)
    }

    /// Fitted centroids, one per ROI.
    pub fn centroids(&self) -> Vec<f64> {
        self.fits.iter().map(RoiFitResult::centroid).collect()
    }

    pub fn len(&self) -> usize {
        self.fits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fits.is_empty()
    }

    /// Pretty-printed JSON of all per-ROI results.
    ///
    /// Undefined covariance entries are written as `null`.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Fits Gaussian photopeaks to regions of a spectrum.
#[derive(Debug, Clone)]
pub struct PeakFitEngine {
    optimizer: LevenbergMarquardt,
    parallel: bool,
}

impl Default for PeakFitEngine {
    fn default() -> Self {
        Self::with_config(LmConfig {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            ..LmConfig::default()
        })
    }
}

impl PeakFitEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine using the given optimizer configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self {
            optimizer: LevenbergMarquardt::with_config(config),
            parallel: false,
        }
    }

    /// Run the ROI fits of [`fit_spectrum`](Self::fit_spectrum) on the rayon pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn config(&self) -> &LmConfig {
        self.optimizer.config()
    }

    /// Fit the Gaussian model to `y` over the channels of `roi`.
    ///
    /// `x` and `y` cover the whole spectrum; only the `[roi.start, roi.stop)`
    /// slice takes part in the fit.
    ///
    /// # Errors
    ///
    /// * `DimensionMismatch` if `x` and `y` differ in length
    /// * `InvalidInput` if the region does not lie within the data
    /// * `FitConvergence` if the optimizer gives up, or ends with a zero or
    ///   non-finite width
    pub fn fit_gaussian(&self, x: &Array1<f64>, y: &Array1<f64>, roi: Roi) -> Result<RoiFitResult> {
        if x.len() != y.len() {
            return Err(GammaCalError::DimensionMismatch(format!(
                "x data has {} channels but y data has {}",
                x.len(),
                y.len()
            )));
        }
        if roi.is_empty() || roi.stop > x.len() {
            return Err(GammaCalError::InvalidInput(format!(
                "ROI {} is not within the {} channels of the data",
                roi,
                x.len()
            )));
        }

        let x_roi = x.slice(s![roi.start..roi.stop]).to_owned();
        let y_roi = y.slice(s![roi.start..roi.stop]).to_owned();
        let problem = GaussianProblem::new(x_roi.clone(), y_roi)?;

        let guess = GaussianParams::initial_guess(roi.start, roi.stop);
        debug!("Fitting ROI {} from {:?}", roi, guess);

        let result = self.optimizer.minimize(&problem, guess.to_array())?;
        if !result.success {
            return Err(GammaCalError::FitConvergence(format!(
                "ROI {}: {} after {} iterations",
                roi, result.message, result.iterations
            )));
        }

        let params = GaussianParams::from_array(&result.params)?;
        if !params.sigma.is_finite() || params.sigma == 0.0 {
            return Err(GammaCalError::FitConvergence(format!(
                "ROI {}: fitted sigma is {}",
                roi, params.sigma
            )));
        }
        if result.params.iter().any(|p| !p.is_finite()) {
            return Err(GammaCalError::FitConvergence(format!(
                "ROI {}: non-finite parameters {:?}",
                roi, result.params
            )));
        }

        let covariance = calculate_covariance(&result.jacobian, result.cost)?;
        let fit_curve = params.evaluate_all(&x_roi);

        info!(
            "ROI {}: centroid {:.3}, sigma {:.3}, height {:.1} ({} iterations)",
            roi,
            params.mean,
            params.sigma.abs(),
            params.peak_height(),
            result.iterations
        );
        if !is_defined(&covariance) {
            debug!("ROI {}: parameter covariance is undefined", roi);
        }

        Ok(RoiFitResult {
            roi,
            params,
            covariance,
            fit_curve,
            iterations: result.iterations,
            cost: result.cost,
            message: result.message,
        })
    }

    /// Fit every ROI of `spectrum`. The first failing region fails the whole call.
    pub fn fit_spectrum(&self, spectrum: &Spectrum) -> Result<SpectrumFit> {
        let x = spectrum.x_data();
        let counts = spectrum.counts();

        let fits = if self.parallel {
            spectrum
                .rois()
                .par_iter()
                .map(|&roi| self.fit_gaussian(&x, counts, roi))
                .collect::<Result<Vec<_>>>()?
        } else {
            spectrum
                .rois()
                .iter()
                .map(|&roi| self.fit_gaussian(&x, counts, roi))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(SpectrumFit::new(fits))
    }
}
