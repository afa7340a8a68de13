//! Reporting hooks and plot-ready data series.
//!
//! Nothing in the analysis draws or prints on its own. Callers that want to
//! see intermediate results pass a [`FitReporter`]; callers that want plots
//! take the [`PlotSeries`] built here and hand them to whatever renderer they
//! use.

use crate::calibration::CalibrationResult;
use crate::error::Result;
use crate::peak_fit::{RoiFitResult, SpectrumFit};
use crate::spectrum::Spectrum;
use log::info;
use serde::Serialize;

/// Receives fit results as they are produced.
pub trait FitReporter {
    /// Called with the result of one ROI fit.
    fn report_roi(&self, fit: &RoiFitResult);

    /// Called with a finished energy calibration.
    fn report_calibration(&self, calibration: &CalibrationResult);

    /// Reports every ROI of a spectrum fit, in ROI order.
    fn report_spectrum_fit(&self, fit: &SpectrumFit) {
        for roi_fit in fit.roi_fits() {
            self.report_roi(roi_fit);
        }
    }
}

/// Writes results through the `log` facade at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl FitReporter for LogReporter {
    fn report_roi(&self, fit: &RoiFitResult) {
        info!(
            "ROI {}: A = {:.4}, m = {:.4}, s = {:.4}, B = {:.4}, FWHM = {:.3}{}",
            fit.roi,
            fit.params.amplitude,
            fit.params.mean,
            fit.params.sigma,
            fit.params.baseline,
            fit.params.fwhm(),
            if fit.is_reliable() {
                ""
            } else {
                " (covariance undefined)"
            }
        );
    }

    fn report_calibration(&self, calibration: &CalibrationResult) {
        info!("Energy calibration: {}", calibration.equation());
        match calibration.r_squared {
            Some(r_squared) => info!("R² = {:.4}", r_squared),
            None => info!("R² undefined: the reference energies are all equal"),
        }
    }
}

/// One named `(x, y)` series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotSeries {
    pub label: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl PlotSeries {
    pub fn new(label: impl Into<String>, x: Vec<f64>, y: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            x,
            y,
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Counts against channel over the whole spectrum.
pub fn spectrum_series(spectrum: &Spectrum) -> PlotSeries {
    let label = spectrum
        .path()
        .and_then(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "spectrum".to_string());
    PlotSeries::new(label, spectrum.x_data().to_vec(), spectrum.counts().to_vec())
}

/// The measured counts of a fitted region and the fitted curve over it.
pub fn roi_series(spectrum: &Spectrum, fit: &RoiFitResult) -> Result<[PlotSeries; 2]> {
    let roi = fit.roi;
    let x = spectrum.x_slice(roi.start, roi.stop)?.to_vec();
    let counts = spectrum.count_slice(roi.start, roi.stop)?.to_vec();

    Ok([
        PlotSeries::new(format!("ROI {roi}"), x.clone(), counts),
        PlotSeries::new(
            format!("fit {:.2}", fit.centroid()),
            x,
            fit.fit_curve.to_vec(),
        ),
    ])
}

/// Reference energies against centroid, and the calibration line at the centroids.
pub fn calibration_series(calibration: &CalibrationResult) -> [PlotSeries; 2] {
    [
        PlotSeries::new(
            "reference peaks",
            calibration.centroids.clone(),
            calibration.energies.clone(),
        ),
        PlotSeries::new(
            calibration.equation(),
            calibration.centroids.clone(),
            calibration.fitted_values.clone(),
        ),
    ]
}
