//! Analysis configuration loaded from JSON.
//!
//! Every field has a default, so a configuration file only needs to name the
//! settings it changes. An optimizer block that is present but partial falls
//! back to the [`LmConfig`] defaults for its missing fields:
//!
//! ```json
//! {
//!   "parse": { "header_lines": 12 },
//!   "peak_fit": { "max_iterations": 1000 },
//!   "parallel": true
//! }
//! ```

use crate::calibration::CalibrationFitter;
use crate::error::Result;
use crate::lm::LmConfig;
use crate::peak_fit::{PeakFitEngine, DEFAULT_MAX_ITERATIONS};
use crate::spectrum::{ParseOptions, SpectrumFileParser};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for the parse, fit and calibration steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Header and trailer layout of the spectrum files
    pub parse: ParseOptions,

    /// Optimizer settings for the per-ROI Gaussian fits
    pub peak_fit: LmConfig,

    /// Optimizer settings for the energy calibration
    pub calibration: LmConfig,

    /// Fit the ROIs of a spectrum in parallel
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            parse: ParseOptions::default(),
            peak_fit: LmConfig {
                max_iterations: DEFAULT_MAX_ITERATIONS,
                ..LmConfig::default()
            },
            calibration: LmConfig::default(),
            parallel: false,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        debug!("Loaded analysis configuration from {}", path.display());
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn parser(&self) -> SpectrumFileParser {
        SpectrumFileParser::new(self.parse.clone())
    }

    pub fn peak_fit_engine(&self) -> PeakFitEngine {
        PeakFitEngine::with_config(self.peak_fit.clone()).with_parallel(self.parallel)
    }

    pub fn calibration_fitter(&self) -> CalibrationFitter {
        CalibrationFitter::with_config(self.calibration.clone())
    }
}
