//! # gammacal-rs
//!
//! `gammacal-rs` reads gamma-ray spectra recorded in the `.Spe` text format,
//! fits a Gaussian photopeak to each region of interest, and derives a linear
//! channel-to-energy calibration from the fitted centroids.
//!
//! The library provides:
//! - A two-pass `.Spe` parser producing an immutable [`Spectrum`]
//! - Per-ROI Gaussian fits with a Levenberg-Marquardt optimizer
//! - A linear energy calibration with R² and parameter covariance
//! - Reporting hooks and plot-ready series, without any rendering
//!
//! ## Basic Usage
//!
//! ```no_run
//! use gammacal_rs::{CalibrationFitter, ParseOptions, PeakFitEngine, SpectrumFileParser};
//!
//! # fn main() -> gammacal_rs::Result<()> {
//! let spectrum = SpectrumFileParser::new(ParseOptions::with_header_lines(12))
//!     .parse("Co60_Cs137.Spe")?;
//! let fit = PeakFitEngine::new().fit_spectrum(&spectrum)?;
//! let calibration = CalibrationFitter::new().calibrate_spectrum(&fit, &[662.0, 1173.0, 1332.0])?;
//! println!("{calibration}");
//! # Ok(())
//! # }
//! ```

// Public modules
pub mod calibration;
pub mod config;
pub mod error;
pub mod lm;
pub mod models;
pub mod peak_fit;
pub mod problem;
pub mod report;
pub mod spectrum;
pub mod uncertainty;

mod utils;

// Re-exports for convenience
pub use calibration::{CalibrationFitter, CalibrationResult, ReferencePeak};
pub use config::AnalysisConfig;
pub use error::{GammaCalError, Result};
pub use lm::{LevenbergMarquardt, LmConfig};
pub use models::GaussianParams;
pub use peak_fit::{PeakFitEngine, RoiFitResult, SpectrumFit};
pub use problem::Problem;
pub use report::{FitReporter, LogReporter, PlotSeries};
pub use spectrum::{ParseOptions, Roi, Spectrum, SpectrumFileParser};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
