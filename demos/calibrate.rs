//! Calibrate a NaI(Tl) detector from one `.Spe` acquisition.
//!
//! ```text
//! RUST_LOG=info cargo run --example calibrate -- spectres/calib_totale.Spe [analysis.json]
//! ```
//!
//! The ROIs of the spectrum must be declared in the order of the reference
//! energies below.

use gammacal_rs::report::{calibration_series, roi_series, spectrum_series, FitReporter};
use gammacal_rs::{AnalysisConfig, LogReporter, ParseOptions};

/// Photopeak energies in keV of Co-57, Cs-137 and Co-60.
const REFERENCE_ENERGIES: [f64; 4] = [122.0, 662.0, 1173.0, 1332.0];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let spectrum_path = args
        .next()
        .unwrap_or_else(|| "spectres/calib_totale.Spe".to_string());
    let config = match args.next() {
        Some(config_path) => AnalysisConfig::from_json_file(config_path)?,
        None => AnalysisConfig {
            parse: ParseOptions::with_header_lines(12),
            ..AnalysisConfig::default()
        },
    };

    let spectrum = config.parser().parse(&spectrum_path)?;
    println!(
        "{}: {} channels, {} ROIs, measured {}",
        spectrum_path,
        spectrum.counts().len(),
        spectrum.roi_count(),
        spectrum.date()
    );

    let fit = config.peak_fit_engine().fit_spectrum(&spectrum)?;
    LogReporter.report_spectrum_fit(&fit);

    let calibration = config
        .calibration_fitter()
        .with_reporter(LogReporter)
        .calibrate_spectrum(&fit, &REFERENCE_ENERGIES)?;

    println!("{calibration}");
    for (roi_fit, energy) in fit.roi_fits().iter().zip(REFERENCE_ENERGIES) {
        println!(
            "  {:>7.1} keV  centroid {:>8.2}  FWHM {:>6.2} ch  ({:.1} keV)",
            energy,
            roi_fit.centroid(),
            roi_fit.params.fwhm(),
            roi_fit.params.fwhm() * calibration.slope
        );
    }

    // Plot-ready data for an external renderer
    let mut series = vec![spectrum_series(&spectrum)];
    for roi_fit in fit.roi_fits() {
        series.extend(roi_series(&spectrum, roi_fit)?);
    }
    series.extend(calibration_series(&calibration));
    let plot_path = format!("{spectrum_path}.plot.json");
    std::fs::write(&plot_path, serde_json::to_string(&series)?)?;
    println!("Wrote {} plot series to {}", series.len(), plot_path);

    Ok(())
}
