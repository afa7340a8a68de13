//! A two-ROI spectrum written to disk, parsed, fitted and calibrated.

use crate::test_helpers::{peak_counts, spe_text, with_poisson_noise, write_spe, Peak, HEADER_LINES};
use approx::assert_relative_eq;
use gammacal_rs::report::{roi_series, spectrum_series, FitReporter, LogReporter};
use gammacal_rs::{
    CalibrationFitter, ParseOptions, PeakFitEngine, Roi, SpectrumFileParser,
};

const CHANNELS: usize = 200;

fn two_peak_counts() -> Vec<f64> {
    let expected = peak_counts(
        CHANNELS,
        &[Peak::new(900.0, 20.0, 3.0), Peak::new(600.0, 115.0, 5.0)],
        0.5,
    );
    with_poisson_noise(&expected, 2022)
}

#[test]
fn test_two_peak_spectrum() {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempfile::tempdir().unwrap();
    let path = write_spe(
        dir.path(),
        "two_peaks.Spe",
        &spe_text(&two_peak_counts(), &[(10, 30), (100, 130)]),
    );

    let spectrum = SpectrumFileParser::new(ParseOptions::with_header_lines(HEADER_LINES))
        .parse(&path)
        .unwrap();
    assert_eq!(spectrum.counts().len(), CHANNELS);
    assert_eq!(
        spectrum.rois(),
        &[Roi::new(10, 30).unwrap(), Roi::new(100, 130).unwrap()]
    );

    let fit = PeakFitEngine::new().fit_spectrum(&spectrum).unwrap();
    assert_eq!(fit.len(), 2);
    let centroids = fit.centroids();
    assert!((centroids[0] - 20.0).abs() <= 1.0, "first centroid {}", centroids[0]);
    assert!((centroids[1] - 115.0).abs() <= 1.0, "second centroid {}", centroids[1]);
    for roi_fit in fit.roi_fits() {
        assert_eq!(roi_fit.fit_curve.len(), roi_fit.roi.len());
    }
    LogReporter.report_spectrum_fit(&fit);

    let calibration = CalibrationFitter::new()
        .with_reporter(LogReporter)
        .calibrate_spectrum(&fit, &[122.0, 662.0])
        .unwrap();
    let expected_slope = 540.0 / (centroids[1] - centroids[0]);
    assert_relative_eq!(calibration.slope, expected_slope, max_relative = 1e-6);
    assert_relative_eq!(calibration.energy_at(centroids[0]), 122.0, epsilon = 1e-3);
    assert_relative_eq!(calibration.energy_at(centroids[1]), 662.0, epsilon = 1e-3);
    assert_relative_eq!(calibration.r_squared.unwrap(), 1.0, epsilon = 1e-9);
}

#[test]
fn test_plot_series_for_fitted_spectrum() {
    let counts = two_peak_counts();
    let spectrum = SpectrumFileParser::default()
        .parse_str(&spe_text(&counts, &[(10, 30), (100, 130)]))
        .unwrap();
    let fit = PeakFitEngine::new().fit_spectrum(&spectrum).unwrap();

    let whole = spectrum_series(&spectrum);
    assert_eq!(whole.len(), CHANNELS);
    assert_eq!(whole.y, counts);

    let [data, curve] = roi_series(&spectrum, &fit.roi_fits()[1]).unwrap();
    assert_eq!(data.x.first(), Some(&100.0));
    assert_eq!(data.x.last(), Some(&129.0));
    assert_eq!(curve.y.len(), 30);
    // The fitted curve peaks near the data maximum
    let data_max = data.y.iter().copied().fold(0.0, f64::max);
    let curve_max = curve.y.iter().copied().fold(0.0, f64::max);
    assert!((curve_max - data_max).abs() < 0.25 * data_max);
}
