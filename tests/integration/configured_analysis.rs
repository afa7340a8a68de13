//! Analysis driven by a JSON configuration file.

use crate::test_helpers::{peak_counts, spe_text, with_poisson_noise, write_spe, Peak};
use gammacal_rs::{AnalysisConfig, GammaCalError, ReferencePeak};

#[test]
fn test_configured_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("analysis.json");
    std::fs::write(
        &config_path,
        r#"{
            "parse": { "header_lines": 12 },
            "peak_fit": { "max_iterations": 800, "ftol": 1e-10 },
            "parallel": true
        }"#,
    )
    .unwrap();
    let config = AnalysisConfig::from_json_file(&config_path).unwrap();

    let peaks = [
        Peak::new(700.0, 60.0, 3.0),
        Peak::new(500.0, 210.0, 4.0),
        Peak::new(300.0, 380.0, 5.0),
    ];
    let counts = with_poisson_noise(&peak_counts(512, &peaks, 1.0), 99);
    let spectrum_path = write_spe(
        dir.path(),
        "three_peaks.Spe",
        &spe_text(&counts, &[(48, 72), (194, 226), (360, 400)]),
    );

    let spectrum = config.parser().parse(&spectrum_path).unwrap();
    let fit = config.peak_fit_engine().fit_spectrum(&spectrum).unwrap();
    let calibration = config
        .calibration_fitter()
        .calibrate_pairs(
            &fit,
            &[
                ReferencePeak::new(0, 122.0),
                ReferencePeak::new(1, 662.0),
                ReferencePeak::new(2, 1274.0),
            ],
        )
        .unwrap();

    assert_eq!(fit.len(), 3);
    assert!(calibration.slope > 0.0);
    assert!(calibration.r_squared_checked().unwrap() > 0.99);
}

#[test]
fn test_configured_header_must_match_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = AnalysisConfig::from_json_str(r#"{ "parse": { "header_lines": 10 } }"#).unwrap();
    let path = write_spe(
        dir.path(),
        "one_peak.Spe",
        &spe_text(&peak_counts(64, &[Peak::new(100.0, 32.0, 3.0)], 1.0), &[(24, 40)]),
    );

    let err = config.parser().parse(&path).unwrap_err();
    assert!(matches!(err, GammaCalError::Config(_)));
}

#[test]
fn test_missing_configuration_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = AnalysisConfig::from_json_file(dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, GammaCalError::Io(_)));
}
