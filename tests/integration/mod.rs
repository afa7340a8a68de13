//! Integration tests for the gammacal-rs library
//!
//! These tests run the parse, fit and calibrate chain on synthetic spectra
//! written to disk, rather than testing individual components.

// Two-peak spectrum through to a calibration
pub mod end_to_end;

// Configuration-driven analysis
pub mod configured_analysis;
