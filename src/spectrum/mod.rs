//! Gamma-ray spectra and their regions of interest.
//!
//! A [`Spectrum`] is the immutable result of parsing one acquisition file: the
//! counts per channel, the ROI channel ranges declared by the acquisition
//! software, and a little metadata. Fitting happens in a separate step (see
//! [`PeakFitEngine`](crate::peak_fit::PeakFitEngine)), so holding a spectrum
//! never implies any hidden computation.

pub mod parser;

pub use parser::{ParseOptions, SpectrumFileParser};

use crate::error::{GammaCalError, Result};
use chrono::NaiveDateTime;
use ndarray::{s, Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Timestamp layout written after the `$DATE_MEA:` marker.
pub const DATE_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// A region of interest: the half-open channel range `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Roi {
    /// First channel of the region
    pub start: usize,
    /// One past the last channel of the region
    pub stop: usize,
}

impl Roi {
    /// Create a region, rejecting empty or inverted ranges.
    pub fn new(start: usize, stop: usize) -> Result<Self> {
        if start >= stop {
            return Err(GammaCalError::InvalidInput(format!(
                "ROI start ({start}) must be below its stop ({stop})"
            )));
        }
        Ok(Self { start, stop })
    }

    /// Number of channels in the region.
    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    /// Always false; a `Roi` spans at least one channel.
    pub fn is_empty(&self) -> bool {
        self.stop <= self.start
    }

    /// Centre of the region, in channels.
    pub fn midpoint(&self) -> f64 {
        (self.start + self.stop) as f64 / 2.0
    }

    /// Half the width of the region, in channels.
    pub fn half_width(&self) -> f64 {
        self.len() as f64 / 2.0
    }

    /// The region as a slice range.
    pub fn range(&self) -> Range<usize> {
        self.start..self.stop
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

/// One parsed gamma-ray spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    path: Option<PathBuf>,
    counts: Array1<f64>,
    rois: Vec<Roi>,
    date: String,
    record_length: usize,
}

impl Spectrum {
    /// Assemble a spectrum from already extracted parts.
    ///
    /// `counts` must hold `record_length + 1` channels and every ROI must lie
    /// within `[0, record_length]`.
    pub fn new(
        path: Option<PathBuf>,
        counts: Array1<f64>,
        rois: Vec<Roi>,
        date: impl Into<String>,
        record_length: usize,
    ) -> Result<Self> {
        if counts.len() != record_length + 1 {
            return Err(GammaCalError::DimensionMismatch(format!(
                "record length {} requires {} counts, got {}",
                record_length,
                record_length + 1,
                counts.len()
            )));
        }
        if let Some(roi) = rois.iter().find(|roi| roi.stop > record_length) {
            return Err(GammaCalError::InvalidInput(format!(
                "ROI {roi} exceeds the record length {record_length}"
            )));
        }

        Ok(Self {
            path,
            counts,
            rois,
            date: date.into(),
            record_length,
        })
    }

    /// The file this spectrum was read from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Counts per channel.
    pub fn counts(&self) -> &Array1<f64> {
        &self.counts
    }

    /// Channel numbers `0..=record_length` as floats.
    pub fn x_data(&self) -> Array1<f64> {
        Array1::range(0.0, self.counts.len() as f64, 1.0)
    }

    /// Channel numbers of `[start, stop)`.
    pub fn x_slice(&self, start: usize, stop: usize) -> Result<Array1<f64>> {
        self.check_range(start, stop)?;
        Ok(Array1::range(start as f64, stop as f64, 1.0))
    }

    /// Counts of `[start, stop)`.
    pub fn count_slice(&self, start: usize, stop: usize) -> Result<ArrayView1<'_, f64>> {
        self.check_range(start, stop)?;
        Ok(self.counts.slice(s![start..stop]))
    }

    /// Declared regions of interest, in file order.
    pub fn rois(&self) -> &[Roi] {
        &self.rois
    }

    /// Number of declared regions of interest.
    pub fn roi_count(&self) -> usize {
        self.rois.len()
    }

    /// The acquisition date line, verbatim.
    pub fn date(&self) -> &str {
        &self.date
    }

    /// The acquisition date, when it follows [`DATE_FORMAT`].
    pub fn acquisition_time(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(self.date.trim(), DATE_FORMAT).ok()
    }

    /// Index of the last channel, as declared after `$DATA:`.
    pub fn record_length(&self) -> usize {
        self.record_length
    }

    /// Total counts over all channels.
    pub fn total_counts(&self) -> f64 {
        self.counts.sum()
    }

    fn check_range(&self, start: usize, stop: usize) -> Result<()> {
        if start > stop || stop > self.counts.len() {
            return Err(GammaCalError::InvalidInput(format!(
                "channel range [{}, {}) is outside the spectrum of {} channels",
                start,
                stop,
                self.counts.len()
            )));
        }
        Ok(())
    }
}
