//! Reader for `.Spe` spectrum files.
//!
//! The file is line oriented. Marker lines (`$DATE_MEA:`, `$DATA:`, `$ROI:`,
//! `$PRESETS:` and others) introduce metadata blocks; the counts sit between a
//! header and a trailer:
//!
//! ```text
//! $SPEC_ID:          ┐
//! ...                │ header: `header_lines` lines, ending with the
//! $DATE_MEA:         │ `$DATA:` marker and its "first last" channel line
//! 01/31/2022 14:05:09│
//! ...                │
//! $DATA:             │
//! 0 8191             ┘
//!        12          ┐ numeric body: record length + 1 counts
//!        ...         ┘
//! $ROI:              ┐
//! 2                  │ trailer: footer_base_lines + ROI count lines
//! 10 30              │
//! 100 130            │
//! $PRESETS:          │
//! ...                ┘
//! ```
//!
//! Parsing runs in two passes over the same lines: a marker scan that
//! recovers the metadata (and with it the ROI count that sizes the trailer),
//! then extraction of the numeric body between the header and the trailer.

use super::{Roi, Spectrum};
use crate::error::{GammaCalError, Result};
use log::{debug, info};
use ndarray::Array1;
use nom::character::complete::{space0, space1, u64 as decimal};
use nom::combinator::all_consuming;
use nom::sequence::{delimited, separated_pair};
use nom::{IResult, Parser};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Marker preceding the acquisition date line.
pub const DATE_MARKER: &str = "$DATE_MEA:";
/// Marker preceding the ROI count and the ROI channel pairs.
pub const ROI_MARKER: &str = "$ROI:";
/// Marker preceding the "first last" channel line of the numeric body.
pub const DATA_MARKER: &str = "$DATA:";
/// Marker terminating the ROI block.
pub const PRESETS_MARKER: &str = "$PRESETS:";
/// Trailer lines that follow the body regardless of the ROI count.
pub const DEFAULT_FOOTER_BASE_LINES: usize = 14;

/// Options for [`SpectrumFileParser`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Lines before the numeric body. `None` takes the value implied by the
    /// position of the `$DATA:` block.
    pub header_lines: Option<usize>,

    /// Trailer lines after the numeric body, not counting one line per ROI.
    pub footer_base_lines: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            header_lines: None,
            footer_base_lines: DEFAULT_FOOTER_BASE_LINES,
        }
    }
}

impl ParseOptions {
    /// Options with an explicit header line count.
    pub fn with_header_lines(header_lines: usize) -> Self {
        Self {
            header_lines: Some(header_lines),
            ..Self::default()
        }
    }
}

/// Metadata recovered by the marker scan.
#[derive(Debug, Default)]
struct MarkerScan {
    date: Option<String>,
    rois: Option<Vec<Roi>>,
    record_length: Option<usize>,
    data_marker_line: Option<usize>,
}

/// Parser for `.Spe` gamma-ray spectrum files.
#[derive(Debug, Clone, Default)]
pub struct SpectrumFileParser {
    options: ParseOptions,
}

impl SpectrumFileParser {
    /// Create a parser with the given options.
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    /// The options used by this parser.
    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Read and parse the spectrum file at `path`.
    pub fn parse(&self, path: impl AsRef<Path>) -> Result<Spectrum> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let spectrum = self.parse_lines(&text, Some(path))?;
        info!(
            "Read {} channels and {} ROIs from {}",
            spectrum.counts().len(),
            spectrum.roi_count(),
            path.display()
        );
        Ok(spectrum)
    }

    /// Parse spectrum text that is already in memory.
    pub fn parse_str(&self, text: &str) -> Result<Spectrum> {
        self.parse_lines(text, None)
    }

    fn parse_lines(&self, text: &str, path: Option<&Path>) -> Result<Spectrum> {
        let mut lines: Vec<&str> = text.lines().collect();
        // Blank lines after the last trailer line are not part of the trailer.
        while lines.last().is_some_and(|line| line.trim().is_empty()) {
            lines.pop();
        }

        // First pass: the trailer size depends on the ROI count.
        let scan = scan_markers(&lines)?;
        let date = scan
            .date
            .ok_or_else(|| missing_marker(DATE_MARKER))?;
        let rois = scan.rois.ok_or_else(|| missing_marker(ROI_MARKER))?;
        let record_length = scan
            .record_length
            .ok_or_else(|| missing_marker(DATA_MARKER))?;
        let data_marker_line = scan
            .data_marker_line
            .ok_or_else(|| missing_marker(DATA_MARKER))?;

        if let Some(roi) = rois.iter().find(|roi| roi.stop > record_length) {
            return Err(GammaCalError::Parse(format!(
                "ROI {roi} exceeds the record length {record_length}"
            )));
        }

        // Second pass: the numeric body between header and trailer.
        let header_lines = self.header_lines(data_marker_line)?;
        let footer_lines = self.options.footer_base_lines + rois.len();
        let counts = extract_body(&lines, header_lines, footer_lines)?;

        if counts.len() != record_length + 1 {
            return Err(GammaCalError::Config(format!(
                "found {} counts between the {} header and {} trailer lines, \
                 but $DATA: declares {} channels",
                counts.len(),
                header_lines,
                footer_lines,
                record_length + 1
            )));
        }

        debug!(
            "Spectrum body spans lines {}..{} ({} ROIs, date {:?})",
            header_lines + 1,
            lines.len() - footer_lines,
            rois.len(),
            date
        );

        Spectrum::new(
            path.map(Path::to_path_buf),
            counts,
            rois,
            date,
            record_length,
        )
    }

    /// The header size: the configured one, checked against the `$DATA:` block.
    fn header_lines(&self, data_marker_line: usize) -> Result<usize> {
        // The body starts right after the marker and its channel range line.
        let implied = data_marker_line + 2;
        match self.options.header_lines {
            None => Ok(implied),
            Some(configured) if configured == implied => Ok(configured),
            Some(configured) => Err(GammaCalError::Config(format!(
                "header of {configured} lines does not match the $DATA: block, \
                 which puts the first count on line {}",
                implied + 1
            ))),
        }
    }
}

fn missing_marker(marker: &str) -> GammaCalError {
    GammaCalError::Parse(format!("missing {marker} marker"))
}

fn scan_markers(lines: &[&str]) -> Result<MarkerScan> {
    let mut scan = MarkerScan::default();

    for (index, &line) in lines.iter().enumerate() {
        match line {
            DATE_MARKER => {
                scan.date = Some(line_after(lines, index, DATE_MARKER)?.to_string());
            }
            ROI_MARKER => {
                if scan.rois.is_some() {
                    return Err(GammaCalError::Parse(format!(
                        "second {ROI_MARKER} block on line {}",
                        index + 1
                    )));
                }
                scan.rois = Some(read_roi_block(lines, index)?);
            }
            DATA_MARKER => {
                if scan.data_marker_line.is_some() {
                    return Err(GammaCalError::Parse(format!(
                        "second {DATA_MARKER} block on line {}",
                        index + 1
                    )));
                }
                let range_line = line_after(lines, index, DATA_MARKER)?;
                scan.record_length = Some(parse_record_length(range_line, index + 2)?);
                scan.data_marker_line = Some(index);
            }
            _ => {}
        }
    }

    Ok(scan)
}

fn line_after<'a>(lines: &[&'a str], index: usize, marker: &str) -> Result<&'a str> {
    lines.get(index + 1).copied().ok_or_else(|| {
        GammaCalError::Parse(format!(
            "{marker} on line {} is the last line of the file",
            index + 1
        ))
    })
}

/// Reads the ROI count and the channel pairs up to the `$PRESETS:` marker.
fn read_roi_block(lines: &[&str], marker_index: usize) -> Result<Vec<Roi>> {
    let count_line = line_after(lines, marker_index, ROI_MARKER)?;
    let declared: usize = count_line.trim().parse().map_err(|_| {
        GammaCalError::Parse(format!(
            "expected a ROI count on line {}, found {:?}",
            marker_index + 2,
            count_line
        ))
    })?;

    let mut rois = Vec::with_capacity(declared);
    let mut index = marker_index + 2;
    loop {
        let line = lines.get(index).copied().ok_or_else(|| {
            GammaCalError::Parse(format!(
                "{ROI_MARKER} block is not terminated by {PRESETS_MARKER}"
            ))
        })?;
        if line == PRESETS_MARKER {
            break;
        }

        let (start, stop) = channel_pair(line).map(|(_, pair)| pair).map_err(|_| {
            GammaCalError::Parse(format!(
                "expected two channel numbers on line {}, found {:?}",
                index + 1,
                line
            ))
        })?;
        let roi = to_channel(start)
            .and_then(|start| Roi::new(start, to_channel(stop)?))
            .map_err(|e| GammaCalError::Parse(format!("line {}: {}", index + 1, e)))?;
        rois.push(roi);
        index += 1;
    }

    if rois.len() != declared {
        return Err(GammaCalError::Parse(format!(
            "{ROI_MARKER} declares {declared} regions but lists {}",
            rois.len()
        )));
    }

    Ok(rois)
}

/// `<start> <stop>` with arbitrary surrounding blanks.
fn channel_pair(input: &str) -> IResult<&str, (u64, u64)> {
    all_consuming(delimited(
        space0,
        separated_pair(decimal, space1, decimal),
        space0,
    ))
    .parse(input)
}

fn to_channel(value: u64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| GammaCalError::InvalidInput(format!("channel {value} is out of range")))
}

/// The record length is the last channel of the "first last" line after `$DATA:`.
fn parse_record_length(line: &str, line_number: usize) -> Result<usize> {
    channel_pair(line)
        .map_err(|_| {
            GammaCalError::Parse(format!(
                "expected \"<first> <last>\" channels on line {line_number}, found {line:?}"
            ))
        })
        .and_then(|(_, (_, last))| to_channel(last))
}

/// Parses every whitespace-separated count between header and trailer.
fn extract_body(lines: &[&str], header_lines: usize, footer_lines: usize) -> Result<Array1<f64>> {
    if header_lines + footer_lines > lines.len() {
        return Err(GammaCalError::Config(format!(
            "skipping {header_lines} header and {footer_lines} trailer lines \
             leaves no body in a file of {} lines",
            lines.len()
        )));
    }
    let body_end = lines.len() - footer_lines;

    if let Some(first_trailer) = lines.get(body_end) {
        if !first_trailer.starts_with('$') {
            return Err(GammaCalError::Config(format!(
                "the {footer_lines}-line trailer would start on line {} inside the numeric body",
                body_end + 1
            )));
        }
    }

    let mut counts = Vec::new();
    for (offset, line) in lines[header_lines..body_end].iter().enumerate() {
        let line_number = header_lines + offset + 1;
        let trimmed = line.trim();
        if trimmed.starts_with('$') {
            return Err(GammaCalError::Config(format!(
                "marker {trimmed} on line {line_number} falls inside the numeric body"
            )));
        }

        for token in trimmed.split_whitespace() {
            let value: f64 = token.parse().map_err(|_| {
                GammaCalError::Parse(format!(
                    "invalid count {token:?} on line {line_number}"
                ))
            })?;
            if !value.is_finite() || value < 0.0 {
                return Err(GammaCalError::Parse(format!(
                    "count {value} on line {line_number} is not a non-negative number"
                )));
            }
            counts.push(value);
        }
    }

    Ok(Array1::from_vec(counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_text() -> String {
        let mut text = String::from(
            "$SPEC_ID:\nsample\n$SPEC_REM:\nDET# 1\nDETDESC# NaI\nAP# Maestro\n\
             $DATE_MEA:\n01/31/2022 14:05:09\n$MEAS_TIM:\n300 310\n$DATA:\n0 5\n",
        );
        for count in [3, 10, 42, 11, 4, 1] {
            text.push_str(&format!("{count:>8}\n"));
        }
        text.push_str("$ROI:\n1\n1 4\n$PRESETS:\nNone\n0\n0\n$ENER_FIT:\n0.0 1.0\n");
        text.push_str("$MCA_CAL:\n3\n0.0 1.0 0.0 keV\n$SHAPE_CAL:\n3\n1.0 0.0 0.0\n");
        text
    }

    #[test]
    fn test_channel_pair() {
        assert_eq!(channel_pair("10 30").unwrap().1, (10, 30));
        assert_eq!(channel_pair("  100\t130 ").unwrap().1, (100, 130));
        assert!(channel_pair("10").is_err());
        assert!(channel_pair("10 30 50").is_err());
        assert!(channel_pair("10 x").is_err());
        assert!(channel_pair("-1 30").is_err());
    }

    #[test]
    fn test_parse_record_length() {
        assert_eq!(parse_record_length("0 8191", 12).unwrap(), 8191);
        assert!(parse_record_length("8191", 12).is_err());
        assert!(parse_record_length("0 many", 12).is_err());
    }

    #[test]
    fn test_parse_sample() {
        let spectrum = SpectrumFileParser::default()
            .parse_str(&sample_text())
            .unwrap();

        assert_eq!(spectrum.record_length(), 5);
        assert_eq!(spectrum.counts().to_vec(), vec![3.0, 10.0, 42.0, 11.0, 4.0, 1.0]);
        assert_eq!(spectrum.rois(), &[Roi { start: 1, stop: 4 }]);
        assert_eq!(spectrum.date(), "01/31/2022 14:05:09");
        assert!(spectrum.path().is_none());
    }

    #[test]
    fn test_explicit_header_must_match_data_block() {
        let text = sample_text();

        let parser = SpectrumFileParser::new(ParseOptions::with_header_lines(12));
        assert_eq!(parser.parse_str(&text).unwrap().counts().len(), 6);

        let parser = SpectrumFileParser::new(ParseOptions::with_header_lines(10));
        let err = parser.parse_str(&text).unwrap_err();
        assert!(matches!(err, GammaCalError::Config(_)), "{err}");
    }

    #[test]
    fn test_crlf_line_endings() {
        let text = sample_text().replace('\n', "\r\n");
        let spectrum = SpectrumFileParser::default().parse_str(&text).unwrap();
        assert_eq!(spectrum.roi_count(), 1);
        assert_eq!(spectrum.date(), "01/31/2022 14:05:09");
    }

    #[test]
    fn test_blank_lines_after_trailer() {
        let text = sample_text() + "\n\n";
        let spectrum = SpectrumFileParser::default().parse_str(&text).unwrap();
        assert_eq!(spectrum.counts().len(), 6);
        assert_eq!(spectrum.roi_count(), 1);
    }

    #[test]
    fn test_wrong_footer_size_is_a_config_error() {
        let options = ParseOptions {
            footer_base_lines: 12,
            ..ParseOptions::default()
        };
        let err = SpectrumFileParser::new(options)
            .parse_str(&sample_text())
            .unwrap_err();
        assert!(matches!(err, GammaCalError::Config(_)), "{err}");

        let options = ParseOptions {
            footer_base_lines: 16,
            ..ParseOptions::default()
        };
        let err = SpectrumFileParser::new(options)
            .parse_str(&sample_text())
            .unwrap_err();
        assert!(matches!(err, GammaCalError::Config(_)), "{err}");
    }
}
