//! BMS report header scanning and point-map extraction.
//!
//! Report files open with a metadata preamble of `"Point_<n>:","<tag>",...`
//! records and switch to a CSV table at the line starting with `<>Date`.
//! The scanner finds that line and collects the point map above it.

use crate::constants::DATA_HEADER_MARKER;
use crate::error::{EtlError, Result};
use crate::models::PointMap;
use regex::Regex;
use tracing::debug;

/// Outcome of scanning one report's lines
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderScan {
    /// Index of the `<>Date` line, if one was found
    pub marker_line: Option<usize>,
    /// Point ID to raw sensor tag, from lines above the marker
    pub point_map: PointMap,
    /// Number of lines scanned
    pub total_lines: usize,
    fallback_line: usize,
}

impl HeaderScan {
    /// Index of the data header row.
    ///
    /// Without a marker, the configured fallback line is used only when the
    /// preamble produced at least one point mapping and the line exists.
    pub fn header_line(&self) -> Option<usize> {
        match self.marker_line {
            Some(line) => Some(line),
            None if !self.point_map.is_empty() && self.fallback_line < self.total_lines => {
                Some(self.fallback_line)
            }
            None => None,
        }
    }

    /// Whether the header row comes from the fallback offset (degraded mode)
    pub fn used_fallback(&self) -> bool {
        self.marker_line.is_none() && self.header_line().is_some()
    }

    pub fn fallback_line(&self) -> usize {
        self.fallback_line
    }

    /// Reason the header could not be located, for error reporting
    pub fn failure_reason(&self) -> Option<String> {
        if self.header_line().is_some() {
            return None;
        }
        Some(if self.point_map.is_empty() {
            format!(
                "no '{}' marker and no point metadata in {} lines",
                DATA_HEADER_MARKER, self.total_lines
            )
        } else {
            format!(
                "no '{}' marker and fallback line {} is beyond end of file ({} lines)",
                DATA_HEADER_MARKER, self.fallback_line, self.total_lines
            )
        })
    }
}

/// Locates the data header and extracts `Point_<n>` mappings
#[derive(Debug, Clone)]
pub struct HeaderScanner {
    fallback_line: usize,
    point_pattern: Regex,
}

impl HeaderScanner {
    pub fn new(fallback_line: usize) -> Result<Self> {
        let point_pattern = Regex::new(r#"^\s*"?(Point_\d+):"?\s*,\s*"([^"]*)""#).map_err(
            |e| EtlError::Configuration {
                message: format!("invalid point pattern: {}", e),
            },
        )?;
        Ok(Self {
            fallback_line,
            point_pattern,
        })
    }

    /// Scan lines from the top until the data header marker
    pub fn scan<I, S>(&self, lines: I) -> HeaderScan
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut point_map = PointMap::new();
        let mut marker_line = None;
        let mut total_lines = 0;

        for (index, line) in lines.into_iter().enumerate() {
            let line = line.as_ref();
            total_lines = index + 1;

            if is_data_header(line) {
                marker_line = Some(index);
                break;
            }

            if let Some((point_id, tag)) = self.parse_point_record(line) {
                point_map.insert(point_id, tag);
            }
        }

        debug!(
            "Header scan: marker={:?}, {} point mappings, {} lines read",
            marker_line,
            point_map.len(),
            total_lines
        );

        HeaderScan {
            marker_line,
            point_map,
            total_lines,
            fallback_line: self.fallback_line,
        }
    }

    /// Parse one `"Point_<n>:","<tag>"` record; empty tags are ignored
    fn parse_point_record(&self, line: &str) -> Option<(String, String)> {
        let captures = self.point_pattern.captures(line)?;
        let point_id = captures.get(1)?.as_str();
        let tag = captures.get(2)?.as_str().trim();
        if tag.is_empty() {
            return None;
        }
        Some((point_id.to_string(), tag.to_string()))
    }
}

/// True if the line's first field, quote-stripped, starts with `<>Date`
pub fn is_data_header(line: &str) -> bool {
    line.trim_start_matches('\u{feff}')
        .trim_start()
        .trim_start_matches('"')
        .starts_with(DATA_HEADER_MARKER)
}

/// Turn a raw sensor tag into a column name (`AH-B4-1.CV` -> `AH_B4_1_CV`)
pub fn sanitize_tag(tag: &str) -> String {
    tag.trim().replace(['-', '.', ':'], "_")
}
