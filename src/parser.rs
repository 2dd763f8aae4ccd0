//! Report parsing: from a BMS export file to a [`TimeSeriesFrame`].
//!
//! The header scanner locates the data table; the table is then read with a
//! flexible `csv` reader so ragged rows are truncated or padded instead of
//! failing the file. Point columns are renamed to sanitized sensor tags and
//! `Date` + `Time` are merged into the `timestamp` vector.

use crate::constants::{
    DATA_HEADER_MARKER, DATE_COLUMN, DATE_COLUMN_PREFIX, DATE_TIME_FORMAT, DEFAULT_FALLBACK_HEADER_LINE, TIME_COLUMN,
};
use crate::error::{EtlError, Result};
use crate::frame::{Column, ColumnValues, TimeSeriesFrame};
use crate::header::{HeaderScanner, sanitize_tag};
use crate::models::{CellValue, ParseWarning, PointMap};
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A parsed report plus everything recovered along the way
#[derive(Debug, Clone)]
pub struct ParsedReport {
    pub path: PathBuf,
    pub frame: TimeSeriesFrame,
    pub point_map: PointMap,
    /// Zero-based line index of the data header row
    pub header_line: usize,
    /// Header located via the fallback offset rather than the `<>Date` marker
    pub used_fallback: bool,
    pub warnings: Vec<ParseWarning>,
}

/// Parses single report files
#[derive(Debug, Clone)]
pub struct ReportParser {
    scanner: HeaderScanner,
}

impl ReportParser {
    pub fn new(fallback_header_line: usize) -> Result<Self> {
        Ok(Self {
            scanner: HeaderScanner::new(fallback_header_line)?,
        })
    }

    /// Read and parse a report file (UTF-8, optional BOM)
    pub fn parse_file(&self, path: &Path) -> Result<ParsedReport> {
        if !path.exists() {
            return Err(EtlError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let bytes = std::fs::read(path)?;
        let content = String::from_utf8(bytes).map_err(|e| EtlError::Encoding {
            path: path.to_path_buf(),
            reason: e.utf8_error().to_string(),
        })?;

        self.parse_str(&content, path)
    }

    /// Parse report text already in memory; `path` is used for reporting only
    pub fn parse_str(&self, content: &str, path: &Path) -> Result<ParsedReport> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let lines: Vec<&str> = content.lines().collect();

        let scan = self.scanner.scan(lines.iter());
        let header_line = scan.header_line().ok_or_else(|| EtlError::NoHeader {
            path: path.to_path_buf(),
            reason: scan.failure_reason().unwrap_or_default(),
        })?;

        let mut warnings = Vec::new();
        if scan.used_fallback() {
            warn!(
                "No data header marker in {}, falling back to line {}",
                path.display(),
                header_line
            );
            warnings.push(ParseWarning::MetadataNotFound {
                fallback_line: header_line,
            });
        }

        let data_section = lines[header_line..].join("\n");
        let table = read_table(&data_section, header_line, &scan.point_map, path, &mut warnings)?;
        let frame = table.into_frame()?.sorted_by_timestamp();

        info!(
            "Parsed {}: {} rows, {} columns, {} point mappings",
            path.display(),
            frame.len(),
            frame.columns().len(),
            scan.point_map.len()
        );

        let used_fallback = scan.used_fallback();
        Ok(ParsedReport {
            path: path.to_path_buf(),
            frame,
            point_map: scan.point_map,
            header_line,
            used_fallback,
            warnings,
        })
    }
}

/// Parse a report file with the default fallback header line
pub fn parse_file(path: impl AsRef<Path>) -> Result<ParsedReport> {
    ReportParser::new(DEFAULT_FALLBACK_HEADER_LINE)?.parse_file(path.as_ref())
}

/// Intermediate column-major table read from the data section
struct RawTable {
    timestamps: Vec<Option<NaiveDateTime>>,
    names: Vec<String>,
    cells: Vec<Vec<CellValue>>,
}

impl RawTable {
    fn into_frame(self) -> Result<TimeSeriesFrame> {
        let columns = self
            .names
            .into_iter()
            .zip(self.cells)
            .map(|(name, cells)| Column::new(name, ColumnValues::from_cells(cells)))
            .collect();
        TimeSeriesFrame::new(self.timestamps, columns)
    }
}

/// Output slot of a header field
enum FieldRole {
    Date,
    Time,
    Data(usize),
    Skip,
}

fn read_table(
    data_section: &str,
    header_line: usize,
    point_map: &PointMap,
    path: &Path,
    warnings: &mut Vec<ParseWarning>,
) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data_section.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record?,
        None => {
            return Err(EtlError::NoHeader {
                path: path.to_path_buf(),
                reason: format!("header line {} is empty", header_line),
            });
        }
    };

    let raw_names: Vec<String> = header.iter().map(|f| f.trim().to_string()).collect();
    let width = raw_names.len();
    let roles = assign_roles(&raw_names, point_map, warnings);

    let date_idx = roles.iter().position(|r| matches!(r, FieldRole::Date));
    let time_idx = roles.iter().position(|r| matches!(r, FieldRole::Time));
    let (Some(date_idx), Some(time_idx)) = (date_idx, time_idx) else {
        return Err(EtlError::NoDateTimeColumns {
            path: path.to_path_buf(),
            found: raw_names,
        });
    };

    let mut names = Vec::new();
    for (idx, role) in roles.iter().enumerate() {
        if let FieldRole::Data(_) = role {
            names.push(column_name(&raw_names[idx], point_map));
        }
    }
    let mut cells: Vec<Vec<CellValue>> = vec![Vec::new(); names.len()];
    let mut timestamps = Vec::new();

    let mut malformed = 0usize;
    let mut first_malformed_line = 0usize;
    let mut banner_rows = 0usize;
    let mut null_timestamps = 0usize;

    for record in records {
        let record = record?;
        let source_line = header_line
            + record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or_default();

        if record.get(0).is_some_and(is_banner_field) {
            banner_rows += 1;
            continue;
        }

        if record.len() != width {
            if malformed == 0 {
                first_malformed_line = source_line;
            }
            malformed += 1;
        }

        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        let timestamp = parse_timestamp(field(date_idx), field(time_idx));
        if timestamp.is_none() {
            null_timestamps += 1;
        }
        timestamps.push(timestamp);

        for (idx, role) in roles.iter().enumerate() {
            if let FieldRole::Data(slot) = role {
                cells[*slot].push(CellValue::parse(field(idx)));
            }
        }
    }

    if banner_rows > 0 {
        debug!("Skipped {} banner rows in {}", banner_rows, path.display());
        warnings.push(ParseWarning::BannerRowsSkipped { count: banner_rows });
    }
    if malformed > 0 {
        warn!(
            "{} ragged rows in {} (first at line {}), truncated/padded to {} fields",
            malformed,
            path.display(),
            first_malformed_line,
            width
        );
        warnings.push(ParseWarning::MalformedRows {
            count: malformed,
            first_line: first_malformed_line,
        });
    }
    if null_timestamps > 0 {
        warn!(
            "{} rows with unparseable timestamps in {}",
            null_timestamps,
            path.display()
        );
        warnings.push(ParseWarning::NullTimestamps {
            count: null_timestamps,
        });
    }

    Ok(RawTable {
        timestamps,
        names,
        cells,
    })
}

/// Decide what each header field becomes; duplicates after renaming keep the first
fn assign_roles(
    raw_names: &[String],
    point_map: &PointMap,
    warnings: &mut Vec<ParseWarning>,
) -> Vec<FieldRole> {
    let mut seen = HashSet::new();
    let mut next_slot = 0;
    let mut roles = Vec::with_capacity(raw_names.len());

    for raw in raw_names {
        let name = column_name(raw, point_map);
        let role = if name.is_empty() {
            FieldRole::Skip
        } else if !seen.insert(name.clone()) {
            warn!("Duplicate column '{}' after renaming, keeping the first", name);
            warnings.push(ParseWarning::DuplicateColumn { name });
            FieldRole::Skip
        } else if name == DATE_COLUMN {
            FieldRole::Date
        } else if name == TIME_COLUMN {
            FieldRole::Time
        } else {
            next_slot += 1;
            FieldRole::Data(next_slot - 1)
        };
        roles.push(role);
    }

    roles
}

/// Final column name for a header field
fn column_name(raw: &str, point_map: &PointMap) -> String {
    let raw = raw.trim().trim_matches('"');
    // only the `<>Date` header field loses its prefix
    if let Some(stripped) = raw
        .strip_prefix(DATE_COLUMN_PREFIX)
        .filter(|_| raw.starts_with(DATA_HEADER_MARKER))
    {
        return stripped.trim().to_string();
    }
    match point_map.get(raw) {
        Some(tag) => sanitize_tag(tag),
        None => raw.to_string(),
    }
}

/// Separator rows start with a repeated non-alphanumeric marker (`****`)
fn is_banner_field(field: &str) -> bool {
    let mut chars = field.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(a), Some(b)) => a == b && !a.is_alphanumeric() && !a.is_whitespace(),
        _ => false,
    }
}

fn parse_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    if date.is_empty() || time.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(&format!("{} {}", date, time), DATE_TIME_FORMAT).ok()
}
