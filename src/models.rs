//! Core data types shared across the ETL stages.
//!
//! Cell values as parsed from report text, column types and semantic
//! classes, and the warning/report structures handed back to callers
//! alongside the data.

use crate::constants::NULL_SENTINELS;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Point identifier (`Point_12`) to raw sensor tag (`AH-B4-1.CV`)
pub type PointMap = HashMap<String, String>;

/// A single parsed data cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Classify raw cell text, mapping every null sentinel to `Null`
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if is_null_sentinel(trimmed) {
            return CellValue::Null;
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return CellValue::Integer(value);
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => CellValue::Number(value),
            _ => CellValue::Text(trimmed.to_string()),
        }
    }

    /// Type observed for this cell; nulls carry no type information
    pub fn observed_type(&self) -> Option<ColumnType> {
        match self {
            CellValue::Null => None,
            CellValue::Integer(_) => Some(ColumnType::Integer),
            CellValue::Number(_) => Some(ColumnType::Float),
            CellValue::Text(_) => Some(ColumnType::Text),
        }
    }
}

/// Whether a trimmed cell is one of the "no reading" sentinels
pub fn is_null_sentinel(value: &str) -> bool {
    NULL_SENTINELS
        .iter()
        .any(|sentinel| value.eq_ignore_ascii_case(sentinel))
}

/// Lenient numeric conversion used by every text-to-float cast
pub fn parse_numeric(value: &str) -> Option<f64> {
    match CellValue::parse(value) {
        CellValue::Integer(v) => Some(v as f64),
        CellValue::Number(v) => Some(v),
        CellValue::Null | CellValue::Text(_) => None,
    }
}

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ColumnType {
    Float,
    Integer,
    Text,
    Boolean,
}

/// Aggregation semantics of a sensor column, derived from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnSemanticClass {
    /// Monotonic energy counters (`...KWH`)
    Cumulative,
    /// On/off and fault indicators
    Status,
    /// Power, temperature, flow, frequency and everything else
    Instantaneous,
}

impl ColumnSemanticClass {
    /// Classify a column by its name suffix
    pub fn classify(name: &str) -> Self {
        let upper = name.to_uppercase();

        if upper.ends_with("KWH") {
            ColumnSemanticClass::Cumulative
        } else if upper.ends_with("_S")
            || upper.ends_with(".S")
            || upper.ends_with("_F")
            || upper.ends_with(".F")
            || upper.contains("STATUS")
            || upper.contains("FAULT")
        {
            ColumnSemanticClass::Status
        } else {
            ColumnSemanticClass::Instantaneous
        }
    }
}

/// Recovered problems found while parsing one report file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ParseWarning {
    /// No `<>Date` marker; the configured fallback line was used as header
    MetadataNotFound { fallback_line: usize },
    /// Rows whose field count differed from the header (truncated or padded)
    MalformedRows { count: usize, first_line: usize },
    /// Separator/banner rows that were discarded
    BannerRowsSkipped { count: usize },
    /// Rows whose date and time did not form a valid timestamp
    NullTimestamps { count: usize },
    /// Two point IDs mapped onto the same sanitized column name
    DuplicateColumn { name: String },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::MetadataNotFound { fallback_line } => write!(
                f,
                "data header marker not found, fell back to line {}",
                fallback_line
            ),
            ParseWarning::MalformedRows { count, first_line } => write!(
                f,
                "{} rows had a ragged field count (first at line {})",
                count, first_line
            ),
            ParseWarning::BannerRowsSkipped { count } => {
                write!(f, "{} banner rows skipped", count)
            }
            ParseWarning::NullTimestamps { count } => {
                write!(f, "{} rows have an unparseable timestamp", count)
            }
            ParseWarning::DuplicateColumn { name } => {
                write!(f, "duplicate column '{}' dropped", name)
            }
        }
    }
}

/// Result of processing one input file in a batch
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub enum FileOutcome {
    Parsed {
        rows: usize,
        columns: usize,
        warnings: Vec<ParseWarning>,
    },
    Failed {
        reason: String,
    },
    /// Not processed because the batch was cancelled
    Pending,
}

impl FileReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FileOutcome::Parsed { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, FileOutcome::Failed { .. })
    }
}

/// Batch processing statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub files_processed: usize,
    pub files_failed: usize,
    pub files_pending: usize,
    pub total_rows: usize,
    pub processing_time_ms: u128,
}

impl ProcessingStats {
    /// "N of M files processed successfully"
    pub fn summary(&self) -> String {
        let attempted = self.files_processed + self.files_failed + self.files_pending;
        format!(
            "{} of {} files processed successfully",
            self.files_processed, attempted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sentinels() {
        for raw in ["", "  ", "No Data", "no data", "No data", "NO DATA", "NA", "null"] {
            assert_eq!(CellValue::parse(raw), CellValue::Null, "{raw:?}");
        }
    }

    #[test]
    fn test_cell_value_parse() {
        assert_eq!(CellValue::parse("42"), CellValue::Integer(42));
        assert_eq!(CellValue::parse(" 334.0 "), CellValue::Number(334.0));
        assert_eq!(CellValue::parse("ON"), CellValue::Text("ON".to_string()));
        assert_eq!(CellValue::parse("NaN"), CellValue::Text("NaN".to_string()));
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric("334.0"), Some(334.0));
        assert_eq!(parse_numeric("7"), Some(7.0));
        assert_eq!(parse_numeric("No Data"), None);
        assert_eq!(parse_numeric("abc"), None);
    }

    #[test]
    fn test_semantic_classification() {
        assert_eq!(
            ColumnSemanticClass::classify("AHWP_3_KWH"),
            ColumnSemanticClass::Cumulative
        );
        assert_eq!(
            ColumnSemanticClass::classify("CHWP_1_S"),
            ColumnSemanticClass::Status
        );
        assert_eq!(
            ColumnSemanticClass::classify("AH.F"),
            ColumnSemanticClass::Status
        );
        assert_eq!(
            ColumnSemanticClass::classify("ch1_fault_code"),
            ColumnSemanticClass::Status
        );
        assert_eq!(
            ColumnSemanticClass::classify("Pump_Status"),
            ColumnSemanticClass::Status
        );
        assert_eq!(
            ColumnSemanticClass::classify("CH_1_KW"),
            ColumnSemanticClass::Instantaneous
        );
        assert_eq!(
            ColumnSemanticClass::classify("temp_db_out"),
            ColumnSemanticClass::Instantaneous
        );
    }

    #[test]
    fn test_stats_summary() {
        let stats = ProcessingStats {
            files_processed: 2,
            files_failed: 1,
            ..Default::default()
        };
        assert_eq!(stats.summary(), "2 of 3 files processed successfully");
    }
}
