//! BMS ETL Library
//!
//! Turns building-management-system report exports into one clean,
//! timestamp-indexed numeric dataset.
//!
//! This library provides tools for:
//! - Locating the data table inside metadata-prefixed report files and
//!   renaming positional `Point_<n>` columns to sanitized sensor tags
//! - Reconciling column types across files and merging them into one
//!   ordered time series
//! - Flagging frozen sensors and resampling onto a fixed interval with
//!   per-column aggregation semantics
//! - Physics-based validation (wet bulb, steady state, heat balance,
//!   pump affinity law) with optional filtering of invalid rows
//! - Parallel batch processing with per-file error isolation, and
//!   Parquet/CSV output
//!
//! ```no_run
//! use bms_etl::{CleaningOptions, clean, parse_file};
//!
//! let report = parse_file("plant_report.csv")?;
//! let cleaned = clean(&report.frame, &CleaningOptions::default())?;
//! println!("{} rows, features: {:?}", cleaned.frame.len(), cleaned.feature_columns());
//! # Ok::<(), bms_etl::EtlError>(())
//! ```

pub mod cleaning;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod frame;
pub mod header;
pub mod merge;
pub mod models;
pub mod parser;
pub mod processor;
pub mod schema;

pub use cleaning::{CleanedFrame, CleaningOptions, CleaningPipeline, CleaningWarning, clean};
pub use config::{EtlConfig, OutputConfig, OutputFormat};
pub use error::{EtlError, Result};
pub use frame::{Column, ColumnSet, ColumnValues, TimeSeriesFrame};
pub use header::{HeaderScan, HeaderScanner};
pub use merge::{BatchMerger, MergeOutcome};
pub use models::{
    CellValue, ColumnSemanticClass, ColumnType, FileOutcome, FileReport, ParseWarning,
    PointMap, ProcessingStats,
};
pub use parser::{ParsedReport, ReportParser, parse_file};
pub use processor::writer::write_output;
pub use processor::{BatchOutcome, BatchProcessor, process_batch};
pub use schema::{SchemaConflict, SchemaReconciler, UnifiedSchema};
