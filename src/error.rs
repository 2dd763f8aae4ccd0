//! Error handling for BMS report processing.
//!
//! Fatal conditions for a single file, a resampling run or a whole batch.
//! Recoverable conditions (fallback header, ragged rows, schema conflicts,
//! skipped validation passes) are reported as warnings next to the data
//! instead, see [`crate::models`].

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("No data header found in file: {path} - {reason}")]
    NoHeader { path: PathBuf, reason: String },

    #[error("Missing Date/Time columns in file: {path} (columns: {found:?})")]
    NoDateTimeColumns { path: PathBuf, found: Vec<String> },

    #[error("File is not valid UTF-8: {path} - {reason}")]
    Encoding { path: PathBuf, reason: String },

    #[error("Frame has no timestamp column")]
    NoTimestamp,

    #[error("No rows left after dropping {dropped} rows with null timestamps")]
    EmptyAfterFilter { dropped: usize },

    #[error("No valid files: all {attempted} input files failed")]
    NoValidFiles { attempted: usize },

    #[error("Invalid resampling interval '{interval}': {reason}")]
    InvalidInterval { interval: String, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Parsing timed out after {seconds}s for file: {path}")]
    Timeout { path: PathBuf, seconds: u64 },

    #[error("Processing failed for file: {path} - {reason}")]
    ProcessingFailed { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, EtlError>;
