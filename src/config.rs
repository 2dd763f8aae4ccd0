//! Configuration management and validation.
//!
//! Batch processing parameters, output settings and the cleaning options
//! handed to [`crate::cleaning::CleaningPipeline`].

use crate::cleaning::CleaningOptions;
use crate::cleaning::resample::parse_interval;
use crate::constants::{DEFAULT_FALLBACK_HEADER_LINE, MEMORY_PRESSURE_THRESHOLD};
use crate::error::{EtlError, Result};
use polars::prelude::ParquetCompression;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Supported compression algorithms for parquet files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionAlgorithm {
    /// Snappy compression - good balance of speed and compression
    Snappy,
    /// ZSTD compression - better compression ratio, slower
    Zstd,
    /// LZ4 compression - fastest, lower compression ratio
    Lz4,
    Uncompressed,
}

impl CompressionAlgorithm {
    /// Convert to polars ParquetCompression type
    pub fn to_polars_compression(&self) -> ParquetCompression {
        match self {
            CompressionAlgorithm::Snappy => ParquetCompression::Snappy,
            CompressionAlgorithm::Zstd => ParquetCompression::Zstd(None),
            CompressionAlgorithm::Lz4 => ParquetCompression::Lz4Raw,
            CompressionAlgorithm::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

/// File format of the cleaned dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Parquet,
    Csv,
}

impl OutputFormat {
    /// Pick the format from a file extension, defaulting to Parquet
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => OutputFormat::Csv,
            _ => OutputFormat::Parquet,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,

    /// Parquet compression; ignored for CSV
    pub compression: CompressionAlgorithm,

    /// Write column statistics into parquet row groups
    pub enable_statistics: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Parquet,
            compression: CompressionAlgorithm::Snappy,
            enable_statistics: true,
        }
    }
}

/// System profiling information for sizing the worker pool
#[derive(Debug, Clone)]
pub struct SystemProfile {
    /// Number of CPU cores available
    pub cpu_cores: usize,
    /// Total memory in MB
    pub memory_mb: usize,
    /// Physical cores (for systems with efficiency cores)
    pub performance_cores: usize,
}

impl SystemProfile {
    /// Auto-detect system capabilities
    pub fn detect() -> Self {
        use sysinfo::System;

        let cpu_cores = num_cpus::get();
        let performance_cores = num_cpus::get_physical();

        let mut system = System::new();
        system.refresh_memory();
        let memory_mb = (system.total_memory() / 1024 / 1024) as usize;

        debug!(
            "Detected {} cores ({} physical), {}MB memory",
            cpu_cores, performance_cores, memory_mb
        );

        Self {
            cpu_cores,
            memory_mb,
            performance_cores,
        }
    }

    /// Concurrent file limit: one report per core, capped by the configured limit
    pub fn recommended_concurrency(&self, configured: usize) -> usize {
        self.cpu_cores.max(1).min(configured.max(1))
    }
}

/// Global configuration for BMS report processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Number of worker threads for the blocking parse pool
    pub workers: usize,

    /// Maximum concurrent file processing
    pub max_concurrent_files: usize,

    /// Per-file parse timeout; expiry counts as an ordinary file failure
    pub file_timeout_secs: Option<u64>,

    /// Header row index used when a report has no `<>Date` marker
    pub fallback_header_line: usize,

    /// Draw an indicatif progress bar during batch runs
    pub show_progress: bool,

    /// Used-memory fraction above which concurrency is halved
    pub memory_pressure_threshold: f64,

    pub output: OutputConfig,

    pub cleaning: CleaningOptions,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            max_concurrent_files: 8,
            file_timeout_secs: Some(120),
            fallback_header_line: DEFAULT_FALLBACK_HEADER_LINE,
            show_progress: false,
            memory_pressure_threshold: MEMORY_PRESSURE_THRESHOLD,
            output: OutputConfig::default(),
            cleaning: CleaningOptions::default(),
        }
    }
}

impl EtlConfig {
    /// Create configuration with custom worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set maximum concurrent files
    pub fn with_max_concurrent_files(mut self, max_files: usize) -> Self {
        self.max_concurrent_files = max_files;
        self
    }

    /// Set or clear the per-file parse timeout
    pub fn with_file_timeout(mut self, seconds: Option<u64>) -> Self {
        self.file_timeout_secs = seconds;
        self
    }

    pub fn with_fallback_header_line(mut self, line: usize) -> Self {
        self.fallback_header_line = line;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    pub fn with_cleaning(mut self, cleaning: CleaningOptions) -> Self {
        self.cleaning = cleaning;
        self
    }

    /// Check the configuration before a run starts
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(EtlError::Configuration {
                message: "workers must be at least 1".to_string(),
            });
        }
        if self.max_concurrent_files == 0 {
            return Err(EtlError::Configuration {
                message: "max_concurrent_files must be at least 1".to_string(),
            });
        }
        if self.file_timeout_secs == Some(0) {
            return Err(EtlError::Configuration {
                message: "file timeout must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.memory_pressure_threshold) {
            return Err(EtlError::Configuration {
                message: format!(
                    "memory pressure threshold {} is outside 0..=1",
                    self.memory_pressure_threshold
                ),
            });
        }
        self.cleaning.validate()?;
        parse_interval(&self.cleaning.interval)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        let config = EtlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fallback_header_line, 211);
        assert_eq!(config.output.format, OutputFormat::Parquet);
    }

    #[test]
    fn test_builders() {
        let config = EtlConfig::default()
            .with_workers(2)
            .with_max_concurrent_files(3)
            .with_file_timeout(None)
            .with_fallback_header_line(10)
            .with_progress(true);
        assert_eq!(config.workers, 2);
        assert_eq!(config.max_concurrent_files, 3);
        assert_eq!(config.file_timeout_secs, None);
        assert_eq!(config.fallback_header_line, 10);
        assert!(config.show_progress);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(EtlConfig::default().with_workers(0).validate().is_err());
        assert!(EtlConfig::default().with_file_timeout(Some(0)).validate().is_err());

        let mut config = EtlConfig::default();
        config.cleaning.interval = "five minutes".to_string();
        assert!(matches!(
            config.validate(),
            Err(EtlError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn test_output_format_from_path() {
        assert_eq!(
            OutputFormat::from_path(&PathBuf::from("out/clean.CSV")),
            OutputFormat::Csv
        );
        assert_eq!(
            OutputFormat::from_path(&PathBuf::from("out/clean.parquet")),
            OutputFormat::Parquet
        );
        assert_eq!(
            OutputFormat::from_path(&PathBuf::from("out/clean")),
            OutputFormat::Parquet
        );
    }

    #[test]
    fn test_system_profile() {
        let profile = SystemProfile::detect();
        assert!(profile.cpu_cores > 0);
        assert_eq!(profile.recommended_concurrency(1), 1);
        assert!(profile.recommended_concurrency(1000) <= profile.cpu_cores);
    }
}
