//! Output writing for cleaned datasets.
//!
//! Converts the frame to a polars `DataFrame` and writes Parquet or CSV.
//! Nulls are written as nulls (Parquet) or empty cells (CSV), never as the
//! source's "No Data" text.

use crate::config::{OutputConfig, OutputFormat};
use crate::error::{EtlError, Result};
use crate::frame::TimeSeriesFrame;

use polars::prelude::{
    CsvWriter, DataFrame, ParquetWriter as PolarsParquetWriter, SerWriter, StatisticsOptions,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CSV_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct OutputWriter {
    output_path: PathBuf,
    config: OutputConfig,
}

impl OutputWriter {
    pub fn new(output_path: impl Into<PathBuf>, config: OutputConfig) -> Self {
        Self {
            output_path: output_path.into(),
            config,
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Write the frame, creating parent directories; returns the row count
    pub fn write(&self, frame: &TimeSeriesFrame) -> Result<usize> {
        if let Some(parent) = self
            .output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut df = frame.to_dataframe()?;
        debug!(
            "Writing {} rows x {} columns as {:?}",
            df.height(),
            df.width(),
            self.config.format
        );

        match self.config.format {
            OutputFormat::Parquet => self.write_parquet(&mut df)?,
            OutputFormat::Csv => self.write_csv(&mut df)?,
        }

        info!(
            "Wrote {} rows to {}",
            df.height(),
            self.output_path.display()
        );
        Ok(df.height())
    }

    fn write_parquet(&self, df: &mut DataFrame) -> Result<()> {
        let file = File::create(&self.output_path)?;
        let statistics = if self.config.enable_statistics {
            StatisticsOptions::full()
        } else {
            StatisticsOptions::empty()
        };

        PolarsParquetWriter::new(file)
            .with_compression(self.config.compression.to_polars_compression())
            .with_statistics(statistics)
            .finish(df)
            .map_err(|e| EtlError::ProcessingFailed {
                path: self.output_path.clone(),
                reason: format!("Failed to write parquet: {}", e),
            })?;
        Ok(())
    }

    fn write_csv(&self, df: &mut DataFrame) -> Result<()> {
        let mut file = File::create(&self.output_path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_datetime_format(Some(CSV_DATETIME_FORMAT.to_string()))
            .finish(df)
            .map_err(|e| EtlError::ProcessingFailed {
                path: self.output_path.clone(),
                reason: format!("Failed to write csv: {}", e),
            })?;
        Ok(())
    }
}

/// Write a frame using the format and compression in `config`
pub fn write_output(frame: &TimeSeriesFrame, path: &Path, config: &OutputConfig) -> Result<usize> {
    OutputWriter::new(path, config.clone()).write(frame)
}
