//! Batch processing engine.
//!
//! Parses report files in parallel, merges the successful frames into one
//! time series and runs the cleaning pipeline over the result. Per-file
//! failures are recorded in the outcome; only a batch where no file could be
//! parsed is an error.

pub mod discovery;
pub mod streaming;
pub mod writer;

#[cfg(test)]
pub mod tests;

use self::discovery::FileDiscovery;
use self::streaming::{ParsePhase, StreamingProcessor};

use crate::cleaning::{CleanedFrame, CleaningPipeline};
use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::merge::{BatchMerger, MergeOutcome};
use crate::models::{FileOutcome, FileReport, ProcessingStats};

use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything a batch run produced
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Cleaned, resampled and validated dataset
    pub cleaned: CleanedFrame,
    /// Merged frame before cleaning, with schema reconciliation details
    pub merged: MergeOutcome,
    /// One entry per input file, in input order
    pub reports: Vec<FileReport>,
    /// Files not processed because the run was cancelled
    pub pending: Vec<PathBuf>,
    pub stats: ProcessingStats,
}

impl BatchOutcome {
    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.reports.iter().filter(|r| r.is_failure())
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }
}

#[derive(Debug)]
pub struct BatchProcessor {
    config: EtlConfig,
    streaming_processor: StreamingProcessor,
    pipeline: CleaningPipeline,
    merger: BatchMerger,
}

impl BatchProcessor {
    pub fn new(config: EtlConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            streaming_processor: StreamingProcessor::new(config.clone())?,
            pipeline: CleaningPipeline::new(config.cleaning.clone())?,
            merger: BatchMerger::new(),
            config,
        })
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// Blocking entry point; runs the batch on its own tokio runtime.
    ///
    /// Must not be called from inside an async context, use
    /// [`Self::process_batch_async`] there.
    pub fn process_batch(&self, files: &[PathBuf]) -> Result<BatchOutcome> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.workers.max(1))
            .enable_all()
            .build()?;
        runtime.block_on(self.process_batch_async(files, &CancellationToken::new()))
    }

    /// Parse, merge and clean `files`, stopping early if `cancel` fires
    pub async fn process_batch_async(
        &self,
        files: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome> {
        let start_time = Instant::now();
        info!("Starting batch processing of {} files", files.len());

        let phase = self.streaming_processor.parse_files(files, cancel).await;
        self.assemble(phase, files.len(), start_time)
    }

    /// Merge and clean whatever the parse phase produced
    fn assemble(
        &self,
        phase: ParsePhase,
        attempted: usize,
        start_time: Instant,
    ) -> Result<BatchOutcome> {
        let files_failed = phase.files_failed();

        if phase.parsed.is_empty() {
            return Err(EtlError::NoValidFiles { attempted });
        }

        for report in phase.reports.iter() {
            if let FileOutcome::Failed { reason } = &report.outcome {
                warn!("Excluded {}: {}", report.path.display(), reason);
            }
        }

        let files_processed = phase.parsed.len();
        let frames = phase.parsed.into_iter().map(|r| r.frame).collect();
        let merged = self.merger.merge(frames)?;
        for conflict in &merged.conflicts {
            warn!("{}", conflict);
        }

        let cleaned = self.pipeline.clean(&merged.frame)?;

        let stats = ProcessingStats {
            files_processed,
            files_failed,
            files_pending: phase.pending.len(),
            total_rows: cleaned.frame.len(),
            processing_time_ms: start_time.elapsed().as_millis(),
        };
        info!(
            "Batch processing complete: {} ({} rows)",
            stats.summary(),
            stats.total_rows
        );

        Ok(BatchOutcome {
            cleaned,
            merged,
            reports: phase.reports,
            pending: phase.pending,
            stats,
        })
    }

    /// Process every file in `directory` matching `pattern`
    pub fn process_directory(
        &self,
        directory: &Path,
        pattern: &str,
        recursive: bool,
    ) -> Result<BatchOutcome> {
        let files = FileDiscovery::new(directory, pattern)
            .recursive(recursive)
            .discover()?;
        if files.is_empty() {
            return Err(EtlError::NoValidFiles { attempted: 0 });
        }
        info!("Found {} files in {}", files.len(), directory.display());
        self.process_batch(&files)
    }
}

/// Blocking batch run with the given configuration
pub fn process_batch(files: &[PathBuf], options: &EtlConfig) -> Result<BatchOutcome> {
    BatchProcessor::new(options.clone())?.process_batch(files)
}

/// Print a colored end-of-run summary to stdout
pub fn print_summary(outcome: &BatchOutcome) {
    let stats = &outcome.stats;
    println!("\n{}", "Processing Summary".bright_green().bold());
    println!(
        "  {} {}ms",
        "Time elapsed:".bright_cyan(),
        stats.processing_time_ms.to_string().bright_white()
    );
    println!("  {} {}", "Files:".bright_cyan(), stats.summary().bright_white());
    if stats.files_failed > 0 {
        println!(
            "  {} {}",
            "Files failed:".bright_red(),
            stats.files_failed.to_string().bright_red().bold()
        );
        for report in outcome.failures() {
            if let FileOutcome::Failed { reason } = &report.outcome {
                println!("    {} {}", report.path.display().to_string().red(), reason);
            }
        }
    }
    if stats.files_pending > 0 {
        println!(
            "  {} {}",
            "Files pending:".bright_yellow(),
            stats.files_pending.to_string().bright_yellow().bold()
        );
    }
    if !outcome.merged.conflicts.is_empty() {
        println!(
            "  {} {}",
            "Schema conflicts:".bright_yellow(),
            outcome.merged.conflicts.len().to_string().bright_white()
        );
    }
    if outcome.merged.duplicates_removed > 0 {
        println!(
            "  {} {}",
            "Duplicate timestamps removed:".bright_cyan(),
            outcome.merged.duplicates_removed.to_string().bright_white()
        );
    }
    if outcome.cleaned.rows_filtered > 0 {
        println!(
            "  {} {}",
            "Invalid rows filtered:".bright_cyan(),
            outcome.cleaned.rows_filtered.to_string().bright_white()
        );
    }
    for warning in &outcome.cleaned.warnings {
        println!("  {} {}", "Warning:".yellow(), warning);
    }
    println!(
        "  {} {}",
        "Total rows:".bright_cyan(),
        stats.total_rows.to_string().bright_white().bold()
    );
}
