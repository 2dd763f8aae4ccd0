//! Concurrent report parsing.
//!
//! Each file is parsed on the blocking pool behind a semaphore, with an
//! optional per-file timeout. Results come back in input order so that the
//! merge phase can keep "first file wins" on duplicate timestamps.

use crate::config::{EtlConfig, SystemProfile};
use crate::error::{EtlError, Result};
use crate::models::{FileOutcome, FileReport};
use crate::parser::{ParsedReport, ReportParser};

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tokio::sync::{Mutex, Semaphore};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of the parallel parse phase, in input order
#[derive(Debug, Default)]
pub struct ParsePhase {
    pub parsed: Vec<ParsedReport>,
    pub reports: Vec<FileReport>,
    /// Files never started because the run was cancelled
    pub pending: Vec<PathBuf>,
}

impl ParsePhase {
    pub fn files_failed(&self) -> usize {
        self.reports.iter().filter(|r| r.is_failure()).count()
    }
}

enum FileResult {
    Parsed(ParsedReport),
    Failed(PathBuf, EtlError),
    Pending(PathBuf),
}

#[derive(Debug)]
pub struct StreamingProcessor {
    config: EtlConfig,
    parser: Arc<ReportParser>,
    parse_semaphore: Arc<Semaphore>,
    system_monitor: Arc<Mutex<System>>,
    memory_threshold: f64,
}

impl StreamingProcessor {
    pub fn new(config: EtlConfig) -> Result<Self> {
        let parser = ReportParser::new(config.fallback_header_line)?;
        let permits = SystemProfile::detect().recommended_concurrency(config.workers);
        Ok(Self {
            parser: Arc::new(parser),
            parse_semaphore: Arc::new(Semaphore::new(permits)),
            system_monitor: Arc::new(Mutex::new(System::new())),
            memory_threshold: config.memory_pressure_threshold,
            config,
        })
    }

    /// Check if system is under memory pressure
    pub async fn check_memory_pressure(&self) -> bool {
        let mut system = self.system_monitor.lock().await;
        system.refresh_memory();

        let used_memory = system.used_memory() as f64;
        let total_memory = system.total_memory() as f64;

        if total_memory == 0.0 {
            return false;
        }

        let memory_usage = used_memory / total_memory;
        let is_pressure = memory_usage > self.memory_threshold;

        if is_pressure {
            debug!(
                "Memory pressure detected: {:.1}% usage (threshold: {:.1}%)",
                memory_usage * 100.0,
                self.memory_threshold * 100.0
            );
        }

        is_pressure
    }

    /// Parse all files; per-file failures are recorded, never propagated.
    ///
    /// Cancellation is checked before each file starts. Files already being
    /// parsed run to completion, the rest come back as pending.
    pub async fn parse_files(&self, files: &[PathBuf], cancel: &CancellationToken) -> ParsePhase {
        self.parse_files_with(files, cancel, |path| self.parse_one(path, cancel))
            .await
    }

    /// Drive `parse` over `files` in input order under the concurrency limit
    pub(crate) async fn parse_files_with<'a, F, Fut>(
        &self,
        files: &'a [PathBuf],
        cancel: &CancellationToken,
        parse: F,
    ) -> ParsePhase
    where
        F: Fn(&'a Path) -> Fut,
        Fut: Future<Output = Result<Option<ParsedReport>>>,
    {
        if files.is_empty() {
            return ParsePhase::default();
        }

        let pb = self.progress_bar(files.len());

        let mut concurrent_limit = self.config.max_concurrent_files.min(files.len()).max(1);
        if self.check_memory_pressure().await {
            concurrent_limit = (concurrent_limit / 2).max(1);
            debug!(
                "Memory pressure detected, reducing concurrency to {}",
                concurrent_limit
            );
        }

        let results: Vec<FileResult> = stream::iter(files)
            .map(|path| {
                let pb = pb.clone();
                let parse = &parse;
                async move {
                    if cancel.is_cancelled() {
                        return FileResult::Pending(path.clone());
                    }
                    if let Some(file_name) = path.file_name() {
                        pb.set_message(format!("Processing: {}", file_name.to_string_lossy()));
                    }

                    let result = parse(path.as_path()).await;
                    pb.inc(1);
                    match result {
                        Ok(Some(report)) => FileResult::Parsed(report),
                        Ok(None) => FileResult::Pending(path.clone()),
                        Err(e) => {
                            error!("Failed to process {}: {:#}", path.display(), e);
                            FileResult::Failed(path.clone(), e)
                        }
                    }
                }
            })
            .buffered(concurrent_limit)
            .collect()
            .await;

        let mut phase = ParsePhase::default();
        for result in results {
            match result {
                FileResult::Parsed(report) => {
                    phase.reports.push(FileReport {
                        path: report.path.clone(),
                        outcome: FileOutcome::Parsed {
                            rows: report.frame.len(),
                            columns: report.frame.columns().len(),
                            warnings: report.warnings.clone(),
                        },
                    });
                    phase.parsed.push(report);
                }
                FileResult::Failed(path, e) => phase.reports.push(FileReport {
                    path,
                    outcome: FileOutcome::Failed {
                        reason: e.to_string(),
                    },
                }),
                FileResult::Pending(path) => {
                    phase.reports.push(FileReport {
                        path: path.clone(),
                        outcome: FileOutcome::Pending,
                    });
                    phase.pending.push(path);
                }
            }
        }

        if phase.pending.is_empty() {
            pb.finish_with_message(format!(
                "Parsed {} files ({} failed)",
                phase.parsed.len(),
                phase.files_failed()
            ));
        } else {
            warn!(
                "Batch cancelled: {} files parsed, {} pending",
                phase.parsed.len(),
                phase.pending.len()
            );
            pb.abandon_with_message("Cancelled");
        }

        phase
    }

    /// Parse one file on the blocking pool; `Ok(None)` if cancelled while queued
    async fn parse_one(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<ParsedReport>> {
        let _permit = self
            .parse_semaphore
            .acquire()
            .await
            .map_err(|e| EtlError::ProcessingFailed {
                path: path.to_path_buf(),
                reason: format!("Semaphore error: {}", e),
            })?;

        if cancel.is_cancelled() {
            return Ok(None);
        }

        let parser = Arc::clone(&self.parser);
        let owned_path = path.to_path_buf();
        let handle = task::spawn_blocking(move || parser.parse_file(&owned_path));

        let joined = await_with_timeout(path, self.config.file_timeout_secs, handle).await?;

        let report = joined.map_err(|e| EtlError::ProcessingFailed {
            path: path.to_path_buf(),
            reason: format!("Task join error: {}", e),
        })??;

        info!(
            "Parsed {}: {} rows x {} columns",
            path.display(),
            report.frame.len(),
            report.frame.columns().len()
        );
        for warning in &report.warnings {
            warn!("{}: {}", path.display(), warning);
        }

        Ok(Some(report))
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message("Processing files");
        pb
    }
}

/// Await `work`, failing with [`EtlError::Timeout`] once `timeout_secs` elapse
pub(crate) async fn await_with_timeout<T>(
    path: &Path,
    timeout_secs: Option<u64>,
    work: impl Future<Output = T>,
) -> Result<T> {
    match timeout_secs {
        Some(seconds) => tokio::time::timeout(Duration::from_secs(seconds), work)
            .await
            .map_err(|_| EtlError::Timeout {
                path: path.to_path_buf(),
                seconds,
            }),
        None => Ok(work.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const REPORT: &str = "\"Point_1:\",\"CH-1.KW\"\n\
\"<>Date\",\"Time\",\"Point_1\"\n\
\"2024/01/01\",\"00:00:00\",\"100\"\n\
\"2024/01/01\",\"00:05:00\",\"110\"\n";

    fn create_test_processor() -> StreamingProcessor {
        StreamingProcessor::new(EtlConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_memory_pressure_detection() {
        let processor = create_test_processor();
        // depends on the host; only checks the call completes
        let _ = processor.check_memory_pressure().await;
    }

    #[tokio::test]
    async fn test_empty_file_list() {
        let processor = create_test_processor();
        let phase = processor.parse_files(&[], &CancellationToken::new()).await;
        assert!(phase.parsed.is_empty());
        assert!(phase.reports.is_empty());
        assert!(phase.pending.is_empty());
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let temp_dir = TempDir::new().unwrap();
        let mut files = Vec::new();
        for i in 0..6 {
            let path = temp_dir.path().join(format!("report_{}.csv", i));
            fs::write(&path, REPORT).unwrap();
            files.push(path);
        }
        let missing = temp_dir.path().join("missing.csv");
        files.insert(2, missing.clone());

        let processor = create_test_processor();
        let phase = processor.parse_files(&files, &CancellationToken::new()).await;

        assert_eq!(phase.parsed.len(), 6);
        assert_eq!(phase.files_failed(), 1);
        let reported: Vec<_> = phase.reports.iter().map(|r| r.path.clone()).collect();
        assert_eq!(reported, files);
        assert!(phase.reports[2].is_failure());
        let parsed: Vec<_> = phase.parsed.iter().map(|r| r.path.clone()).collect();
        assert_eq!(parsed[2], files[3]);
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_files_pending() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report.csv");
        fs::write(&path, REPORT).unwrap();
        let files = vec![path.clone(), path];

        let cancel = CancellationToken::new();
        cancel.cancel();

        let phase = create_test_processor().parse_files(&files, &cancel).await;
        assert!(phase.parsed.is_empty());
        assert_eq!(phase.pending.len(), 2);
        assert!(
            phase
                .reports
                .iter()
                .all(|r| matches!(r.outcome, FileOutcome::Pending))
        );
    }

    #[tokio::test]
    async fn test_await_with_timeout() {
        let path = Path::new("slow.csv");
        let result = await_with_timeout(path, Some(1), std::future::pending::<()>()).await;
        assert!(matches!(result, Err(EtlError::Timeout { seconds: 1, .. })));
        assert_eq!(await_with_timeout(path, None, async { 7 }).await.unwrap(), 7);
        assert_eq!(await_with_timeout(path, Some(5), async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_timed_out_file_is_an_ordinary_failure() {
        let temp_dir = TempDir::new().unwrap();
        let mut files = Vec::new();
        for name in ["a.csv", "stuck.csv", "c.csv"] {
            let path = temp_dir.path().join(name);
            fs::write(&path, REPORT).unwrap();
            files.push(path);
        }
        let stuck = files[1].clone();

        let processor = create_test_processor();
        let phase = processor
            .parse_files_with(&files, &CancellationToken::new(), |path| {
                let parser = Arc::clone(&processor.parser);
                let stuck = stuck.as_path() == path;
                async move {
                    if stuck {
                        let never = std::future::pending::<Result<Option<ParsedReport>>>();
                        return await_with_timeout(path, Some(1), never).await?;
                    }
                    parser.parse_file(path).map(Some)
                }
            })
            .await;

        assert_eq!(phase.parsed.len(), 2);
        assert_eq!(phase.files_failed(), 1);
        assert!(phase.pending.is_empty());
        match &phase.reports[1].outcome {
            FileOutcome::Failed { reason } => assert!(reason.contains("timed out after 1s")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_between_files_leaves_rest_pending() {
        let temp_dir = TempDir::new().unwrap();
        let mut files = Vec::new();
        for name in ["a.csv", "b.csv", "c.csv"] {
            let path = temp_dir.path().join(name);
            fs::write(&path, REPORT).unwrap();
            files.push(path);
        }

        let processor =
            StreamingProcessor::new(EtlConfig::default().with_max_concurrent_files(1)).unwrap();
        let cancel = CancellationToken::new();
        let phase = processor
            .parse_files_with(&files, &cancel, |path| {
                let parser = Arc::clone(&processor.parser);
                let cancel = cancel.clone();
                async move {
                    let report = parser.parse_file(path);
                    cancel.cancel();
                    report.map(Some)
                }
            })
            .await;

        assert_eq!(phase.parsed.len(), 1);
        assert_eq!(phase.parsed[0].path, files[0]);
        assert_eq!(phase.pending, files[1..].to_vec());
        assert_eq!(phase.files_failed(), 0);
    }

    #[test]
    fn test_processor_configuration() {
        let config = EtlConfig::default();
        let processor = StreamingProcessor::new(config.clone()).unwrap();
        assert_eq!(
            processor.config.max_concurrent_files,
            config.max_concurrent_files
        );
        assert_eq!(processor.memory_threshold, config.memory_pressure_threshold);
    }
}
