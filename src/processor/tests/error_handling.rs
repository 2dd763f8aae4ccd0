//! Batch-level failure modes

use super::{report, write_file};
use crate::config::EtlConfig;
use crate::error::EtlError;
use crate::models::FileOutcome;
use crate::parser::ReportParser;
use crate::processor::{BatchProcessor, process_batch};
use std::time::Instant;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[test]
fn test_all_files_failing_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let bad = write_file(temp_dir.path(), "bad.csv", "nothing useful here\n");
    let missing = temp_dir.path().join("missing.csv");

    let result = process_batch(&[bad, missing], &EtlConfig::default());
    assert!(matches!(
        result,
        Err(EtlError::NoValidFiles { attempted: 2 })
    ));
}

#[test]
fn test_empty_file_list_is_an_error() {
    let result = process_batch(&[], &EtlConfig::default());
    assert!(matches!(
        result,
        Err(EtlError::NoValidFiles { attempted: 0 })
    ));
}

#[test]
fn test_missing_directory() {
    let temp_dir = TempDir::new().unwrap();
    let processor = BatchProcessor::new(EtlConfig::default()).unwrap();
    let result = processor.process_directory(&temp_dir.path().join("nope"), "*.csv", false);
    assert!(matches!(result, Err(EtlError::FileNotFound { .. })));
}

#[test]
fn test_directory_without_matches() {
    let temp_dir = TempDir::new().unwrap();
    write_file(temp_dir.path(), "notes.txt", "text");
    let processor = BatchProcessor::new(EtlConfig::default()).unwrap();
    let result = processor.process_directory(temp_dir.path(), "*.csv", false);
    assert!(matches!(
        result,
        Err(EtlError::NoValidFiles { attempted: 0 })
    ));
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let config = EtlConfig::default().with_workers(0);
    assert!(matches!(
        BatchProcessor::new(config),
        Err(EtlError::Configuration { .. })
    ));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_file(temp_dir.path(), "a.csv", &report(0, &["100"]));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let processor = BatchProcessor::new(EtlConfig::default()).unwrap();
    let result = processor.process_batch_async(&[path], &cancel).await;
    assert!(matches!(
        result,
        Err(EtlError::NoValidFiles { attempted: 1 })
    ));
}

#[tokio::test]
async fn test_cancelled_mid_batch_keeps_parsed_files() {
    let temp_dir = TempDir::new().unwrap();
    let files = vec![
        write_file(temp_dir.path(), "a.csv", &report(0, &["100", "110"])),
        write_file(temp_dir.path(), "b.csv", &report(10, &["120", "130"])),
        write_file(temp_dir.path(), "c.csv", &report(20, &["140", "150"])),
    ];

    let config = EtlConfig::default()
        .with_workers(1)
        .with_max_concurrent_files(1);
    let processor = BatchProcessor::new(config).unwrap();
    let parser = ReportParser::new(processor.config().fallback_header_line).unwrap();
    let cancel = CancellationToken::new();
    let start_time = Instant::now();

    // stop the run as soon as the first file is parsed
    let phase = processor
        .streaming_processor
        .parse_files_with(&files, &cancel, |path| {
            let parser = &parser;
            let cancel = cancel.clone();
            async move {
                let parsed = parser.parse_file(path);
                cancel.cancel();
                parsed.map(Some)
            }
        })
        .await;
    let outcome = processor.assemble(phase, files.len(), start_time).unwrap();

    assert!(!outcome.is_complete());
    assert_eq!(outcome.pending, files[1..].to_vec());
    assert_eq!(outcome.stats.files_processed, 1);
    assert_eq!(outcome.stats.files_pending, 2);
    assert_eq!(outcome.reports.len(), 3);
    assert!(matches!(outcome.reports[2].outcome, FileOutcome::Pending));
    assert_eq!(outcome.merged.frame.len(), 2);
    assert_eq!(outcome.failures().count(), 0);
}
