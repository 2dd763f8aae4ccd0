//! End-to-end batch runs over temporary report files

use super::{report, write_file};
use crate::cleaning::CleaningOptions;
use crate::config::{EtlConfig, OutputConfig, OutputFormat};
use crate::models::FileOutcome;
use crate::processor::writer::write_output;
use crate::processor::{BatchProcessor, process_batch};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn test_config() -> EtlConfig {
    EtlConfig::default().with_workers(2).with_max_concurrent_files(2)
}

#[test]
fn test_partial_failure_merges_valid_files() {
    let temp_dir = TempDir::new().unwrap();
    let first = write_file(temp_dir.path(), "a.csv", &report(0, &["100", "110"]));
    let corrupt = write_file(
        temp_dir.path(),
        "b.csv",
        "garbage without any header\n1,2,3\n",
    );
    let third = write_file(temp_dir.path(), "c.csv", &report(10, &["120", "130"]));

    let outcome = process_batch(&[first, corrupt.clone(), third], &test_config()).unwrap();

    assert_eq!(outcome.stats.files_processed, 2);
    assert_eq!(outcome.stats.files_failed, 1);
    assert_eq!(outcome.stats.summary(), "2 of 3 files processed successfully");

    let failures: Vec<_> = outcome.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].path, corrupt);

    let frame = &outcome.cleaned.frame;
    assert_eq!(frame.len(), 4);
    assert_eq!(
        frame.numeric("CH_1_KW").unwrap(),
        vec![Some(100.0), Some(110.0), Some(120.0), Some(130.0)]
    );
    assert!(frame.has_column("CH_0_RT"));
}

#[test]
fn test_overlapping_files_keep_first_in_input_order() {
    let temp_dir = TempDir::new().unwrap();
    let first = write_file(temp_dir.path(), "z_first.csv", &report(0, &["100", "110"]));
    let second = write_file(temp_dir.path(), "a_second.csv", &report(5, &["999", "120"]));

    let outcome = BatchProcessor::new(test_config())
        .unwrap()
        .process_batch(&[first, second])
        .unwrap();

    assert_eq!(outcome.merged.duplicates_removed, 1);
    assert_eq!(
        outcome.cleaned.frame.numeric("CH_1_KW").unwrap(),
        vec![Some(100.0), Some(110.0), Some(120.0)]
    );
}

#[test]
fn test_process_directory_and_write_csv() {
    let temp_dir = TempDir::new().unwrap();
    write_file(temp_dir.path(), "day1.csv", &report(0, &["100", "No Data"]));
    write_file(temp_dir.path(), "day2.csv", &report(10, &["120"]));
    write_file(temp_dir.path(), "readme.txt", "not a report");

    let config = test_config().with_cleaning(CleaningOptions::default().with_interval("10m"));
    let outcome = BatchProcessor::new(config)
        .unwrap()
        .process_directory(temp_dir.path(), "*.csv", false)
        .unwrap();

    assert_eq!(outcome.reports.len(), 2);
    assert!(outcome.is_complete());
    assert_eq!(
        outcome.cleaned.frame.numeric("CH_1_KW").unwrap(),
        vec![Some(100.0), Some(120.0)]
    );

    let output = temp_dir.path().join("out").join("clean.csv");
    let config = OutputConfig {
        format: OutputFormat::Csv,
        ..Default::default()
    };
    let rows = write_output(&outcome.cleaned.frame, &output, &config).unwrap();
    assert_eq!(rows, 2);
    let text = std::fs::read_to_string(output).unwrap();
    assert!(!text.contains("No Data"));
}

#[tokio::test]
async fn test_async_batch_reports_parse_warnings() {
    let temp_dir = TempDir::new().unwrap();
    let ragged = report(0, &["100", "110"]).replace(
        "\"00:05:00\",\"110\",\"500\"",
        "\"00:05:00\",\"110\"",
    );
    let path = write_file(temp_dir.path(), "ragged.csv", &ragged);

    let processor = BatchProcessor::new(test_config()).unwrap();
    let outcome = processor
        .process_batch_async(&[path], &CancellationToken::new())
        .await
        .unwrap();

    match &outcome.reports[0].outcome {
        FileOutcome::Parsed { rows, warnings, .. } => {
            assert_eq!(*rows, 2);
            assert!(!warnings.is_empty());
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}
