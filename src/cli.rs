//! Command-line interface components.

use crate::cleaning::{AffinityParams, CleaningOptions, HeatBalanceParams, SteadyStateParams};
use crate::config::{CompressionAlgorithm, EtlConfig, OutputConfig, OutputFormat};
use crate::constants::{DEFAULT_FALLBACK_HEADER_LINE, DEFAULT_FILE_PATTERN, DEFAULT_RESAMPLE_INTERVAL};
use crate::parser::ReportParser;
use crate::processor::discovery::FileDiscovery;
use crate::processor::writer::write_output;
use crate::processor::{BatchProcessor, print_summary};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "bms-etl")]
#[command(about = "Parse, merge and clean building-management-system report exports")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse report files, merge them and run the cleaning pipeline
    Process(ProcessArgs),
    /// Parse a single report and describe what was found, without cleaning
    Inspect {
        /// Report file to inspect
        file: PathBuf,

        /// Header row index used when the `<>Date` marker is missing
        #[arg(long, default_value_t = DEFAULT_FALLBACK_HEADER_LINE)]
        fallback_header_line: usize,
    },
}

#[derive(clap::Args, Debug)]
pub struct ProcessArgs {
    /// Report files or directories containing report files
    #[arg(required = true, value_name = "INPUT")]
    pub inputs: Vec<PathBuf>,

    /// Glob pattern for files inside input directories
    #[arg(long, default_value = DEFAULT_FILE_PATTERN)]
    pub pattern: String,

    /// Descend into subdirectories of input directories
    #[arg(short, long)]
    pub recursive: bool,

    /// Output file (.parquet or .csv)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Parquet compression algorithm (snappy, zstd, lz4, none)
    #[arg(long, default_value = "snappy")]
    pub compression: String,

    /// Resampling interval such as 5m, 15m or 1h
    #[arg(long, default_value = DEFAULT_RESAMPLE_INTERVAL)]
    pub interval: String,

    /// Rolling window (samples) for frozen-sensor detection
    #[arg(long)]
    pub frozen_window: Option<usize>,

    /// Run steady-state detection on the given load column
    #[arg(long, value_name = "LOAD_COLUMN")]
    pub steady_state: Option<String>,

    /// Run the heat-balance check on FLOW,TEMP_IN,TEMP_OUT,LOAD columns
    #[arg(long, value_delimiter = ',', value_name = "FLOW,TEMP_IN,TEMP_OUT,LOAD")]
    pub heat_balance: Option<Vec<String>>,

    /// Run the pump affinity-law check (columns auto-detected unless given)
    #[arg(long)]
    pub affinity: bool,

    /// Pump frequency column for the affinity check
    #[arg(long, requires = "affinity")]
    pub pump_frequency: Option<String>,

    /// Pump power column for the affinity check
    #[arg(long, requires = "affinity")]
    pub pump_power: Option<String>,

    /// Drop rows failing an applied check instead of only flagging them
    #[arg(long)]
    pub filter_invalid: bool,

    /// Maximum number of files parsed concurrently
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Per-file parse timeout in seconds (0 disables)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Header row index used when the `<>Date` marker is missing
    #[arg(long, default_value_t = DEFAULT_FALLBACK_HEADER_LINE)]
    pub fallback_header_line: usize,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl Args {
    pub fn get_log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }
}

impl ProcessArgs {
    /// Build the run configuration from defaults plus command-line overrides
    pub fn to_config(&self) -> Result<EtlConfig> {
        let mut cleaning = CleaningOptions::default()
            .with_interval(&self.interval)
            .with_filter_invalid(self.filter_invalid);
        if let Some(window) = self.frozen_window {
            cleaning = cleaning.with_frozen_window(window);
        }
        if let Some(load) = &self.steady_state {
            cleaning = cleaning.with_steady_state(SteadyStateParams::default().with_load_column(load));
        }
        if let Some(columns) = &self.heat_balance {
            let [flow, temp_in, temp_out, load] = columns.as_slice() else {
                bail!("--heat-balance needs exactly four columns: FLOW,TEMP_IN,TEMP_OUT,LOAD");
            };
            cleaning =
                cleaning.with_heat_balance(HeatBalanceParams::new(flow, temp_in, temp_out, load));
        }
        if self.affinity {
            cleaning = cleaning.with_affinity(AffinityParams {
                frequency_column: self.pump_frequency.clone(),
                power_column: self.pump_power.clone(),
                ..Default::default()
            });
        }

        let format = self
            .output
            .as_deref()
            .map(OutputFormat::from_path)
            .unwrap_or(OutputFormat::Parquet);
        let output = OutputConfig {
            format,
            compression: parse_compression(&self.compression)?,
            ..Default::default()
        };

        let mut config = EtlConfig::default()
            .with_fallback_header_line(self.fallback_header_line)
            .with_progress(!self.no_progress)
            .with_output(output)
            .with_cleaning(cleaning);
        if let Some(max) = self.max_concurrent {
            config = config.with_max_concurrent_files(max);
        }
        if let Some(seconds) = self.timeout {
            config = config.with_file_timeout((seconds > 0).then_some(seconds));
        }

        config.validate()?;
        Ok(config)
    }

    /// Expand directories into their matching files, keeping argument order
    pub fn resolve_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for input in &self.inputs {
            if input.is_dir() {
                let found = FileDiscovery::new(input, &self.pattern)
                    .recursive(self.recursive)
                    .discover()?;
                debug!("{}: {} matching files", input.display(), found.len());
                files.extend(found);
            } else {
                files.push(input.clone());
            }
        }
        if files.is_empty() {
            bail!("No files matching '{}' found in the given inputs", self.pattern);
        }
        Ok(files)
    }
}

fn parse_compression(name: &str) -> Result<CompressionAlgorithm> {
    match name.to_lowercase().as_str() {
        "snappy" => Ok(CompressionAlgorithm::Snappy),
        "zstd" => Ok(CompressionAlgorithm::Zstd),
        "lz4" => Ok(CompressionAlgorithm::Lz4),
        "none" | "uncompressed" => Ok(CompressionAlgorithm::Uncompressed),
        other => bail!("Unknown compression algorithm '{}'", other),
    }
}

/// Set up structured logging based on CLI arguments
pub fn setup_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bms_etl={}", log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_timer(fmt::time::uptime())
                .with_writer(std::io::stderr),
        )
        .init();

    debug!("Logging initialized at level: {}", log_level);
}

/// Run the selected command
pub async fn run(args: Args, cancel: CancellationToken) -> Result<ExitCode> {
    match args.command {
        Command::Process(process) => run_process(process, cancel).await,
        Command::Inspect {
            file,
            fallback_header_line,
        } => run_inspect(file, fallback_header_line).await,
    }
}

async fn run_process(args: ProcessArgs, cancel: CancellationToken) -> Result<ExitCode> {
    let config = args.to_config()?;
    let files = args.resolve_files()?;

    println!(
        "{}",
        "Starting BMS report processing".bright_green().bold()
    );
    println!(
        "  {} {}",
        "Files:".bright_cyan(),
        files.len().to_string().bright_white().bold()
    );
    if let Some(output) = &args.output {
        println!("  {} {}", "Output:".bright_cyan(), output.display());
    }

    let processor = BatchProcessor::new(config)?;
    let outcome = processor.process_batch_async(&files, &cancel).await?;

    if let Some(output) = &args.output {
        let path = output.clone();
        let frame = outcome.cleaned.frame.clone();
        let output_config = processor.config().output.clone();
        let rows = tokio::task::spawn_blocking(move || write_output(&frame, &path, &output_config))
            .await
            .context("Output writer task failed")??;
        println!(
            "  {} {} rows to {}",
            "Wrote".bright_green(),
            rows.to_string().bright_white(),
            output.display()
        );
    }

    print_summary(&outcome);

    if outcome.is_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "\n{} {} files were not processed",
            "Cancelled:".bright_yellow().bold(),
            outcome.pending.len()
        );
        Ok(ExitCode::from(130))
    }
}

async fn run_inspect(file: PathBuf, fallback_header_line: usize) -> Result<ExitCode> {
    let parser = ReportParser::new(fallback_header_line)?;
    let path = file.clone();
    let report = tokio::task::spawn_blocking(move || parser.parse_file(&path))
        .await
        .context("Parser task failed")?
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    print_inspection(&file, &report);
    Ok(ExitCode::SUCCESS)
}

fn print_inspection(file: &Path, report: &crate::parser::ParsedReport) {
    println!("{}", file.display().to_string().bright_green().bold());
    let header_source = if report.used_fallback {
        "fallback offset".yellow()
    } else {
        "<>Date marker".bright_white()
    };
    println!(
        "  {} line {} ({})",
        "Header:".bright_cyan(),
        report.header_line,
        header_source
    );
    println!(
        "  {} {}",
        "Point map entries:".bright_cyan(),
        report.point_map.len()
    );
    println!("  {} {}", "Rows:".bright_cyan(), report.frame.len());

    if let Some(timestamps) = report.frame.timestamps() {
        let first = timestamps.iter().flatten().min();
        let last = timestamps.iter().flatten().max();
        if let (Some(first), Some(last)) = (first, last) {
            println!("  {} {} .. {}", "Time range:".bright_cyan(), first, last);
        }
    }

    println!(
        "  {} {}",
        "Columns:".bright_cyan(),
        report.frame.columns().len()
    );
    for column in report.frame.columns().iter() {
        println!(
            "    {} {}",
            column.name().bright_white(),
            format!("{:?} / {:?}", column.column_type(), column.class()).bright_black()
        );
    }

    for warning in &report.warnings {
        println!("  {} {}", "Warning:".yellow(), warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_process_args_to_config() {
        let args = parse(&[
            "bms-etl",
            "process",
            "reports/",
            "-o",
            "clean.csv",
            "--interval",
            "15m",
            "--heat-balance",
            "CHW_FLOW,CHWR_T,CHWS_T,CH_0_RT",
            "--affinity",
            "--pump-frequency",
            "CHWP_HZ_1",
            "--compression",
            "zstd",
            "--timeout",
            "0",
        ]);
        let Command::Process(process) = args.command else {
            panic!("expected process command");
        };
        let config = process.to_config().unwrap();

        assert_eq!(config.cleaning.interval, "15m");
        assert_eq!(config.output.format, OutputFormat::Csv);
        assert_eq!(config.output.compression, CompressionAlgorithm::Zstd);
        assert_eq!(config.file_timeout_secs, None);
        let heat = config.cleaning.heat_balance.unwrap();
        assert_eq!(heat.flow_column, "CHW_FLOW");
        assert_eq!(heat.load_column, "CH_0_RT");
        let affinity = config.cleaning.affinity.unwrap();
        assert_eq!(affinity.frequency_column.as_deref(), Some("CHWP_HZ_1"));
        assert_eq!(affinity.power_column, None);
        assert!(config.cleaning.steady_state.is_none());
    }

    #[test]
    fn test_invalid_interval_is_rejected() {
        let args = parse(&["bms-etl", "process", "a.csv", "--interval", "5x"]);
        let Command::Process(process) = args.command else {
            panic!("expected process command");
        };
        assert!(process.to_config().is_err());
    }

    #[test]
    fn test_inspect_and_verbose() {
        let args = parse(&["bms-etl", "inspect", "report.csv", "-v"]);
        assert_eq!(args.get_log_level(), "debug");
        assert!(matches!(args.command, Command::Inspect { .. }));
    }

    #[test]
    fn test_parse_compression() {
        assert_eq!(parse_compression("LZ4").unwrap(), CompressionAlgorithm::Lz4);
        assert_eq!(
            parse_compression("none").unwrap(),
            CompressionAlgorithm::Uncompressed
        );
        assert!(parse_compression("brotli").is_err());
    }

    #[test]
    fn test_resolve_files_expands_directories() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("b.csv"), "x").unwrap();
        std::fs::write(temp_dir.path().join("a.csv"), "x").unwrap();
        let single = temp_dir.path().join("single.txt");

        let dir_arg = temp_dir.path().to_string_lossy().to_string();
        let single_arg = single.to_string_lossy().to_string();
        let args = parse(&["bms-etl", "process", &single_arg, &dir_arg]);
        let Command::Process(process) = args.command else {
            panic!("expected process command");
        };

        let files = process.resolve_files().unwrap();
        assert_eq!(
            files,
            vec![
                single,
                temp_dir.path().join("a.csv"),
                temp_dir.path().join("b.csv")
            ]
        );
    }
}
