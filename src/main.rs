use bms_etl::cli::{self, Args};
use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    cli::setup_logging(&args);

    // Ctrl+C stops new files from starting; files in flight still finish
    let cancellation_token = CancellationToken::new();
    let signal_token = cancellation_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived CTRL+C, finishing files in progress...");
            signal_token.cancel();
        }
    });

    match cli::run(args, cancellation_token).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {:#}", error);
            ExitCode::FAILURE
        }
    }
}
