//! Entry point for the `distlock` binary.

use std::process::ExitCode;

use clap::Parser;
use distlock_cli::command::EXIT_FAILURE;
use distlock_cli::{Cli, Command, metrics, startup};
use tracing::{error, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging_config = startup::LoggingConfig::from_env();
    let _logging_guard = match startup::init_logging(&logging_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("distlock: {:#}, continuing without logging", e);
            None
        }
    };

    let metrics_handle = match metrics::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Metrics disabled");
            None
        }
    };

    let (result, metrics_file) = match cli.command {
        Command::Run(args) => {
            let metrics_file = args.metrics_file.clone();
            (distlock_cli::run(args).await, metrics_file)
        }
    };

    if let (Some(handle), Some(path)) = (&metrics_handle, &metrics_file) {
        if let Err(e) = metrics::write_metrics(handle, path) {
            warn!(error = %e, "Failed to write metrics file");
            eprintln!("distlock: {:#}", e);
        }
    }

    match result {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            error!(error = %e, "distlock failed");
            eprintln!("distlock: {:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
