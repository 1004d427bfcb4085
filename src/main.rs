// file: src/main.rs
// version: 2.0.0
// guid: e1f4a7c2-8b3d-4d59-9f06-2c8e5b1a7d34

//! Shell Bootstrap Agent - Main entry point

use clap::Parser;
use colored::Colorize;
use shell_bootstrap_agent::{
    cli::{args::Cli, commands::run_command},
    logging::logger,
};
use std::process::ExitCode;
use tokio::signal;
use tracing::warn;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logger::init_logger(cli.debug, Some(&cli.log_dir)) {
        eprintln!("{} {}", "warning:".yellow().bold(), e);
    }

    // Dropping the run future on Ctrl-C removes its temporary files
    let outcome = tokio::select! {
        result = run_command(&cli) => Some(result),
        _ = signal::ctrl_c() => None,
    };

    match outcome {
        Some(Ok(_)) => ExitCode::SUCCESS,
        Some(Err(e)) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::from(e.exit_code() as u8)
        }
        None => {
            warn!("Interrupted, no further changes made");
            eprintln!("{} interrupted", "error:".red().bold());
            ExitCode::from(130)
        }
    }
}
