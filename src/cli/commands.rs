// file: src/cli/commands.rs
// version: 2.0.0
// guid: 6a1d9e3b-4f72-4c05-8b2e-d7f3a0c1e948

//! Command implementations for the CLI

use crate::{
    cli::args::Cli,
    config::loader::ConfigLoader,
    error::BootstrapError,
    executor::{CommandRunner, DryRunRunner, LocalRunner},
    installer::{Host, InstallOptions, InstallReport, Installer, Phase},
    network::download::{CommandTransport, HttpTransport, Transport},
    reporter::TracingReporter,
    steps::{StepRecord, StepStatus},
    utils::system::{SystemUserDirectory, SystemUtils, ToolLocator, WhichLocator},
    Result,
};
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Wire the real host collaborators and run the installer
///
/// The summary of recorded steps is printed whether or not the run succeeds.
pub async fn run_command(cli: &Cli) -> Result<InstallReport> {
    let config = ConfigLoader::new().load(cli.config.as_deref())?;
    let os = SystemUtils::current_os()
        .ok_or_else(|| BootstrapError::UnsupportedDistro(std::env::consts::OS.to_string()))?;

    let timeout = Duration::from_secs(config.command_timeout_secs);
    let runner: Arc<dyn CommandRunner> = if cli.dry_run {
        Arc::new(DryRunRunner)
    } else {
        Arc::new(LocalRunner::new(timeout))
    };
    let tools: Arc<dyn ToolLocator> = Arc::new(WhichLocator);
    let transports: Vec<Arc<dyn Transport>> = vec![
        Arc::new(HttpTransport::new()?) as Arc<dyn Transport>,
        Arc::new(CommandTransport::new(tools.clone())) as Arc<dyn Transport>,
    ];

    let host = Host {
        users: Arc::new(SystemUserDirectory::new(os)),
        runner,
        query_runner: Arc::new(LocalRunner::new(timeout)),
        tools,
        transports,
        reporter: Arc::new(TracingReporter),
        os: Some(os),
        delegate: std::env::var(&config.delegate_env).ok(),
    };
    let options = InstallOptions {
        dry_run: cli.dry_run,
        no_backup: cli.no_backup,
        no_shell: cli.no_shell,
    };

    if cli.dry_run {
        info!("Dry-run: privileged commands are reported, not executed");
    }

    let installer = Installer::new(config, host, options);
    let result = installer.run().await;
    print_summary(&installer.steps());

    if let Ok(report) = &result {
        if report.phase == Phase::Resume {
            info!("Resumed run for {}", report.real_user);
        }
        if report.resume.is_awaiting() {
            println!(
                "\n{} run this tool again after `p10k configure` to finish linking",
                "Next:".yellow().bold()
            );
        }
    }
    result
}

fn status_label(status: StepStatus) -> colored::ColoredString {
    match status {
        StepStatus::Completed => "ok".green(),
        StepStatus::Skipped => "skip".dimmed(),
        StepStatus::Warning => "warn".yellow(),
        StepStatus::Failed => "FAIL".red().bold(),
    }
}

/// Print one line per recorded step
pub fn print_summary(steps: &[StepRecord]) {
    if steps.is_empty() {
        return;
    }

    println!("\n{}", "Summary".bold());
    for step in steps {
        println!(
            "  {:<5} {:<10} {} ({:.1}s)",
            status_label(step.status),
            step.name,
            step.message,
            step.elapsed.as_secs_f64()
        );
    }
}
