// file: src/cli/args.rs
// version: 2.0.0
// guid: 3c8e1f5a-7d24-4b90-a6e3-0f9b2d4c8e71

//! Command line argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "shell-bootstrap")]
#[command(about = "Install zsh, fetch a verified shell configuration and make it the login shell")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Report what would change without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Do not archive existing dotfiles before replacing them
    #[arg(long)]
    pub no_backup: bool,

    /// Leave the login shell unchanged
    #[arg(long)]
    pub no_shell: bool,

    /// Verbose logging
    #[arg(long, env = "SHELL_BOOTSTRAP_DEBUG")]
    pub debug: bool,

    /// Configuration file (TOML)
    #[arg(long, env = "SHELL_BOOTSTRAP_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory for the run's log file
    #[arg(long, value_name = "DIR", default_value = "/var/log/shell-bootstrap")]
    pub log_dir: PathBuf,
}
