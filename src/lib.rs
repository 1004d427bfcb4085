// file: src/lib.rs
// version: 2.0.0
// guid: f3a8c1e6-5d29-4b07-8e4f-a2c9d6b1e750

//! # Shell Bootstrap Agent
//!
//! Provisions an interactive shell for the account that invoked `sudo`:
//! installs zsh and friends through the host package manager, backs up the
//! existing dotfiles, installs a checksum-verified `.zshrc`, shares it with
//! the root account and switches the login shell.

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod installer;
pub mod logging;
pub mod network;
pub mod reporter;
pub mod security;
pub mod steps;
pub mod testing;
pub mod utils;

pub use error::{BootstrapError, Result};

/// Version information for the agent
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
