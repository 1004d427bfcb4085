// file: src/cli/mod.rs
// version: 2.0.0
// guid: b5e2c8f1-9a3d-4e76-8c10-4d7f2a9b6e03

//! Command line interface for the shell bootstrap agent

pub mod args;
pub mod commands;

pub use args::Cli;
pub use commands::*;
