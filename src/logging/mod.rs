// file: src/logging/mod.rs
// version: 2.0.0
// guid: 9a3f5e21-0d7c-4b68-a1e4-6c2b8f0d3e57

//! Logging setup for the bootstrap agent

pub mod logger;

pub use logger::{init_logger, with_operation_span};
