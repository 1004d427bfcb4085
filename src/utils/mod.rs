// file: src/utils/mod.rs
// version: 2.1.0
// guid: 5e9b1d4a-7c36-4a80-b2f5-1d6e8c3a0f97

//! Utility modules for system operations

pub mod crypto;
pub mod fs;
pub mod system;

pub use system::SystemUtils;
