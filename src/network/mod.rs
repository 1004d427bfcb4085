// file: src/network/mod.rs
// version: 2.0.0
// guid: 8d2f6a0c-3e51-4b97-9c7a-f4b0e2d5a183

//! Network operations module

pub mod download;
pub mod fetch;

pub use download::{download_with_fallback, CommandTransport, HttpTransport, RetryPolicy, Transport};
pub use fetch::{FetchedConfig, TrustedFetch};
