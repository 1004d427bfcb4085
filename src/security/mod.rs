// file: src/security/mod.rs
// version: 2.0.0
// guid: 0c7a3e9f-2b5d-4f18-a6c4-8e1d3b7f9a52

//! Input validation and privilege resolution

pub mod identity;
pub mod validator;

pub use identity::{resolve_identity, Identity};
pub use validator::{validate_identifier, IdentifierKind};
