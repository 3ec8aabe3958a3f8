//! Core shared types for Arbor.
//!
//! This crate is intentionally small and dependency-light.

pub mod paths;

mod type_name;

pub use type_name::TypeName;

/// Version string baked into persisted artifacts and diagnostics.
pub const ARBOR_VERSION: &str = env!("CARGO_PKG_VERSION");
