//! # Tidemark Domain
//!
//! Business domain types for lease-based sync scheduling.
//!
//! This crate contains:
//! - Sync log entries, triggers, results and the enums that drive them
//! - Entity keys and parameter canonicalization
//! - Domain error types and Result definitions
//! - Configuration structures and defaults
//!
//! ## Architecture
//! - No dependencies on other Tidemark crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
