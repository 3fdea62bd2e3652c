//! Infrastructure utilities shared across Tidemark crates.
//!
//! - `error`: classification of infrastructure errors (retryable, severity)
//! - `storage`: r2d2 SQLite pooling and the storage error type

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod error;
pub mod storage;

pub use error::{ErrorClassification, ErrorSeverity};
pub use storage::{StorageError, StorageResult};
