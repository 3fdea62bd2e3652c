//! # Tidemark Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - The in-memory and SQLite sync log stores
//! - Configuration loading (environment and files)
//! - The periodic sync scheduler
//! - Logging bootstrap and error conversions
//!
//! ## Architecture
//! - Implements traits defined in `tidemark-core`
//! - Depends on `tidemark-common` for pooling and storage errors
//! - Contains all "impure" code (I/O, clocks, host identity)

pub mod config;
pub mod database;
pub mod errors;
pub mod logging;
pub mod scheduling;
pub mod store;

// Re-export commonly used items
pub use database::{DbManager, SqliteSyncLogStore};
pub use errors::InfraError;
pub use logging::init_logging;
pub use scheduling::{SchedulerError, SyncScheduler, SyncSchedulerConfig};
pub use store::{build_store, default_machine_id, InMemorySyncLogStore};
