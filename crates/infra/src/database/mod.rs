//! Database implementations

pub mod manager;
pub mod sync_log_repository;

pub use manager::*;
pub use sync_log_repository::*;
