//! Application constants
//!
//! Centralized location for domain-level defaults and fixed messages.

// Lease and eligibility defaults
pub const DEFAULT_LEASE_EXPIRATION_SECS: u64 = 86_400;
pub const DEFAULT_ELIGIBILITY_INTERVAL_SECS: u64 = 86_400;

// Scheduler defaults
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

// Database defaults
pub const DEFAULT_DB_PATH: &str = "tidemark.db";
pub const DEFAULT_POOL_SIZE: u32 = 8;

// Result messages written to finalized log entries
pub const MSG_SYNC_SUCCEEDED: &str = "sync completed successfully";
pub const MSG_SYNC_FAILED: &str = "sync failed";
pub const MSG_NOT_ELIGIBLE: &str = "entity is not eligible for sync";
pub const MSG_SYNC_CANCELLED: &str = "sync cancelled";
