//! Lease-based sync orchestration
//!
//! - `ports`: store, job and provider traits
//! - `eligibility`: pure strategies deciding whether a trigger proceeds
//! - `options`: per-entity configuration and key derivation
//! - `registry` / `resolver`: explicit job and entity lookup
//! - `service` / `queue`: the two entry paths (direct run and queue fan-out)

pub mod eligibility;
pub mod options;
pub mod ports;
pub mod progress;
pub mod queue;
pub mod registry;
pub mod resolver;
pub mod service;

pub use eligibility::{AlwaysEligible, EligibilityStrategy, IntervalEligibility};
pub use options::{SyncEntityOptions, SyncEntityType};
pub use ports::{AcquiredLease, EntityProvider, EntitySync, JobError, SyncLogStore};
pub use progress::ProgressReporter;
pub use queue::SyncQueueService;
pub use registry::{JobFactory, JobRegistry};
pub use resolver::EntityResolver;
pub use service::SyncService;
