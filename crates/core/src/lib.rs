//! # Tidemark Core
//!
//! Orchestration logic for lease-based entity sync - no infrastructure
//! dependencies.
//!
//! This crate contains:
//! - Port interfaces (log store, job, entity provider)
//! - Eligibility strategies and entity options
//! - The sync orchestrator and the queue fan-out service
//!
//! ## Architecture Principles
//! - Only depends on `tidemark-domain`
//! - No database or platform code
//! - All persistence via the `SyncLogStore` trait
//! - Pure, testable business logic

pub mod sync;

// Re-export specific items to avoid ambiguity
pub use sync::{
    AcquiredLease, AlwaysEligible, EligibilityStrategy, EntityProvider, EntityResolver,
    EntitySync, IntervalEligibility, JobError, JobFactory, JobRegistry, ProgressReporter,
    SyncEntityOptions, SyncEntityType, SyncLogStore, SyncQueueService, SyncService,
};
