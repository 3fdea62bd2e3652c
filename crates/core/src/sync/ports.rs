//! Port interfaces for sync orchestration
//!
//! The orchestrator talks to persistence, job implementations and dynamic
//! entity sources only through these traits.

use async_trait::async_trait;
use tidemark_domain::{
    AcquireLeaseBehavior, LogEntry, PriorSyncInfo, Result, SyncResult, SyncTrigger,
    SyncTriggerType,
};
use tokio_util::sync::CancellationToken;

use super::options::SyncEntityOptions;
use super::progress::ProgressReporter;

/// A log entry handed to its acquirer together with the key's history.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquiredLease {
    pub entry: LogEntry,
    pub prior: PriorSyncInfo,
}

/// Persistent store of sync log entries
///
/// Implementations guarantee that for any entity key at most one entry is
/// active (pending or in progress) at a time, and that acquisition plus the
/// prior-sync snapshot are atomic with respect to other acquirers of the same
/// key. Every entry returned is an owned copy.
#[async_trait]
pub trait SyncLogStore: Send + Sync {
    /// Acquire (or create) the active entry for the entity's key.
    ///
    /// Returns `Ok(None)` when another holder owns an unexpired lease and
    /// `behavior` does not force acquisition.
    async fn acquire_lease(
        &self,
        trigger_type: SyncTriggerType,
        entity: &SyncEntityOptions,
        behavior: AcquireLeaseBehavior,
        cancel: &CancellationToken,
    ) -> Result<Option<AcquiredLease>>;

    /// Resume a specific entry, typically one created by the queue fan-out.
    ///
    /// Fails with `NotFound` for unknown ids and `KeyMismatch` when the entry
    /// belongs to a different entity key. Returns `Ok(None)` for entries that
    /// are already terminal or leased by someone else.
    async fn acquire_existing(
        &self,
        entry_id: &str,
        entity: &SyncEntityOptions,
        behavior: AcquireLeaseBehavior,
        cancel: &CancellationToken,
    ) -> Result<Option<AcquiredLease>>;

    /// Persist every mutable field of `entry`.
    ///
    /// Fails with `LeaseLost` when the stored entry has finished or was
    /// leased by someone else since `entry` was read, and with `NotFound`
    /// for unknown ids.
    async fn update_log_entry(&self, entry: &LogEntry, cancel: &CancellationToken) -> Result<()>;

    /// Set only the queue message id of an existing entry.
    ///
    /// Leaves status, lease and result fields as they are in the store, so a
    /// worker that already ran the entry is not undone.
    async fn record_queue_message_id(
        &self,
        entry_id: &str,
        message_id: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn find_by_id(&self, id: &str, cancel: &CancellationToken) -> Result<Option<LogEntry>>;
}

/// Error type returned by job implementations
pub type JobError = anyhow::Error;

/// One entity's synchronization logic
///
/// Jobs must tolerate being invoked again with the same trigger: a crash
/// after the job's side effects but before finalization leads to a rerun.
#[async_trait]
pub trait EntitySync: Send + Sync {
    async fn run(
        &self,
        trigger: &SyncTrigger,
        entity: &SyncEntityOptions,
        progress: &ProgressReporter,
        cancel: CancellationToken,
    ) -> std::result::Result<SyncResult, JobError>;
}

/// Source of entities discovered at run time
#[async_trait]
pub trait EntityProvider: Send + Sync {
    async fn get_entities(&self, cancel: &CancellationToken) -> Result<Vec<SyncEntityOptions>>;
}
