//! Log store backends
//!
//! Both backends implement [`SyncLogStore`] with the same acquisition rules:
//!
//! - at most one active (pending or in-progress) entry per entity key
//! - an overdue lease is marked `lease_expired` by the next acquirer, which
//!   then gets a fresh entry
//! - an unexpired lease blocks everyone except `ForceAcquire`
//! - `DoNotAcquire` reserves an entry without stamping lease fields
//! - a full-row update is refused with `LeaseLost` once the stored entry has
//!   finished or been re-leased since the writer took its copy

pub mod memory;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tidemark_core::{SyncEntityOptions, SyncLogStore};
use tidemark_domain::{
    AcquireLeaseBehavior, Config, EntityKey, LogEntry, Result, StoreBackend, StoreConfig,
    SyncTriggerType, TidemarkError,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use memory::InMemorySyncLogStore;

use crate::database::{DbManager, SqliteSyncLogStore};

const UNKNOWN_MACHINE_ID: &str = "unknown-host";

/// Everything a backend needs to acquire a lease, detached from the entity's
/// strategy objects so it can cross into blocking tasks.
#[derive(Debug, Clone)]
pub(crate) struct LeaseRequest {
    pub key: EntityKey,
    pub trigger_type: SyncTriggerType,
    pub behavior: AcquireLeaseBehavior,
    pub lease_duration: Duration,
}

impl LeaseRequest {
    pub fn new(
        config: &StoreConfig,
        trigger_type: SyncTriggerType,
        entity: &SyncEntityOptions,
        behavior: AcquireLeaseBehavior,
    ) -> Self {
        Self {
            key: entity.key(),
            trigger_type,
            behavior,
            lease_duration: Self::lease_duration(config, entity),
        }
    }

    /// Entity override, or the store's default lease length.
    pub fn lease_duration(config: &StoreConfig, entity: &SyncEntityOptions) -> Duration {
        entity.lease_expiration().unwrap_or(config.default_lease_expiration)
    }

    /// Stamp lease fields onto `entry` unless the request only reserves.
    pub fn stamp(&self, entry: &mut LogEntry, machine_id: &str, now: DateTime<Utc>) {
        if self.behavior == AcquireLeaseBehavior::DoNotAcquire {
            return;
        }
        entry.leased_at = Some(now);
        entry.leased_by = Some(machine_id.to_string());
        entry.lease_expires_at = Some(now + self.lease_duration);
    }

    /// An unexpired lease blocks acquisition unless forced.
    pub fn blocked_by(&self, active: &LogEntry) -> bool {
        active.is_leased() && self.behavior != AcquireLeaseBehavior::ForceAcquire
    }
}

/// Check that `incoming` may overwrite `stored`.
///
/// A terminal entry keeps its status, and a leased entry only accepts writes
/// carrying the same lease stamp. Stamps are compared at millisecond
/// precision, which is what the SQLite backend keeps.
pub(crate) fn check_update(stored: &LogEntry, incoming: &LogEntry) -> Result<()> {
    if stored.status.is_terminal() && incoming.status != stored.status {
        return Err(TidemarkError::LeaseLost(format!(
            "sync log entry '{}' is already {}",
            stored.id, stored.status
        )));
    }

    let stamp = |entry: &LogEntry| {
        (entry.leased_at.map(|at| at.timestamp_millis()), entry.leased_by.clone())
    };
    if stored.leased_at.is_some() && stamp(stored) != stamp(incoming) {
        return Err(TidemarkError::LeaseLost(format!(
            "sync log entry '{}' was leased again by {}",
            stored.id,
            stored.leased_by.as_deref().unwrap_or("another holder")
        )));
    }
    Ok(())
}

pub(crate) fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(TidemarkError::Cancelled);
    }
    Ok(())
}

/// Host name of this machine, used as the default lease holder.
pub fn default_machine_id() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_MACHINE_ID.to_string())
}

/// Build the configured log store backend.
///
/// The SQLite backend opens the database and runs migrations before
/// returning.
///
/// # Errors
/// Returns `TidemarkError::Database` when the database cannot be opened or
/// migrated.
pub fn build_store(config: &Config) -> Result<Arc<dyn SyncLogStore>> {
    let store_config = config.store.to_store_config(default_machine_id());

    match config.store.backend {
        StoreBackend::Memory => {
            info!(machine_id = %store_config.machine_id, "Using in-memory sync log store");
            Ok(Arc::new(InMemorySyncLogStore::new(store_config)))
        }
        StoreBackend::Sqlite => {
            let db = DbManager::new(&config.database.path, config.database.pool_size)?;
            db.run_migrations()?;
            info!(
                machine_id = %store_config.machine_id,
                db_path = %db.path().display(),
                "Using SQLite sync log store"
            );
            Ok(Arc::new(SqliteSyncLogStore::new(Arc::new(db), store_config)))
        }
    }
}
