//! In-memory log store
//!
//! Entries live in a single arena behind one write lock, so acquisition is
//! serialized across all keys. Ids are the 1-based arena position rendered
//! as a string. Nothing survives a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tidemark_core::{AcquiredLease, SyncEntityOptions, SyncLogStore};
use tidemark_domain::{
    AcquireLeaseBehavior, EntityKey, LogEntry, PriorSyncInfo, Result, StoreConfig, SyncStatus,
    SyncTriggerType, TidemarkError,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{check_update, ensure_not_cancelled, LeaseRequest};

pub struct InMemorySyncLogStore {
    config: StoreConfig,
    entries: RwLock<Vec<LogEntry>>,
}

impl InMemorySyncLogStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config, entries: RwLock::new(Vec::new()) }
    }

    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Copy of every entry for `key`, oldest first.
    pub fn entries_for(&self, key: &EntityKey) -> Vec<LogEntry> {
        self.entries.read().iter().filter(|e| e.matches_key(key)).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Acquire under the caller's write guard.
    fn acquire_locked(
        &self,
        entries: &mut Vec<LogEntry>,
        request: &LeaseRequest,
        now: DateTime<Utc>,
    ) -> Option<AcquiredLease> {
        let mut active = entries.iter().rposition(|e| e.is_active() && e.matches_key(&request.key));

        if let Some(index) = active {
            let entry = &mut entries[index];
            if entry.lease_expired_at(now) {
                warn!(
                    entity = %entry.entity,
                    entry_id = %entry.id,
                    "Lease expired, marking sync log entry as lease expired"
                );
                entry.status = SyncStatus::LeaseExpired;
                active = None;
            } else if request.blocked_by(entry) {
                debug!(entity = %entry.entity, entry_id = %entry.id, "Sync log entry already leased");
                return None;
            }
        }

        let prior = PriorSyncInfo::from_history(entries.iter().filter(|e| e.matches_key(&request.key)));

        let index = match active {
            Some(index) => index,
            None => {
                let id = (entries.len() + 1).to_string();
                entries.push(LogEntry::pending(id, &request.key, request.trigger_type, now));
                entries.len() - 1
            }
        };

        let entry = &mut entries[index];
        request.stamp(entry, &self.config.machine_id, now);

        Some(AcquiredLease { entry: entry.clone(), prior })
    }
}

fn position_of(entries: &[LogEntry], id: &str) -> Option<usize> {
    let index = id.parse::<usize>().ok()?.checked_sub(1)?;
    (index < entries.len()).then_some(index)
}

#[async_trait]
impl SyncLogStore for InMemorySyncLogStore {
    async fn acquire_lease(
        &self,
        trigger_type: SyncTriggerType,
        entity: &SyncEntityOptions,
        behavior: AcquireLeaseBehavior,
        cancel: &CancellationToken,
    ) -> Result<Option<AcquiredLease>> {
        ensure_not_cancelled(cancel)?;

        let request = LeaseRequest::new(&self.config, trigger_type, entity, behavior);
        let mut entries = self.entries.write();
        Ok(self.acquire_locked(&mut entries, &request, Utc::now()))
    }

    async fn acquire_existing(
        &self,
        entry_id: &str,
        entity: &SyncEntityOptions,
        behavior: AcquireLeaseBehavior,
        cancel: &CancellationToken,
    ) -> Result<Option<AcquiredLease>> {
        ensure_not_cancelled(cancel)?;

        let mut entries = self.entries.write();
        let index = position_of(&entries, entry_id)
            .ok_or_else(|| TidemarkError::NotFound(format!("sync log entry '{entry_id}'")))?;

        let now = Utc::now();
        let entry = &entries[index];
        if !entity.matches_entry(entry) {
            return Err(TidemarkError::KeyMismatch(format!(
                "sync log entry '{entry_id}' does not belong to entity '{}'",
                entity.entity()
            )));
        }
        if !entry.is_active() {
            debug!(entry_id, status = %entry.status, "Sync log entry already finished");
            return Ok(None);
        }

        let request = LeaseRequest::new(&self.config, entry.trigger_type, entity, behavior);
        if entry.lease_expired_at(now) {
            // Expires the entry and hands out a fresh one for the same key.
            return Ok(self.acquire_locked(&mut entries, &request, now));
        }
        if request.blocked_by(entry) {
            debug!(entry_id, "Sync log entry already leased");
            return Ok(None);
        }

        let prior = PriorSyncInfo::from_history(entries.iter().filter(|e| e.matches_key(&request.key)));
        let entry = &mut entries[index];
        request.stamp(entry, &self.config.machine_id, now);

        Ok(Some(AcquiredLease { entry: entry.clone(), prior }))
    }

    async fn update_log_entry(&self, entry: &LogEntry, cancel: &CancellationToken) -> Result<()> {
        ensure_not_cancelled(cancel)?;

        let mut entries = self.entries.write();
        let index = position_of(&entries, &entry.id)
            .ok_or_else(|| TidemarkError::NotFound(format!("sync log entry '{}'", entry.id)))?;
        check_update(&entries[index], entry)?;
        entries[index] = entry.clone();
        Ok(())
    }

    async fn record_queue_message_id(
        &self,
        entry_id: &str,
        message_id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_not_cancelled(cancel)?;

        let mut entries = self.entries.write();
        let index = position_of(&entries, entry_id)
            .ok_or_else(|| TidemarkError::NotFound(format!("sync log entry '{entry_id}'")))?;
        entries[index].queue_message_id = Some(message_id.to_string());
        Ok(())
    }

    async fn find_by_id(&self, id: &str, cancel: &CancellationToken) -> Result<Option<LogEntry>> {
        ensure_not_cancelled(cancel)?;

        let entries = self.entries.read();
        Ok(position_of(&entries, id).map(|index| entries[index].clone()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tidemark_core::SyncEntityOptions;

    use super::*;

    fn store() -> InMemorySyncLogStore {
        InMemorySyncLogStore::new(StoreConfig::new("worker-1"))
    }

    fn orders() -> SyncEntityOptions {
        SyncEntityOptions::new("Orders", "orders")
    }

    async fn acquire(
        store: &InMemorySyncLogStore,
        entity: &SyncEntityOptions,
        behavior: AcquireLeaseBehavior,
    ) -> Option<AcquiredLease> {
        store
            .acquire_lease(SyncTriggerType::Timer, entity, behavior, &CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ids_are_sequential() {
        let store = store();
        let cancel = CancellationToken::new();

        let first = acquire(&store, &orders(), AcquireLeaseBehavior::AcquireIfNotLeased).await.unwrap();
        let mut finished = first.entry.clone();
        finished.status = SyncStatus::Completed;
        store.update_log_entry(&finished, &cancel).await.unwrap();
        let second =
            acquire(&store, &orders(), AcquireLeaseBehavior::AcquireIfNotLeased).await.unwrap();

        assert_eq!(first.entry.id, "1");
        assert_eq!(second.entry.id, "2");
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_returned_entries_are_copies() {
        let store = store();

        let mut lease =
            acquire(&store, &orders(), AcquireLeaseBehavior::AcquireIfNotLeased).await.unwrap();
        lease.entry.status = SyncStatus::Completed;

        let stored = store.find_by_id("1", &CancellationToken::new()).await.unwrap().unwrap();
        assert_eq!(stored.status, SyncStatus::Pending);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lease_fields_use_machine_id_and_duration() {
        let store = store();
        let entity = orders().with_lease_expiration(Duration::minutes(10));

        let lease = acquire(&store, &entity, AcquireLeaseBehavior::AcquireIfNotLeased).await.unwrap();

        let entry = lease.entry;
        assert_eq!(entry.leased_by.as_deref(), Some("worker-1"));
        let leased_at = entry.leased_at.unwrap();
        assert_eq!(entry.lease_expires_at.unwrap() - leased_at, Duration::minutes(10));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_force_acquire_restamps_active_entry() {
        let store = store();

        let first = acquire(&store, &orders(), AcquireLeaseBehavior::AcquireIfNotLeased).await.unwrap();
        let forced = acquire(&store, &orders(), AcquireLeaseBehavior::ForceAcquire).await.unwrap();

        assert_eq!(forced.entry.id, first.entry.id);
        assert!(forced.entry.leased_at >= first.entry.leased_at);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reserved_entry_is_reused_by_next_acquirer() {
        let store = store();

        let reserved = acquire(&store, &orders(), AcquireLeaseBehavior::DoNotAcquire).await.unwrap();
        assert!(reserved.entry.leased_at.is_none());

        let leased =
            acquire(&store, &orders(), AcquireLeaseBehavior::AcquireIfNotLeased).await.unwrap();
        assert_eq!(leased.entry.id, reserved.entry.id);
        assert!(leased.entry.leased_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_unknown_entry_is_not_found() {
        let store = store();
        let entry = LogEntry::pending("99", &orders().key(), SyncTriggerType::Manual, Utc::now());

        let result = store.update_log_entry(&entry, &CancellationToken::new()).await;
        assert!(matches!(result, Err(TidemarkError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_find_by_id_rejects_malformed_ids() {
        let store = store();
        let cancel = CancellationToken::new();
        acquire(&store, &orders(), AcquireLeaseBehavior::AcquireIfNotLeased).await.unwrap();

        assert!(store.find_by_id("0", &cancel).await.unwrap().is_none());
        assert!(store.find_by_id("abc", &cancel).await.unwrap().is_none());
        assert!(store.find_by_id("1", &cancel).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancelled_token_short_circuits() {
        let store = store();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = store
            .acquire_lease(
                SyncTriggerType::Timer,
                &orders(),
                AcquireLeaseBehavior::AcquireIfNotLeased,
                &cancel,
            )
            .await;
        assert!(matches!(result, Err(TidemarkError::Cancelled)));
        assert!(store.is_empty());
    }
}
