//! Mock log store
//!
//! Hands out a fresh leased entry on every acquisition and records every
//! update. Contention, canned history and write failures are configured per
//! entity name.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use tidemark_core::{AcquiredLease, SyncEntityOptions, SyncLogStore};
use tidemark_domain::{
    AcquireLeaseBehavior, LogEntry, PriorSyncInfo, Result as DomainResult, SyncStatus,
    SyncTriggerType, TidemarkError,
};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct MockLogStore {
    entries: Mutex<Vec<LogEntry>>,
    updates: Mutex<Vec<LogEntry>>,
    contended: HashSet<String>,
    history: HashMap<String, PriorSyncInfo>,
    failing_updates: Mutex<HashMap<String, FailWhen>>,
}

/// Which updates of an entity's entry should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailWhen {
    Always,
    /// Progress writes only (entry is in progress with progress fields set).
    ProgressWrites,
}

impl MockLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquisitions for `entity` report the lease as held elsewhere.
    pub fn with_contention(mut self, entity: &str) -> Self {
        self.contended.insert(entity.to_string());
        self
    }

    pub fn with_history(mut self, entity: &str, prior: PriorSyncInfo) -> Self {
        self.history.insert(entity.to_string(), prior);
        self
    }

    pub fn fail_updates(self, entity: &str, when: FailWhen) -> Self {
        self.failing_updates.lock().insert(entity.to_string(), when);
        self
    }

    /// Insert an entry directly, as if queued earlier.
    pub fn seed(&self, entry: LogEntry) {
        self.entries.lock().push(entry);
    }

    pub fn entry(&self, id: &str) -> Option<LogEntry> {
        self.entries.lock().iter().find(|e| e.id == id).cloned()
    }

    pub fn entries_for(&self, entity: &str) -> Vec<LogEntry> {
        self.entries.lock().iter().filter(|e| e.entity == entity).cloned().collect()
    }

    pub fn updates_for(&self, entity: &str) -> Vec<LogEntry> {
        self.updates.lock().iter().filter(|e| e.entity == entity).cloned().collect()
    }

    fn should_fail(&self, entry: &LogEntry) -> bool {
        match self.failing_updates.lock().get(&entry.entity) {
            Some(FailWhen::Always) => true,
            Some(FailWhen::ProgressWrites) => {
                entry.status == SyncStatus::InProgress && entry.progress_value.is_some()
            }
            None => false,
        }
    }
}

#[async_trait]
impl SyncLogStore for MockLogStore {
    async fn acquire_lease(
        &self,
        trigger_type: SyncTriggerType,
        entity: &SyncEntityOptions,
        behavior: AcquireLeaseBehavior,
        cancel: &CancellationToken,
    ) -> DomainResult<Option<AcquiredLease>> {
        if cancel.is_cancelled() {
            return Err(TidemarkError::Cancelled);
        }
        if self.contended.contains(entity.entity()) {
            return Ok(None);
        }

        let mut entries = self.entries.lock();
        let now = Utc::now();
        let mut entry =
            LogEntry::pending((entries.len() + 1).to_string(), &entity.key(), trigger_type, now);
        if behavior != AcquireLeaseBehavior::DoNotAcquire {
            entry.leased_at = Some(now);
            entry.leased_by = Some("test-host".into());
            entry.lease_expires_at =
                Some(now + entity.lease_expiration().unwrap_or_else(|| Duration::hours(1)));
        }
        entries.push(entry.clone());

        let prior = self.history.get(entity.entity()).cloned().unwrap_or_default();
        Ok(Some(AcquiredLease { entry, prior }))
    }

    async fn acquire_existing(
        &self,
        entry_id: &str,
        entity: &SyncEntityOptions,
        behavior: AcquireLeaseBehavior,
        _cancel: &CancellationToken,
    ) -> DomainResult<Option<AcquiredLease>> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.iter_mut().find(|e| e.id == entry_id) else {
            return Err(TidemarkError::NotFound(entry_id.to_string()));
        };
        if !entity.matches_entry(entry) {
            return Err(TidemarkError::KeyMismatch(entry_id.to_string()));
        }
        if !entry.is_active() || (entry.is_leased() && behavior != AcquireLeaseBehavior::ForceAcquire)
        {
            return Ok(None);
        }

        if behavior != AcquireLeaseBehavior::DoNotAcquire {
            entry.leased_at = Some(Utc::now());
            entry.leased_by = Some("test-host".into());
        }
        let prior = self.history.get(entity.entity()).cloned().unwrap_or_default();
        Ok(Some(AcquiredLease { entry: entry.clone(), prior }))
    }

    async fn update_log_entry(
        &self,
        entry: &LogEntry,
        _cancel: &CancellationToken,
    ) -> DomainResult<()> {
        if self.should_fail(entry) {
            return Err(TidemarkError::Database(format!("write rejected for {}", entry.entity)));
        }

        let mut entries = self.entries.lock();
        let Some(slot) = entries.iter_mut().find(|e| e.id == entry.id) else {
            return Err(TidemarkError::NotFound(entry.id.clone()));
        };
        *slot = entry.clone();
        self.updates.lock().push(entry.clone());
        Ok(())
    }

    async fn record_queue_message_id(
        &self,
        entry_id: &str,
        message_id: &str,
        _cancel: &CancellationToken,
    ) -> DomainResult<()> {
        let mut entries = self.entries.lock();
        let Some(slot) = entries.iter_mut().find(|e| e.id == entry_id) else {
            return Err(TidemarkError::NotFound(entry_id.to_string()));
        };
        slot.queue_message_id = Some(message_id.to_string());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &str,
        _cancel: &CancellationToken,
    ) -> DomainResult<Option<LogEntry>> {
        Ok(self.entry(id))
    }
}
