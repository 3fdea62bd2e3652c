//! Queue fan-out service
//!
//! Creates pending entries without taking leases so that external workers
//! can pick them up later through [`super::SyncService::sync_queued_entry`].
//! Publishing to the actual queue happens between the two calls here:
//!
//! 1. `create_all_queued_sync_entries` reserves one entry per entity
//! 2. the caller publishes a message per entry
//! 3. `record_queue_message_id` stores the transport's message id
//!
//! A crash between steps 2 and 3 leaves an entry without a message id.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tidemark_domain::constants::MSG_NOT_ELIGIBLE;
use tidemark_domain::{
    AcquireLeaseBehavior, LogEntry, QueueBehavior, Result, SyncStatus, SyncTrigger,
    SyncTriggerType, TidemarkError,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::options::SyncEntityOptions;
use super::ports::{AcquiredLease, SyncLogStore};
use super::resolver::EntityResolver;

pub struct SyncQueueService {
    store: Arc<dyn SyncLogStore>,
    resolver: EntityResolver,
}

impl SyncQueueService {
    pub fn new(store: Arc<dyn SyncLogStore>, resolver: EntityResolver) -> Self {
        Self { store, resolver }
    }

    /// Reserve a pending entry for every entity and stamp it as queued.
    ///
    /// Entities whose active entry is already leased are skipped. With
    /// [`QueueBehavior::QueueEligibleOnly`] a non-manual trigger also skips
    /// entities that are not eligible. A freshly reserved entry is then
    /// finalized as `Skipped`; an entry queued by an earlier fan-out stays
    /// pending for the worker holding its message. Failures for one entity
    /// are logged and do not affect the others.
    ///
    /// # Errors
    /// Only when the entity list itself cannot be resolved.
    #[instrument(skip(self, cancel), fields(trigger = %trigger_type, behavior = %behavior))]
    pub async fn create_all_queued_sync_entries(
        &self,
        trigger_type: SyncTriggerType,
        behavior: QueueBehavior,
        cancel: &CancellationToken,
    ) -> Result<Vec<LogEntry>> {
        let entities = self.resolver.resolve_entities(cancel).await?;

        if entities.is_empty() {
            warn!("No entities registered for sync, skipping queue creation");
            return Ok(Vec::new());
        }

        let queued_at = Utc::now();
        let mut queued = Vec::with_capacity(entities.len());

        for entity in &entities {
            match self.queue_entity(trigger_type, behavior, entity, queued_at, cancel).await {
                Ok(Some(entry)) => {
                    debug!(entity = %entity.entity(), entry_id = %entry.id, "Created queued sync entry");
                    queued.push(entry);
                }
                Ok(None) => {}
                Err(err) => {
                    error!(entity = %entity.entity(), error = %err, "Failed to create queued sync entry");
                }
            }
        }

        info!(count = queued.len(), "Created queued sync entries for distributed processing");
        Ok(queued)
    }

    async fn queue_entity(
        &self,
        trigger_type: SyncTriggerType,
        behavior: QueueBehavior,
        entity: &SyncEntityOptions,
        queued_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Option<LogEntry>> {
        let lease = self
            .store
            .acquire_lease(trigger_type, entity, AcquireLeaseBehavior::DoNotAcquire, cancel)
            .await?;

        let Some(AcquiredLease { mut entry, prior }) = lease else {
            debug!(entity = %entity.entity(), "Entity is already leased, not queueing");
            return Ok(None);
        };

        if behavior == QueueBehavior::QueueEligibleOnly
            && trigger_type != SyncTriggerType::Manual
            && !entity.eligibility().is_eligible(&SyncTrigger::new(trigger_type, prior))
        {
            if entry.queued_at.is_some() {
                debug!(
                    entity = %entity.entity(),
                    entry_id = %entry.id,
                    "Entity is not eligible, leaving earlier queued entry to its worker"
                );
                return Ok(None);
            }
            debug!(entity = %entity.entity(), "Entity is not eligible, not queueing");
            entry.status = SyncStatus::Skipped;
            entry.result_message = Some(MSG_NOT_ELIGIBLE.to_string());
            entry.finished_at = Some(Utc::now());
            self.store.update_log_entry(&entry, cancel).await?;
            return Ok(None);
        }

        entry.status = SyncStatus::Pending;
        entry.queued_at = Some(queued_at);
        self.store.update_log_entry(&entry, cancel).await?;

        Ok(Some(entry))
    }

    /// Attach the transport's message id to a queued entry.
    ///
    /// Only the message id is written, so recording after a worker already
    /// picked the entry up keeps the worker's status and result.
    ///
    /// # Errors
    /// `InvalidInput` for blank arguments, `NotFound` for unknown entries.
    #[instrument(skip(self, cancel))]
    pub async fn record_queue_message_id(
        &self,
        entry_id: &str,
        message_id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if entry_id.trim().is_empty() {
            return Err(TidemarkError::InvalidInput("sync log entry id must not be blank".into()));
        }
        if message_id.trim().is_empty() {
            return Err(TidemarkError::InvalidInput("queue message id must not be blank".into()));
        }

        if let Err(err) = self.store.record_queue_message_id(entry_id, message_id, cancel).await {
            warn!(error = %err, "Failed to record queue message id");
            return Err(err);
        }

        debug!("Recorded queue message id");
        Ok(())
    }
}
