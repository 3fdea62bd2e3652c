//! Sync orchestration service
//!
//! Ties lease acquisition, eligibility, job invocation and finalization
//! together. Outcomes map onto the error taxonomy as follows:
//!
//! | Situation | Return | Entry |
//! |---|---|---|
//! | lease held elsewhere | `Ok(None)` | untouched |
//! | not eligible | `Ok(None)` | `Skipped` |
//! | job failed, errored, panicked or was cancelled | `Ok(Some(failure))` | `Failed` |
//! | job succeeded | `Ok(Some(success))` | `Completed` |
//! | no job registered | `Err(JobNotRegistered)` | `Failed` |
//! | store failure | `Err(..)` | as far as it got |

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tidemark_domain::constants::{
    MSG_NOT_ELIGIBLE, MSG_SYNC_CANCELLED, MSG_SYNC_FAILED, MSG_SYNC_SUCCEEDED,
};
use tidemark_domain::{
    AcquireLeaseBehavior, LogEntry, Result, SyncResult, SyncStatus, SyncTrigger, SyncTriggerType,
    TidemarkError,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::options::SyncEntityOptions;
use super::ports::{AcquiredLease, EntitySync, JobError, SyncLogStore};
use super::progress::ProgressReporter;
use super::registry::JobRegistry;
use super::resolver::EntityResolver;

enum JobOutcome {
    Finished(std::result::Result<SyncResult, JobError>),
    Panicked(String),
    Cancelled,
}

/// Sync orchestrator
pub struct SyncService {
    store: Arc<dyn SyncLogStore>,
    resolver: EntityResolver,
    registry: JobRegistry,
}

impl SyncService {
    pub fn new(store: Arc<dyn SyncLogStore>, resolver: EntityResolver, registry: JobRegistry) -> Self {
        Self { store, resolver, registry }
    }

    pub fn store(&self) -> &Arc<dyn SyncLogStore> {
        &self.store
    }

    pub const fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    /// Run every eligible entity once, sequentially.
    ///
    /// Failures of individual entities (including store and configuration
    /// errors) are logged and do not stop the batch.
    ///
    /// # Errors
    /// Only when the entity list itself cannot be resolved.
    #[instrument(skip(self, cancel), fields(trigger = %trigger_type))]
    pub async fn sync_all_eligible(
        &self,
        trigger_type: SyncTriggerType,
        cancel: &CancellationToken,
    ) -> Result<Vec<SyncResult>> {
        let entities = self.resolver.resolve_entities(cancel).await?;

        if entities.is_empty() {
            warn!("No entities registered for sync, skipping");
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(entities.len());

        for (index, entity) in entities.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(remaining = entities.len() - index, "Sync cancelled, skipping remaining entities");
                break;
            }

            match self.sync_entity_if_eligible(trigger_type, entity, cancel).await {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(err) => {
                    error!(entity = %entity.entity(), error = %err, "Sync failed for entity");
                }
            }
        }

        info!(count = results.len(), "Sync pass completed");
        Ok(results)
    }

    /// Acquire a lease for `entity` and run its job if eligible.
    ///
    /// Manual triggers bypass the eligibility check.
    #[instrument(skip(self, entity, cancel), fields(entity = %entity.entity(), trigger = %trigger_type))]
    pub async fn sync_entity_if_eligible(
        &self,
        trigger_type: SyncTriggerType,
        entity: &SyncEntityOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<SyncResult>> {
        let lease = self
            .store
            .acquire_lease(trigger_type, entity, AcquireLeaseBehavior::AcquireIfNotLeased, cancel)
            .await?;

        let Some(lease) = lease else {
            info!("Entity is already leased, skipping");
            return Ok(None);
        };

        self.run_acquired(trigger_type, entity, lease, cancel).await
    }

    /// Pick up an entry created by the queue fan-out and run it.
    ///
    /// The entry's own trigger type drives eligibility.
    ///
    /// # Errors
    /// `NotFound` for unknown ids, `KeyMismatch` when no configured entity
    /// matches the entry's key, plus any store failure.
    #[instrument(skip(self, cancel))]
    pub async fn sync_queued_entry(
        &self,
        entry_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<SyncResult>> {
        let entry = self
            .store
            .find_by_id(entry_id, cancel)
            .await?
            .ok_or_else(|| TidemarkError::NotFound(format!("sync log entry '{entry_id}'")))?;

        let entity = self.resolver.find_for_entry(&entry, cancel).await?;

        let lease = self
            .store
            .acquire_existing(entry_id, &entity, AcquireLeaseBehavior::AcquireIfNotLeased, cancel)
            .await?;

        let Some(lease) = lease else {
            info!(entity = %entity.entity(), "Queued entry is leased or finished, skipping");
            return Ok(None);
        };

        self.run_acquired(entry.trigger_type, &entity, lease, cancel).await
    }

    async fn run_acquired(
        &self,
        trigger_type: SyncTriggerType,
        entity: &SyncEntityOptions,
        lease: AcquiredLease,
        cancel: &CancellationToken,
    ) -> Result<Option<SyncResult>> {
        let AcquiredLease { mut entry, prior } = lease;
        let trigger = SyncTrigger::new(trigger_type, prior);

        if trigger_type != SyncTriggerType::Manual && !entity.eligibility().is_eligible(&trigger) {
            debug!(entry_id = %entry.id, "Entity is not eligible for sync");
            let skipped = SyncResult::failure(entity.entity(), MSG_NOT_ELIGIBLE);
            self.finalize(entry, SyncStatus::Skipped, &skipped).await?;
            return Ok(None);
        }

        let job = match self.registry.resolve(entity) {
            Ok(job) => job,
            Err(err) => {
                error!(entry_id = %entry.id, error = %err, "Cannot resolve sync job");
                let failed = SyncResult::failure(entity.entity(), err.to_string());
                self.finalize(entry, SyncStatus::Failed, &failed).await?;
                return Err(err);
            }
        };

        entry.status = SyncStatus::InProgress;
        self.store.update_log_entry(&entry, cancel).await?;

        info!(entry_id = %entry.id, "Running sync job");

        let reporter = ProgressReporter::new(Arc::clone(&self.store), entry, cancel.child_token());
        let outcome = invoke_job(job, &trigger, entity, &reporter, cancel).await;
        let entry = reporter.snapshot().await;

        // A lost progress write outranks whatever the job did afterwards.
        if let Some(err) = reporter.take_write_error() {
            error!(entry_id = %entry.id, error = %err, "Progress could not be persisted");
            return Err(err);
        }

        let result = match outcome {
            JobOutcome::Finished(Ok(result)) => result,
            JobOutcome::Finished(Err(err)) => {
                warn!(entry_id = %entry.id, error = %err, "Sync job returned an error");
                SyncResult::failure(entity.entity(), format!("{err:#}"))
            }
            JobOutcome::Panicked(message) => {
                error!(entry_id = %entry.id, panic = %message, "Sync job panicked");
                SyncResult::failure(entity.entity(), format!("sync job panicked: {message}"))
            }
            JobOutcome::Cancelled => {
                warn!(entry_id = %entry.id, "Sync job cancelled");
                SyncResult::failure(entity.entity(), MSG_SYNC_CANCELLED)
            }
        };

        let status = if result.success {
            info!(entry_id = %entry.id, "Sync completed");
            SyncStatus::Completed
        } else {
            warn!(entry_id = %entry.id, message = ?result.message, "Sync failed");
            SyncStatus::Failed
        };

        self.finalize(entry, status, &result).await?;
        Ok(Some(result))
    }

    /// Write the terminal status and result fields.
    ///
    /// Uses a fresh token so a cancelled run still records its outcome.
    async fn finalize(&self, mut entry: LogEntry, status: SyncStatus, result: &SyncResult) -> Result<()> {
        let default_message = if result.success { MSG_SYNC_SUCCEEDED } else { MSG_SYNC_FAILED };

        entry.status = status;
        entry.result_message =
            Some(result.message.clone().unwrap_or_else(|| default_message.to_string()));
        entry.finished_at = Some(Utc::now());
        entry.high_water_mark.clone_from(&result.high_water_mark);
        entry.record_count = result.record_count;

        self.store.update_log_entry(&entry, &CancellationToken::new()).await
    }
}

async fn invoke_job(
    job: Arc<dyn EntitySync>,
    trigger: &SyncTrigger,
    entity: &SyncEntityOptions,
    reporter: &ProgressReporter,
    cancel: &CancellationToken,
) -> JobOutcome {
    let run = AssertUnwindSafe(job.run(trigger, entity, reporter, cancel.child_token())).catch_unwind();

    tokio::select! {
        biased;
        outcome = run => match outcome {
            Ok(finished) => JobOutcome::Finished(finished),
            Err(payload) => JobOutcome::Panicked(panic_message(payload.as_ref())),
        },
        () = cancel.cancelled() => JobOutcome::Cancelled,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
