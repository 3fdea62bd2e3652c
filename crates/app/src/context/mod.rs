//! Application context - dependency injection container

use std::sync::Arc;
use std::time::Duration;

use tidemark_core::{EntityResolver, SyncLogStore, SyncQueueService, SyncService};
use tidemark_domain::{Config, Result, TidemarkError};
use tidemark_infra::{build_store, SyncScheduler, SyncSchedulerConfig};
use tracing::{error, info};

use crate::jobs::{demo_entities, demo_registry};

/// Pause between progress steps of the demo jobs
pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(250);

/// Application context - holds the store and both sync entry paths
pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn SyncLogStore>,
    pub sync_service: Arc<SyncService>,
    pub queue_service: Arc<SyncQueueService>,
}

impl AppContext {
    /// Build the store named in `config` and wire the demo entities to it.
    ///
    /// # Errors
    /// Returns an error when the store cannot be opened or migrated.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_step_delay(config, DEFAULT_STEP_DELAY)
    }

    /// Same as [`AppContext::new`] with a custom pause between job steps.
    ///
    /// # Errors
    /// Returns an error when the store cannot be opened or migrated.
    pub fn with_step_delay(config: Config, step_delay: Duration) -> Result<Self> {
        let store = build_store(&config)?;
        let entities = demo_entities();

        let sync_service = Arc::new(SyncService::new(
            Arc::clone(&store),
            EntityResolver::new(entities.clone()),
            demo_registry(step_delay),
        ));
        let queue_service =
            Arc::new(SyncQueueService::new(Arc::clone(&store), EntityResolver::new(entities)));

        info!(backend = %config.store.backend, "Application context initialised");

        Ok(Self { config, store, sync_service, queue_service })
    }

    /// Start the periodic scheduler.
    ///
    /// # Errors
    /// Returns `TidemarkError::Internal` when start does not complete within
    /// ten seconds or the scheduler refuses to start.
    pub async fn start_scheduler(&self) -> Result<SyncScheduler> {
        let scheduler_config = SyncSchedulerConfig::from(&self.config.scheduler);
        let mut scheduler = SyncScheduler::new(Arc::clone(&self.sync_service), scheduler_config);

        // Fail fast if the scheduler cannot start
        let start_timeout = Duration::from_secs(10);
        tokio::time::timeout(start_timeout, scheduler.start())
            .await
            .map_err(|_| {
                error!(timeout_secs = 10, "SyncScheduler start timed out");
                TidemarkError::Internal("SyncScheduler start timed out after 10s".into())
            })?
            .map_err(|err| {
                error!(error = %err, "failed to start SyncScheduler");
                TidemarkError::from(err)
            })?;

        Ok(scheduler)
    }
}
