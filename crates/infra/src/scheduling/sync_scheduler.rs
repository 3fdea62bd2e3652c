//! Periodic sync scheduler
//!
//! Runs `sync_all_eligible(Timer)` on a fixed interval after an optional
//! startup delay. Each pass gets a child of the scheduler's cancellation
//! token, so `stop()` also interrupts a pass that is still running.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tidemark_core::SyncService;
//! use tidemark_infra::scheduling::{SyncScheduler, SyncSchedulerConfig};
//!
//! # async fn example(service: Arc<SyncService>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut scheduler = SyncScheduler::new(service, SyncSchedulerConfig::default());
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tidemark_core::SyncService;
use tidemark_domain::{SchedulerConfig, SyncTriggerType};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Type alias for task handle to avoid complexity warnings
type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Configuration for the sync scheduler
#[derive(Debug, Clone)]
pub struct SyncSchedulerConfig {
    /// Delay before the first pass
    pub startup_delay: Duration,
    /// Time between passes
    pub check_interval: Duration,
    /// How long `stop()` waits for the loop to wind down
    pub shutdown_timeout: Duration,
}

impl Default for SyncSchedulerConfig {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SyncSchedulerConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            startup_delay: config.startup_delay(),
            check_interval: config.check_interval(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Sync scheduler for periodic timer-triggered passes
pub struct SyncScheduler {
    service: Arc<SyncService>,
    config: SyncSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl SyncScheduler {
    pub fn new(service: Arc<SyncService>, config: SyncSchedulerConfig) -> Self {
        Self {
            service,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the scheduler
    ///
    /// Spawns a background task that runs sync passes periodically.
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is already running
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!(
            startup_delay = ?self.config.startup_delay,
            check_interval = ?self.config.check_interval,
            "Starting sync scheduler"
        );

        // Fresh token so the scheduler can be restarted after stop
        self.cancellation_token = CancellationToken::new();

        let service = Arc::clone(&self.service);
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            Self::sync_loop(service, config, cancel).await;
        });

        *self.task_handle.lock().await = Some(handle);

        info!("Sync scheduler started");
        Ok(())
    }

    /// Stop the scheduler gracefully
    ///
    /// Cancels the background task and awaits completion.
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is not running, or the task does not finish
    /// within the shutdown timeout
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        info!("Stopping sync scheduler");

        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            let join_timeout = self.config.shutdown_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|e| SchedulerError::TaskJoinFailed(e.to_string()))?;
        }

        info!("Sync scheduler stopped");
        Ok(())
    }

    /// Check if scheduler is running
    ///
    /// A scheduler is considered running if it has an active task handle that
    /// hasn't finished.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    async fn sync_loop(
        service: Arc<SyncService>,
        config: SyncSchedulerConfig,
        cancel: CancellationToken,
    ) {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("Sync loop cancelled during startup delay");
                return;
            }
            () = tokio::time::sleep(config.startup_delay) => {}
        }

        let mut interval = tokio::time::interval(config.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Sync loop cancelled");
                    break;
                }
                _ = interval.tick() => {
                    Self::run_pass(&service, &cancel).await;
                }
            }
        }
    }

    async fn run_pass(service: &SyncService, cancel: &CancellationToken) {
        let started = Instant::now();
        let pass_cancel = cancel.child_token();

        match service.sync_all_eligible(SyncTriggerType::Timer, &pass_cancel).await {
            Ok(results) => {
                let failed = results.iter().filter(|r| !r.success).count();
                info!(
                    synced = results.len(),
                    failed,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Scheduled sync pass completed"
                );
            }
            Err(e) => {
                error!(error = %e, "Scheduled sync pass failed");
            }
        }
    }
}

/// Ensure scheduler is stopped when dropped
impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SyncScheduler dropped while running; cancelling");
            self.cancellation_token.cancel();
        }
    }
}
