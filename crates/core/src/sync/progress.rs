//! Progress reporting for running jobs
//!
//! The reporter owns the running entry for the duration of a job. Each report
//! writes through to the log store before returning, so the job sees storage
//! failures immediately. The orchestrator later finalizes from the same
//! entry, keeping the last reported progress on the terminal record.

use std::sync::Arc;

use parking_lot::Mutex;
use tidemark_domain::{LogEntry, Progress, Result, TidemarkError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ports::SyncLogStore;

#[derive(Clone)]
pub struct ProgressReporter {
    store: Arc<dyn SyncLogStore>,
    entry: Arc<tokio::sync::Mutex<LogEntry>>,
    write_error: Arc<Mutex<Option<TidemarkError>>>,
    cancel: CancellationToken,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn SyncLogStore>, entry: LogEntry, cancel: CancellationToken) -> Self {
        Self {
            store,
            entry: Arc::new(tokio::sync::Mutex::new(entry)),
            write_error: Arc::new(Mutex::new(None)),
            cancel,
        }
    }

    /// Validate and persist `value` out of `max`.
    ///
    /// # Errors
    /// `InvalidInput` when the pair violates `0 <= value <= max, max > 0`
    /// (nothing is written), or the store's error when the write fails.
    pub async fn report(&self, value: i64, max: i64) -> Result<()> {
        let progress = Progress::new(value, max)?;
        self.report_progress(progress).await
    }

    pub async fn report_progress(&self, progress: Progress) -> Result<()> {
        let mut entry = self.entry.lock().await;
        entry.progress_value = Some(progress.value());
        entry.progress_max = Some(progress.max());

        match self.store.update_log_entry(&entry, &self.cancel).await {
            Ok(()) => {
                debug!(entry_id = %entry.id, value = progress.value(), max = progress.max(), "Progress recorded");
                Ok(())
            }
            Err(err) => {
                warn!(entry_id = %entry.id, error = %err, "Failed to record progress");
                *self.write_error.lock() = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Id of the entry this reporter writes to.
    pub async fn entry_id(&self) -> String {
        self.entry.lock().await.id.clone()
    }

    /// Copy of the entry including the latest progress fields.
    pub(crate) async fn snapshot(&self) -> LogEntry {
        self.entry.lock().await.clone()
    }

    /// Most recent progress write failure, if any.
    pub(crate) fn take_write_error(&self) -> Option<TidemarkError> {
        self.write_error.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;
    use tidemark_domain::{AcquireLeaseBehavior, EntityKey, SyncTriggerType};

    use super::*;
    use crate::sync::options::SyncEntityOptions;
    use crate::sync::ports::AcquiredLease;

    /// Records every update; fails them all once `fail` is set.
    #[derive(Default)]
    struct RecordingStore {
        updates: Mutex<Vec<LogEntry>>,
        fail: bool,
    }

    #[async_trait]
    impl SyncLogStore for RecordingStore {
        async fn acquire_lease(
            &self,
            _trigger_type: SyncTriggerType,
            _entity: &SyncEntityOptions,
            _behavior: AcquireLeaseBehavior,
            _cancel: &CancellationToken,
        ) -> Result<Option<AcquiredLease>> {
            Ok(None)
        }

        async fn acquire_existing(
            &self,
            _entry_id: &str,
            _entity: &SyncEntityOptions,
            _behavior: AcquireLeaseBehavior,
            _cancel: &CancellationToken,
        ) -> Result<Option<AcquiredLease>> {
            Ok(None)
        }

        async fn update_log_entry(
            &self,
            entry: &LogEntry,
            _cancel: &CancellationToken,
        ) -> Result<()> {
            if self.fail {
                return Err(TidemarkError::Database("disk full".into()));
            }
            self.updates.lock().push(entry.clone());
            Ok(())
        }

        async fn record_queue_message_id(
            &self,
            _entry_id: &str,
            _message_id: &str,
            _cancel: &CancellationToken,
        ) -> Result<()> {
            Ok(())
        }

        async fn find_by_id(
            &self,
            _id: &str,
            _cancel: &CancellationToken,
        ) -> Result<Option<LogEntry>> {
            Ok(None)
        }
    }

    fn running_entry() -> LogEntry {
        let key = EntityKey::new("Orders", None, None);
        LogEntry::pending("1", &key, SyncTriggerType::Timer, Utc::now())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_report_writes_through() {
        let store = Arc::new(RecordingStore::default());
        let reporter = ProgressReporter::new(store.clone(), running_entry(), CancellationToken::new());

        reporter.report(1, 4).await.unwrap();
        reporter.report(3, 4).await.unwrap();

        let updates = store.updates.lock().clone();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].progress_value, Some(3));
        assert_eq!(updates[1].progress_max, Some(4));

        let snapshot = reporter.snapshot().await;
        assert_eq!(snapshot.progress_percentage(), Some(0.75));
        assert!(reporter.take_write_error().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_progress_is_not_written() {
        let store = Arc::new(RecordingStore::default());
        let reporter = ProgressReporter::new(store.clone(), running_entry(), CancellationToken::new());

        let err = reporter.report(5, 0).await.unwrap_err();
        assert!(matches!(err, TidemarkError::InvalidInput(_)));
        assert!(store.updates.lock().is_empty());
        assert!(reporter.take_write_error().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_write_failure_is_returned_and_recorded() {
        let store = Arc::new(RecordingStore { fail: true, ..RecordingStore::default() });
        let reporter = ProgressReporter::new(store, running_entry(), CancellationToken::new());

        let err = reporter.report(1, 2).await.unwrap_err();
        assert_eq!(err, TidemarkError::Database("disk full".into()));
        assert_eq!(reporter.take_write_error(), Some(TidemarkError::Database("disk full".into())));
        assert_eq!(reporter.take_write_error(), None);
        assert_eq!(reporter.entry_id().await, "1");
    }
}
