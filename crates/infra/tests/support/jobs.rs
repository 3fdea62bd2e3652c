//! Jobs used by the end-to-end tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tidemark_core::{EntitySync, JobError, ProgressReporter, SyncEntityOptions};
use tidemark_domain::{SyncResult, SyncTrigger};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
    /// Report `0..=steps` out of `steps` with a short pause between steps.
    Progress { steps: i64 },
}

pub struct TestJob {
    behavior: Behavior,
    runs: AtomicUsize,
}

impl TestJob {
    pub fn new(behavior: Behavior) -> Self {
        Self { behavior, runs: AtomicUsize::new(0) }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntitySync for TestJob {
    async fn run(
        &self,
        trigger: &SyncTrigger,
        entity: &SyncEntityOptions,
        progress: &ProgressReporter,
        _cancel: CancellationToken,
    ) -> Result<SyncResult, JobError> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;

        match self.behavior {
            Behavior::Succeed => {
                let previous = trigger.prior_sync_info.high_water_mark.as_deref().unwrap_or("none");
                Ok(SyncResult::success(entity.entity())
                    .with_message(format!("previous mark {previous}"))
                    .with_high_water_mark(format!("mark-{run}")))
            }
            Behavior::Fail => Err(anyhow!("upstream unavailable")),
            Behavior::Panic => panic!("job exploded"),
            Behavior::Progress { steps } => {
                for step in 0..=steps {
                    progress.report(step, steps).await?;
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                Ok(SyncResult::success(entity.entity()).with_record_count(steps))
            }
        }
    }
}
