//! Test job implementations

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use tidemark_core::{EntitySync, JobError, ProgressReporter, SyncEntityOptions};
use tidemark_domain::{SyncResult, SyncTrigger};
use tokio_util::sync::CancellationToken;

/// What a [`ScriptedJob`] does when run.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed { high_water_mark: Option<String>, records: Option<i64> },
    ReportFailure(String),
    Error(String),
    Panic(String),
    /// Report `0..=steps` out of `steps`, then succeed.
    Progress { steps: i64 },
    /// Report once, ignore the outcome, then panic with the message.
    ReportThenPanic(String),
    /// Never finishes on its own.
    Hang,
}

pub struct ScriptedJob {
    script: Script,
    runs: AtomicUsize,
    triggers: Mutex<Vec<SyncTrigger>>,
}

impl ScriptedJob {
    pub fn new(script: Script) -> Self {
        Self { script, runs: AtomicUsize::new(0), triggers: Mutex::new(Vec::new()) }
    }

    pub fn succeed() -> Self {
        Self::new(Script::Succeed { high_water_mark: None, records: None })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn last_trigger(&self) -> Option<SyncTrigger> {
        self.triggers.lock().last().cloned()
    }
}

#[async_trait]
impl EntitySync for ScriptedJob {
    async fn run(
        &self,
        trigger: &SyncTrigger,
        entity: &SyncEntityOptions,
        progress: &ProgressReporter,
        _cancel: CancellationToken,
    ) -> Result<SyncResult, JobError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.triggers.lock().push(trigger.clone());

        match &self.script {
            Script::Succeed { high_water_mark, records } => {
                let mut result = SyncResult::success(entity.entity());
                if let Some(hwm) = high_water_mark {
                    result = result.with_high_water_mark(hwm.clone());
                }
                if let Some(records) = records {
                    result = result.with_record_count(*records);
                }
                Ok(result)
            }
            Script::ReportFailure(message) => Ok(SyncResult::failure(entity.entity(), message)),
            Script::Error(message) => Err(anyhow!(message.clone())),
            Script::Panic(message) => panic!("{message}"),
            Script::Progress { steps } => {
                for step in 0..=*steps {
                    progress.report(step, *steps).await?;
                }
                Ok(SyncResult::success(entity.entity()).with_record_count(*steps))
            }
            Script::ReportThenPanic(message) => {
                let _ = progress.report(1, 2).await;
                panic!("{message}")
            }
            Script::Hang => std::future::pending().await,
        }
    }
}
