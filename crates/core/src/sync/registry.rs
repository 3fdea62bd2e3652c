//! Job registry
//!
//! Maps the sync id named in [`SyncEntityOptions`] to a job implementation.
//! Registration is explicit; nothing is discovered at run time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tidemark_domain::{Result, TidemarkError};

use super::options::SyncEntityOptions;
use super::ports::EntitySync;

/// Produces a job instance for one run.
pub trait JobFactory: Send + Sync {
    fn create(&self) -> Arc<dyn EntitySync>;
}

impl<F> JobFactory for F
where
    F: Fn() -> Arc<dyn EntitySync> + Send + Sync,
{
    fn create(&self) -> Arc<dyn EntitySync> {
        self()
    }
}

struct SharedInstance(Arc<dyn EntitySync>);

impl JobFactory for SharedInstance {
    fn create(&self) -> Arc<dyn EntitySync> {
        Arc::clone(&self.0)
    }
}

#[derive(Clone, Default)]
pub struct JobRegistry {
    factories: HashMap<String, Arc<dyn JobFactory>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory invoked once per run. Replaces any previous
    /// registration under the same id.
    pub fn register<F>(&mut self, sync_id: impl Into<String>, factory: F) -> &mut Self
    where
        F: JobFactory + 'static,
    {
        self.factories.insert(sync_id.into(), Arc::new(factory));
        self
    }

    /// Register one job instance shared by every run.
    pub fn register_instance(
        &mut self,
        sync_id: impl Into<String>,
        job: Arc<dyn EntitySync>,
    ) -> &mut Self {
        self.register(sync_id, SharedInstance(job))
    }

    #[must_use]
    pub fn with_job(mut self, sync_id: impl Into<String>, job: Arc<dyn EntitySync>) -> Self {
        self.register_instance(sync_id, job);
        self
    }

    pub fn resolve(&self, entity: &SyncEntityOptions) -> Result<Arc<dyn EntitySync>> {
        self.factories
            .get(entity.sync_id())
            .map(|factory| factory.create())
            .ok_or_else(|| TidemarkError::JobNotRegistered(entity.sync_id().to_string()))
    }

    pub fn contains(&self, sync_id: &str) -> bool {
        self.factories.contains_key(sync_id)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("JobRegistry").field("sync_ids", &ids).finish()
    }
}
