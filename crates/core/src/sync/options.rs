//! Entity sync options

use std::sync::Arc;

use chrono::Duration;
use serde_json::Value;
use tidemark_domain::{canonicalize_parameters, EntityKey, LogEntry, Parameters};

use super::eligibility::{EligibilityStrategy, IntervalEligibility};

/// Compile-time identity of a synced entity type.
///
/// Lets options take the entity name and schema version from a Rust type
/// rather than repeating string literals at every registration site.
pub trait SyncEntityType {
    const NAME: &'static str;
    const SCHEMA_VERSION: Option<i32> = None;
}

/// Everything the orchestrator needs to know about one entity.
///
/// Built with consuming `with_*` methods and immutable afterwards. The
/// canonical parameter form is computed once per change so key comparisons
/// never re-serialize.
#[derive(Debug, Clone)]
pub struct SyncEntityOptions {
    entity: String,
    sync_id: String,
    schema_version: Option<i32>,
    lease_expiration: Option<Duration>,
    eligibility: Arc<dyn EligibilityStrategy>,
    parameters: Parameters,
    parameters_json: Option<String>,
}

impl SyncEntityOptions {
    /// Options for `entity`, run by the job registered as `sync_id`.
    pub fn new(entity: impl Into<String>, sync_id: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            sync_id: sync_id.into(),
            schema_version: None,
            lease_expiration: None,
            eligibility: Arc::new(IntervalEligibility::default()),
            parameters: Parameters::new(),
            parameters_json: None,
        }
    }

    /// Options whose name and schema version come from `T`.
    pub fn for_entity<T: SyncEntityType>(sync_id: impl Into<String>) -> Self {
        let mut options = Self::new(T::NAME, sync_id);
        options.schema_version = T::SCHEMA_VERSION;
        options
    }

    #[must_use]
    pub const fn with_schema_version(mut self, schema_version: i32) -> Self {
        self.schema_version = Some(schema_version);
        self
    }

    /// Override the store's default lease duration for this entity.
    #[must_use]
    pub const fn with_lease_expiration(mut self, lease_expiration: Duration) -> Self {
        self.lease_expiration = Some(lease_expiration);
        self
    }

    #[must_use]
    pub fn with_eligibility(mut self, strategy: impl EligibilityStrategy + 'static) -> Self {
        self.eligibility = Arc::new(strategy);
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self.parameters_json = canonicalize_parameters(Some(&self.parameters));
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self.parameters_json = canonicalize_parameters(Some(&self.parameters));
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn sync_id(&self) -> &str {
        &self.sync_id
    }

    pub const fn schema_version(&self) -> Option<i32> {
        self.schema_version
    }

    pub const fn lease_expiration(&self) -> Option<Duration> {
        self.lease_expiration
    }

    pub fn eligibility(&self) -> &dyn EligibilityStrategy {
        self.eligibility.as_ref()
    }

    pub const fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameters_json(&self) -> Option<&str> {
        self.parameters_json.as_deref()
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity.clone(), self.parameters_json.clone(), self.schema_version)
    }

    pub fn matches_entry(&self, entry: &LogEntry) -> bool {
        entry.entity == self.entity
            && entry.parameters_json == self.parameters_json
            && entry.schema_version == self.schema_version
    }
}
