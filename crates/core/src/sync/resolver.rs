//! Entity list resolution
//!
//! Combines statically configured entities with an optional dynamic provider.

use std::sync::Arc;

use tidemark_domain::{LogEntry, Result, TidemarkError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::options::SyncEntityOptions;
use super::ports::EntityProvider;

#[derive(Clone, Default)]
pub struct EntityResolver {
    entities: Vec<SyncEntityOptions>,
    provider: Option<Arc<dyn EntityProvider>>,
}

impl EntityResolver {
    pub fn new(entities: Vec<SyncEntityOptions>) -> Self {
        Self { entities, provider: None }
    }

    #[must_use]
    pub fn with_entity(mut self, entity: SyncEntityOptions) -> Self {
        self.entities.push(entity);
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn EntityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Static entities followed by whatever the provider returns.
    ///
    /// # Errors
    /// Propagates the provider's error; the static list alone never fails.
    pub async fn resolve_entities(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<SyncEntityOptions>> {
        let mut entities = self.entities.clone();

        if let Some(provider) = &self.provider {
            let additional = provider.get_entities(cancel).await?;

            if additional.is_empty() {
                warn!("Entity provider returned no additional entities, using configured entities only");
            } else {
                info!(count = additional.len(), "Entity provider returned additional entities");
                entities.extend(additional);
            }
        }

        debug!(count = entities.len(), "Resolved sync entities");
        Ok(entities)
    }

    /// Find the options whose key matches a stored entry.
    ///
    /// # Errors
    /// `KeyMismatch` when the entity name is known but no options share the
    /// entry's parameters and schema version; `NotFound` when the name is
    /// unknown altogether.
    pub async fn find_for_entry(
        &self,
        entry: &LogEntry,
        cancel: &CancellationToken,
    ) -> Result<SyncEntityOptions> {
        let entities = self.resolve_entities(cancel).await?;

        if let Some(found) = entities.iter().find(|e| e.matches_entry(entry)) {
            return Ok(found.clone());
        }

        if entities.iter().any(|e| e.entity() == entry.entity) {
            Err(TidemarkError::KeyMismatch(format!(
                "no configured options match key {} of entry {}",
                entry.key(),
                entry.id
            )))
        } else {
            Err(TidemarkError::NotFound(format!(
                "entity '{}' for entry {} is not configured",
                entry.entity, entry.id
            )))
        }
    }
}
