//! Publish workflow: validate, persist, then register
//!
//! The registry is only written after the store accepted the change, so a
//! transport failure never leaves the registry ahead of storage.

use crate::definition::WidgetDefinition;
use crate::error::{RegistryError, RegistryResult};
use crate::persistence::WidgetStore;
use crate::registry::{PublishKind, WidgetRegistry};
use std::fmt;
use std::sync::Arc;

/// Result of a successful publish
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PublishReceipt {
    /// Widget id
    pub id: String,
    /// Created or overwritten
    pub kind: PublishKind,
    /// Registry version after the write
    pub version: u64,
    /// Publisher recorded by the store
    pub created_by: Option<String>,
}

/// Registry plus persistence service
#[derive(Clone)]
pub struct Publisher {
    registry: Arc<WidgetRegistry>,
    store: Arc<dyn WidgetStore>,
}

impl Publisher {
    /// Publisher writing through `store` into `registry`
    pub fn new(registry: Arc<WidgetRegistry>, store: Arc<dyn WidgetStore>) -> Self {
        Self { registry, store }
    }

    /// The registry this publisher writes to
    #[must_use]
    pub fn registry(&self) -> &Arc<WidgetRegistry> {
        &self.registry
    }

    /// Validate, persist and register `definition`
    ///
    /// A blank id is replaced by a fresh UUID. Known ids are updated in the
    /// store, unknown ids are created.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Validation`] before anything is written,
    /// [`RegistryError::Transport`] if the store fails (registry untouched).
    pub async fn publish(&self, mut definition: WidgetDefinition) -> RegistryResult<PublishReceipt> {
        if definition.id.trim().is_empty() {
            definition.id = uuid::Uuid::new_v4().to_string();
        }
        definition.validate()?;

        if self.registry.contains(&definition.id) {
            self.store.update(&definition.id, &definition).await?;
        } else {
            let created = self.store.create(&definition).await?;
            if !created.id.is_empty() && created.id != definition.id {
                tracing::debug!(requested = %definition.id, assigned = %created.id, "store assigned a different id");
                definition.id = created.id;
            }
            if created.created_by.is_some() {
                definition.metadata.created_by = created.created_by;
            }
        }

        let id = definition.id.clone();
        let created_by = definition.metadata.created_by.clone();
        let (kind, version) = self.registry.publish(definition)?;
        tracing::info!(widget = %id, ?kind, version, "published widget");
        Ok(PublishReceipt {
            id,
            kind,
            version,
            created_by,
        })
    }

    /// Delete from the store, then from the registry
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] for unknown ids, [`RegistryError::Transport`]
    /// if the store refuses (registry untouched).
    pub async fn unpublish(&self, id: &str) -> RegistryResult<u64> {
        if !self.registry.contains(id) {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        self.store.delete(id).await?;
        self.registry.remove(id)
    }

    /// Replace the registry contents with the store's published widgets
    ///
    /// # Errors
    ///
    /// [`RegistryError::Transport`] if listing fails (registry untouched).
    pub async fn reload(&self) -> RegistryResult<u64> {
        let definitions = self.store.list_published().await?;
        Ok(self.registry.load(definitions))
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
