//! Dynamic widget registry
//!
//! Process-wide mapping from widget id to definition and compiled factory.
//! Every successful mutation bumps a version token published on a
//! [`tokio::sync::watch`] channel so cached consumers (grid palettes,
//! catalog views) know to refresh. Readers get immutable [`Arc`] snapshots.

use crate::definition::WidgetDefinition;
use crate::error::{RegistryError, RegistryResult, ValidationError};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;
use studio_lang::{compile, CompilationResult, CompileError, Factory};
use tokio::sync::watch;

/// Registered widget
#[derive(Debug)]
pub struct RegistryEntry {
    definition: WidgetDefinition,
    revision: u64,
    compiled: CompilationResult,
}

impl RegistryEntry {
    /// Published definition
    #[inline]
    #[must_use]
    pub fn definition(&self) -> &WidgetDefinition {
        &self.definition
    }

    /// Widget id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    /// Per-entry revision, starting at 1 and bumped on each overwrite
    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The compiled factory ("mount function")
    #[must_use]
    pub fn factory(&self) -> Option<&Factory> {
        self.compiled.as_ref().ok()
    }

    /// Compile error for entries loaded from storage that no longer compile
    #[must_use]
    pub fn compile_error(&self) -> Option<&CompileError> {
        self.compiled.as_ref().err()
    }

    /// Factory or compile error
    #[must_use]
    pub fn compiled(&self) -> &CompilationResult {
        &self.compiled
    }
}

/// Whether a publish created or overwrote an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishKind {
    /// New id
    Created,
    /// Existing id replaced
    Updated,
}

static GLOBAL: Lazy<Arc<WidgetRegistry>> = Lazy::new(|| Arc::new(WidgetRegistry::new()));

/// Runtime-mutable widget registry
#[derive(Debug)]
pub struct WidgetRegistry {
    entries: RwLock<IndexMap<String, Arc<RegistryEntry>>>,
    version: watch::Sender<u64>,
}

impl Default for WidgetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WidgetRegistry {
    /// Empty registry at version 0
    #[must_use]
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            entries: RwLock::new(IndexMap::new()),
            version,
        }
    }

    /// The process-wide instance
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Current version token
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Receiver notified on every version change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump(&self) -> u64 {
        let mut next = 0;
        self.version.send_modify(|v| {
            *v += 1;
            next = *v;
        });
        next
    }

    /// Add a new widget
    ///
    /// # Errors
    ///
    /// [`RegistryError::Validation`] if the definition is invalid or does not
    /// compile, [`RegistryError::AlreadyRegistered`] if the id exists.
    /// The version is unchanged on error.
    pub fn register(&self, definition: WidgetDefinition) -> RegistryResult<u64> {
        let compiled = definition.validate()?;
        let mut entries = self.entries.write();
        if entries.contains_key(&definition.id) {
            return Err(RegistryError::AlreadyRegistered(definition.id));
        }
        let id = definition.id.clone();
        entries.insert(
            id.clone(),
            Arc::new(RegistryEntry {
                definition,
                revision: 1,
                compiled: Ok(compiled),
            }),
        );
        let version = self.bump();
        drop(entries);
        tracing::info!(widget = %id, version, "registered widget");
        Ok(version)
    }

    /// Replace an existing widget, keeping its id
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] for unknown ids, [`RegistryError::Validation`]
    /// for invalid definitions (including one carrying a different id).
    pub fn update(&self, id: &str, mut definition: WidgetDefinition) -> RegistryResult<u64> {
        if definition.id.is_empty() {
            definition.id = id.to_string();
        }
        if definition.id != id {
            return Err(ValidationError::IdMismatch {
                expected: id.to_string(),
                found: definition.id,
            }
            .into());
        }
        let compiled = definition.validate()?;
        let mut entries = self.entries.write();
        let previous = entries
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let revision = previous.revision + 1;
        entries.insert(
            id.to_string(),
            Arc::new(RegistryEntry {
                definition,
                revision,
                compiled: Ok(compiled),
            }),
        );
        let version = self.bump();
        drop(entries);
        tracing::info!(widget = %id, revision, version, "updated widget");
        Ok(version)
    }

    /// Register or update depending on whether `id` exists
    ///
    /// # Errors
    ///
    /// As [`Self::register`] and [`Self::update`].
    pub fn publish(&self, definition: WidgetDefinition) -> RegistryResult<(PublishKind, u64)> {
        if self.contains(&definition.id) {
            let id = definition.id.clone();
            self.update(&id, definition).map(|v| (PublishKind::Updated, v))
        } else {
            self.register(definition).map(|v| (PublishKind::Created, v))
        }
    }

    /// Remove a widget
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] for unknown ids.
    pub fn remove(&self, id: &str) -> RegistryResult<u64> {
        let mut entries = self.entries.write();
        if entries.shift_remove(id).is_none() {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        let version = self.bump();
        drop(entries);
        tracing::info!(widget = %id, version, "removed widget");
        Ok(version)
    }

    /// Replace the whole contents with stored definitions
    ///
    /// Definitions whose source no longer compiles are kept with their
    /// compile error; definitions with an empty id are skipped. Bumps the
    /// version once.
    pub fn load(&self, definitions: impl IntoIterator<Item = WidgetDefinition>) -> u64 {
        let mut loaded = IndexMap::new();
        let mut broken = 0usize;
        for definition in definitions {
            if definition.id.trim().is_empty() {
                tracing::warn!("skipped stored widget without an id");
                continue;
            }
            let compiled = compile(&definition.source.text);
            if let Err(err) = &compiled {
                broken += 1;
                tracing::warn!(widget = %definition.id, error = %err, "stored widget no longer compiles");
            }
            loaded.insert(
                definition.id.clone(),
                Arc::new(RegistryEntry {
                    definition,
                    revision: 1,
                    compiled,
                }),
            );
        }
        let count = loaded.len();
        let mut entries = self.entries.write();
        *entries = loaded;
        let version = self.bump();
        drop(entries);
        tracing::info!(count, broken, version, "loaded widgets");
        version
    }

    /// Snapshot of one entry
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<RegistryEntry>> {
        self.entries.read().get(id).cloned()
    }

    /// Whether `id` is registered
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Snapshot of all entries in registration order
    #[must_use]
    pub fn list(&self) -> Vec<Arc<RegistryEntry>> {
        self.entries.read().values().cloned().collect()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
