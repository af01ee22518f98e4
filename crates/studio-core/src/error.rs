//! Error types for the studio
//!
//! Compile and render failures are not errors here: the session turns them
//! into state and correction requests. What remains is configuration,
//! mounting outside the studio, and the studio handle talking to its task.

use std::path::PathBuf;
use studio_lang::CompileError;
use studio_registry::RegistryError;
use studio_runtime::DispatchError;

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config {path}: {source}")]
    Read {
        /// Config path
        path: PathBuf,
        /// IO error
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors from [`crate::mount::mount`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MountError {
    /// No registry entry with this id
    #[error("unknown widget '{0}'")]
    UnknownWidget(String),

    /// The source does not compile or its module body failed; the container shows the fallback
    #[error("{0}")]
    Compile(CompileError),
}

/// Errors returned by the studio handle
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    /// The studio task has stopped
    #[error("studio is not running")]
    Closed,

    /// Publishing needs a stable, mounted widget
    #[error("the current widget is not stable: {0}")]
    NotStable(String),

    /// No publisher was configured
    #[error("publishing is not configured")]
    NoPublisher,

    /// Registry or persistence failure while publishing
    #[error("publish failed: {0}")]
    Registry(#[from] RegistryError),

    /// Event could not be routed to the preview
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// Configuration problem
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP client could not be built
    #[error("client setup failed: {0}")]
    Client(String),
}

impl StudioError {
    /// Check if the studio task is gone
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Result type alias for studio operations
pub type StudioResult<T> = Result<T, StudioError>;
