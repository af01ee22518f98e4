//! Error types for the widget registry
//!
//! - [`ValidationError`]: a definition cannot be published
//! - [`TransportError`]: the persistence service failed
//! - [`RegistryError`]: everything a registry or publisher call can return

use studio_lang::CompileError;

/// Reasons a widget definition is refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Empty or blank id
    #[error("widget id must not be empty")]
    EmptyId,

    /// Empty widget name
    #[error("widget name must not be empty")]
    EmptyName,

    /// Source text does not compile
    #[error("widget source does not compile: {0}")]
    Compile(CompileError),

    /// Configuration schema is not a valid JSON Schema
    #[error("invalid configuration schema: {0}")]
    ConfigSchema(String),

    /// `update` called with a definition carrying another id
    #[error("definition id '{found}' does not match '{expected}'")]
    IdMismatch {
        /// Id the caller addressed
        expected: String,
        /// Id inside the definition
        found: String,
    },

    /// Footprint outside the grid
    #[error("default size {w}x{h} is outside 1..=24 grid units")]
    Footprint {
        /// Width
        w: u32,
        /// Height
        h: u32,
    },
}

/// Persistence service failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Request never produced a response (connect, timeout, TLS)
    #[error("request to {url} failed: {reason}")]
    Request {
        /// Target URL
        url: String,
        /// Underlying error text
        reason: String,
    },

    /// Non-success HTTP status
    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        /// Target URL
        url: String,
        /// Status code
        status: u16,
        /// Response body (possibly truncated)
        body: String,
    },

    /// Response body did not have the expected shape
    #[error("unexpected response from {url}: {reason}")]
    Decode {
        /// Target URL
        url: String,
        /// What went wrong
        reason: String,
    },
}

impl TransportError {
    /// HTTP status, if the service answered
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if the error is worth retrying (no response or 5xx)
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode { .. } => false,
        }
    }
}

/// Registry and publisher errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Definition refused
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Persistence failed
    #[error("persistence failed: {0}")]
    Transport(#[from] TransportError),

    /// `register` on an id that already exists
    #[error("widget '{0}' is already registered")]
    AlreadyRegistered(String),

    /// `update`/`remove` on an unknown id
    #[error("widget '{0}' is not registered")]
    NotFound(String),
}

impl RegistryError {
    /// Check if this is a validation failure
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a persistence failure
    #[inline]
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Result type alias for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
