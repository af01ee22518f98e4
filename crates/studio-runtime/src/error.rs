//! Error types for the widget runtime

use serde::Serialize;
use std::fmt;
use studio_lang::ComponentId;

/// Where in a mount's lifetime a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPhase {
    /// Initial render
    Mount,
    /// Re-render after new props
    PropsUpdate,
    /// Re-render after a state change
    StateUpdate,
    /// Event handler prop
    Event,
    /// `ui.setInterval` callback
    Timer,
    /// `loadScript` completion or its callback
    Script,
    /// `ui.on` listener
    Listener,
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mount => "mount",
            Self::PropsUpdate => "props update",
            Self::StateUpdate => "state update",
            Self::Event => "event handler",
            Self::Timer => "timer callback",
            Self::Script => "script load",
            Self::Listener => "listener callback",
        })
    }
}

/// Failure captured by a containment boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[error("{message}")]
pub struct RenderError {
    /// Error text as the component would see it (`ReferenceError: x is not defined`)
    pub message: String,
    /// When it happened
    pub phase: RenderPhase,
    /// Component instance that failed
    #[serde(skip)]
    pub component: Option<ComponentId>,
    /// Whether the failure was a caught panic rather than a runtime error
    pub panicked: bool,
}

impl RenderError {
    /// Error raised by component code
    pub fn runtime(message: impl Into<String>, phase: RenderPhase, component: Option<ComponentId>) -> Self {
        Self {
            message: message.into(),
            phase,
            component,
            panicked: false,
        }
    }

    /// Panic caught while running component code
    pub fn panic(message: impl Into<String>, phase: RenderPhase, component: Option<ComponentId>) -> Self {
        Self {
            message: format!("internal error during {phase}: {}", message.into()),
            phase,
            component,
            panicked: true,
        }
    }

    /// Text used as an error signature and in correction requests
    #[must_use]
    pub fn summary(&self) -> String {
        format!("Render error ({}): {}", self.phase, self.message)
    }
}

/// Result of mounting or updating a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountOutcome {
    /// Rendered without error
    Stable,
    /// The boundary caught an error and shows the fallback
    RenderError(RenderError),
}

impl MountOutcome {
    /// True for [`MountOutcome::Stable`]
    #[inline]
    #[must_use]
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Stable)
    }

    /// The captured error, if any
    #[must_use]
    pub fn error(&self) -> Option<&RenderError> {
        match self {
            Self::Stable => None,
            Self::RenderError(err) => Some(err),
        }
    }
}

/// Errors from routing an event into a mount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Nothing is mounted, or the boundary shows its fallback
    #[error("no component is mounted")]
    NotMounted,

    /// The addressed element has no handler for the event
    #[error("no '{event}' handler at path {path:?}")]
    NoHandler {
        /// Child-index path of the element
        path: Vec<usize>,
        /// Event name (`click`)
        event: String,
    },
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;
