//! Studio Runtime - failure-isolating mounts for generated widgets
//!
//! A [`ContainmentBoundary`] mounts a [`studio_lang::ComponentValue`],
//! renders it to a host [`ViewNode`] tree and keeps the host alive whatever
//! the component does: errors and panics during mount, updates, handlers,
//! timers, listeners and script callbacks are captured as [`RenderError`]s
//! and replaced by a fixed fallback.
//!
//! # Example
//!
//! ```rust,ignore
//! use studio_runtime::{ContainmentBoundary, MountOutcome};
//!
//! let mut boundary = ContainmentBoundary::new("preview");
//! match boundary.mount(component, props) {
//!     MountOutcome::Stable => render(boundary.view()),
//!     MountOutcome::RenderError(err) => request_fix(&err),
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod boundary;
pub mod error;
mod resources;
pub mod view;

pub use boundary::{BoundaryState, ContainmentBoundary, ErrorSink, MAX_RENDER_PASSES};
pub use error::{DispatchError, DispatchResult, MountOutcome, RenderError, RenderPhase};
pub use resources::{MAX_TIMER_PERIOD, MIN_TIMER_PERIOD};
pub use view::{build_view, find_path, HandlerTable, NodePath, ViewNode, FALLBACK_MESSAGE};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for mounting components
    pub use crate::{BoundaryState, ContainmentBoundary, MountOutcome, RenderError, RenderPhase, ViewNode};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
