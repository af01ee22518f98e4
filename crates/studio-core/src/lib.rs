//! Studio Core - generation loop for dynamically generated widgets
//!
//! Drives the path from a natural-language prompt to a stable, publishable
//! widget:
//!
//! - [`StudioSession`]: sans-IO state machine over the source artifact,
//!   conversation and correction streak
//! - [`Studio`] / [`StudioHandle`]: the actor that runs generations,
//!   debounced compilations and the preview boundary
//! - [`mount`]: the single entry point for mounting a published widget or
//!   ad-hoc source into a [`studio_runtime::ContainmentBoundary`]
//!
//! # Example
//!
//! ```rust,ignore
//! use studio_core::{Studio, StudioConfig, StudioServices};
//!
//! let config = StudioConfig::from_env()?;
//! studio_core::telemetry::init_tracing(config.log_format)?;
//! let services = StudioServices::from_config(&config, Capabilities::default())?;
//! let studio = Studio::spawn(config, services);
//! studio.submit_prompt("Revenue by region as a bar chart").await?;
//! let snapshot = studio.wait_for(|s| !s.generating).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod artifact;
pub mod cache;
pub mod config;
pub mod conversation;
pub mod correction;
pub mod error;
pub mod extract;
pub mod generation;
pub mod mount;
pub mod probe;
pub mod session;
pub mod studio;
pub mod telemetry;

pub use artifact::{CorrectionAttempt, SourceArtifact};
pub use cache::{CacheStats, CompileCache};
pub use config::StudioConfig;
pub use conversation::{ConversationState, Role, Turn};
pub use correction::{error_signature, CorrectionDecision, CorrectionTracker};
pub use error::{ConfigError, MountError, StudioError, StudioResult};
pub use extract::{extract_code, Extracted};
pub use generation::{GenerationRequest, GenerationResponse, GenerationService, HttpGenerationService};
pub use mount::{mount, mount_with, MountSource};
pub use probe::{infer_schema, DataSourceProbe, HttpProbe, ProbeResult};
pub use session::{
    CompileOutcome, GenerationOutcome, GenerationTicket, StudioSession, StudioSnapshot, StudioStatus,
};
pub use studio::{preview_props, Studio, StudioHandle, StudioServices};
pub use telemetry::{init_tracing, LogFormat};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving a studio
    pub use crate::{
        mount, MountSource, Studio, StudioConfig, StudioError, StudioHandle, StudioServices, StudioSnapshot,
        StudioStatus,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
