//! Studio Registry - runtime catalog of published widgets
//!
//! - [`WidgetRegistry`]: id → definition + compiled factory, mutable at
//!   runtime, with a version token consumers can watch
//! - [`Publisher`]: validate → persist → register
//! - [`WidgetStore`] / [`HttpWidgetStore`]: the persistence service
//!
//! # Example
//!
//! ```rust,ignore
//! use studio_registry::{Publisher, WidgetDefinition, WidgetRegistry, HttpWidgetStore};
//!
//! let store = HttpWidgetStore::new("http://localhost:8000/api", timeout)?;
//! let publisher = Publisher::new(WidgetRegistry::global(), Arc::new(store));
//! publisher.reload().await?;
//! let receipt = publisher.publish(WidgetDefinition::new("kpi1", source)).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod definition;
pub mod error;
pub mod persistence;
pub mod publisher;
pub mod registry;
pub mod transport;

pub use definition::{
    ConfigurationMode, DataSource, DataSourceKind, DisplayMetadata, Footprint, PersistedWidget,
    SourceSnapshot, WidgetDefinition, MAX_GRID_UNITS,
};
pub use error::{RegistryError, RegistryResult, TransportError, ValidationError};
pub use persistence::{CreatedWidget, HttpWidgetStore, WidgetStore};
pub use publisher::{PublishReceipt, Publisher};
pub use registry::{PublishKind, RegistryEntry, WidgetRegistry};
pub use transport::{error_detail, JsonClient, MAX_ERROR_BODY};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the registry
    pub use crate::{Publisher, RegistryError, WidgetDefinition, WidgetRegistry, WidgetStore};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
