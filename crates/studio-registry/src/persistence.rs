//! Persistence service interface
//!
//! [`WidgetStore`] is the published-widget store the registry reloads from
//! and the publisher writes through. [`HttpWidgetStore`] talks to the REST
//! service (`GET/POST /custom`, `PUT/DELETE /custom/{id}`).

use crate::definition::{PersistedWidget, WidgetDefinition};
use crate::error::TransportError;
use crate::transport::JsonClient;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// What the store reports after a create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedWidget {
    /// Id the store filed the widget under
    pub id: String,
    /// User recorded as the publisher
    pub created_by: Option<String>,
}

/// Published-widget storage
#[async_trait]
pub trait WidgetStore: Send + Sync {
    /// Every published widget
    async fn list_published(&self) -> Result<Vec<WidgetDefinition>, TransportError>;

    /// Store a new widget
    async fn create(&self, definition: &WidgetDefinition) -> Result<CreatedWidget, TransportError>;

    /// Overwrite an existing widget
    async fn update(&self, id: &str, definition: &WidgetDefinition) -> Result<(), TransportError>;

    /// Delete a widget
    async fn delete(&self, id: &str) -> Result<(), TransportError>;
}

#[derive(Deserialize)]
struct ListResponse {
    widgets: Vec<PersistedWidget>,
}

#[derive(Deserialize)]
struct CreateResponse {
    id: String,
    #[serde(default)]
    created_by: Option<String>,
}

/// REST client for the widget store
#[derive(Debug, Clone)]
pub struct HttpWidgetStore {
    service: JsonClient,
}

impl HttpWidgetStore {
    /// Client for the service at `base_url` with a request timeout
    ///
    /// # Errors
    ///
    /// [`TransportError::Request`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            service: JsonClient::new(base_url, timeout)?,
        })
    }

    /// Reuse an existing client
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            service: JsonClient::with_client(base_url, client),
        }
    }
}

#[async_trait]
impl WidgetStore for HttpWidgetStore {
    async fn list_published(&self) -> Result<Vec<WidgetDefinition>, TransportError> {
        let list: ListResponse = self.service.get("/custom").await?;
        tracing::debug!(count = list.widgets.len(), "fetched published widgets");
        Ok(list.widgets.into_iter().map(WidgetDefinition::from).collect())
    }

    async fn create(&self, definition: &WidgetDefinition) -> Result<CreatedWidget, TransportError> {
        let created: CreateResponse = self.service.post("/custom", &PersistedWidget::from(definition)).await?;
        Ok(CreatedWidget {
            id: created.id,
            created_by: created.created_by,
        })
    }

    async fn update(&self, id: &str, definition: &WidgetDefinition) -> Result<(), TransportError> {
        self.service
            .put(&format!("/custom/{id}"), &PersistedWidget::from(definition))
            .await
    }

    async fn delete(&self, id: &str) -> Result<(), TransportError> {
        self.service.delete(&format!("/custom/{id}")).await
    }
}
