//! Generation service interface
//!
//! The service turns a prompt (or a failing source plus its error) into
//! candidate component source. [`HttpGenerationService`] talks to the
//! `/generate` endpoint; tests substitute a scripted implementation.

use crate::conversation::Turn;
use crate::extract::{extract_code, strip_markers};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use studio_registry::{JsonClient, TransportError};

/// Body of a generation call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// User prompt; `None` for automatic corrections
    pub prompt: Option<String>,
    /// Conversation so far, excluding the turn this request belongs to
    pub history: Vec<Turn>,
    /// Source to fix; `None` for fresh prompts
    pub current_code: Option<String>,
    /// Error that triggered a correction
    pub error_log: Option<String>,
    /// Column name to type name, from the data-source probe
    pub data_source_schema: Option<serde_json::Value>,
    /// SQL text or API URL
    pub data_source: Option<String>,
    /// `sql` or `api`
    pub data_source_type: Option<String>,
}

impl GenerationRequest {
    /// Check if this is an error-triggered correction
    #[inline]
    #[must_use]
    pub fn is_correction(&self) -> bool {
        self.prompt.is_none()
    }
}

/// Reply of a generation call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Component source, if the service found any
    #[serde(default)]
    pub code: Option<String>,
    /// Prose accompanying the code
    #[serde(default)]
    pub explanation: String,
    /// Unprocessed model output
    #[serde(default)]
    pub raw: String,
}

impl GenerationResponse {
    /// Fill in `code` from `raw` when the service did not split it out
    #[must_use]
    pub fn normalized(mut self) -> Self {
        match self.code.take().filter(|c| !c.trim().is_empty()) {
            Some(code) => self.code = Some(strip_markers(code.trim())),
            None => {
                let extracted = extract_code(&self.raw);
                self.code = extracted.code;
                if self.explanation.trim().is_empty() {
                    self.explanation = extracted.explanation;
                }
            }
        }
        self
    }
}

/// Prompt-to-source service
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Run one generation
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, TransportError>;
}

/// Client for the `/generate` endpoint
#[derive(Debug, Clone)]
pub struct HttpGenerationService {
    service: JsonClient,
}

impl HttpGenerationService {
    /// Client for the service at `base_url`
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
impl GenerationService for HttpGenerationService {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, TransportError> {
        tracing::debug!(
            correction = request.is_correction(),
            history = request.history.len(),
            "calling generation service"
        );
        let response: GenerationResponse = self.service.post("/generate", &request).await?;
        Ok(response.normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn correction_requests_serialize_null_prompt() {
        let request = GenerationRequest {
            current_code: Some("export default () => x;".into()),
            error_log: Some("ReferenceError: x is not defined".into()),
            ..GenerationRequest::default()
        };
        assert!(request.is_correction());
        let json = serde_json::to_value(&request).unwrap();
        assert!(json["prompt"].is_null());
        assert_eq!(json["error_log"], "ReferenceError: x is not defined");
    }

    #[test]
    fn missing_code_is_recovered_from_raw() {
        let response = GenerationResponse {
            code: None,
            explanation: String::new(),
            raw: "A bar chart.\n```tsx\nexport default () => 1;\n```".into(),
        }
        .normalized();
        assert_eq!(response.code.as_deref(), Some("export default () => 1;"));
        assert_eq!(response.explanation, "A bar chart.");
    }

    #[test]
    fn service_code_is_kept_but_unfenced() {
        let response = GenerationResponse {
            code: Some("```tsx\nexport default () => 2;\n```".into()),
            explanation: "ok".into(),
            raw: String::new(),
        }
        .normalized();
        assert_eq!(response.code.as_deref(), Some("export default () => 2;"));
        assert_eq!(response.explanation, "ok");
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        let service = HttpGenerationService::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let err = service.generate(GenerationRequest::default()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
