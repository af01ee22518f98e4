//! JSON-over-HTTP client shared by every service the studio talks to
//!
//! Non-2xx replies become [`TransportError::Status`] carrying the `detail`
//! field of a JSON error body when there is one, else the raw body, cut to
//! [`MAX_ERROR_BODY`] bytes.

use crate::error::TransportError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Longest error body kept in a [`TransportError::Status`]
pub const MAX_ERROR_BODY: usize = 512;

/// `reqwest` client bound to a base URL
#[derive(Debug, Clone)]
pub struct JsonClient {
    client: reqwest::Client,
    base_url: String,
}

impl JsonClient {
    /// Client for the service at `base_url` with a request timeout
    ///
    /// # Errors
    ///
    /// [`TransportError::Request`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = normalize(base_url.into());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request {
                url: base_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, base_url })
    }

    /// Reuse an existing client
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: normalize(base_url.into()),
        }
    }

    /// Absolute URL of `path`
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `GET` and decode
    ///
    /// # Errors
    ///
    /// [`TransportError`] on connection failure, non-2xx status or a body
    /// that does not decode.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let url = self.url(path);
        let response = self.send(self.client.get(&url), &url).await?;
        decode(response, &url).await
    }

    /// `POST` a JSON body and decode the reply
    ///
    /// # Errors
    ///
    /// As [`Self::get`].
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self.send(self.client.post(&url).json(body), &url).await?;
        decode(response, &url).await
    }

    /// `PUT` a JSON body, ignoring the reply body
    ///
    /// # Errors
    ///
    /// [`TransportError`] on connection failure or non-2xx status.
    pub async fn put<B>(&self, path: &str, body: &B) -> Result<(), TransportError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let url = self.url(path);
        self.send(self.client.put(&url).json(body), &url).await?;
        Ok(())
    }

    /// `DELETE`, ignoring the reply body
    ///
    /// # Errors
    ///
    /// As [`Self::put`].
    pub async fn delete(&self, path: &str) -> Result<(), TransportError> {
        let url = self.url(path);
        self.send(self.client.delete(&url), &url).await?;
        Ok(())
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<reqwest::Response, TransportError> {
        let response = request.send().await.map_err(|e| TransportError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(url, status = status.as_u16(), "service refused request");
        Err(TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body: error_detail(&body),
        })
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<T, TransportError> {
    response.json::<T>().await.map_err(|e| TransportError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn normalize(base_url: String) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// `detail` of a JSON error body, else the body itself, truncated
#[must_use]
pub fn error_detail(body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string());
    let mut cut = detail.len().min(MAX_ERROR_BODY);
    while !detail.is_char_boundary(cut) {
        cut -= 1;
    }
    detail[..cut].to_string()
}
