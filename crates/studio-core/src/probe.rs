//! Data-source probing
//!
//! A probe runs the configured SQL or API source once and reports a column
//! schema that is attached to generation requests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use studio_registry::{DataSource, JsonClient, TransportError};

/// Schema and sample rows of a data source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Column name to type name
    pub schema: Value,
    /// A few rows
    #[serde(default)]
    pub sample: Value,
}

/// Something that can inspect a data source
#[async_trait]
pub trait DataSourceProbe: Send + Sync {
    /// Probe `source`
    async fn probe(&self, source: &DataSource) -> Result<ProbeResult, TransportError>;
}

#[derive(Serialize)]
struct ProbeRequest<'a> {
    data_source_type: &'a str,
    data_source: &'a str,
}

/// Client for the `/datasource/test` endpoint
#[derive(Debug, Clone)]
pub struct HttpProbe {
    service: JsonClient,
}

impl HttpProbe {
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
}

#[async_trait]
impl DataSourceProbe for HttpProbe {
    async fn probe(&self, source: &DataSource) -> Result<ProbeResult, TransportError> {
        let request = ProbeRequest {
            data_source_type: source.kind.as_str(),
            data_source: &source.source,
        };
        self.service.post("/datasource/test", &request).await
    }
}

/// Infer a column schema from a JSON sample
///
/// Arrays are described by their first row; `null` columns default to
/// `"string"`.
#[must_use]
pub fn infer_schema(data: &Value) -> Value {
    let mut schema = Map::new();
    match data {
        Value::Array(items) if !items.is_empty() => match &items[0] {
            Value::Object(row) => describe_row(row, &mut schema),
            other => {
                schema.insert("value".into(), type_name(other).into());
            }
        },
        Value::Object(row) => describe_row(row, &mut schema),
        other => {
            schema.insert("data".into(), type_name(other).into());
        }
    }
    Value::Object(schema)
}

/// Keep at most two rows of an array sample
#[must_use]
pub fn sample_of(data: &Value) -> Value {
    match data {
        Value::Array(items) => Value::Array(items.iter().take(2).cloned().collect()),
        other => other.clone(),
    }
}

fn describe_row(row: &Map<String, Value>, schema: &mut Map<String, Value>) {
    for (key, value) in row {
        let name = if value.is_null() { "string" } else { type_name(value) };
        schema.insert(key.clone(), name.into());
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn describes_first_row() {
        let schema = infer_schema(&json!([
            { "region": "EU", "revenue": 12.5, "orders": 3, "note": null, "ok": true },
            { "region": "US" }
        ]));
        assert_eq!(
            schema,
            json!({ "region": "str", "revenue": "float", "orders": "int", "note": "string", "ok": "bool" })
        );
    }

    #[test]
    fn scalars_and_empty_lists() {
        assert_eq!(infer_schema(&json!([1, 2])), json!({ "value": "int" }));
        assert_eq!(infer_schema(&json!([])), json!({ "data": "list" }));
        assert_eq!(infer_schema(&json!("x")), json!({ "data": "str" }));
        assert_eq!(infer_schema(&json!({ "rows": [] })), json!({ "rows": "list" }));
    }

    #[test]
    fn sample_keeps_two_rows() {
        assert_eq!(sample_of(&json!([1, 2, 3])), json!([1, 2]));
        assert_eq!(sample_of(&json!({ "a": 1 })), json!({ "a": 1 }));
    }
}
