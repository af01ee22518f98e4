//! Widget definitions and their persisted wire form

use crate::error::ValidationError;
use serde::{Deserialize, Deserializer, Serialize};
use studio_lang::{compile, Factory};

/// Largest accepted default width or height, in grid units
pub const MAX_GRID_UNITS: u32 = 24;

/// Catalog metadata shown for a widget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMetadata {
    /// Display name
    pub name: String,
    /// Free-text description
    pub description: String,
    /// Catalog category
    pub category: String,
    /// Business domain
    pub domain: String,
    /// Publishing user, filled in by the persistence service
    pub created_by: Option<String>,
}

impl Default for DisplayMetadata {
    fn default() -> Self {
        Self {
            name: default_name(),
            description: String::new(),
            category: default_category(),
            domain: default_domain(),
            created_by: None,
        }
    }
}

/// Default grid size of a newly placed widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footprint {
    /// Width in grid units
    pub w: u32,
    /// Height in grid units
    pub h: u32,
}

impl Default for Footprint {
    fn default() -> Self {
        Self { w: 6, h: 6 }
    }
}

/// How a placed widget is configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigurationMode {
    /// No configuration
    #[default]
    None,
    /// Fixed configuration set at placement
    Static,
    /// Configuration resolved at runtime
    Dynamic,
}

/// Kind of data source a widget reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    /// SQL query text
    Sql,
    /// HTTP endpoint URL
    Api,
}

impl DataSourceKind {
    /// Wire name (`sql`, `api`)
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Api => "api",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "sql" => Some(Self::Sql),
            "api" => Some(Self::Api),
            _ => None,
        }
    }
}

/// A configured data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    /// Source kind
    pub kind: DataSourceKind,
    /// Query text or URL
    pub source: String,
}

impl DataSource {
    /// SQL data source
    pub fn sql(query: impl Into<String>) -> Self {
        Self {
            kind: DataSourceKind::Sql,
            source: query.into(),
        }
    }

    /// HTTP data source
    pub fn api(url: impl Into<String>) -> Self {
        Self {
            kind: DataSourceKind::Api,
            source: url.into(),
        }
    }
}

/// Source text captured at publish time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    /// Component source
    pub text: String,
    /// Studio revision the text was taken from
    pub revision: u64,
}

/// A publishable widget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetDefinition {
    /// Unique id
    pub id: String,
    /// Catalog metadata
    pub metadata: DisplayMetadata,
    /// Component source
    pub source: SourceSnapshot,
    /// Configuration mode
    pub configuration_mode: ConfigurationMode,
    /// JSON Schema for the widget configuration
    pub config_schema: Option<serde_json::Value>,
    /// Data source the widget was generated against
    pub data_source: Option<DataSource>,
    /// Default grid size
    pub footprint: Footprint,
    /// Whether the widget triggers actions when used
    pub is_executable: bool,
    /// Last assistant explanation, used to reopen the widget in the studio
    pub explanation: Option<String>,
}

impl WidgetDefinition {
    /// Definition with default metadata
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: DisplayMetadata::default(),
            source: SourceSnapshot {
                text: source.into(),
                revision: 0,
            },
            configuration_mode: ConfigurationMode::None,
            config_schema: None,
            data_source: None,
            footprint: Footprint::default(),
            is_executable: false,
            explanation: None,
        }
    }

    /// With display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    /// With full metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: DisplayMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// With the studio revision the source came from
    #[must_use]
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.source.revision = revision;
        self
    }

    /// With default grid size
    #[must_use]
    pub fn with_footprint(mut self, w: u32, h: u32) -> Self {
        self.footprint = Footprint { w, h };
        self
    }

    /// With configuration schema and mode
    #[must_use]
    pub fn with_config_schema(mut self, mode: ConfigurationMode, schema: serde_json::Value) -> Self {
        self.configuration_mode = mode;
        self.config_schema = Some(schema);
        self
    }

    /// With data source
    #[must_use]
    pub fn with_data_source(mut self, data_source: DataSource) -> Self {
        self.data_source = Some(data_source);
        self
    }

    /// With explanation
    #[must_use]
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    /// Mark as executable
    #[must_use]
    pub fn executable(mut self, is_executable: bool) -> Self {
        self.is_executable = is_executable;
        self
    }

    /// Check everything but the source
    ///
    /// # Errors
    ///
    /// The first [`ValidationError`] found.
    pub fn validate_metadata(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if self.metadata.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let Footprint { w, h } = self.footprint;
        if !(1..=MAX_GRID_UNITS).contains(&w) || !(1..=MAX_GRID_UNITS).contains(&h) {
            return Err(ValidationError::Footprint { w, h });
        }
        if let Some(schema) = &self.config_schema {
            validate_schema(schema)?;
        }
        Ok(())
    }

    /// Full publish validation; returns the compiled factory
    ///
    /// # Errors
    ///
    /// The first [`ValidationError`] found, with compile failures reported
    /// as [`ValidationError::Compile`].
    pub fn validate(&self) -> Result<Factory, ValidationError> {
        self.validate_metadata()?;
        compile(&self.source.text).map_err(ValidationError::Compile)
    }
}

fn validate_schema(schema: &serde_json::Value) -> Result<(), ValidationError> {
    if !(schema.is_object() || schema.is_boolean()) {
        return Err(ValidationError::ConfigSchema(
            "a schema must be a JSON object or boolean".to_string(),
        ));
    }
    jsonschema::JSONSchema::compile(schema)
        .map(|_| ())
        .map_err(|err| ValidationError::ConfigSchema(err.to_string()))
}

fn default_name() -> String {
    "Untitled Widget".to_string()
}

fn default_category() -> String {
    "Custom".to_string()
}

fn default_domain() -> String {
    "General".to_string()
}

fn default_units() -> u32 {
    6
}

fn default_source_type() -> String {
    "none".to_string()
}

/// Accepts `true`/`false` as well as the `1`/`0` the store returns
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}

/// Widget record as exchanged with the persistence service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedWidget {
    /// Widget id
    pub id: String,
    /// Display name
    #[serde(default = "default_name")]
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Category
    #[serde(default = "default_category")]
    pub category: String,
    /// Domain
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Default width
    #[serde(default = "default_units", alias = "defaultW")]
    pub default_w: u32,
    /// Default height
    #[serde(default = "default_units", alias = "defaultH")]
    pub default_h: u32,
    /// Component source
    #[serde(default)]
    pub tsx_code: String,
    /// Configuration mode
    #[serde(default, rename = "configurationMode", alias = "configuration_mode")]
    pub configuration_mode: ConfigurationMode,
    /// Configuration schema (object, or its JSON text)
    #[serde(default, rename = "configSchema", alias = "config_schema")]
    pub config_schema: Option<serde_json::Value>,
    /// `none`, `sql` or `api`
    #[serde(default = "default_source_type")]
    pub data_source_type: String,
    /// Query or URL
    #[serde(default)]
    pub data_source: Option<String>,
    /// Executable flag
    #[serde(default, rename = "isExecutable", alias = "is_executable", deserialize_with = "flag")]
    pub is_executable: bool,
    /// Publishing user
    #[serde(default)]
    pub created_by: Option<String>,
    /// Last assistant explanation
    #[serde(default)]
    pub explanation: Option<String>,
}

impl From<&WidgetDefinition> for PersistedWidget {
    fn from(def: &WidgetDefinition) -> Self {
        Self {
            id: def.id.clone(),
            name: def.metadata.name.clone(),
            description: def.metadata.description.clone(),
            category: def.metadata.category.clone(),
            domain: def.metadata.domain.clone(),
            default_w: def.footprint.w,
            default_h: def.footprint.h,
            tsx_code: def.source.text.clone(),
            configuration_mode: def.configuration_mode,
            config_schema: def.config_schema.clone(),
            data_source_type: def
                .data_source
                .as_ref()
                .map_or_else(default_source_type, |ds| ds.kind.as_str().to_string()),
            data_source: def.data_source.as_ref().map(|ds| ds.source.clone()),
            is_executable: def.is_executable,
            created_by: def.metadata.created_by.clone(),
            explanation: def.explanation.clone(),
        }
    }
}

impl From<PersistedWidget> for WidgetDefinition {
    fn from(row: PersistedWidget) -> Self {
        let config_schema = match row.config_schema {
            Some(serde_json::Value::String(text)) if text.trim().is_empty() => None,
            Some(serde_json::Value::String(text)) => {
                Some(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
            }
            Some(serde_json::Value::Null) | None => None,
            other => other,
        };
        let data_source = DataSourceKind::parse(&row.data_source_type)
            .zip(row.data_source.filter(|s| !s.trim().is_empty()))
            .map(|(kind, source)| DataSource { kind, source });
        Self {
            id: row.id,
            metadata: DisplayMetadata {
                name: row.name,
                description: row.description,
                category: row.category,
                domain: row.domain,
                created_by: row.created_by,
            },
            source: SourceSnapshot {
                text: row.tsx_code,
                revision: 0,
            },
            configuration_mode: row.configuration_mode,
            config_schema,
            data_source,
            footprint: Footprint {
                w: row.default_w,
                h: row.default_h,
            },
            is_executable: row.is_executable,
            explanation: row.explanation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const OK_SOURCE: &str = "export default function Kpi() { return <b>42</b>; }";

    #[test]
    fn defaults_follow_the_catalog() {
        let def = WidgetDefinition::new("kpi1", OK_SOURCE);
        assert_eq!(def.metadata.name, "Untitled Widget");
        assert_eq!(def.metadata.category, "Custom");
        assert_eq!(def.metadata.domain, "General");
        assert_eq!(def.footprint, Footprint { w: 6, h: 6 });
        assert!(def.validate().is_ok());
    }

    #[test]
    fn non_compiling_source_is_a_validation_error() {
        let err = WidgetDefinition::new("kpi1", "export default (").validate().unwrap_err();
        assert!(matches!(err, ValidationError::Compile(_)));
    }

    #[test]
    fn blank_id_and_bad_footprint_are_refused() {
        assert_eq!(
            WidgetDefinition::new("  ", OK_SOURCE).validate_metadata(),
            Err(ValidationError::EmptyId)
        );
        assert_eq!(
            WidgetDefinition::new("a", OK_SOURCE).with_footprint(0, 4).validate_metadata(),
            Err(ValidationError::Footprint { w: 0, h: 4 })
        );
    }

    #[test]
    fn config_schema_must_be_a_schema() {
        let good = WidgetDefinition::new("a", OK_SOURCE)
            .with_config_schema(ConfigurationMode::Static, json!({ "type": "object" }));
        assert!(good.validate_metadata().is_ok());

        let not_object = WidgetDefinition::new("a", OK_SOURCE).with_config_schema(ConfigurationMode::Static, json!(3));
        assert!(matches!(not_object.validate_metadata(), Err(ValidationError::ConfigSchema(_))));

        let bad_type = WidgetDefinition::new("a", OK_SOURCE)
            .with_config_schema(ConfigurationMode::Dynamic, json!({ "type": "no-such-type" }));
        assert!(matches!(bad_type.validate_metadata(), Err(ValidationError::ConfigSchema(_))));
    }

    #[test]
    fn store_rows_are_read_leniently() {
        let row: PersistedWidget = serde_json::from_value(json!({
            "id": "w1",
            "name": "Sales",
            "tsx_code": OK_SOURCE,
            "default_w": 4,
            "configuration_mode": "static",
            "config_schema": "{\"type\":\"object\"}",
            "data_source_type": "sql",
            "data_source": "SELECT 1",
            "is_executable": 1,
            "created_by": "ana",
            "timestamp": "2025-01-01 00:00:00"
        }))
        .unwrap();
        let def = WidgetDefinition::from(row);
        assert_eq!(def.footprint, Footprint { w: 4, h: 6 });
        assert_eq!(def.configuration_mode, ConfigurationMode::Static);
        assert_eq!(def.config_schema, Some(json!({ "type": "object" })));
        assert_eq!(def.data_source, Some(DataSource::sql("SELECT 1")));
        assert!(def.is_executable);
        assert_eq!(def.metadata.created_by.as_deref(), Some("ana"));
    }

    #[test]
    fn outgoing_records_use_the_store_field_names() {
        let def = WidgetDefinition::new("w2", OK_SOURCE)
            .with_name("Map")
            .with_data_source(DataSource::api("https://api/rows"))
            .executable(true);
        let wire = serde_json::to_value(PersistedWidget::from(&def)).unwrap();
        assert_eq!(wire["tsx_code"], OK_SOURCE);
        assert_eq!(wire["configurationMode"], "none");
        assert_eq!(wire["isExecutable"], true);
        assert_eq!(wire["data_source_type"], "api");
        assert_eq!(wire["default_w"], 6);
    }
}
