//! Studio configuration
//!
//! Loaded from TOML, then overridden from the environment:
//!
//! | variable | field |
//! |---|---|
//! | `STUDIO_GENERATION_URL` | `generation_url` |
//! | `STUDIO_PROBE_URL` | `probe_url` |
//! | `STUDIO_PERSISTENCE_URL` | `persistence_url` |
//! | `STUDIO_DEBOUNCE_MS` | `debounce_ms` |

use crate::error::ConfigError;
use crate::telemetry::LogFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Studio settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// Base URL of the generation service (`POST {url}/generate`)
    pub generation_url: String,
    /// Base URL of the data-source probe (`POST {url}/datasource/test`)
    pub probe_url: String,
    /// Base URL of the widget store (`{url}/custom`)
    pub persistence_url: String,
    /// Quiet period before recompiling after a source change
    pub debounce_ms: u64,
    /// Automatic corrections allowed between two human interventions
    pub max_corrections_per_streak: u32,
    /// HTTP request timeout
    pub request_timeout_secs: u64,
    /// Compiled factories kept in the compile cache
    pub compile_cache_capacity: u64,
    /// Compile cache time-to-live
    pub compile_cache_ttl_secs: u64,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            generation_url: "http://localhost:8000/api/agent".to_string(),
            probe_url: "http://localhost:8000/api/agent".to_string(),
            persistence_url: "http://localhost:8000/api/widgets".to_string(),
            debounce_ms: 500,
            max_corrections_per_streak: 3,
            request_timeout_secs: 120,
            compile_cache_capacity: 256,
            compile_cache_ttl_secs: 600,
            log_format: LogFormat::Pretty,
        }
    }
}

impl StudioConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed TOML, [`ConfigError::Invalid`] on
    /// out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file and apply environment overrides
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`] and [`Self::with_env_overrides`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)?.with_env_overrides(std::env::vars())
    }

    /// Defaults plus environment overrides
    ///
    /// # Errors
    ///
    /// As [`Self::with_env_overrides`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(std::env::vars())
    }

    /// Apply `STUDIO_*` overrides from `vars`
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if `STUDIO_DEBOUNCE_MS` is not a number.
    pub fn with_env_overrides<I, K, V>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            match key.as_ref() {
                "STUDIO_GENERATION_URL" => self.generation_url = value.into(),
                "STUDIO_PROBE_URL" => self.probe_url = value.into(),
                "STUDIO_PERSISTENCE_URL" => self.persistence_url = value.into(),
                "STUDIO_DEBOUNCE_MS" => {
                    let raw: String = value.into();
                    self.debounce_ms = raw
                        .trim()
                        .parse()
                        .map_err(|_| ConfigError::Invalid(format!("STUDIO_DEBOUNCE_MS must be milliseconds, got '{raw}'")))?;
                }
                _ => {}
            }
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be positive".to_string()));
        }
        if self.compile_cache_capacity == 0 {
            return Err(ConfigError::Invalid("compile_cache_capacity must be positive".to_string()));
        }
        Ok(())
    }

    /// With generation service URL
    #[inline]
    #[must_use]
    pub fn with_generation_url(mut self, url: impl Into<String>) -> Self {
        self.generation_url = url.into();
        self
    }

    /// With persistence service URL
    #[inline]
    #[must_use]
    pub fn with_persistence_url(mut self, url: impl Into<String>) -> Self {
        self.persistence_url = url.into();
        self
    }

    /// With debounce period
    #[inline]
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With per-streak correction cap
    #[inline]
    #[must_use]
    pub fn with_max_corrections(mut self, max: u32) -> Self {
        self.max_corrections_per_streak = max;
        self
    }

    /// With log format
    #[inline]
    #[must_use]
    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Debounce period
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// HTTP request timeout
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Compile cache time-to-live
    #[must_use]
    pub fn compile_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.compile_cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = StudioConfig::new();
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert_eq!(config.max_corrections_per_streak, 3);
    }

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let config = StudioConfig::from_toml_str(
            r#"
            generation_url = "https://studio.internal/api/agent"
            debounce_ms = 250
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.generation_url, "https://studio.internal/api/agent");
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.max_corrections_per_streak, 3);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(StudioConfig::from_toml_str("debounce_ms = ["), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn environment_overrides_win() {
        let config = StudioConfig::new()
            .with_env_overrides([
                ("STUDIO_DEBOUNCE_MS", "40"),
                ("STUDIO_PERSISTENCE_URL", "http://store"),
                ("UNRELATED", "x"),
            ])
            .unwrap();
        assert_eq!(config.debounce_ms, 40);
        assert_eq!(config.persistence_url, "http://store");

        let err = StudioConfig::new()
            .with_env_overrides([("STUDIO_DEBOUNCE_MS", "soon")])
            .unwrap_err();
        assert!(err.to_string().contains("soon"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(StudioConfig::from_toml_str("request_timeout_secs = 0").is_err());
    }
}
