//! Observability configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `OBSERVABILITY_*` environment variables (nested keys use `__`, e.g.
//! `OBSERVABILITY_RETRY__MAX_RETRIES`).

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Hosted endpoint used when no base URL is configured
pub const DEFAULT_BASE_URL: &str = "https://cloud.langfuse.com";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "OBSERVABILITY";

/// Retry defaults applied to every call unless overridden.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

/// Configuration for the observability client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObservabilityConfig {
    /// Public key of the tracing project
    #[serde(default)]
    pub public_key: Option<String>,
    /// Secret key of the tracing project
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Base URL of the tracing service
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// How long a health probe result stays fresh
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// How often a long-running server flushes buffered records
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Log every failed attempt, not only final failures
    #[serde(default)]
    pub detailed_logging: bool,
    /// Maximum records buffered between flushes
    #[serde(default = "default_max_buffered")]
    pub max_buffered: usize,
    /// Application name stamped on every trace
    #[serde(default = "default_application")]
    pub application: String,
    /// Application version stamped on every trace
    #[serde(default = "default_release")]
    pub release: String,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            public_key: None,
            secret_key: None,
            base_url: default_base_url(),
            health_check_interval_ms: default_health_check_interval_ms(),
            flush_interval_ms: default_flush_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            detailed_logging: false,
            max_buffered: default_max_buffered(),
            application: default_application(),
            release: default_release(),
            retry: RetrySettings::default(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_health_check_interval_ms() -> u64 {
    30_000
}

fn default_flush_interval_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_buffered() -> usize {
    1000
}

fn default_application() -> String {
    "pm-copilot".to_string()
}

fn default_release() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(#[from] ConfigError),

    #[error("invalid configuration path: {0}")]
    InvalidPath(String),
}

/// Credential presence, as reported by diagnostics. Never carries the keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationSummary {
    pub base_url: String,
    pub has_public_key: bool,
    pub has_secret_key: bool,
}

impl ObservabilityConfig {
    /// Load configuration from an optional file plus the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigLoadError> {
        Self::load_with_env(path, None)
    }

    /// Load configuration, reading environment overrides from `env` instead
    /// of the process environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigLoadError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            let path_str = path
                .to_str()
                .ok_or_else(|| ConfigLoadError::InvalidPath(format!("{:?}", path)))?;

            if !path.exists() {
                return Err(ConfigLoadError::FileNotFound(path_str.to_string()));
            }

            builder = builder.add_source(File::with_name(path_str));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Returns the key pair when both keys are present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let public_key = non_empty(self.public_key.as_deref())?;
        let secret_key = non_empty(self.secret_key.as_deref())?;
        Some((public_key, secret_key))
    }

    /// Whether observability is configured at all.
    pub fn is_enabled(&self) -> bool {
        self.credentials().is_some()
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The process-wide default retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            Duration::from_millis(self.retry.retry_delay_ms),
            self.detailed_logging,
        )
    }

    /// Credential presence for diagnostics.
    pub fn summary(&self) -> ConfigurationSummary {
        ConfigurationSummary {
            base_url: self.base_url.clone(),
            has_public_key: non_empty(self.public_key.as_deref()).is_some(),
            has_secret_key: non_empty(self.secret_key.as_deref()).is_some(),
        }
    }

    /// Set both keys.
    pub fn with_credentials(
        mut self,
        public_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.public_key = Some(public_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.base_url, "https://cloud.langfuse.com");
        assert_eq!(config.health_check_interval(), Duration::from_secs(30));
        assert_eq!(config.flush_interval(), Duration::from_secs(10));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.retry_delay_ms, 1000);
        assert_eq!(config.application, "pm-copilot");
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_load_empty_env_gives_defaults() {
        let config = ObservabilityConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config, ObservabilityConfig::default());
    }

    #[test]
    fn test_load_from_env() {
        let config = ObservabilityConfig::load_with_env(
            None,
            env(&[
                ("OBSERVABILITY_PUBLIC_KEY", "pk-lf-1"),
                ("OBSERVABILITY_SECRET_KEY", "sk-lf-1"),
                ("OBSERVABILITY_BASE_URL", "http://localhost:3000"),
                ("OBSERVABILITY_DETAILED_LOGGING", "true"),
                ("OBSERVABILITY_RETRY__MAX_RETRIES", "5"),
                ("OBSERVABILITY_FLUSH_INTERVAL_MS", "2500"),
            ]),
        )
        .unwrap();

        assert_eq!(config.credentials(), Some(("pk-lf-1", "sk-lf-1")));
        assert_eq!(config.base_url, "http://localhost:3000");
        assert!(config.detailed_logging);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.retry_delay_ms, 1000);
        assert_eq!(config.flush_interval(), Duration::from_millis(2500));
    }

    #[test]
    fn test_load_from_file_with_env_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            public_key = "pk-file"
            secret_key = "sk-file"
            health_check_interval_ms = 5000

            [retry]
            retry_delay_ms = 250
            "#
        )
        .unwrap();

        let config = ObservabilityConfig::load_with_env(
            Some(file.path()),
            env(&[("OBSERVABILITY_PUBLIC_KEY", "pk-env")]),
        )
        .unwrap();

        assert_eq!(config.credentials(), Some(("pk-env", "sk-file")));
        assert_eq!(config.health_check_interval(), Duration::from_secs(5));
        assert_eq!(config.retry.retry_delay_ms, 250);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_load_file_not_found() {
        let result = ObservabilityConfig::load_with_env(
            Some(Path::new("nonexistent/path/observability.toml")),
            env(&[]),
        );
        assert!(matches!(result, Err(ConfigLoadError::FileNotFound(_))));
    }

    #[test]
    fn test_empty_key_disables() {
        let config = ObservabilityConfig::default().with_credentials("pk", "  ");
        assert!(!config.is_enabled());

        let summary = config.summary();
        assert!(summary.has_public_key);
        assert!(!summary.has_secret_key);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let mut config = ObservabilityConfig::default();
        config.detailed_logging = true;
        config.retry.max_retries = 0;

        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.retry_delay, Duration::from_millis(1000));
        assert!(policy.detailed_logging);
    }

    #[test]
    fn test_deserialize_from_toml() {
        let config: ObservabilityConfig = toml::from_str(
            r#"
            base_url = "https://eu.example.com"
            max_buffered = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://eu.example.com");
        assert_eq!(config.max_buffered, 10);
        assert_eq!(config.release, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let summary = ObservabilityConfig::default()
            .with_credentials("pk", "sk")
            .summary();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["baseUrl"], "https://cloud.langfuse.com");
        assert_eq!(json["hasPublicKey"], true);
        assert_eq!(json["hasSecretKey"], true);
    }

    #[test]
    fn test_error_display() {
        let err = ConfigLoadError::FileNotFound("test.toml".to_string());
        assert_eq!(err.to_string(), "configuration file not found: test.toml");
    }
}
