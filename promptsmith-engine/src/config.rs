//! Configuration management for the engine
//!
//! Layers, lowest priority first: built-in defaults, `config/default`,
//! an optional user file, then `PROMPTSMITH_*` environment variables with
//! `__` separating nested keys (`PROMPTSMITH_DATABASE__URL`).

use crate::{Error, Result};
use promptsmith_core::config::OrchestrationSettings;
use promptsmith_storage::DatabaseConfig;
use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub orchestration: OrchestrationSettings,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

/// Text-generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API, without the trailing path
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 120,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `plain` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "plain".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default file and environment
    pub fn load() -> Result<Self> {
        Self::build(None)
    }

    /// Load configuration with an additional user file on top of the defaults
    pub fn load_from_file(path: &str) -> Result<Self> {
        Self::build(Some(path))
    }

    fn build(user_file: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("orchestration.max_iterations", 5)?
            .set_default("orchestration.max_interventions", 3)?
            .set_default("orchestration.history_window", 20)?
            .set_default("orchestration.context_cache_ttl_seconds", 30)?
            .set_default("database.url", "sqlite:./promptsmith.db")?
            .set_default("database.max_connections", 5)?
            .set_default("database.migrate_on_startup", true)?
            .set_default("llm.base_url", "https://api.openai.com/v1")?
            .set_default("llm.model", "gpt-4o-mini")?
            .set_default("llm.timeout_seconds", 120)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "plain")?
            .add_source(config::File::with_name("config/default").required(false));

        if let Some(path) = user_file {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("PROMPTSMITH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.orchestration.validate()?;
        if self.database.url.trim().is_empty() {
            return Err(Error::Configuration("database.url must not be empty".to_string()));
        }
        if self.llm.timeout_seconds == 0 {
            return Err(Error::Configuration(
                "llm.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        match self.logging.format.as_str() {
            "plain" | "json" => Ok(()),
            other => Err(Error::Configuration(format!(
                "logging.format must be 'plain' or 'json', got '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.database.url.starts_with("sqlite:"));
        assert_eq!(config.orchestration.max_iterations, 5);
        assert_eq!(config.logging.format, "plain");
    }

    #[test]
    fn test_load_from_user_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("promptsmith.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[orchestration]
max_iterations = 4

[orchestration.retry]
max_attempts = 2
initial_delay_ms = 10
backoff_multiplier = 2.0
max_delay_ms = 100

[llm]
model = "local-model"
base_url = "http://localhost:8000/v1"

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = Config::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.orchestration.max_iterations, 4);
        assert_eq!(config.orchestration.max_interventions, 3);
        assert_eq!(config.orchestration.retry.max_attempts, 2);
        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.logging.format, "json");
        assert!(config.database.migrate_on_startup);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[logging]\nformat = \"xml\"\n").unwrap();
        assert!(Config::load_from_file(path.to_str().unwrap()).is_err());

        let path = dir.path().join("zero.toml");
        std::fs::write(&path, "[orchestration]\nmax_iterations = 0\n").unwrap();
        assert!(Config::load_from_file(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_missing_user_file_is_an_error() {
        assert!(Config::load_from_file("/nonexistent/promptsmith-config.toml").is_err());
    }
}
