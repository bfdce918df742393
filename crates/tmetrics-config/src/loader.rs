//! Configuration loading utilities

use crate::schema::Config;
use crate::validator::ConfigValidator;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tmetrics_common::MetricsError;
use tracing::{debug, info};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_VAR: &str = "TMETRICS_CONFIG_PATH";

/// Prefix of per-source credential variables, e.g. `TMETRICS_TOKEN_GITHUB`
pub const TOKEN_VAR_PREFIX: &str = "TMETRICS_TOKEN_";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error when reading configuration file
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML configuration: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Field validation error
    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    /// Environment variable parsing error
    #[error("Failed to parse environment variable '{var}': {source}")]
    EnvParseError {
        /// Variable name
        var: String,
        /// Parse failure
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Keys or references that do not line up
    #[error("Invalid configuration: {0}")]
    InvalidReference(String),
}

impl From<ConfigError> for MetricsError {
    fn from(err: ConfigError) -> Self {
        MetricsError::config_with_source("configuration could not be loaded", err)
    }
}

/// Configuration loader for the application
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file with environment variable overrides
    pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "read configuration file");
        Self::from_yaml_with(&content, |name| env::var(name).ok())
    }

    /// Locate and load the configuration.
    ///
    /// Lookup order: explicit path, `TMETRICS_CONFIG_PATH`, `config.yaml`,
    /// `config.yml`, then built-in defaults. Environment overrides always apply.
    pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_config(path);
        }
        if let Ok(path) = env::var(CONFIG_PATH_VAR) {
            return Self::load_config(PathBuf::from(path));
        }
        for candidate in ["config.yaml", "config.yml"] {
            if Path::new(candidate).exists() {
                return Self::load_config(candidate);
            }
        }

        info!("no configuration file found, using built-in defaults");
        let mut config = Config::default();
        Self::apply_overrides(&mut config, |name| env::var(name).ok())?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Parse YAML, apply overrides from `lookup` and validate
    pub fn from_yaml_with<F>(content: &str, lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config = serde_yaml::from_str(content)?;
        Self::apply_overrides(&mut config, lookup)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply environment style overrides read through `lookup`
    pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(limit) = lookup("TMETRICS_WORKER_LIMIT") {
            config.run.worker_limit = parse_var("TMETRICS_WORKER_LIMIT", &limit)?;
        }

        if let Some(timeout) = lookup("TMETRICS_RUN_TIMEOUT") {
            config.run.run_timeout_seconds = parse_var("TMETRICS_RUN_TIMEOUT", &timeout)?;
        }

        if let Some(dir) = lookup("TMETRICS_OUTPUT_DIR") {
            config.run.output_dir = PathBuf::from(dir);
        }

        if let Some(path) = lookup("TMETRICS_STORE_PATH") {
            config.storage.path = PathBuf::from(path);
        }

        if let Some(level) = lookup("TMETRICS_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(retries) = lookup("TMETRICS_MAX_RETRIES") {
            config.fetch.max_retries = parse_var("TMETRICS_MAX_RETRIES", &retries)?;
        }

        for (key, source) in &mut config.sources {
            let var = token_var(key);
            if let Some(token) = lookup(&var).filter(|t| !t.trim().is_empty()) {
                debug!(source = %key, "credential supplied through {}", var);
                source.token = Some(token.trim().to_string());
            }
        }

        Ok(())
    }
}

/// Name of the credential variable for a source key
pub fn token_var(source_key: &str) -> String {
    format!("{TOKEN_VAR_PREFIX}{}", source_key.to_ascii_uppercase())
}

fn parse_var<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.trim().parse().map_err(|e| ConfigError::EnvParseError {
        var: var.to_string(),
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = ConfigLoader::from_yaml_with("{}", no_env).unwrap();
        assert_eq!(config.run.worker_limit, 4);
        assert!(config.sources.contains_key("bugzilla"));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("TMETRICS_WORKER_LIMIT", "8"),
            ("TMETRICS_OUTPUT_DIR", "/tmp/digest"),
            ("TMETRICS_TOKEN_GITHUB", " ghp_secret "),
        ]
        .into_iter()
        .collect();

        let config =
            ConfigLoader::from_yaml_with("{}", |k| env.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(config.run.worker_limit, 8);
        assert_eq!(config.run.output_dir, PathBuf::from("/tmp/digest"));
        assert_eq!(config.sources["github"].token.as_deref(), Some("ghp_secret"));
        assert!(config.sources["bugzilla"].token.is_none());
    }

    #[test]
    fn test_bad_override_reports_variable() {
        let err = ConfigLoader::from_yaml_with("{}", |k| {
            (k == "TMETRICS_WORKER_LIMIT").then(|| "many".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("TMETRICS_WORKER_LIMIT"));
    }

    #[test]
    fn test_token_var() {
        assert_eq!(token_var("weblate_stats"), "TMETRICS_TOKEN_WEBLATE_STATS");
    }

    #[test]
    fn test_token_not_serialized() {
        let mut config = Config::default();
        if let Some(github) = config.sources.get_mut("github") {
            github.token = Some("secret".to_string());
        }
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("secret"));
        assert!(format!("{:?}", config.sources["github"]).contains("<redacted>"));
    }
}
