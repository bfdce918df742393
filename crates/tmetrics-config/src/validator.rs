//! Field and cross-reference validation.

use crate::loader::ConfigError;
use crate::schema::Config;
use std::collections::HashSet;
use tmetrics_common::SourceKey;
use validator::{Validate, ValidationError};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Accepts a plain level or an env-filter directive list whose default level is known.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let known = level.split(',').all(|directive| {
        let lvl = directive.rsplit('=').next().unwrap_or(directive).trim();
        LOG_LEVELS.contains(&lvl.to_ascii_lowercase().as_str())
    });
    if known {
        Ok(())
    } else {
        Err(ValidationError::new("log_level"))
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate every section, then check that keys and references line up.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        config.fetch.validate()?;
        config.charts.validate()?;
        config.run.validate()?;
        config.logging.validate()?;

        for (key, source) in &config.sources {
            SourceKey::new(key.as_str())
                .map_err(|e| ConfigError::InvalidReference(e.to_string()))?;
            source.validate()?;
            if source.authenticated_requests_per_hour < source.requests_per_hour {
                return Err(ConfigError::InvalidReference(format!(
                    "source '{key}' allows fewer authenticated than anonymous requests"
                )));
            }
        }

        let mut seen = HashSet::new();
        for topic in &config.topics {
            topic.validate()?;
            if !seen.insert(topic.key.as_str()) {
                return Err(ConfigError::InvalidReference(format!(
                    "topic '{}' is defined twice",
                    topic.key
                )));
            }
            let mut listed = HashSet::new();
            for source in &topic.sources {
                if !config.sources.contains_key(source) {
                    return Err(ConfigError::InvalidReference(format!(
                        "topic '{}' references unknown source '{source}'",
                        topic.key
                    )));
                }
                if !listed.insert(source.as_str()) {
                    return Err(ConfigError::InvalidReference(format!(
                        "topic '{}' lists source '{source}' twice",
                        topic.key
                    )));
                }
            }
        }

        Ok(())
    }
}
