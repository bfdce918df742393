//! Building adapters for the built-in source set.

use chrono::Utc;
use std::time::Duration;
use tmetrics_common::SourceKey;
use tmetrics_config::Config;
use tmetrics_sources::{build_adapter, build_source, AdapterContext, Credential, FetchEnvironment};

fn context<'a>(config: &'a Config, key: &str, env: &FetchEnvironment) -> AdapterContext<'a> {
    AdapterContext {
        key: SourceKey::new(key).unwrap(),
        settings: config.source(key).unwrap(),
        env: env.clone(),
        as_of: Utc::now(),
    }
}

#[test]
fn test_every_default_source_builds_with_a_credential() {
    let config = Config::default();
    let env = FetchEnvironment::live(&config.fetch).unwrap();

    for key in config.sources.keys() {
        let adapter = build_source(context(&config, key, &env), Some(Credential::new("token"))).unwrap();
        assert_eq!(adapter.source().key.as_str(), key);
        assert!(adapter.source().base_url.as_str().ends_with('/'));
        assert!(!adapter.metrics().is_empty(), "{key} defines no metrics");
    }
}

#[test]
fn test_anonymous_github_is_limited_to_sixty_per_hour() {
    let config = Config::default();
    let env = FetchEnvironment::live(&config.fetch).unwrap();

    let adapter = build_adapter(context(&config, "github", &env)).unwrap();
    assert_eq!(adapter.source().min_request_interval(false), Duration::from_secs(60));
    assert!(adapter.source().min_request_interval(true) < Duration::from_secs(1));
}

#[test]
fn test_missing_required_parameter_is_a_config_error() {
    let mut config = Config::default();
    if let Some(settings) = config.sources.get_mut("github") {
        settings.params.clear();
    }
    let env = FetchEnvironment::live(&config.fetch).unwrap();

    let err = build_adapter(context(&config, "github", &env)).err().unwrap();
    assert!(err.to_string().contains("repository"));
}
