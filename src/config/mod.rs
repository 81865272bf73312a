//! Configuration, resolved from environment variables at startup.
//!
//! Each subsystem gets its own struct with a `resolve()` that reads and
//! validates its variables in one place. Everything has a workable default
//! except the classification oracle endpoint, which there is no sane guess
//! for.

pub mod helpers;

use std::time::Duration;

use crate::error::ConfigError;

use helpers::{optional_env, parse_bool_env, parse_optional_env, require_env};

/// Where the registry database lives.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

impl DatabaseConfig {
    pub fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            path: optional_env("CAPGATE_DB_PATH")?.unwrap_or_else(|| "capgate.db".to_string()),
        })
    }
}

/// Classification engine and oracle settings.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// When off, nothing classifies; capabilities stay unclassified and
    /// remain fully discoverable and executable.
    pub enabled: bool,
    /// Base URL of an OpenAI-compatible chat completion API.
    pub oracle_base_url: String,
    pub oracle_api_key: Option<String>,
    pub oracle_model: String,
    pub oracle_timeout: Duration,
    /// Assignments below this confidence are discarded.
    pub confidence_threshold: f64,
    /// Concurrent oracle calls.
    pub max_concurrency: usize,
    /// How often the worker sweeps for unclassified capabilities.
    pub poll_interval: Duration,
    pub queue_capacity: usize,
    pub sweep_batch_size: i64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            oracle_base_url: "http://localhost:8080/v1".to_string(),
            oracle_api_key: None,
            oracle_model: "gpt-4o-mini".to_string(),
            oracle_timeout: Duration::from_secs(30),
            confidence_threshold: 0.5,
            max_concurrency: 4,
            poll_interval: Duration::from_secs(30),
            queue_capacity: 256,
            sweep_batch_size: 32,
        }
    }
}

impl ClassifierConfig {
    pub fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let confidence_threshold = parse_optional_env::<f64>("CLASSIFY_CONFIDENCE_THRESHOLD")?
            .unwrap_or(defaults.confidence_threshold);
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "CLASSIFY_CONFIDENCE_THRESHOLD".to_string(),
                message: format!("{} is outside [0, 1]", confidence_threshold),
            });
        }
        let enabled = parse_bool_env("CLASSIFY_ENABLED")?.unwrap_or(defaults.enabled);
        let oracle_base_url = if enabled {
            require_env(
                "CLASSIFY_ORACLE_URL",
                "Set it to the base URL of an OpenAI-compatible API, e.g. https://api.openai.com/v1",
            )?
        } else {
            optional_env("CLASSIFY_ORACLE_URL")?.unwrap_or(defaults.oracle_base_url)
        };
        Ok(Self {
            enabled,
            oracle_base_url,
            oracle_api_key: optional_env("CLASSIFY_ORACLE_API_KEY")?,
            oracle_model: optional_env("CLASSIFY_ORACLE_MODEL")?
                .unwrap_or(defaults.oracle_model),
            oracle_timeout: parse_optional_env::<u64>("CLASSIFY_ORACLE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.oracle_timeout),
            confidence_threshold,
            max_concurrency: parse_optional_env("CLASSIFY_MAX_CONCURRENCY")?
                .unwrap_or(defaults.max_concurrency),
            poll_interval: parse_optional_env::<u64>("CLASSIFY_POLL_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            queue_capacity: defaults.queue_capacity,
            sweep_batch_size: parse_optional_env("CLASSIFY_SWEEP_BATCH_SIZE")?
                .unwrap_or(defaults.sweep_batch_size),
        })
    }
}

/// External server aggregation settings.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub resync_interval: Duration,
    /// Default per-call timeout for remote servers that do not set their own.
    pub request_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl AggregatorConfig {
    pub fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            resync_interval: parse_optional_env::<u64>("AGGREGATOR_RESYNC_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.resync_interval),
            request_timeout: parse_optional_env::<u64>("AGGREGATOR_REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        })
    }
}

/// Discovery surface settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Default cap on discover results when the caller does not pass one.
    pub max_results: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { max_results: 10 }
    }
}

impl GatewayConfig {
    pub fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_results: parse_optional_env("DISCOVER_MAX_RESULTS")?
                .unwrap_or(defaults.max_results),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_config_defaults_without_env() {
        std::env::remove_var("CAPGATE_DB_PATH");
        let config = DatabaseConfig::resolve().unwrap();
        assert_eq!(config.path, "capgate.db");
    }

    // One test covers the classifier variables: env is process-global and
    // tests run in parallel, so CLASSIFY_* is only touched here.
    #[test]
    fn classifier_resolution() {
        std::env::remove_var("CLASSIFY_ORACLE_URL");
        assert!(matches!(
            ClassifierConfig::resolve(),
            Err(ConfigError::MissingRequired { .. })
        ));

        std::env::set_var("CLASSIFY_ORACLE_URL", "http://localhost/v1");
        std::env::set_var("CLASSIFY_CONFIDENCE_THRESHOLD", "1.5");
        assert!(matches!(
            ClassifierConfig::resolve(),
            Err(ConfigError::InvalidValue { .. })
        ));

        std::env::set_var("CLASSIFY_CONFIDENCE_THRESHOLD", "0.7");
        let config = ClassifierConfig::resolve().unwrap();
        assert_eq!(config.oracle_base_url, "http://localhost/v1");
        assert!((config.confidence_threshold - 0.7).abs() < f64::EPSILON);

        std::env::remove_var("CLASSIFY_CONFIDENCE_THRESHOLD");
        std::env::remove_var("CLASSIFY_ORACLE_URL");
    }
}
