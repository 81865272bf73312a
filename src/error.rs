//! Error types, one enum per subsystem.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced to the calling agent by the gateway.
///
/// Every gateway operation returns one of these variants rather than a raw
/// transport or storage error. `NotFound` deliberately does not distinguish
/// "does not exist" from "not visible to your org" so callers cannot probe
/// for other tenants' capability names.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("A capability named '{0}' already exists in this scope")]
    NameConflict(String),

    #[error("Capability '{0}' not found")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Server unavailable: {0}")]
    ServerUnavailable(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Store(StoreError),
}

/// Errors from the capability store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("A capability named '{name}' already exists in this scope")]
    NameConflict { name: String },

    #[error("Row not found: {0}")]
    RowNotFound(String),

    #[error("Skill category '{0}' still has assigned capabilities")]
    SkillInUse(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Errors from the classification engine and oracle.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Oracle request failed: {0}")]
    Oracle(String),

    #[error("Oracle timed out after {0:?}")]
    Timeout(Duration),

    #[error("Oracle returned an unparseable response: {0}")]
    BadResponse(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the external server aggregator.
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("Server '{0}' is unknown")]
    UnknownServer(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Remote server returned an error: {0}")]
    Remote(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Environment variable {key} contains invalid unicode")]
    InvalidUnicode { key: String },
}

impl From<AggregatorError> for GatewayError {
    fn from(e: AggregatorError) -> Self {
        match e {
            AggregatorError::Timeout(d) => GatewayError::Timeout(d),
            AggregatorError::Store(s) => GatewayError::Store(s),
            other => GatewayError::ServerUnavailable(other.to_string()),
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NameConflict { name } => GatewayError::NameConflict(name),
            other => GatewayError::Store(other),
        }
    }
}
