//! Error types shared across capscale crates.

use thiserror::Error;

/// Result type alias for remote service calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors returned by the remote table-management and statistics services.
///
/// These are transient from the engine's point of view: the failing table
/// is reported and the next tick re-evaluates it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Errors raised while loading or validating `capscale.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
