//! Error types shared across the workspace. `ConfigError` follows the same
//! shape as `tasker-client::error::ClientError`: a `thiserror` enum with
//! constructor helpers and an `is_recoverable` classifier.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {key}")]
    Missing { key: String },

    #[error("invalid value for environment variable {key}: {value}")]
    Invalid { key: String, value: String },

    /// An optional `dispatcher.toml` base layer exists but failed to parse,
    /// or the `config` crate's own merge step failed.
    #[error("configuration source error: {0}")]
    Source(#[from] config::ConfigError),
}

impl ConfigError {
    pub fn missing(key: &str) -> Self {
        ConfigError::Missing {
            key: key.to_string(),
        }
    }

    pub fn invalid(key: &str, value: &str) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    /// Configuration errors are never retryable — they require operator
    /// intervention, not another attempt.
    pub fn is_recoverable(&self) -> bool {
        false
    }
}
