//! Store error type, grounded on `tasker-client::error::ClientError`'s
//! shape (a `thiserror` enum plus an `is_recoverable` classifier the retry
//! helper's callers consult).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("row not found: {what}")]
    NotFound { what: String },

    #[error("invalid row returned by the store: {reason}")]
    InvalidRow { reason: String },
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound { what: what.into() }
    }

    pub fn invalid_row(reason: impl Into<String>) -> Self {
        StoreError::InvalidRow {
            reason: reason.into(),
        }
    }

    /// Transient (connection/timeout) errors are retryable; a row simply
    /// not existing or being malformed is not — retrying won't fix it.
    pub fn is_recoverable(&self) -> bool {
        match self {
            #[cfg(feature = "postgres")]
            StoreError::Database(e) => {
                matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
            }
            StoreError::Serialization(_) => false,
            StoreError::NotFound { .. } => false,
            StoreError::InvalidRow { .. } => false,
        }
    }

    /// Short variant name used as the "class" half of failure records
    /// surfaced to an `ErrorSummarizer`.
    pub fn class_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "postgres")]
            StoreError::Database(_) => "Database",
            StoreError::Serialization(_) => "Serialization",
            StoreError::NotFound { .. } => "NotFound",
            StoreError::InvalidRow { .. } => "InvalidRow",
        }
    }
}
