//! Error types for the service layer.
//!
//! Precondition and configuration failures are raised synchronously, before
//! any query is mutated or executed. Database errors are propagated from sqlx
//! verbatim so callers can branch on the underlying error shape.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required argument was missing or empty. Caller bug; never retried.
    #[error("{0}")]
    Precondition(String),

    /// A service was misconfigured (e.g. a default-sort key without the
    /// `$alias` placeholder, or a relation graph deeper than the cap).
    #[error("{0}")]
    Configuration(String),

    /// No active connection/pool is registered under the requested name.
    #[error("Connection or repository not found")]
    RepositoryNotFound,

    /// Underlying database error, unchanged.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl Error {
    pub(crate) fn precondition(message: &str) -> Self {
        Error::Precondition(message.to_string())
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }
}
