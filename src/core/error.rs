//! Error types for broker operations.

use thiserror::Error;

/// Errors reported by a document store backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The document, or the whole collection, does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The revision supplied with an update is stale.
    #[error("conflict: {0}")]
    Conflict(String),
    /// A document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the error reports a missing document or collection.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors produced by the job core.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job identity does not exist in the store.
    #[error("job not found")]
    NotFound,
    /// An opaque blob was empty when a handler tried to decode it.
    #[error("message is nil")]
    MessageNil,
    /// An opaque blob could not be decoded into the requested type.
    #[error("could not unmarshal message")]
    MessageUnmarshal,
    /// No worker type with this name is registered.
    #[error("unknown worker type: {0}")]
    UnknownWorker(String),
    /// The worker type only accepts jobs pushed by the stack itself.
    #[error("worker type {0} is reserved")]
    ReservedWorker(String),
    /// Workers were already started on this broker.
    #[error("workers already started")]
    AlreadyStarted,
    /// The broker has been shut down.
    #[error("broker has been shut down")]
    Shutdown,
    /// Shutdown deadline expired with executions still in flight.
    #[error("shutdown deadline expired with {abandoned} running executions")]
    ShutdownDeadline {
        /// Number of slots still running when the deadline hit.
        abandoned: usize,
    },
    /// A waited-for job reached the errored state.
    #[error("job failed: {0}")]
    Failed(String),
    /// Broker configuration is invalid or incomplete.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The notification hub refused an operation.
    #[error("hub error: {0}")]
    Hub(String),
    /// Persistence failure, propagated untouched.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_wraps_transparently() {
        let err: JobError = StoreError::Backend("connection reset".into()).into();
        assert_eq!(err.to_string(), "backend error: connection reset");
    }

    #[test]
    fn not_found_detection() {
        assert!(StoreError::NotFound("io.jobs".into()).is_not_found());
        assert!(!StoreError::Conflict("1-a".into()).is_not_found());
    }
}
