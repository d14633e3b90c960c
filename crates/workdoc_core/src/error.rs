//! Error types for work unit operations.

use std::time::Duration;
use thiserror::Error;
use workdoc_dom::DomError;
use workdoc_storage::StorageError;

/// Result type for work unit operations.
pub type WorkDocResult<T> = Result<T, WorkDocError>;

/// Errors that can occur while opening, closing or aborting a work unit.
#[derive(Debug, Error)]
pub enum WorkDocError {
    /// The row lock was not obtained within the configured bound.
    ///
    /// The only retryable kind; nothing retries it internally.
    #[error("row lock on {resource} not obtained within {waited:?}")]
    Timeout {
        /// Label of the contended resource.
        resource: String,
        /// How long the selector waited.
        waited: Duration,
    },

    /// The storage location cannot support the requested operation.
    #[error("storage location {location}: {message}")]
    Configuration {
        /// Name of the storage location.
        location: String,
        /// Description of the problem.
        message: String,
    },

    /// Persisted state does not match what the work unit wrote.
    ///
    /// Always fatal: retrying could mask a lost update.
    #[error("storage location {location}: consistency violation: {message}")]
    Consistency {
        /// Name of the storage location.
        location: String,
        /// Description of the violation.
        message: String,
    },

    /// The work unit was used out of sequence.
    #[error("invalid work unit state: {message}")]
    InvalidState {
        /// Description of the misuse.
        message: String,
    },

    /// A statement or locator operation failed.
    #[error("storage location {location}: {source}")]
    Database {
        /// Name of the storage location.
        location: String,
        /// The underlying storage error.
        #[source]
        source: StorageError,
    },

    /// A storage error not yet attributed to a location.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The document could not be built, mutated or decoded.
    #[error("document error: {0}")]
    Document(#[from] DomError),
}

impl WorkDocError {
    /// Creates a configuration error.
    pub fn configuration(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Creates a consistency error.
    pub fn consistency(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Consistency {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a database error.
    pub fn database(location: impl Into<String>, source: StorageError) -> Self {
        Self::Database {
            location: location.into(),
            source,
        }
    }

    /// Attributes a bare storage error to a storage location.
    #[must_use]
    pub fn in_location(self, location: &str) -> Self {
        match self {
            Self::Storage(source) => Self::database(location, source),
            other => other,
        }
    }

    /// Returns true if a higher level may retry the whole operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
