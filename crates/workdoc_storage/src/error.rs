//! Error types for storage operations.

use crate::statement::StatementType;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The row is locked by another transaction.
    ///
    /// This is the only transient error: retrying later may succeed.
    #[error("row {table}/{key} is locked by another transaction")]
    RowLocked {
        /// Table containing the row.
        table: String,
        /// Key of the locked row.
        key: String,
    },

    /// The statement references a table that does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// A named bind has no value.
    #[error("no value bound for :{0}")]
    UnboundVariable(String),

    /// A bind value has the wrong kind for where it is used.
    #[error("bind :{name} must be {expected}")]
    BindTypeMismatch {
        /// Name of the bind.
        name: String,
        /// The kind of value required.
        expected: &'static str,
    },

    /// An insert targeted a key that already exists.
    #[error("duplicate key {key} in {table}")]
    DuplicateKey {
        /// Table of the insert.
        table: String,
        /// The duplicate key.
        key: String,
    },

    /// A statement was executed through the wrong entry point.
    #[error("{operation} does not accept a {actual} statement")]
    WrongStatementType {
        /// The operation that rejected the statement.
        operation: &'static str,
        /// The statement type supplied.
        actual: StatementType,
    },

    /// The locator's row no longer exists.
    #[error("locator for {table}/{key} no longer references a row")]
    StaleLocator {
        /// Table of the locator.
        table: String,
        /// Key of the locator.
        key: String,
    },

    /// A locator write was attempted without holding the row lock.
    #[error("row {table}/{key} is not locked by the writing transaction")]
    NotLockOwner {
        /// Table of the row.
        table: String,
        /// Key of the row.
        key: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A snapshot file could not be read or written.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// The connection is no longer usable.
    #[error("connection closed")]
    Closed,
}

impl StorageError {
    /// Returns true if the error is lock contention that may clear on retry.
    #[must_use]
    pub fn is_row_locked(&self) -> bool {
        matches!(self, StorageError::RowLocked { .. })
    }
}
