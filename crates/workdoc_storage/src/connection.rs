//! Connection and connection-provider traits.

use crate::error::{StorageError, StorageResult};
use crate::statement::{BindValues, Statement};
use bytes::Bytes;
use std::fmt;

/// Identifier of the transaction that owns row locks.
///
/// Transaction IDs are monotonically increasing and never reused within a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Handle to the large-object cell of one locked row.
///
/// A locator is only meaningful while its owning transaction holds the row lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    table: String,
    key: String,
    owner: TransactionId,
}

impl Locator {
    /// Creates a locator for a row locked by `owner`.
    pub fn new(table: impl Into<String>, key: impl Into<String>, owner: TransactionId) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            owner,
        }
    }

    /// Returns the table of the row.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the key of the row.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the transaction holding the row lock.
    #[must_use]
    pub fn owner(&self) -> TransactionId {
        self.owner
    }
}

/// A database connection bound to one transaction.
///
/// # Invariants
///
/// - `select_for_update` never waits: contention is reported as
///   [`StorageError::RowLocked`]
/// - Row locks are reentrant for the owning transaction
/// - A lock is held until `release_lock` or the end of the transaction
pub trait Connection: Send {
    /// Returns the transaction this connection works in.
    fn transaction_id(&self) -> TransactionId;

    /// Runs a locking query and opens a locator on the selected row.
    ///
    /// Returns `Ok(None)` if no row matches.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::RowLocked`] if another transaction holds the
    /// row lock, or another error if the statement cannot run.
    fn select_for_update(
        &mut self,
        statement: &Statement,
        binds: &BindValues,
    ) -> StorageResult<Option<Locator>>;

    /// Executes an insert or update, returning the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement cannot run.
    fn execute(&mut self, statement: &Statement, binds: &BindValues) -> StorageResult<u64>;

    /// Reads the large-object cell. `None` means SQL `NULL`.
    ///
    /// # Errors
    ///
    /// Returns an error if the locator no longer references a row.
    fn read_lob(&mut self, locator: &Locator) -> StorageResult<Option<Bytes>>;

    /// Replaces the content of the large-object cell.
    ///
    /// # Errors
    ///
    /// Returns an error if this transaction does not hold the row lock.
    fn write_lob(&mut self, locator: &Locator, data: Bytes) -> StorageResult<()>;

    /// Releases the row lock behind a locator, if this transaction holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the release cannot be performed.
    fn release_lock(&mut self, locator: &Locator) -> StorageResult<()>;
}

/// Lends pooled connections for a stated purpose.
pub trait ConnectionProvider {
    /// The connection type handed out.
    type Connection: Connection;

    /// Borrows a connection.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be obtained.
    fn get_connection(&self, purpose: &str) -> StorageResult<Self::Connection>;

    /// Returns a borrowed connection.
    fn return_connection(&self, connection: Self::Connection, purpose: &str);
}

struct ReturnOnDrop<'p, P: ConnectionProvider + ?Sized> {
    provider: &'p P,
    connection: Option<P::Connection>,
    purpose: &'p str,
}

impl<P: ConnectionProvider + ?Sized> Drop for ReturnOnDrop<'_, P> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.provider.return_connection(connection, self.purpose);
        }
    }
}

/// Borrows a connection for the duration of `f`.
///
/// The connection is returned to the provider when `f` finishes, whether it
/// succeeds, fails, or unwinds.
///
/// # Errors
///
/// Returns the error from obtaining the connection, or from `f`.
pub fn with_connection<P, T, E, F>(provider: &P, purpose: &str, f: F) -> Result<T, E>
where
    P: ConnectionProvider + ?Sized,
    E: From<StorageError>,
    F: FnOnce(&mut P::Connection) -> Result<T, E>,
{
    let connection = provider.get_connection(purpose)?;
    let mut scope = ReturnOnDrop {
        provider,
        connection: Some(connection),
        purpose,
    };
    let result = match scope.connection.as_mut() {
        Some(connection) => f(connection),
        None => Err(StorageError::Closed.into()),
    };
    drop(scope);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryDatabase;

    #[test]
    fn transaction_id_display() {
        assert_eq!(TransactionId::new(7).to_string(), "txn:7");
    }

    #[test]
    fn with_connection_returns_on_success_and_failure() {
        let db = MemoryDatabase::new();
        let session = db.session();

        let ok: StorageResult<u64> = with_connection(&session, "ok", |_| Ok(1));
        assert_eq!(ok.unwrap(), 1);
        assert_eq!(session.outstanding_connections(), 0);

        let failed: StorageResult<()> =
            with_connection(&session, "fail", |_| Err(StorageError::Closed));
        assert!(failed.is_err());
        assert_eq!(session.outstanding_connections(), 0);
        assert_eq!(session.connections_lent(), 2);
    }

    #[test]
    fn with_connection_returns_on_panic() {
        let db = MemoryDatabase::new();
        let session = db.session();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: StorageResult<()> = with_connection(&session, "panic", |_| panic!("boom"));
        }));
        assert!(outcome.is_err());
        assert_eq!(session.outstanding_connections(), 0);
    }
}
