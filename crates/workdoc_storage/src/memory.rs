//! In-memory row store with transaction-owned row locks.

use crate::connection::{Connection, ConnectionProvider, Locator, TransactionId};
use crate::error::{StorageError, StorageResult};
use crate::statement::{BindValues, DocSource, Statement, StatementType};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Content of a large-object column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobCell {
    /// SQL `NULL`.
    Null,
    /// A large object, possibly empty.
    Data(Bytes),
}

impl LobCell {
    /// Creates an empty (non-null) large object.
    #[must_use]
    pub fn empty() -> Self {
        LobCell::Data(Bytes::new())
    }

    /// Returns true for SQL `NULL`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, LobCell::Null)
    }

    /// Returns true for a zero-length large object.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, LobCell::Data(data) if data.is_empty())
    }

    /// Returns the content, or `None` for `NULL`.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            LobCell::Null => None,
            LobCell::Data(data) => Some(data),
        }
    }
}

#[derive(Debug)]
struct Row {
    doc: LobCell,
    lock_owner: Option<TransactionId>,
}

type Table = BTreeMap<String, Row>;

/// Counts of statements executed against a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatementStats {
    /// Locking queries attempted, including contended ones.
    pub queries: u64,
    /// Inserts executed.
    pub inserts: u64,
    /// Updates executed.
    pub updates: u64,
}

#[derive(Debug, Default)]
struct Counters {
    queries: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
}

#[derive(Debug)]
struct Shared {
    tables: RwLock<BTreeMap<String, Table>>,
    next_txid: AtomicU64,
    counters: Counters,
}

/// A thread-safe in-memory database of single-document tables.
///
/// Each table maps a text key to a row holding one large-object cell. Rows
/// carry the [`TransactionId`] holding their lock; locks are taken by locking
/// queries, inserts and updates and released through a locator or when the
/// owning [`MemorySession`] ends.
///
/// Cloning is cheap and shares the same data.
///
/// # Example
///
/// ```rust
/// use workdoc_storage::{LobCell, MemoryDatabase};
///
/// let db = MemoryDatabase::new();
/// db.create_table("docs");
/// db.write_out_of_band("docs", "a", LobCell::empty()).unwrap();
/// assert_eq!(db.keys("docs").unwrap(), vec!["a".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tables(BTreeMap::new())
    }

    pub(crate) fn with_tables(tables: BTreeMap<String, BTreeMap<String, LobCell>>) -> Self {
        let tables = tables
            .into_iter()
            .map(|(name, rows)| {
                let rows = rows
                    .into_iter()
                    .map(|(key, doc)| (key, Row { doc, lock_owner: None }))
                    .collect();
                (name, rows)
            })
            .collect();
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(tables),
                next_txid: AtomicU64::new(1),
                counters: Counters::default(),
            }),
        }
    }

    pub(crate) fn export_tables(&self) -> BTreeMap<String, BTreeMap<String, LobCell>> {
        self.shared
            .tables
            .read()
            .iter()
            .map(|(name, rows)| {
                let rows = rows
                    .iter()
                    .map(|(key, row)| (key.clone(), row.doc.clone()))
                    .collect();
                (name.clone(), rows)
            })
            .collect()
    }

    /// Creates a table if it does not already exist.
    pub fn create_table(&self, name: impl Into<String>) {
        self.shared
            .tables
            .write()
            .entry(name.into())
            .or_default();
    }

    /// Returns the names of all tables.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.shared.tables.read().keys().cloned().collect()
    }

    /// Returns the keys of all rows in a table.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TableNotFound`] if the table does not exist.
    pub fn keys(&self, table: &str) -> StorageResult<Vec<String>> {
        let tables = self.shared.tables.read();
        let rows = tables
            .get(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        Ok(rows.keys().cloned().collect())
    }

    /// Returns the document cell of a row, ignoring locks.
    #[must_use]
    pub fn row(&self, table: &str, key: &str) -> Option<LobCell> {
        self.shared
            .tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(key))
            .map(|row| row.doc.clone())
    }

    /// Returns the transaction holding a row lock.
    #[must_use]
    pub fn lock_owner(&self, table: &str, key: &str) -> Option<TransactionId> {
        self.shared
            .tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(key))
            .and_then(|row| row.lock_owner)
    }

    /// Writes a cell without taking or honouring row locks.
    ///
    /// Models a writer that bypasses the locking protocol. Creates the row if
    /// it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TableNotFound`] if the table does not exist.
    pub fn write_out_of_band(&self, table: &str, key: &str, doc: LobCell) -> StorageResult<()> {
        let mut tables = self.shared.tables.write();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        rows.entry(key.to_string())
            .and_modify(|row| row.doc = doc.clone())
            .or_insert(Row {
                doc,
                lock_owner: None,
            });
        Ok(())
    }

    /// Deletes a row without honouring row locks, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TableNotFound`] if the table does not exist.
    pub fn delete_out_of_band(&self, table: &str, key: &str) -> StorageResult<bool> {
        let mut tables = self.shared.tables.write();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        Ok(rows.remove(key).is_some())
    }

    /// Starts a new session with its own transaction.
    #[must_use]
    pub fn session(&self) -> MemorySession {
        let txid = TransactionId::new(self.shared.next_txid.fetch_add(1, Ordering::SeqCst));
        MemorySession {
            db: self.clone(),
            txid,
            outstanding: AtomicUsize::new(0),
            lent: AtomicU64::new(0),
        }
    }

    /// Returns statement counters since the database was created.
    #[must_use]
    pub fn stats(&self) -> StatementStats {
        let counters = &self.shared.counters;
        StatementStats {
            queries: counters.queries.load(Ordering::SeqCst),
            inserts: counters.inserts.load(Ordering::SeqCst),
            updates: counters.updates.load(Ordering::SeqCst),
        }
    }

    /// Releases every row lock held by a transaction, returning how many were held.
    pub fn release_locks(&self, txid: TransactionId) -> usize {
        let mut tables = self.shared.tables.write();
        let mut released = 0;
        for row in tables.values_mut().flat_map(|rows| rows.values_mut()) {
            if row.lock_owner == Some(txid) {
                row.lock_owner = None;
                released += 1;
            }
        }
        released
    }

    fn select_for_update(
        &self,
        txid: TransactionId,
        statement: &Statement,
        binds: &BindValues,
    ) -> StorageResult<Option<Locator>> {
        let Statement::Query { table, key } = statement else {
            return Err(StorageError::WrongStatementType {
                operation: "select_for_update",
                actual: statement.statement_type(),
            });
        };
        self.shared.counters.queries.fetch_add(1, Ordering::SeqCst);

        let key = key.resolve(binds)?;
        let mut tables = self.shared.tables.write();
        let rows = tables
            .get_mut(table.as_str())
            .ok_or_else(|| StorageError::TableNotFound(table.clone()))?;

        let Some(row) = rows.get_mut(key) else {
            return Ok(None);
        };
        lock_row(row, txid, table, key)?;
        Ok(Some(Locator::new(table.as_str(), key, txid)))
    }

    fn execute(
        &self,
        txid: TransactionId,
        statement: &Statement,
        binds: &BindValues,
    ) -> StorageResult<u64> {
        match statement {
            Statement::Query { .. } => Err(StorageError::WrongStatementType {
                operation: "execute",
                actual: StatementType::Query,
            }),
            Statement::Insert { table, key, doc } => {
                self.shared.counters.inserts.fetch_add(1, Ordering::SeqCst);
                let key = key.resolve(binds)?;
                let doc = resolve_doc(doc, binds)?;

                let mut tables = self.shared.tables.write();
                let rows = tables
                    .get_mut(table.as_str())
                    .ok_or_else(|| StorageError::TableNotFound(table.clone()))?;
                if rows.contains_key(key) {
                    return Err(StorageError::DuplicateKey {
                        table: table.clone(),
                        key: key.to_string(),
                    });
                }
                rows.insert(
                    key.to_string(),
                    Row {
                        doc,
                        lock_owner: Some(txid),
                    },
                );
                Ok(1)
            }
            Statement::Update { table, key, doc } => {
                self.shared.counters.updates.fetch_add(1, Ordering::SeqCst);
                let key = key.resolve(binds)?;
                let doc = resolve_doc(doc, binds)?;

                let mut tables = self.shared.tables.write();
                let rows = tables
                    .get_mut(table.as_str())
                    .ok_or_else(|| StorageError::TableNotFound(table.clone()))?;
                let Some(row) = rows.get_mut(key) else {
                    return Ok(0);
                };
                lock_row(row, txid, table, key)?;
                row.doc = doc;
                Ok(1)
            }
        }
    }

    fn read_lob(&self, locator: &Locator) -> StorageResult<Option<Bytes>> {
        let tables = self.shared.tables.read();
        let row = tables
            .get(locator.table())
            .and_then(|rows| rows.get(locator.key()))
            .ok_or_else(|| stale(locator))?;
        Ok(row.doc.as_bytes().cloned())
    }

    fn write_lob(&self, txid: TransactionId, locator: &Locator, data: Bytes) -> StorageResult<()> {
        let mut tables = self.shared.tables.write();
        let row = tables
            .get_mut(locator.table())
            .and_then(|rows| rows.get_mut(locator.key()))
            .ok_or_else(|| stale(locator))?;
        if row.lock_owner != Some(txid) || locator.owner() != txid {
            return Err(StorageError::NotLockOwner {
                table: locator.table().to_string(),
                key: locator.key().to_string(),
            });
        }
        row.doc = LobCell::Data(data);
        Ok(())
    }

    fn release_lock(&self, txid: TransactionId, locator: &Locator) {
        let mut tables = self.shared.tables.write();
        if let Some(row) = tables
            .get_mut(locator.table())
            .and_then(|rows| rows.get_mut(locator.key()))
        {
            if row.lock_owner == Some(txid) {
                row.lock_owner = None;
            }
        }
    }
}

fn lock_row(row: &mut Row, txid: TransactionId, table: &str, key: &str) -> StorageResult<()> {
    match row.lock_owner {
        Some(owner) if owner != txid => Err(StorageError::RowLocked {
            table: table.to_string(),
            key: key.to_string(),
        }),
        _ => {
            row.lock_owner = Some(txid);
            Ok(())
        }
    }
}

fn resolve_doc(doc: &DocSource, binds: &BindValues) -> StorageResult<LobCell> {
    match doc {
        DocSource::Bind(name) => Ok(LobCell::Data(binds.lob(name)?)),
        DocSource::Empty => Ok(LobCell::empty()),
        DocSource::Null => Ok(LobCell::Null),
    }
}

fn stale(locator: &Locator) -> StorageError {
    StorageError::StaleLocator {
        table: locator.table().to_string(),
        key: locator.key().to_string(),
    }
}

/// A connection provider bound to one transaction.
///
/// Every connection lent by a session works in the session's transaction, so
/// row locks survive returning a connection and borrowing another. Ending or
/// dropping the session releases the transaction's locks.
#[derive(Debug)]
pub struct MemorySession {
    db: MemoryDatabase,
    txid: TransactionId,
    outstanding: AtomicUsize,
    lent: AtomicU64,
}

impl MemorySession {
    /// Returns the session's transaction.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.txid
    }

    /// Returns the database this session works against.
    #[must_use]
    pub fn database(&self) -> &MemoryDatabase {
        &self.db
    }

    /// Returns the number of connections currently borrowed.
    #[must_use]
    pub fn outstanding_connections(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Returns the number of connections lent over the session's lifetime.
    #[must_use]
    pub fn connections_lent(&self) -> u64 {
        self.lent.load(Ordering::SeqCst)
    }

    /// Ends the session, releasing its row locks. Returns how many were held.
    pub fn end(self) -> usize {
        self.db.release_locks(self.txid)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.db.release_locks(self.txid);
    }
}

impl ConnectionProvider for MemorySession {
    type Connection = MemoryConnection;

    fn get_connection(&self, _purpose: &str) -> StorageResult<MemoryConnection> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.lent.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            db: self.db.clone(),
            txid: self.txid,
        })
    }

    fn return_connection(&self, _connection: MemoryConnection, _purpose: &str) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A connection lent by a [`MemorySession`].
#[derive(Debug)]
pub struct MemoryConnection {
    db: MemoryDatabase,
    txid: TransactionId,
}

impl Connection for MemoryConnection {
    fn transaction_id(&self) -> TransactionId {
        self.txid
    }

    fn select_for_update(
        &mut self,
        statement: &Statement,
        binds: &BindValues,
    ) -> StorageResult<Option<Locator>> {
        self.db.select_for_update(self.txid, statement, binds)
    }

    fn execute(&mut self, statement: &Statement, binds: &BindValues) -> StorageResult<u64> {
        self.db.execute(self.txid, statement, binds)
    }

    fn read_lob(&mut self, locator: &Locator) -> StorageResult<Option<Bytes>> {
        self.db.read_lob(locator)
    }

    fn write_lob(&mut self, locator: &Locator, data: Bytes) -> StorageResult<()> {
        self.db.write_lob(self.txid, locator, data)
    }

    fn release_lock(&mut self, locator: &Locator) -> StorageResult<()> {
        self.db.release_lock(self.txid, locator);
        Ok(())
    }
}
