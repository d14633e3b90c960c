//! The work unit: checkout and check-in of one row-stored document.
//!
//! # Protocol
//!
//! `open` borrows a connection, takes the row lock through the
//! [`RowSelector`], and only then inspects or changes any state. It either
//! reads the locked row or inserts a new one. `close` writes the document
//! back if it changed, verifies the write by re-reading the change token,
//! and always releases the lock. `abort` gives up without writing.
//!
//! ```text
//! Unopened ──open──▶ Locked ──▶ Open ──close──▶ Closed ──open──▶ ...
//!                      │          │
//!                      └─ error ──┴──abort──▶ Aborted
//! ```

use crate::accessor::{DocumentAccessor, LobDocumentAccessor};
use crate::config::WorkDocConfig;
use crate::error::{WorkDocError, WorkDocResult};
use crate::location::WorkingStoreLocation;
use crate::selector::RowSelector;
use crate::token::{change_token_of, stamp_change_token, UNKNOWN_CHANGE_TOKEN};
use tracing::{debug, debug_span, info, info_span, warn};
use workdoc_dom::{AccessMode, Document};
use workdoc_storage::{with_connection, Connection, ConnectionProvider};

const OPEN_PURPOSE: &str = "WorkDoc Open";
const CLOSE_PURPOSE: &str = "WorkDoc Close";

/// Lifecycle state of a [`WorkDoc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkDocState {
    /// Never opened.
    Unopened,
    /// Row lock held; document not yet read or created.
    Locked,
    /// Document checked out.
    Open,
    /// Checked in by `close`.
    Closed,
    /// Given up by `abort`.
    Aborted,
}

/// Whether `close` writes the document back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBack {
    /// Only if the document was modified after open.
    IfModified,
    /// Always; the row does not hold a real document yet.
    Forced,
}

/// Result of reading or creating the row during open.
struct Checkout {
    document: Document,
    change_token: String,
    modify_count_at_open: u64,
    write_back: WriteBack,
}

/// One checked-out document bound to a working store location.
///
/// A work unit is driven by one caller at a time; share it through
/// [`crate::WorkDocCache`] to get exclusive checkout. The row lock taken by
/// `open` is what keeps other work units, in this process or another, from
/// opening the same document.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use workdoc_core::{StorageLocation, WorkDoc, WorkDocConfig, WorkingStoreLocation};
/// use workdoc_storage::MemoryDatabase;
///
/// let db = MemoryDatabase::new();
/// db.create_table("order_docs");
/// let orders = Arc::new(StorageLocation::for_table("orders", "order_docs", "ORDER"));
///
/// let session = db.session();
/// let mut work = WorkDoc::new(
///     WorkingStoreLocation::for_key(orders, "o-1"),
///     &WorkDocConfig::default(),
/// );
/// work.open(&session).unwrap();
/// let doc = work.document_mut().unwrap();
/// let root = doc.root();
/// doc.set_attr(root, "status", "new").unwrap();
/// work.close(&session).unwrap();
///
/// assert_eq!(db.stats().inserts, 1);
/// assert_eq!(db.stats().updates, 1);
/// ```
#[derive(Debug)]
pub struct WorkDoc<A: DocumentAccessor = LobDocumentAccessor> {
    location: WorkingStoreLocation,
    accessor: A,
    selector: RowSelector,
    auto_ids: bool,
    state: WorkDocState,
    document: Option<Document>,
    change_token: Option<String>,
    modify_count_at_open: u64,
    write_back: WriteBack,
}

impl WorkDoc<LobDocumentAccessor> {
    /// Creates a work unit using a large-object accessor.
    #[must_use]
    pub fn new(location: WorkingStoreLocation, config: &WorkDocConfig) -> Self {
        Self::with_accessor(location, LobDocumentAccessor::new(), config)
    }
}

impl<A: DocumentAccessor> WorkDoc<A> {
    /// Creates a work unit using the given accessor.
    pub fn with_accessor(location: WorkingStoreLocation, accessor: A, config: &WorkDocConfig) -> Self {
        Self {
            location,
            accessor,
            selector: RowSelector::from_config(config),
            auto_ids: config.auto_ids,
            state: WorkDocState::Unopened,
            document: None,
            change_token: None,
            modify_count_at_open: 0,
            write_back: WriteBack::IfModified,
        }
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkDocState {
        self.state
    }

    /// Returns true while the document is checked out.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == WorkDocState::Open
    }

    /// Returns the working store location.
    #[must_use]
    pub fn location(&self) -> &WorkingStoreLocation {
        &self.location
    }

    /// Returns the accessor.
    #[must_use]
    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    /// Returns the key identifying this document within the process.
    #[must_use]
    pub fn cache_key(&self) -> String {
        self.location.cache_key()
    }

    /// Returns the last known change token.
    #[must_use]
    pub fn change_token(&self) -> Option<&str> {
        self.change_token.as_deref()
    }

    /// Returns the most recently opened document.
    ///
    /// After `close` the document is read-only.
    #[must_use]
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// Returns the checked-out document for editing.
    ///
    /// # Errors
    ///
    /// Returns [`WorkDocError::InvalidState`] unless the work unit is open.
    pub fn document_mut(&mut self) -> WorkDocResult<&mut Document> {
        match (self.state, self.document.as_mut()) {
            (WorkDocState::Open, Some(document)) => Ok(document),
            _ => Err(WorkDocError::invalid_state("work unit is not open")),
        }
    }

    /// Returns the write-back mode `close` will apply.
    #[must_use]
    pub fn write_back(&self) -> WriteBack {
        self.write_back
    }

    /// Checks out the document, creating its row if needed.
    ///
    /// # Errors
    ///
    /// - [`WorkDocError::Timeout`] if the row stays locked by another
    ///   transaction past the configured bound
    /// - [`WorkDocError::InvalidState`] if the work unit is already open
    /// - [`WorkDocError::Configuration`] if a row must be created but the
    ///   location cannot create one
    /// - [`WorkDocError::Consistency`] if the inserted row cannot be selected
    /// - [`WorkDocError::Database`] or [`WorkDocError::Document`] for storage
    ///   and decoding failures
    ///
    /// On error the work unit keeps its previous state and holds no locator.
    pub fn open<P>(&mut self, provider: &P) -> WorkDocResult<()>
    where
        P: ConnectionProvider + ?Sized,
    {
        let location = self.location.name().to_string();
        let span = info_span!("workdoc_open", location = %location, accessor = self.accessor.name());
        let _enter = span.enter();

        with_connection(provider, OPEN_PURPOSE, |connection| self.open_with(connection))
            .map_err(|e| e.in_location(&location))
    }

    fn open_with<C: Connection>(&mut self, connection: &mut C) -> WorkDocResult<()> {
        let found = self.select_row(connection)?;

        if self.state == WorkDocState::Open {
            return Err(WorkDocError::invalid_state("work unit is already open"));
        }
        let prior = self.state;
        self.state = WorkDocState::Locked;

        let checkout = if found {
            self.read_existing_row(connection)
        } else {
            self.insert_new_row(connection)
        };
        let checkout = match checkout {
            Ok(checkout) => checkout,
            Err(e) => {
                self.accessor.close_locator(connection);
                self.state = prior;
                return Err(e);
            }
        };

        let mut document = checkout.document;
        document.set_mode(if self.auto_ids {
            AccessMode::ReadWriteAutoIds
        } else {
            AccessMode::ReadWrite
        });
        self.document = Some(document);
        self.change_token = Some(checkout.change_token);
        self.modify_count_at_open = checkout.modify_count_at_open;
        self.write_back = checkout.write_back;
        self.state = WorkDocState::Open;

        info!(cache_key = %self.location.cache_key(), write_back = ?self.write_back, "work unit opened");
        Ok(())
    }

    fn select_row<C: Connection>(&mut self, connection: &mut C) -> WorkDocResult<bool> {
        let query = self.location.storage().query_statement();
        let binds = self.location.binds();
        let accessor = &mut self.accessor;
        self.selector
            .select_row(connection, self.location.name(), |c| {
                accessor.select_for_update(c, query, binds)
            })
    }

    fn read_existing_row<C: Connection>(&mut self, connection: &mut C) -> WorkDocResult<Checkout> {
        if self.accessor.is_locator_empty(connection)? || self.accessor.is_locator_null(connection)? {
            debug!("document column is empty; initialising a new document");
            let document = self.new_document()?;
            return Ok(Checkout {
                modify_count_at_open: document.modify_count(),
                document,
                change_token: UNKNOWN_CHANGE_TOKEN.to_string(),
                write_back: WriteBack::Forced,
            });
        }

        let document = self.accessor.read_document(connection)?;
        let change_token = change_token_of(&document)
            .unwrap_or(UNKNOWN_CHANGE_TOKEN)
            .to_string();
        Ok(Checkout {
            modify_count_at_open: document.modify_count(),
            document,
            change_token,
            write_back: WriteBack::IfModified,
        })
    }

    fn insert_new_row<C: Connection>(&mut self, connection: &mut C) -> WorkDocResult<Checkout> {
        let span = debug_span!("insert_row");
        let _enter = span.enter();

        let Some(insert) = self.location.storage().insert_statement().cloned() else {
            return Err(WorkDocError::configuration(
                self.location.name(),
                "no row returned and no insert statement defined",
            ));
        };

        let mut document = self.new_document()?;
        let change_token = stamp_change_token(&mut document)?;
        let modify_count_at_open = document.modify_count();
        self.accessor.prepare_for_write(connection, &document)?;

        let mut binds = self.location.binds().clone();
        binds.extend(&self.accessor.dml_binds());
        debug!(statement = %insert, "inserting new row");
        connection
            .execute(&insert, &binds)
            .map_err(|e| WorkDocError::database(self.location.name(), e))?;

        if !self.select_row(connection)? {
            return Err(WorkDocError::consistency(
                self.location.name(),
                "insert/query pair do not access the same row (no data found)",
            ));
        }

        let write_back = if self.accessor.is_locator_empty(connection)? {
            debug!("inserted row holds an empty placeholder; forcing write-back");
            WriteBack::Forced
        } else {
            WriteBack::IfModified
        };
        Ok(Checkout {
            document,
            change_token,
            modify_count_at_open,
            write_back,
        })
    }

    fn new_document(&self) -> WorkDocResult<Document> {
        let storage = self.location.storage();
        let Some(root) = storage.new_doc_root() else {
            return Err(WorkDocError::configuration(
                storage.name(),
                "has no root element name, cannot initialise",
            ));
        };
        Ok(Document::create(root)?)
    }

    /// Checks the document back in, writing it if it changed.
    ///
    /// Whatever the outcome, the document becomes read-only, the work unit
    /// is closed and the locator is released.
    ///
    /// # Errors
    ///
    /// - [`WorkDocError::InvalidState`] if the work unit is not open
    /// - [`WorkDocError::Consistency`] if the re-read row does not carry the
    ///   change token just written
    /// - [`WorkDocError::Timeout`] or [`WorkDocError::Database`] if the write
    ///   or its verification fails
    pub fn close<P>(&mut self, provider: &P) -> WorkDocResult<()>
    where
        P: ConnectionProvider + ?Sized,
    {
        if self.state != WorkDocState::Open {
            return Err(WorkDocError::invalid_state(
                "work unit cannot be closed if not open",
            ));
        }

        let location = self.location.name().to_string();
        let span = info_span!("workdoc_close", location = %location, accessor = self.accessor.name());
        let _enter = span.enter();

        let result = with_connection(provider, CLOSE_PURPOSE, |connection| {
            let outcome = self.write_back_if_dirty(connection);
            self.accessor.close_locator(connection);
            self.mark_closed();
            outcome
        });

        if self.state == WorkDocState::Open {
            warn!("no connection to release the row lock; leaving it to the transaction");
            self.accessor.discard_locator();
            self.mark_closed();
        }
        result.map_err(|e| e.in_location(&location))
    }

    fn mark_closed(&mut self) {
        if let Some(document) = self.document.as_mut() {
            document.set_mode(AccessMode::ReadOnly);
        }
        self.state = WorkDocState::Closed;
    }

    fn write_back_if_dirty<C: Connection>(&mut self, connection: &mut C) -> WorkDocResult<()> {
        let Some(mut document) = self.document.take() else {
            return Err(WorkDocError::invalid_state("open work unit has no document"));
        };
        let outcome = self.write_back_document(connection, &mut document);
        self.document = Some(document);
        outcome
    }

    fn write_back_document<C: Connection>(
        &mut self,
        connection: &mut C,
        document: &mut Document,
    ) -> WorkDocResult<()> {
        let dirty = self.write_back == WriteBack::Forced
            || document.modify_count() != self.modify_count_at_open;
        if !dirty {
            debug!("document unchanged; update skipped");
            return Ok(());
        }

        let token = stamp_change_token(document)?;
        info!(change_token = %token, forced = self.write_back == WriteBack::Forced, "writing back document");
        self.change_token = Some(token.clone());
        self.update_row(connection, document, &token)?;

        self.modify_count_at_open = document.modify_count();
        self.write_back = WriteBack::IfModified;
        Ok(())
    }

    fn update_row<C: Connection>(
        &mut self,
        connection: &mut C,
        document: &Document,
        token: &str,
    ) -> WorkDocResult<()> {
        self.accessor.prepare_for_write(connection, document)?;

        match self.location.storage().update_statement().cloned() {
            Some(update) => {
                let mut binds = self.location.binds().clone();
                binds.extend(&self.accessor.dml_binds());
                debug!(statement = %update, "updating row");
                connection
                    .execute(&update, &binds)
                    .map_err(|e| WorkDocError::database(self.location.name(), e))?;
            }
            None => debug!("no update statement; document written through the locator only"),
        }

        let found = self.select_row(connection)?;
        if !found
            || self.accessor.is_locator_empty(connection)?
            || self.accessor.is_locator_null(connection)?
        {
            return Err(WorkDocError::consistency(
                self.location.name(),
                "update/query pair do not access the same row/column or failed to update column",
            ));
        }

        let persisted = self.accessor.read_change_token(connection)?;
        if persisted.as_deref() != Some(token) {
            return Err(WorkDocError::consistency(
                self.location.name(),
                format!(
                    "update/query pair do not access the same row (document change token {token}, database change token {})",
                    persisted.as_deref().unwrap_or(UNKNOWN_CHANGE_TOKEN)
                ),
            ));
        }
        Ok(())
    }

    /// Gives up the checkout without writing anything.
    ///
    /// The locator is dropped without I/O, so the row lock stays with the
    /// transaction until it ends. The document's access mode is left as is.
    pub fn abort(&mut self) {
        if self.state == WorkDocState::Open {
            debug!(location = self.location.name(), "work unit aborted");
        }
        self.accessor.discard_locator();
        self.state = WorkDocState::Aborted;
    }

    /// Opens the document, runs `f` on it, and closes it.
    ///
    /// If `f` fails the work unit is aborted instead of closed.
    ///
    /// # Errors
    ///
    /// Returns the first error from `open`, `f`, or `close`.
    pub fn with_open<P, T, F>(&mut self, provider: &P, f: F) -> WorkDocResult<T>
    where
        P: ConnectionProvider + ?Sized,
        F: FnOnce(&mut Document) -> WorkDocResult<T>,
    {
        self.open(provider)?;
        match self.document_mut().and_then(f) {
            Ok(value) => {
                self.close(provider)?;
                Ok(value)
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::StorageLocation;
    use crate::token::CHANGE_TOKEN_ATTR;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Duration;
    use workdoc_storage::{Bind, DocSource, LobCell, MemoryDatabase, Statement};

    const TABLE: &str = "order_docs";

    fn config() -> WorkDocConfig {
        WorkDocConfig::new()
            .lock_timeout(Duration::from_millis(100))
            .retry_pause(Duration::from_millis(5))
    }

    fn database() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.create_table(TABLE);
        db
    }

    fn orders() -> Arc<StorageLocation> {
        Arc::new(StorageLocation::for_table("orders", TABLE, "ORDER"))
    }

    fn work(storage: Arc<StorageLocation>, key: &str) -> WorkDoc {
        WorkDoc::new(WorkingStoreLocation::for_key(storage, key), &config())
    }

    fn persisted_token(db: &MemoryDatabase, key: &str) -> Option<String> {
        let cell = db.row(TABLE, key)?;
        let document = Document::from_bytes(cell.as_bytes()?).ok()?;
        change_token_of(&document).map(str::to_owned)
    }

    #[test]
    fn open_inserts_missing_row() {
        let db = database();
        let session = db.session();
        let mut work = work(orders(), "o-1");

        work.open(&session).unwrap();
        assert_eq!(work.state(), WorkDocState::Open);
        assert_eq!(db.keys(TABLE).unwrap(), vec!["o-1".to_string()]);
        assert_eq!(db.lock_owner(TABLE, "o-1"), Some(session.transaction_id()));
        assert_eq!(work.change_token(), persisted_token(&db, "o-1").as_deref());
        assert_eq!(work.write_back(), WriteBack::IfModified);
        assert_eq!(session.outstanding_connections(), 0);

        work.close(&session).unwrap();
        assert_eq!(work.state(), WorkDocState::Closed);
        assert_eq!(db.lock_owner(TABLE, "o-1"), None);
        assert_eq!(db.stats().updates, 0);
    }

    #[test]
    fn modified_document_is_written_back() {
        let db = database();
        let session = db.session();
        let mut work = work(orders(), "o-1");
        work.open(&session).unwrap();
        let before = work.change_token().map(str::to_owned);

        let doc = work.document_mut().unwrap();
        let root = doc.root();
        let line = doc.append_element(root, "LINE").unwrap();
        doc.set_text(line, "widget").unwrap();
        work.close(&session).unwrap();

        assert_eq!(db.stats().updates, 1);
        let after = persisted_token(&db, "o-1");
        assert_ne!(after, before);
        assert_eq!(work.change_token(), after.as_deref());
    }

    #[test]
    fn reopen_reads_what_was_written() {
        let db = database();
        let storage = orders();
        let session = db.session();

        let mut first = work(Arc::clone(&storage), "o-1");
        first.open(&session).unwrap();
        let doc = first.document_mut().unwrap();
        let root = doc.root();
        doc.set_attr(root, "status", "paid").unwrap();
        first.close(&session).unwrap();

        let mut second = work(storage, "o-1");
        second.open(&session).unwrap();
        let reopened = second.document().unwrap();
        assert!(reopened.content_eq(first.document().unwrap()));
        assert_eq!(second.change_token(), first.change_token());
        assert_eq!(reopened.attr(reopened.root(), "status"), Some("paid"));
        second.close(&session).unwrap();
    }

    #[test]
    fn closed_document_is_read_only() {
        let db = database();
        let session = db.session();
        let mut work = work(orders(), "o-1");
        work.open(&session).unwrap();
        work.close(&session).unwrap();

        assert!(work.document_mut().is_err());
        assert_eq!(work.document().unwrap().mode(), AccessMode::ReadOnly);
    }

    #[test]
    fn double_close_is_invalid_state() {
        let db = database();
        let session = db.session();
        let mut work = work(orders(), "o-1");

        assert!(matches!(
            work.close(&session),
            Err(WorkDocError::InvalidState { .. })
        ));
        work.open(&session).unwrap();
        work.close(&session).unwrap();
        assert!(matches!(
            work.close(&session),
            Err(WorkDocError::InvalidState { .. })
        ));
    }

    #[test]
    fn open_twice_is_invalid_state_and_keeps_checkout() {
        let db = database();
        let session = db.session();
        let mut work = work(orders(), "o-1");
        work.open(&session).unwrap();

        assert!(matches!(
            work.open(&session),
            Err(WorkDocError::InvalidState { .. })
        ));
        assert!(work.is_open());
        work.close(&session).unwrap();
    }

    #[test]
    fn missing_insert_statement_is_configuration_error() {
        let db = database();
        let session = db.session();
        let storage = Arc::new(
            StorageLocation::new("orders", Statement::query(TABLE, Bind::named("key")))
                .with_new_doc_root("ORDER"),
        );
        let mut work = work(storage, "o-1");

        let err = work.open(&session).unwrap_err();
        assert!(matches!(err, WorkDocError::Configuration { .. }));
        assert_eq!(work.state(), WorkDocState::Unopened);
        assert!(db.keys(TABLE).unwrap().is_empty());
        assert_eq!(db.stats().inserts, 0);
    }

    #[test]
    fn missing_root_name_is_configuration_error() {
        let db = database();
        let session = db.session();
        let storage = Arc::new(
            StorageLocation::new("orders", Statement::query(TABLE, Bind::named("key")))
                .with_insert(Statement::insert(TABLE, Bind::named("key"), DocSource::Empty)),
        );
        let mut work = work(storage, "o-1");

        let err = work.open(&session).unwrap_err();
        assert!(matches!(err, WorkDocError::Configuration { .. }));
        assert!(err.to_string().contains("root element"));
    }

    #[test]
    fn empty_placeholder_insert_forces_write_back() {
        let db = database();
        let session = db.session();
        let storage = Arc::new(
            StorageLocation::new("orders", Statement::query(TABLE, Bind::named("key")))
                .with_insert(Statement::insert(TABLE, Bind::named("key"), DocSource::Empty))
                .with_new_doc_root("ORDER"),
        );
        let mut work = work(storage, "o-1");

        work.open(&session).unwrap();
        assert_eq!(work.write_back(), WriteBack::Forced);
        assert_eq!(db.row(TABLE, "o-1"), Some(LobCell::empty()));

        work.close(&session).unwrap();
        assert_eq!(db.stats().updates, 0);
        assert_eq!(work.change_token(), persisted_token(&db, "o-1").as_deref());
    }

    #[test]
    fn empty_existing_row_is_initialised_and_forced() {
        let db = database();
        db.write_out_of_band(TABLE, "o-1", LobCell::Null).unwrap();
        let session = db.session();
        let mut work = work(orders(), "o-1");

        work.open(&session).unwrap();
        assert_eq!(work.change_token(), Some(UNKNOWN_CHANGE_TOKEN));
        assert_eq!(work.write_back(), WriteBack::Forced);

        work.close(&session).unwrap();
        assert_eq!(db.stats().updates, 1);
        assert!(persisted_token(&db, "o-1").is_some());
    }

    #[test]
    fn insert_into_another_row_is_consistency_error() {
        let db = database();
        let session = db.session();
        let storage = Arc::new(
            StorageLocation::new("orders", Statement::query(TABLE, Bind::named("key")))
                .with_insert(Statement::insert(
                    TABLE,
                    Bind::literal("other"),
                    DocSource::Bind("doc".into()),
                ))
                .with_new_doc_root("ORDER"),
        );
        let mut work = work(storage, "o-1");

        let err = work.open(&session).unwrap_err();
        assert!(matches!(err, WorkDocError::Consistency { .. }));
        assert!(err.to_string().contains("no data found"));
        assert_eq!(work.state(), WorkDocState::Unopened);
        assert_eq!(session.outstanding_connections(), 0);
        assert_eq!(db.keys(TABLE).unwrap(), vec!["other".to_string()]);
    }

    #[test]
    fn auto_ids_mode_follows_config() {
        let db = database();
        let session = db.session();
        let mut work = WorkDoc::new(
            WorkingStoreLocation::for_key(orders(), "o-1"),
            &config().auto_ids(true),
        );
        work.open(&session).unwrap();

        let doc = work.document_mut().unwrap();
        assert_eq!(doc.mode(), AccessMode::ReadWriteAutoIds);
        let root = doc.root();
        let line = doc.append_element(root, "LINE").unwrap();
        assert!(doc.attr(line, workdoc_dom::AUTO_ID_ATTR).is_some());
        work.close(&session).unwrap();
    }

    #[test]
    fn stale_update_is_consistency_error_and_still_releases() {
        let db = database();
        let mut stale_doc = Document::create("ORDER").unwrap();
        let root = stale_doc.root();
        stale_doc.set_attr(root, CHANGE_TOKEN_ATTR, "stale").unwrap();

        let storage = Arc::new(
            StorageLocation::for_table("orders", TABLE, "ORDER").with_update(Statement::update(
                TABLE,
                Bind::named("key"),
                DocSource::Bind("stale".into()),
            )),
        );
        let mut binds = workdoc_storage::BindValues::new();
        binds
            .set_text("key", "o-1")
            .set_lob("stale", Bytes::from(stale_doc.to_bytes().unwrap()));

        let session = db.session();
        let mut work = WorkDoc::new(WorkingStoreLocation::new(storage, binds), &config());
        work.open(&session).unwrap();
        let doc = work.document_mut().unwrap();
        let root = doc.root();
        doc.set_attr(root, "status", "paid").unwrap();

        let err = work.close(&session).unwrap_err();
        assert!(matches!(err, WorkDocError::Consistency { .. }));
        assert!(err.to_string().contains("database change token stale"));
        assert_eq!(work.state(), WorkDocState::Closed);
        assert_eq!(db.lock_owner(TABLE, "o-1"), None);
        assert_eq!(session.outstanding_connections(), 0);
        assert_eq!(work.document().unwrap().mode(), AccessMode::ReadOnly);
    }

    #[test]
    fn update_that_nulls_column_is_consistency_error() {
        let db = database();
        let storage = Arc::new(
            StorageLocation::for_table("orders", TABLE, "ORDER").with_update(Statement::update(
                TABLE,
                Bind::named("key"),
                DocSource::Null,
            )),
        );
        let session = db.session();
        let mut work = work(storage, "o-1");
        work.open(&session).unwrap();
        let doc = work.document_mut().unwrap();
        let root = doc.root();
        doc.set_text(root, "x").unwrap();

        let err = work.close(&session).unwrap_err();
        assert!(matches!(err, WorkDocError::Consistency { .. }));
        assert!(err.to_string().contains("failed to update column"));
    }

    #[test]
    fn insert_only_location_writes_through_locator() {
        let db = database();
        let storage = Arc::new(
            StorageLocation::new("audit", Statement::query(TABLE, Bind::named("key")))
                .with_insert(Statement::insert(
                    TABLE,
                    Bind::named("key"),
                    DocSource::Bind("doc".into()),
                ))
                .with_new_doc_root("AUDIT"),
        );
        let session = db.session();
        let mut work = work(storage, "a-1");
        work.open(&session).unwrap();
        let doc = work.document_mut().unwrap();
        let root = doc.root();
        doc.append_element(root, "ENTRY").unwrap();
        work.close(&session).unwrap();

        assert_eq!(db.stats().updates, 0);
        assert_eq!(work.change_token(), persisted_token(&db, "a-1").as_deref());
    }

    #[test]
    fn contended_open_times_out_and_stays_unopened() {
        let db = database();
        let storage = orders();
        let holder = db.session();
        let mut first = work(Arc::clone(&storage), "o-1");
        first.open(&holder).unwrap();

        let waiter = db.session();
        let mut second = work(storage, "o-1");
        let err = second.open(&waiter).unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, WorkDocError::Timeout { ref resource, .. } if resource == "orders"));
        assert_eq!(second.state(), WorkDocState::Unopened);
        assert_eq!(waiter.outstanding_connections(), 0);

        first.close(&holder).unwrap();
        second.open(&waiter).unwrap();
        second.close(&waiter).unwrap();
    }

    #[test]
    fn missing_table_is_database_error() {
        let db = MemoryDatabase::new();
        let session = db.session();
        let mut work = work(orders(), "o-1");

        let err = work.open(&session).unwrap_err();
        assert!(matches!(err, WorkDocError::Database { ref location, .. } if location == "orders"));
        assert_eq!(session.outstanding_connections(), 0);
    }

    #[test]
    fn abort_discards_changes() {
        let db = database();
        let storage = orders();
        let session = db.session();
        let mut work = work(Arc::clone(&storage), "o-1");
        work.open(&session).unwrap();
        let token = work.change_token().map(str::to_owned);

        let doc = work.document_mut().unwrap();
        let root = doc.root();
        doc.set_attr(root, "status", "lost").unwrap();
        work.abort();

        assert_eq!(work.state(), WorkDocState::Aborted);
        assert_eq!(work.document().unwrap().mode(), AccessMode::ReadWrite);
        assert_eq!(db.stats().updates, 0);
        assert_eq!(persisted_token(&db, "o-1"), token);
        assert!(matches!(
            work.close(&session),
            Err(WorkDocError::InvalidState { .. })
        ));

        drop(session);
        let session = db.session();
        let mut again = WorkDoc::new(WorkingStoreLocation::for_key(storage, "o-1"), &config());
        again.open(&session).unwrap();
        let doc = again.document().unwrap();
        assert_eq!(doc.attr(doc.root(), "status"), None);
        again.close(&session).unwrap();
    }

    #[test]
    fn with_open_closes_on_success_and_aborts_on_failure() {
        let db = database();
        let session = db.session();
        let mut work = work(orders(), "o-1");

        let count = work
            .with_open(&session, |doc| {
                let root = doc.root();
                doc.append_element(root, "LINE")?;
                Ok(doc.children(root).len())
            })
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(work.state(), WorkDocState::Closed);
        assert_eq!(db.stats().updates, 1);

        let err = work
            .with_open(&session, |_| -> WorkDocResult<()> {
                Err(WorkDocError::invalid_state("caller gave up"))
            })
            .unwrap_err();
        assert!(matches!(err, WorkDocError::InvalidState { .. }));
        assert_eq!(work.state(), WorkDocState::Aborted);
        assert_eq!(db.stats().updates, 1);
    }
}
