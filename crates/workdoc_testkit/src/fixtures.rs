//! Test fixtures and store helpers.
//!
//! Provides an in-memory store with a ready storage location, preset
//! locations for the unusual statement layouts, and an accessor that
//! simulates a writer bypassing the row lock.

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use workdoc_core::{
    change_token_of, DocumentAccessor, LobDocumentAccessor, StorageLocation, WorkDoc,
    WorkDocConfig, WorkDocResult, WorkingStoreLocation, CHANGE_TOKEN_ATTR,
};
use workdoc_dom::Document;
use workdoc_storage::{BindValues, Connection, LobCell, MemoryDatabase, Statement, StorageResult};

/// Table used by the default test location.
pub const TEST_TABLE: &str = "test_docs";

/// Root element name of new test documents.
pub const TEST_ROOT: &str = "DOC";

/// Name of the default test location.
pub const TEST_LOCATION: &str = "test";

/// Lock timeout used by [`test_config`].
pub const TEST_LOCK_TIMEOUT: Duration = Duration::from_millis(200);

/// Configuration with a short lock timeout so contention tests finish quickly.
pub fn test_config() -> WorkDocConfig {
    WorkDocConfig::new()
        .lock_timeout(TEST_LOCK_TIMEOUT)
        .retry_pause(Duration::from_millis(5))
}

/// An in-memory store with one storage location.
pub struct TestStore {
    /// The database.
    pub db: MemoryDatabase,
    /// The storage location under test.
    pub storage: Arc<StorageLocation>,
    /// Configuration for work units.
    pub config: WorkDocConfig,
}

impl TestStore {
    /// Creates a store with the conventional location for [`TEST_TABLE`].
    pub fn new() -> Self {
        Self::with_location(StorageLocation::for_table(TEST_LOCATION, TEST_TABLE, TEST_ROOT))
    }

    /// Creates a store for a custom location, creating its query table.
    pub fn with_location(location: StorageLocation) -> Self {
        let db = MemoryDatabase::new();
        db.create_table(location.query_statement().table());
        Self {
            db,
            storage: Arc::new(location),
            config: test_config(),
        }
    }

    /// Creates a work unit for a row key.
    pub fn work_unit(&self, key: &str) -> WorkDoc {
        WorkDoc::new(
            WorkingStoreLocation::for_key(Arc::clone(&self.storage), key),
            &self.config,
        )
    }

    /// Creates a work unit with explicit binds.
    pub fn work_unit_with_binds(&self, binds: BindValues) -> WorkDoc {
        WorkDoc::new(
            WorkingStoreLocation::new(Arc::clone(&self.storage), binds),
            &self.config,
        )
    }

    /// Creates a work unit whose accessor lets a racing writer change the row.
    pub fn racing_work_unit(&self, key: &str, write: LobCell) -> WorkDoc<RacingWriterAccessor> {
        WorkDoc::with_accessor(
            WorkingStoreLocation::for_key(Arc::clone(&self.storage), key),
            RacingWriterAccessor::new(self.db.clone(), write),
            &self.config,
        )
    }

    /// Returns the table the location's query reads.
    pub fn table(&self) -> &str {
        self.storage.query_statement().table()
    }

    /// Opens and closes the document for `key` once, creating its row.
    pub fn seed(&self, key: &str) {
        let session = self.db.session();
        let mut work = self.work_unit(key);
        work.open(&session).expect("Failed to open work unit");
        work.close(&session).expect("Failed to close work unit");
    }

    /// Decodes the document persisted under `key`.
    pub fn persisted(&self, key: &str) -> Option<Document> {
        let cell = self.db.row(self.table(), key)?;
        Document::from_bytes(cell.as_bytes()?).ok()
    }

    /// Returns the change token persisted under `key`.
    pub fn persisted_token(&self, key: &str) -> Option<String> {
        self.persisted(key)
            .and_then(|doc| change_token_of(&doc).map(str::to_owned))
    }

    /// Returns the number of rows in the location's table.
    pub fn row_count(&self) -> usize {
        self.db.keys(self.table()).map(|keys| keys.len()).unwrap_or(0)
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot file in a temporary directory.
pub struct SnapshotFile {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl SnapshotFile {
    /// Creates a path for a snapshot that does not exist yet.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            path: temp_dir.path().join("store.json"),
            _temp_dir: temp_dir,
        }
    }

    /// Returns the snapshot path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for SnapshotFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds `:key` binds.
pub fn key_binds(key: &str) -> BindValues {
    let mut binds = BindValues::new();
    binds.set_text("key", key);
    binds
}

/// Serializes a test document carrying `token`.
pub fn document_with_token(token: &str) -> Bytes {
    let mut doc = Document::create(TEST_ROOT).expect("Failed to create document");
    let root = doc.root();
    doc.set_attr(root, CHANGE_TOKEN_ATTR, token)
        .expect("Failed to set token");
    Bytes::from(doc.to_bytes().expect("Failed to encode document"))
}

/// Preset storage locations over [`TEST_TABLE`].
pub mod locations {
    use super::*;
    use workdoc_storage::{Bind, DocSource};

    fn query() -> Statement {
        Statement::query(TEST_TABLE, Bind::named("key"))
    }

    /// Query only: rows must already exist.
    pub fn query_only() -> StorageLocation {
        StorageLocation::new(TEST_LOCATION, query()).with_new_doc_root(TEST_ROOT)
    }

    /// Query and insert without a root element name.
    pub fn without_root() -> StorageLocation {
        StorageLocation::new(TEST_LOCATION, query())
            .with_insert(Statement::insert(TEST_TABLE, Bind::named("key"), DocSource::Empty))
    }

    /// Insert writes an empty placeholder; no update statement.
    pub fn empty_placeholder() -> StorageLocation {
        query_only()
            .with_insert(Statement::insert(TEST_TABLE, Bind::named("key"), DocSource::Empty))
    }

    /// Update writes the large object bound as `:stale` instead of the document.
    pub fn stale_update() -> StorageLocation {
        StorageLocation::for_table(TEST_LOCATION, TEST_TABLE, TEST_ROOT).with_update(
            Statement::update(TEST_TABLE, Bind::named("key"), DocSource::Bind("stale".into())),
        )
    }

    /// Update sets the document column to `NULL`.
    pub fn nulling_update() -> StorageLocation {
        StorageLocation::for_table(TEST_LOCATION, TEST_TABLE, TEST_ROOT).with_update(
            Statement::update(TEST_TABLE, Bind::named("key"), DocSource::Null),
        )
    }
}

/// Accessor that overwrites the row out of band just before the change
/// token is verified, like a writer that ignores the row lock.
#[derive(Debug)]
pub struct RacingWriterAccessor {
    inner: LobDocumentAccessor,
    db: MemoryDatabase,
    write: Option<LobCell>,
}

impl RacingWriterAccessor {
    /// Creates an accessor that writes `write` once, at the first verification.
    pub fn new(db: MemoryDatabase, write: LobCell) -> Self {
        Self {
            inner: LobDocumentAccessor::new(),
            db,
            write: Some(write),
        }
    }

    /// Returns true once the racing write happened.
    pub fn has_raced(&self) -> bool {
        self.write.is_none()
    }
}

impl DocumentAccessor for RacingWriterAccessor {
    fn name(&self) -> &'static str {
        "racing"
    }

    fn select_for_update<C: Connection>(
        &mut self,
        connection: &mut C,
        query: &Statement,
        binds: &BindValues,
    ) -> StorageResult<bool> {
        self.inner.select_for_update(connection, query, binds)
    }

    fn is_locator_empty<C: Connection>(&mut self, connection: &mut C) -> StorageResult<bool> {
        self.inner.is_locator_empty(connection)
    }

    fn is_locator_null<C: Connection>(&mut self, connection: &mut C) -> StorageResult<bool> {
        self.inner.is_locator_null(connection)
    }

    fn read_document<C: Connection>(&mut self, connection: &mut C) -> WorkDocResult<Document> {
        self.inner.read_document(connection)
    }

    fn prepare_for_write<C: Connection>(
        &mut self,
        connection: &mut C,
        document: &Document,
    ) -> WorkDocResult<()> {
        self.inner.prepare_for_write(connection, document)
    }

    fn read_change_token<C: Connection>(
        &mut self,
        connection: &mut C,
    ) -> WorkDocResult<Option<String>> {
        if let (Some(write), Some(locator)) = (self.write.take(), self.inner.locator()) {
            self.db
                .write_out_of_band(locator.table(), locator.key(), write)?;
        }
        self.inner.read_change_token(connection)
    }

    fn dml_binds(&self) -> BindValues {
        self.inner.dml_binds()
    }

    fn close_locator<C: Connection>(&mut self, connection: &mut C) {
        self.inner.close_locator(connection);
    }

    fn discard_locator(&mut self) {
        self.inner.discard_locator();
    }
}
