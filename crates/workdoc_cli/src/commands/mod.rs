//! CLI command implementations.

pub mod edit;
pub mod init;
pub mod list;
pub mod show;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use workdoc_core::{StorageLocation, WorkDoc, WorkDocConfig, WorkDocResult, WorkingStoreLocation};
use workdoc_dom::Document;
use workdoc_storage::{MemoryDatabase, MemorySession};

/// Location used when none is named.
pub const DEFAULT_LOCATION: &str = "documents";

/// Boxed error returned by commands.
pub type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// State shared by every command: the store and the selected location.
pub struct Context {
    store: PathBuf,
    location: Arc<StorageLocation>,
    config: WorkDocConfig,
}

impl Context {
    /// Resolves the storage location and remembers the store path.
    ///
    /// Without a locations file only [`DEFAULT_LOCATION`] is available; it
    /// keeps `DOCUMENT` documents in a `documents` table.
    pub fn load(store: PathBuf, locations: Option<&Path>, name: &str) -> CommandResult<Self> {
        let location = match locations {
            Some(path) => find_location(path, name)?,
            None if name == DEFAULT_LOCATION => {
                StorageLocation::for_table(DEFAULT_LOCATION, "documents", "DOCUMENT")
            }
            None => return Err(format!("unknown storage location {name:?}").into()),
        };
        location.validate()?;
        Ok(Self {
            store,
            location: Arc::new(location),
            config: WorkDocConfig::default(),
        })
    }

    /// Returns the selected storage location.
    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Returns the table the location's query reads.
    pub fn table(&self) -> &str {
        self.location.query_statement().table()
    }

    /// Loads the store, creating the location's table if needed.
    pub fn open_database(&self) -> CommandResult<MemoryDatabase> {
        let db = MemoryDatabase::open_snapshot(&self.store)?;
        db.create_table(self.table());
        Ok(db)
    }

    /// Saves the store.
    pub fn save_database(&self, db: &MemoryDatabase) -> CommandResult<()> {
        db.save_snapshot(&self.store)?;
        debug!(store = %self.store.display(), "store saved");
        Ok(())
    }

    /// Creates a work unit for a row key.
    pub fn work_unit(&self, key: &str) -> WorkDoc {
        WorkDoc::new(
            WorkingStoreLocation::for_key(Arc::clone(&self.location), key),
            &self.config,
        )
    }

    /// Checks out the document for `key` in one session, runs `f`, and checks it in.
    ///
    /// The store is saved only if `persist` is true and the checkout succeeded.
    pub fn with_document<T, F>(&self, key: &str, persist: bool, f: F) -> CommandResult<(T, Option<String>)>
    where
        F: FnOnce(&mut Document) -> WorkDocResult<T>,
    {
        let db = self.open_database()?;
        let session = db.session();
        let mut work = self.work_unit(key);
        let value = work.with_open(&session, f)?;
        let token = work.change_token().map(str::to_owned);
        end_session(session);
        if persist {
            self.save_database(&db)?;
        }
        Ok((value, token))
    }
}

fn find_location(path: &Path, name: &str) -> CommandResult<StorageLocation> {
    let json = fs::read(path)?;
    let locations: Vec<StorageLocation> = serde_json::from_slice(&json)?;
    locations
        .into_iter()
        .find(|location| location.name() == name)
        .ok_or_else(|| format!("storage location {name:?} not defined in {}", path.display()).into())
}

fn end_session(session: MemorySession) {
    let released = session.end();
    if released > 0 {
        debug!(released, "row locks released at end of session");
    }
}
