//! Document accessors: handles on the large-object cell backing a document.

use crate::error::WorkDocResult;
use crate::token::change_token_of;
use bytes::Bytes;
use tracing::{trace, warn};
use workdoc_dom::Document;
use workdoc_storage::{BindValues, Connection, Locator, Statement, StorageResult};

/// Default name of the bind carrying the serialized document in DML.
pub const DOC_BIND: &str = "doc";

/// Physical access to the document column of one locked row.
///
/// An accessor holds at most one locator, obtained by
/// [`DocumentAccessor::select_for_update`] and released by
/// [`DocumentAccessor::close_locator`]. A missing locator reads as `NULL`.
pub trait DocumentAccessor: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Runs one locking select attempt and keeps the resulting locator.
    ///
    /// Returns `Ok(false)` if no row matched; any previous locator is then
    /// forgotten.
    ///
    /// # Errors
    ///
    /// Passes through storage errors, including the transient
    /// [`workdoc_storage::StorageError::RowLocked`].
    fn select_for_update<C: Connection>(
        &mut self,
        connection: &mut C,
        query: &Statement,
        binds: &BindValues,
    ) -> StorageResult<bool>;

    /// Returns true if the cell holds a zero-length large object.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell cannot be read.
    fn is_locator_empty<C: Connection>(&mut self, connection: &mut C) -> StorageResult<bool>;

    /// Returns true if the cell is `NULL` or no locator is held.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell cannot be read.
    fn is_locator_null<C: Connection>(&mut self, connection: &mut C) -> StorageResult<bool>;

    /// Decodes the document stored in the cell.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell cannot be read or does not hold a document.
    fn read_document<C: Connection>(&mut self, connection: &mut C) -> WorkDocResult<Document>;

    /// Serializes `document` for writing.
    ///
    /// The bytes are written through the locator when one is held and are
    /// also offered to DML statements by [`DocumentAccessor::dml_binds`].
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the locator write fails.
    fn prepare_for_write<C: Connection>(
        &mut self,
        connection: &mut C,
        document: &Document,
    ) -> WorkDocResult<()>;

    /// Reads the change token of the persisted document.
    ///
    /// Returns `None` if the cell is empty or null, or the document carries
    /// no token.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell cannot be read or decoded.
    fn read_change_token<C: Connection>(
        &mut self,
        connection: &mut C,
    ) -> WorkDocResult<Option<String>>;

    /// Binds contributed to insert and update statements.
    fn dml_binds(&self) -> BindValues;

    /// Releases the row lock behind the locator and forgets it.
    ///
    /// Never fails; release errors are logged.
    fn close_locator<C: Connection>(&mut self, connection: &mut C);

    /// Forgets the locator without any I/O.
    ///
    /// The row lock stays with the transaction until it ends.
    fn discard_locator(&mut self);
}

/// Accessor for a binary large-object document column.
#[derive(Debug, Clone)]
pub struct LobDocumentAccessor {
    doc_bind: String,
    locator: Option<Locator>,
    pending: Option<Bytes>,
}

impl Default for LobDocumentAccessor {
    fn default() -> Self {
        Self::new()
    }
}

impl LobDocumentAccessor {
    /// Creates an accessor binding documents as `:doc`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_doc_bind(DOC_BIND)
    }

    /// Creates an accessor binding documents under another name.
    pub fn with_doc_bind(name: impl Into<String>) -> Self {
        Self {
            doc_bind: name.into(),
            locator: None,
            pending: None,
        }
    }

    /// Returns the held locator, if any.
    #[must_use]
    pub fn locator(&self) -> Option<&Locator> {
        self.locator.as_ref()
    }

    fn read_cell<C: Connection>(&self, connection: &mut C) -> StorageResult<Option<Bytes>> {
        match &self.locator {
            Some(locator) => connection.read_lob(locator),
            None => Ok(None),
        }
    }
}

impl DocumentAccessor for LobDocumentAccessor {
    fn name(&self) -> &'static str {
        "lob"
    }

    fn select_for_update<C: Connection>(
        &mut self,
        connection: &mut C,
        query: &Statement,
        binds: &BindValues,
    ) -> StorageResult<bool> {
        self.locator = connection.select_for_update(query, binds)?;
        Ok(self.locator.is_some())
    }

    fn is_locator_empty<C: Connection>(&mut self, connection: &mut C) -> StorageResult<bool> {
        Ok(self
            .read_cell(connection)?
            .is_some_and(|data| data.is_empty()))
    }

    fn is_locator_null<C: Connection>(&mut self, connection: &mut C) -> StorageResult<bool> {
        Ok(self.read_cell(connection)?.is_none())
    }

    fn read_document<C: Connection>(&mut self, connection: &mut C) -> WorkDocResult<Document> {
        let data = self.read_cell(connection)?.unwrap_or_default();
        Ok(Document::from_bytes(&data)?)
    }

    fn prepare_for_write<C: Connection>(
        &mut self,
        connection: &mut C,
        document: &Document,
    ) -> WorkDocResult<()> {
        let data = Bytes::from(document.to_bytes()?);
        if let Some(locator) = &self.locator {
            trace!(table = locator.table(), key = locator.key(), len = data.len(), "writing through locator");
            connection.write_lob(locator, data.clone())?;
        }
        self.pending = Some(data);
        Ok(())
    }

    fn read_change_token<C: Connection>(
        &mut self,
        connection: &mut C,
    ) -> WorkDocResult<Option<String>> {
        match self.read_cell(connection)? {
            Some(data) if !data.is_empty() => {
                let document = Document::from_bytes(&data)?;
                Ok(change_token_of(&document).map(str::to_owned))
            }
            _ => Ok(None),
        }
    }

    fn dml_binds(&self) -> BindValues {
        let mut binds = BindValues::new();
        if let Some(data) = &self.pending {
            binds.set_lob(self.doc_bind.as_str(), data.clone());
        }
        binds
    }

    fn close_locator<C: Connection>(&mut self, connection: &mut C) {
        self.pending = None;
        if let Some(locator) = self.locator.take() {
            if let Err(e) = connection.release_lock(&locator) {
                warn!(table = locator.table(), key = locator.key(), error = %e, "failed to release row lock");
            }
        }
    }

    fn discard_locator(&mut self) {
        self.pending = None;
        self.locator = None;
    }
}
