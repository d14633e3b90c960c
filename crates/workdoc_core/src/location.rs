//! Storage locations: where a document lives and how it is read and written.

use crate::error::{WorkDocError, WorkDocResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use workdoc_storage::{Bind, BindValue, BindValues, DocSource, Statement, StatementType};

/// Static description of a document's persistence mapping.
///
/// A storage location names a locking query and, optionally, the insert used
/// when the query finds no row and the update used to write a modified
/// document back. Locations are built once and shared; they are never
/// mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    name: String,
    query: Statement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    insert: Option<Statement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    update: Option<Statement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    new_doc_root: Option<String>,
}

impl StorageLocation {
    /// Creates a location with only a locking query.
    pub fn new(name: impl Into<String>, query: Statement) -> Self {
        Self {
            name: name.into(),
            query,
            insert: None,
            update: None,
            new_doc_root: None,
        }
    }

    /// Creates the conventional location for a single-document table.
    ///
    /// Rows are keyed by the `:key` bind; insert and update bind the
    /// serialized document as `:doc`.
    pub fn for_table(name: impl Into<String>, table: &str, root: impl Into<String>) -> Self {
        Self::new(name, Statement::query(table, Bind::named("key")))
            .with_insert(Statement::insert(
                table,
                Bind::named("key"),
                DocSource::Bind("doc".into()),
            ))
            .with_update(Statement::update(
                table,
                Bind::named("key"),
                DocSource::Bind("doc".into()),
            ))
            .with_new_doc_root(root)
    }

    /// Sets the insert statement.
    #[must_use]
    pub fn with_insert(mut self, statement: Statement) -> Self {
        self.insert = Some(statement);
        self
    }

    /// Sets the update statement.
    #[must_use]
    pub fn with_update(mut self, statement: Statement) -> Self {
        self.update = Some(statement);
        self
    }

    /// Sets the root element name used for new documents.
    #[must_use]
    pub fn with_new_doc_root(mut self, root: impl Into<String>) -> Self {
        self.new_doc_root = Some(root.into());
        self
    }

    /// Returns the location name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the locking query.
    #[must_use]
    pub fn query_statement(&self) -> &Statement {
        &self.query
    }

    /// Returns the insert statement, if defined.
    #[must_use]
    pub fn insert_statement(&self) -> Option<&Statement> {
        self.insert.as_ref()
    }

    /// Returns the update statement, if defined.
    #[must_use]
    pub fn update_statement(&self) -> Option<&Statement> {
        self.update.as_ref()
    }

    /// Returns the root element name for new documents, if defined.
    #[must_use]
    pub fn new_doc_root(&self) -> Option<&str> {
        self.new_doc_root.as_deref()
    }

    /// Returns true if a statement of the given type is defined.
    #[must_use]
    pub fn has_statement(&self, statement_type: StatementType) -> bool {
        match statement_type {
            StatementType::Query => true,
            StatementType::Insert => self.insert.is_some(),
            StatementType::Update => self.update.is_some(),
        }
    }

    /// Checks that each slot holds a statement of the matching type.
    ///
    /// # Errors
    ///
    /// Returns [`WorkDocError::Configuration`] naming the first mismatch.
    pub fn validate(&self) -> WorkDocResult<()> {
        let slots = [
            (StatementType::Query, Some(&self.query)),
            (StatementType::Insert, self.insert.as_ref()),
            (StatementType::Update, self.update.as_ref()),
        ];
        for (expected, statement) in slots {
            if let Some(statement) = statement {
                if statement.statement_type() != expected {
                    return Err(WorkDocError::configuration(
                        &self.name,
                        format!(
                            "{expected} slot holds a {} statement",
                            statement.statement_type()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A storage location bound to the values identifying one row.
#[derive(Debug, Clone)]
pub struct WorkingStoreLocation {
    storage: Arc<StorageLocation>,
    binds: BindValues,
}

impl WorkingStoreLocation {
    /// Binds a storage location to explicit values.
    pub fn new(storage: Arc<StorageLocation>, binds: BindValues) -> Self {
        Self { storage, binds }
    }

    /// Binds a storage location to a row key, bound as `:key`.
    pub fn for_key(storage: Arc<StorageLocation>, key: impl Into<String>) -> Self {
        let mut binds = BindValues::new();
        binds.set_text("key", key);
        Self::new(storage, binds)
    }

    /// Returns the static storage location.
    #[must_use]
    pub fn storage(&self) -> &StorageLocation {
        &self.storage
    }

    /// Returns the storage location name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.storage.name()
    }

    /// Returns the row-identifying binds.
    #[must_use]
    pub fn binds(&self) -> &BindValues {
        &self.binds
    }

    /// Returns a key identifying this logical document within the process.
    ///
    /// Built from the location name and the text binds in name order.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let binds: Vec<String> = self
            .binds
            .iter()
            .filter_map(|(name, value)| match value {
                BindValue::Text(text) => Some(format!("{name}={text}")),
                BindValue::Lob(_) => None,
            })
            .collect();
        format!("{}/{}", self.storage.name(), binds.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> StorageLocation {
        StorageLocation::for_table("orders", "order_docs", "ORDER")
    }

    #[test]
    fn for_table_defines_all_statements() {
        let location = orders();
        assert!(location.has_statement(StatementType::Insert));
        assert!(location.has_statement(StatementType::Update));
        assert_eq!(location.new_doc_root(), Some("ORDER"));
        assert_eq!(location.query_statement().table(), "order_docs");
        assert!(location.validate().is_ok());
    }

    #[test]
    fn query_only_location() {
        let location =
            StorageLocation::new("audit", Statement::query("audit", Bind::named("key")));
        assert!(!location.has_statement(StatementType::Insert));
        assert!(!location.has_statement(StatementType::Update));
        assert!(location.new_doc_root().is_none());
    }

    #[test]
    fn validate_rejects_misplaced_statements() {
        let location = StorageLocation::new("bad", Statement::query("t", Bind::named("key")))
            .with_insert(Statement::update("t", Bind::named("key"), DocSource::Null));
        assert!(matches!(
            location.validate(),
            Err(WorkDocError::Configuration { .. })
        ));
    }

    #[test]
    fn location_loads_from_json() {
        let json = r#"{
            "name": "orders",
            "query": {"type": "query", "table": "order_docs", "key": {"named": "key"}},
            "insert": {"type": "insert", "table": "order_docs", "key": {"named": "key"}, "doc": "empty"},
            "new_doc_root": "ORDER"
        }"#;
        let location: StorageLocation = serde_json::from_str(json).unwrap();
        assert_eq!(location.name(), "orders");
        assert!(location.update_statement().is_none());
        assert_eq!(
            location.insert_statement(),
            Some(&Statement::insert(
                "order_docs",
                Bind::named("key"),
                DocSource::Empty
            ))
        );
    }

    #[test]
    fn cache_key_includes_binds() {
        let storage = Arc::new(orders());
        let working = WorkingStoreLocation::for_key(Arc::clone(&storage), "o-1");
        assert_eq!(working.cache_key(), "orders/key=o-1");

        let mut binds = BindValues::new();
        binds.set_text("tenant", "acme").set_text("key", "o-2");
        let working = WorkingStoreLocation::new(storage, binds);
        assert_eq!(working.cache_key(), "orders/key=o-2&tenant=acme");
    }
}
