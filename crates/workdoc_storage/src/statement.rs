//! Statement templates and bind values.

use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The kind of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    /// Locking select of a single row.
    Query,
    /// Insert of a new row.
    Insert,
    /// Update of an existing row.
    Update,
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementType::Query => "query",
            StatementType::Insert => "insert",
            StatementType::Update => "update",
        };
        f.write_str(name)
    }
}

/// A row key expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bind {
    /// Resolved from a named text bind at execution time.
    Named(String),
    /// A fixed key.
    Literal(String),
}

impl Bind {
    /// Creates a named bind reference.
    pub fn named(name: impl Into<String>) -> Self {
        Bind::Named(name.into())
    }

    /// Creates a literal key.
    pub fn literal(value: impl Into<String>) -> Self {
        Bind::Literal(value.into())
    }

    /// Resolves the key against a set of bind values.
    ///
    /// # Errors
    ///
    /// Fails if a named bind is missing or is not text.
    pub fn resolve<'a>(&'a self, binds: &'a BindValues) -> StorageResult<&'a str> {
        match self {
            Bind::Named(name) => binds.text(name),
            Bind::Literal(value) => Ok(value),
        }
    }
}

impl fmt::Display for Bind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bind::Named(name) => write!(f, ":{name}"),
            Bind::Literal(value) => write!(f, "'{value}'"),
        }
    }
}

/// Where an insert or update takes the document column value from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocSource {
    /// A named large-object bind.
    Bind(String),
    /// An empty (non-null) large object placeholder.
    Empty,
    /// SQL `NULL`.
    Null,
}

impl fmt::Display for DocSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocSource::Bind(name) => write!(f, ":{name}"),
            DocSource::Empty => f.write_str("EMPTY_BLOB()"),
            DocSource::Null => f.write_str("NULL"),
        }
    }
}

/// A statement template against a single-document table.
///
/// Tables have a text key column and a large-object document column.
/// Templates are resolved against [`BindValues`] when executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Statement {
    /// `SELECT doc ... FOR UPDATE NOWAIT`.
    Query {
        /// Target table.
        table: String,
        /// Row key.
        key: Bind,
    },
    /// `INSERT INTO ... (key, doc)`.
    Insert {
        /// Target table.
        table: String,
        /// Row key.
        key: Bind,
        /// Document column value.
        doc: DocSource,
    },
    /// `UPDATE ... SET doc = ...`.
    Update {
        /// Target table.
        table: String,
        /// Row key.
        key: Bind,
        /// Document column value.
        doc: DocSource,
    },
}

impl Statement {
    /// Creates a locking query.
    pub fn query(table: impl Into<String>, key: Bind) -> Self {
        Statement::Query {
            table: table.into(),
            key,
        }
    }

    /// Creates an insert.
    pub fn insert(table: impl Into<String>, key: Bind, doc: DocSource) -> Self {
        Statement::Insert {
            table: table.into(),
            key,
            doc,
        }
    }

    /// Creates an update.
    pub fn update(table: impl Into<String>, key: Bind, doc: DocSource) -> Self {
        Statement::Update {
            table: table.into(),
            key,
            doc,
        }
    }

    /// Returns the statement type.
    #[must_use]
    pub fn statement_type(&self) -> StatementType {
        match self {
            Statement::Query { .. } => StatementType::Query,
            Statement::Insert { .. } => StatementType::Insert,
            Statement::Update { .. } => StatementType::Update,
        }
    }

    /// Returns the target table.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Statement::Query { table, .. }
            | Statement::Insert { table, .. }
            | Statement::Update { table, .. } => table,
        }
    }

    /// Returns the row key expression.
    #[must_use]
    pub fn key(&self) -> &Bind {
        match self {
            Statement::Query { key, .. }
            | Statement::Insert { key, .. }
            | Statement::Update { key, .. } => key,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Query { table, key } => {
                write!(f, "SELECT doc FROM {table} WHERE key = {key} FOR UPDATE NOWAIT")
            }
            Statement::Insert { table, key, doc } => {
                write!(f, "INSERT INTO {table} (key, doc) VALUES ({key}, {doc})")
            }
            Statement::Update { table, key, doc } => {
                write!(f, "UPDATE {table} SET doc = {doc} WHERE key = {key}")
            }
        }
    }
}

/// A single bind value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindValue {
    /// Text value, usable as a key.
    Text(String),
    /// Large-object value, usable as a document column.
    Lob(Bytes),
}

/// Named values resolved by statement templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindValues {
    values: BTreeMap<String, BindValue>,
}

impl BindValues {
    /// Creates an empty set of binds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a text value.
    pub fn set_text(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values
            .insert(name.into(), BindValue::Text(value.into()));
        self
    }

    /// Binds a large-object value.
    pub fn set_lob(&mut self, name: impl Into<String>, value: impl Into<Bytes>) -> &mut Self {
        self.values.insert(name.into(), BindValue::Lob(value.into()));
        self
    }

    /// Returns a bind value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BindValue> {
        self.values.get(name)
    }

    /// Returns a text bind.
    ///
    /// # Errors
    ///
    /// Fails if the bind is missing or is a large object.
    pub fn text(&self, name: &str) -> StorageResult<&str> {
        match self.values.get(name) {
            Some(BindValue::Text(value)) => Ok(value),
            Some(BindValue::Lob(_)) => Err(StorageError::BindTypeMismatch {
                name: name.to_string(),
                expected: "text",
            }),
            None => Err(StorageError::UnboundVariable(name.to_string())),
        }
    }

    /// Returns a large-object bind.
    ///
    /// # Errors
    ///
    /// Fails if the bind is missing or is text.
    pub fn lob(&self, name: &str) -> StorageResult<Bytes> {
        match self.values.get(name) {
            Some(BindValue::Lob(value)) => Ok(value.clone()),
            Some(BindValue::Text(_)) => Err(StorageError::BindTypeMismatch {
                name: name.to_string(),
                expected: "a large object",
            }),
            None => Err(StorageError::UnboundVariable(name.to_string())),
        }
    }

    /// Iterates over binds in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BindValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Copies every bind from `other`, replacing existing names.
    pub fn extend(&mut self, other: &BindValues) {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), value.clone());
        }
    }

    /// Returns the number of binds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
