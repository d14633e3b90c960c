//! # WorkDoc Storage
//!
//! Row-store primitives consumed by the WorkDoc work unit.
//!
//! This crate provides the database-facing half of a document checkout:
//! - [`Statement`] templates for locking queries, inserts and updates
//! - [`BindValues`] resolved at execution time
//! - The [`Connection`] and [`ConnectionProvider`] traits
//! - [`with_connection`] for scoped borrow/return of pooled connections
//! - [`MemoryDatabase`], a thread-safe in-memory row store with
//!   transaction-owned row locks and large-object cells
//!
//! ## Design Principles
//!
//! - Row locks belong to a [`TransactionId`], not to a connection
//! - A locking select on a row owned by another transaction fails fast with
//!   [`StorageError::RowLocked`]; waiting is the caller's policy
//! - Large-object cells distinguish `NULL` from empty
//!
//! ## Example
//!
//! ```rust
//! use workdoc_storage::{
//!     with_connection, Bind, BindValues, Connection, DocSource, MemoryDatabase,
//!     Statement, StorageError,
//! };
//!
//! let db = MemoryDatabase::new();
//! db.create_table("docs");
//! let session = db.session();
//!
//! let mut binds = BindValues::new();
//! binds.set_text("key", "a");
//!
//! let inserted = with_connection(&session, "example", |conn| {
//!     let insert = Statement::insert("docs", Bind::named("key"), DocSource::Empty);
//!     conn.execute(&insert, &binds)?;
//!     let query = Statement::query("docs", Bind::named("key"));
//!     Ok::<_, StorageError>(conn.select_for_update(&query, &binds)?.is_some())
//! })
//! .unwrap();
//! assert!(inserted);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod error;
mod memory;
mod snapshot;
mod statement;

pub use connection::{with_connection, Connection, ConnectionProvider, Locator, TransactionId};
pub use error::{StorageError, StorageResult};
pub use memory::{LobCell, MemoryConnection, MemoryDatabase, MemorySession, StatementStats};
pub use statement::{Bind, BindValue, BindValues, DocSource, Statement, StatementType};
