//! # WorkDoc Core
//!
//! Transactional checkout and check-in of a document stored in one database
//! row.
//!
//! This crate provides:
//! - [`WorkDoc`], the work unit that locks a row, reads or creates its
//!   document, and writes it back only when it changed
//! - [`RowSelector`], bounded waiting for contended row locks
//! - [`DocumentAccessor`] and [`LobDocumentAccessor`] for the document column
//! - [`StorageLocation`] and [`WorkingStoreLocation`] describing where a
//!   document lives
//! - Change tokens that detect writers bypassing the row lock
//! - [`WorkDocCache`] for exclusive in-process checkout of shared work units
//!
//! ## Guarantees
//!
//! - No state changes before the row lock is held
//! - A clean checkout performs no write-back
//! - After a write-back the persisted change token equals the in-memory one,
//!   or `close` fails with [`WorkDocError::Consistency`]
//! - Connections are returned and locators released on every path
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use workdoc_core::{StorageLocation, WorkDoc, WorkDocConfig, WorkingStoreLocation};
//! use workdoc_storage::MemoryDatabase;
//!
//! let db = MemoryDatabase::new();
//! db.create_table("order_docs");
//! let orders = Arc::new(StorageLocation::for_table("orders", "order_docs", "ORDER"));
//! let session = db.session();
//!
//! let mut work = WorkDoc::new(
//!     WorkingStoreLocation::for_key(Arc::clone(&orders), "o-1"),
//!     &WorkDocConfig::default(),
//! );
//! let lines = work
//!     .with_open(&session, |doc| {
//!         let root = doc.root();
//!         doc.append_element(root, "LINE")?;
//!         Ok(doc.children(root).len())
//!     })
//!     .unwrap();
//! assert_eq!(lines, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod accessor;
mod cache;
mod config;
mod error;
mod location;
mod selector;
mod token;
mod workdoc;

pub use accessor::{DocumentAccessor, LobDocumentAccessor, DOC_BIND};
pub use cache::{WorkDocCache, WorkDocCheckout};
pub use config::{WorkDocConfig, DEFAULT_LOCK_TIMEOUT, DEFAULT_RETRY_PAUSE};
pub use error::{WorkDocError, WorkDocResult};
pub use location::{StorageLocation, WorkingStoreLocation};
pub use selector::{retry_until_deadline, RetryError, RowSelector};
pub use token::{change_token_of, ChangeTokenSource, CHANGE_TOKEN_ATTR, UNKNOWN_CHANGE_TOKEN};
pub use workdoc::{WorkDoc, WorkDocState, WriteBack};
