//! # WorkDoc DOM
//!
//! Document tree model for WorkDoc.
//!
//! This crate provides the in-memory representation of a checked-out
//! document:
//! - An arena-backed element tree addressed by [`NodeId`]
//! - A monotonically increasing modify count, bumped on every mutation
//! - Access modes that gate mutation ([`AccessMode`])
//! - Automatic element identifiers for documents opened with auto ids
//! - CBOR serialization for storage in a large-object column
//!
//! ## Usage
//!
//! ```
//! use workdoc_dom::{AccessMode, Document};
//!
//! let mut doc = Document::create("ORDER").unwrap();
//! let root = doc.root();
//! doc.set_attr(root, "status", "draft").unwrap();
//! assert_eq!(doc.modify_count(), 1);
//!
//! doc.set_mode(AccessMode::ReadOnly);
//! assert!(doc.set_attr(root, "status", "final").is_err());
//!
//! let bytes = doc.to_bytes().unwrap();
//! let restored = Document::from_bytes(&bytes).unwrap();
//! assert_eq!(restored.attr(restored.root(), "status"), Some("draft"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod document;
mod error;

pub use document::{AccessMode, Document, NodeId, AUTO_ID_ATTR};
pub use error::{DomError, DomResult};
