//! # WorkDoc Testkit
//!
//! Test utilities for WorkDoc.
//!
//! This crate provides:
//! - Test fixtures: an in-memory store with a ready storage location
//! - Property-based test generators using proptest
//! - Lock contention scenarios run across threads
//! - A checkout harness reporting the statements a checkout executed
//!
//! ## Usage
//!
//! ```rust
//! use workdoc_testkit::prelude::*;
//!
//! let store = TestStore::new();
//! let edits = vec![Edit::SetAttr { name: "status".into(), value: "new".into() }];
//! let report = checkout(&store, "doc-1", &edits).unwrap();
//! assert_eq!(report.statements.inserts, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod contention;
pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::contention::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use contention::*;
pub use fixtures::*;
pub use generators::*;
pub use integration::*;
