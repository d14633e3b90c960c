//! Error types for document operations.

use crate::document::NodeId;
use thiserror::Error;

/// Result type for document operations.
pub type DomResult<T> = Result<T, DomError>;

/// Errors that can occur while reading, mutating or serializing a document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    /// A mutation was attempted while the document is read-only.
    #[error("document is read-only")]
    ReadOnly,

    /// The node id does not belong to this document.
    #[error("unknown node: {0:?}")]
    UnknownNode(NodeId),

    /// An element or attribute name is not valid.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// Failed to encode the document.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode stored document bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },
}

impl DomError {
    /// Creates an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Creates a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }
}
