//! CBOR serialization of documents.
//!
//! The stored form is a nested element tree; arena layout, modify count and
//! access mode are not persisted.

use crate::document::{Document, Element, NodeId};
use crate::error::{DomError, DomResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Deserialize)]
struct StoredElement {
    name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<StoredElement>,
}

impl Document {
    /// Serializes the document to CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::EncodingFailed`] if encoding fails.
    pub fn to_bytes(&self) -> DomResult<Vec<u8>> {
        let stored = self.to_stored(self.root())?;
        let mut bytes = Vec::new();
        ciborium::into_writer(&stored, &mut bytes)
            .map_err(|e| DomError::encoding_failed(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserializes a document from CBOR bytes.
    ///
    /// The returned document has a modify count of zero and is read-write.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::DecodingFailed`] if the bytes are not a stored document.
    pub fn from_bytes(bytes: &[u8]) -> DomResult<Self> {
        let stored: StoredElement =
            ciborium::from_reader(bytes).map_err(|e| DomError::decoding_failed(e.to_string()))?;

        let mut elements = Vec::new();
        flatten(stored, None, &mut elements);
        Ok(Document::from_elements(elements))
    }

    fn to_stored(&self, node: NodeId) -> DomResult<StoredElement> {
        let element = self.element(node)?;
        let children = element
            .children
            .iter()
            .map(|&child| self.to_stored(child))
            .collect::<DomResult<Vec<_>>>()?;
        Ok(StoredElement {
            name: element.name.clone(),
            attrs: element.attrs.clone(),
            text: element.text.clone(),
            children,
        })
    }
}

fn flatten(stored: StoredElement, parent: Option<NodeId>, out: &mut Vec<Element>) -> NodeId {
    let id = NodeId(out.len());
    out.push(Element {
        name: stored.name,
        attrs: stored.attrs,
        text: stored.text,
        children: Vec::new(),
        parent,
    });
    let children: Vec<NodeId> = stored
        .children
        .into_iter()
        .map(|child| flatten(child, Some(id), out))
        .collect();
    out[id.0].children = children;
    id
}
