//! Arena-backed document tree.

use crate::error::{DomError, DomResult};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Attribute that carries an element's automatic identifier.
pub const AUTO_ID_ATTR: &str = "ref";

/// Identifier of an element within one [`Document`].
///
/// Node ids are only meaningful for the document that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

/// Controls which operations a document accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// All mutations fail with [`DomError::ReadOnly`].
    ReadOnly,
    /// Mutations are accepted.
    #[default]
    ReadWrite,
    /// Mutations are accepted and new elements receive an [`AUTO_ID_ATTR`].
    ReadWriteAutoIds,
}

impl AccessMode {
    /// Returns true if mutations are accepted in this mode.
    #[must_use]
    pub fn is_writable(self) -> bool {
        !matches!(self, AccessMode::ReadOnly)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Element {
    pub(crate) name: String,
    pub(crate) attrs: BTreeMap<String, String>,
    pub(crate) text: Option<String>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
}

impl Element {
    pub(crate) fn new(name: String, parent: Option<NodeId>) -> Self {
        Self {
            name,
            attrs: BTreeMap::new(),
            text: None,
            children: Vec::new(),
            parent,
        }
    }
}

/// An in-memory document.
///
/// Every successful mutation increments [`Document::modify_count`], which is
/// what callers compare to decide whether the document needs writing back.
/// Changing the [`AccessMode`] is not a mutation.
#[derive(Debug, Clone)]
pub struct Document {
    elements: Vec<Element>,
    root: NodeId,
    modify_count: u64,
    mode: AccessMode,
}

impl Document {
    /// Creates a new document containing only a root element.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::InvalidName`] if `root_name` is not a valid element name.
    pub fn create(root_name: &str) -> DomResult<Self> {
        validate_name(root_name)?;
        Ok(Self::from_elements(vec![Element::new(
            root_name.to_string(),
            None,
        )]))
    }

    /// Builds a document from decoded elements; element 0 is the root.
    pub(crate) fn from_elements(elements: Vec<Element>) -> Self {
        Self {
            elements,
            root: NodeId(0),
            modify_count: 0,
            mode: AccessMode::default(),
        }
    }

    /// Returns the root element.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the number of mutations applied since the document was created or decoded.
    #[must_use]
    pub fn modify_count(&self) -> u64 {
        self.modify_count
    }

    /// Returns the current access mode.
    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Sets the access mode.
    pub fn set_mode(&mut self, mode: AccessMode) {
        self.mode = mode;
    }

    /// Returns the element name, if the node exists.
    #[must_use]
    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.elements.get(node.0).map(|e| e.name.as_str())
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.elements
            .get(node.0)
            .and_then(|e| e.attrs.get(name))
            .map(String::as_str)
    }

    /// Returns all attributes of an element in name order.
    pub fn attrs(&self, node: NodeId) -> impl Iterator<Item = (&str, &str)> {
        self.elements
            .get(node.0)
            .into_iter()
            .flat_map(|e| e.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Returns the text content of an element.
    #[must_use]
    pub fn text(&self, node: NodeId) -> Option<&str> {
        self.elements.get(node.0).and_then(|e| e.text.as_deref())
    }

    /// Returns the children of an element (empty for unknown nodes).
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.elements
            .get(node.0)
            .map(|e| e.children.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the first child element with the given name.
    #[must_use]
    pub fn child_named(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&child| self.name(child) == Some(name))
    }

    /// Returns the parent of an element; the root has none.
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.elements.get(node.0).and_then(|e| e.parent)
    }

    /// Counts the elements reachable from the root.
    #[must_use]
    pub fn element_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend_from_slice(self.children(node));
        }
        count
    }

    /// Sets an attribute on an element.
    ///
    /// # Errors
    ///
    /// Fails if the document is read-only, the node is unknown, or the
    /// attribute name is invalid.
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: impl Into<String>) -> DomResult<()> {
        self.ensure_writable()?;
        validate_name(name)?;
        self.element_mut(node)?
            .attrs
            .insert(name.to_string(), value.into());
        self.touch();
        Ok(())
    }

    /// Removes an attribute, returning its previous value.
    ///
    /// # Errors
    ///
    /// Fails if the document is read-only or the node is unknown.
    pub fn remove_attr(&mut self, node: NodeId, name: &str) -> DomResult<Option<String>> {
        self.ensure_writable()?;
        let previous = self.element_mut(node)?.attrs.remove(name);
        self.touch();
        Ok(previous)
    }

    /// Appends a new child element and returns its id.
    ///
    /// In [`AccessMode::ReadWriteAutoIds`] the new element is given a unique
    /// [`AUTO_ID_ATTR`].
    ///
    /// # Errors
    ///
    /// Fails if the document is read-only, the parent is unknown, or the
    /// element name is invalid.
    pub fn append_element(&mut self, parent: NodeId, name: &str) -> DomResult<NodeId> {
        self.ensure_writable()?;
        validate_name(name)?;
        self.element(parent)?;

        let id = NodeId(self.elements.len());
        let mut element = Element::new(name.to_string(), Some(parent));
        if self.mode == AccessMode::ReadWriteAutoIds {
            element
                .attrs
                .insert(AUTO_ID_ATTR.to_string(), Uuid::new_v4().simple().to_string());
        }
        self.elements.push(element);
        self.element_mut(parent)?.children.push(id);
        self.touch();
        Ok(id)
    }

    /// Replaces the text content of an element.
    ///
    /// # Errors
    ///
    /// Fails if the document is read-only or the node is unknown.
    pub fn set_text(&mut self, node: NodeId, text: impl Into<String>) -> DomResult<()> {
        self.ensure_writable()?;
        self.element_mut(node)?.text = Some(text.into());
        self.touch();
        Ok(())
    }

    /// Detaches all children of an element, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Fails if the document is read-only or the node is unknown.
    pub fn clear_children(&mut self, node: NodeId) -> DomResult<usize> {
        self.ensure_writable()?;
        let removed = std::mem::take(&mut self.element_mut(node)?.children);
        for child in &removed {
            if let Some(element) = self.elements.get_mut(child.0) {
                element.parent = None;
            }
        }
        self.touch();
        Ok(removed.len())
    }

    /// Returns true if both documents hold the same tree.
    ///
    /// Modify counts, access modes and arena layout are ignored.
    #[must_use]
    pub fn content_eq(&self, other: &Document) -> bool {
        self.subtree_eq(self.root, other, other.root)
    }

    fn subtree_eq(&self, node: NodeId, other: &Document, other_node: NodeId) -> bool {
        let (Some(a), Some(b)) = (self.elements.get(node.0), other.elements.get(other_node.0))
        else {
            return false;
        };
        a.name == b.name
            && a.attrs == b.attrs
            && a.text == b.text
            && a.children.len() == b.children.len()
            && a.children
                .iter()
                .zip(&b.children)
                .all(|(&x, &y)| self.subtree_eq(x, other, y))
    }

    pub(crate) fn element(&self, node: NodeId) -> DomResult<&Element> {
        self.elements.get(node.0).ok_or(DomError::UnknownNode(node))
    }

    fn element_mut(&mut self, node: NodeId) -> DomResult<&mut Element> {
        self.elements
            .get_mut(node.0)
            .ok_or(DomError::UnknownNode(node))
    }

    fn ensure_writable(&self) -> DomResult<()> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(DomError::ReadOnly)
        }
    }

    fn touch(&mut self) {
        self.modify_count += 1;
    }
}

fn validate_name(name: &str) -> DomResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_alphabetic() || first == '_')
                && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DomError::InvalidName(name.to_string()))
    }
}
