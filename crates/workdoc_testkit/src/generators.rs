//! Property-based test generators using proptest.
//!
//! Provides strategies for row keys and for edit scripts applied to a
//! checked-out document.

use proptest::prelude::*;
use workdoc_dom::{Document, DomResult};

/// Strategy for generating row keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating element and attribute names.
///
/// Names never collide with the reserved change token attribute.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,7}").expect("Invalid regex")
}

/// Strategy for generating text and attribute values.
pub fn value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ -~]{0,24}").expect("Invalid regex")
}

/// One edit applied to a document.
#[derive(Debug, Clone)]
pub enum Edit {
    /// Set an attribute on the root element.
    SetAttr {
        /// Attribute name
        name: String,
        /// Attribute value
        value: String,
    },
    /// Remove an attribute from the root element.
    RemoveAttr {
        /// Attribute name
        name: String,
    },
    /// Append a child to the root element.
    Append {
        /// Element name
        name: String,
        /// Optional text content
        text: Option<String>,
    },
    /// Set the text of the last child, or of the root if it has none.
    SetText {
        /// Text content
        text: String,
    },
    /// Remove all children of the root element.
    ClearChildren,
}

/// Strategy for generating a single edit.
pub fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (name_strategy(), value_strategy())
            .prop_map(|(name, value)| Edit::SetAttr { name, value }),
        1 => name_strategy().prop_map(|name| Edit::RemoveAttr { name }),
        3 => (name_strategy(), prop::option::of(value_strategy()))
            .prop_map(|(name, text)| Edit::Append { name, text }),
        2 => value_strategy().prop_map(|text| Edit::SetText { text }),
        1 => Just(Edit::ClearChildren),
    ]
}

/// Strategy for generating an edit script.
pub fn edit_script_strategy(min_edits: usize, max_edits: usize) -> impl Strategy<Value = Vec<Edit>> {
    prop::collection::vec(edit_strategy(), min_edits..max_edits)
}

/// Applies one edit to a document.
///
/// # Errors
///
/// Returns the document error if the edit is rejected.
pub fn apply_edit(doc: &mut Document, edit: &Edit) -> DomResult<()> {
    let root = doc.root();
    match edit {
        Edit::SetAttr { name, value } => doc.set_attr(root, name, value.as_str()),
        Edit::RemoveAttr { name } => doc.remove_attr(root, name).map(|_| ()),
        Edit::Append { name, text } => {
            let child = doc.append_element(root, name)?;
            match text {
                Some(text) => doc.set_text(child, text.as_str()),
                None => Ok(()),
            }
        }
        Edit::SetText { text } => {
            let target = doc.children(root).last().copied().unwrap_or(root);
            doc.set_text(target, text.as_str())
        }
        Edit::ClearChildren => doc.clear_children(root).map(|_| ()),
    }
}

/// Applies a whole script, stopping at the first rejected edit.
///
/// # Errors
///
/// Returns the first document error.
pub fn apply_script(doc: &mut Document, edits: &[Edit]) -> DomResult<()> {
    edits.iter().try_for_each(|edit| apply_edit(doc, edit))
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
