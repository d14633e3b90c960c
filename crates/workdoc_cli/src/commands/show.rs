//! Show command implementation.

use super::{CommandResult, Context};
use crate::Format;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use workdoc_dom::{Document, NodeId};

/// A document element as printed by `show --format json`.
#[derive(Debug, Serialize)]
pub struct ElementView {
    /// Element name.
    pub name: String,
    /// Attributes in name order.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    /// Text content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Child elements.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElementView>,
}

impl ElementView {
    fn build(doc: &Document, node: NodeId) -> Self {
        Self {
            name: doc.name(node).unwrap_or_default().to_string(),
            attrs: doc
                .attrs(node)
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            text: doc.text(node).map(str::to_owned),
            children: doc
                .children(node)
                .iter()
                .map(|&child| Self::build(doc, child))
                .collect(),
        }
    }
}

/// Output of `show --format json`.
#[derive(Debug, Serialize)]
pub struct ShowResult {
    /// Row key.
    pub key: String,
    /// Change token recorded at checkout.
    pub change_token: Option<String>,
    /// The document tree.
    pub document: ElementView,
}

/// Runs the show command.
///
/// The document is checked out and in again without changes; the store is
/// not saved.
pub fn run(ctx: &Context, key: &str, format: Format, out: &mut impl Write) -> CommandResult<()> {
    if ctx.open_database()?.row(ctx.table(), key).is_none() {
        return Err(format!("no document stored under {key:?}").into());
    }
    let (document, change_token) =
        ctx.with_document(key, false, |doc| Ok(ElementView::build(doc, doc.root())))?;

    match format {
        Format::Json => {
            let result = ShowResult {
                key: key.to_string(),
                change_token,
                document,
            };
            writeln!(out, "{}", serde_json::to_string_pretty(&result)?)?;
        }
        Format::Text => {
            writeln!(
                out,
                "{key} (change token {})",
                change_token.as_deref().unwrap_or("-")
            )?;
            print_element(out, &document, 1)?;
        }
    }
    Ok(())
}

fn print_element(out: &mut impl Write, element: &ElementView, depth: usize) -> CommandResult<()> {
    let indent = "  ".repeat(depth);
    write!(out, "{indent}{}", element.name)?;
    for (name, value) in &element.attrs {
        write!(out, " {name}={value:?}")?;
    }
    if let Some(text) = &element.text {
        write!(out, ": {text:?}")?;
    }
    writeln!(out)?;
    for child in &element.children {
        print_element(out, child, depth + 1)?;
    }
    Ok(())
}
