//! Commands that modify a document's root element.

use super::{CommandResult, Context};
use std::io::Write;

/// Sets an attribute on the root element.
pub fn set_attr(
    ctx: &Context,
    key: &str,
    name: &str,
    value: &str,
    out: &mut impl Write,
) -> CommandResult<()> {
    let (_, token) = ctx.with_document(key, true, |doc| {
        let root = doc.root();
        doc.set_attr(root, name, value)?;
        Ok(())
    })?;
    writeln!(
        out,
        "{key}: set {name} (change token {})",
        token.unwrap_or_default()
    )?;
    Ok(())
}

/// Appends a child element, optionally with text, to the root element.
pub fn append(
    ctx: &Context,
    key: &str,
    element: &str,
    text: Option<&str>,
    out: &mut impl Write,
) -> CommandResult<()> {
    let (children, token) = ctx.with_document(key, true, |doc| {
        let root = doc.root();
        let child = doc.append_element(root, element)?;
        if let Some(text) = text {
            doc.set_text(child, text)?;
        }
        Ok(doc.children(root).len())
    })?;
    writeln!(
        out,
        "{key}: appended {element}, {children} children (change token {})",
        token.unwrap_or_default()
    )?;
    Ok(())
}
