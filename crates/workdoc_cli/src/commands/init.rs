//! Init command implementation.

use super::{CommandResult, Context};
use std::io::Write;

/// Runs the init command.
///
/// Checking out a missing document inserts its row; an existing document is
/// left untouched.
pub fn run(ctx: &Context, key: &str, out: &mut impl Write) -> CommandResult<()> {
    let existed = ctx.open_database()?.row(ctx.table(), key).is_some();
    let (_, token) = ctx.with_document(key, true, |_| Ok(()))?;
    let token = token.unwrap_or_default();

    if existed {
        writeln!(out, "{key}: already exists (change token {token})")?;
    } else {
        writeln!(out, "{key}: created (change token {token})")?;
    }
    Ok(())
}
