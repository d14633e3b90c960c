//! List command implementation.

use super::{CommandResult, Context};
use std::io::Write;
use workdoc_core::change_token_of;
use workdoc_dom::Document;
use workdoc_storage::LobCell;

/// Runs the list command: one line per row with its size and change token.
pub fn run(ctx: &Context, out: &mut impl Write) -> CommandResult<()> {
    let db = ctx.open_database()?;
    let keys = db.keys(ctx.table())?;
    if keys.is_empty() {
        writeln!(out, "{} ({}): no rows", ctx.location().name(), ctx.table())?;
        return Ok(());
    }

    for key in keys {
        let summary = match db.row(ctx.table(), &key) {
            None | Some(LobCell::Null) => "null".to_string(),
            Some(LobCell::Data(data)) if data.is_empty() => "empty".to_string(),
            Some(LobCell::Data(data)) => {
                let token = Document::from_bytes(&data)
                    .ok()
                    .and_then(|doc| change_token_of(&doc).map(str::to_owned))
                    .unwrap_or_else(|| "?".to_string());
                format!("{} bytes, change token {token}", data.len())
            }
        };
        writeln!(out, "{key}\t{summary}")?;
    }
    Ok(())
}
