//! Change tokens fingerprinting document versions.

use crate::error::WorkDocResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use uuid::Uuid;
use workdoc_dom::Document;

/// Root attribute carrying the document's change token.
pub const CHANGE_TOKEN_ATTR: &str = "workdoc-change";

/// Change token recorded for rows whose document column was empty or null.
pub const UNKNOWN_CHANGE_TOKEN: &str = "*UNKNOWN*";

static GLOBAL: LazyLock<ChangeTokenSource> = LazyLock::new(ChangeTokenSource::new);

/// Generates unique change tokens.
///
/// Tokens combine a per-source random prefix with a counter, so tokens from
/// one source sort in issue order and tokens from different sources (or
/// processes) never collide.
#[derive(Debug)]
pub struct ChangeTokenSource {
    prefix: String,
    counter: AtomicU64,
}

impl ChangeTokenSource {
    /// Creates a source with a fresh random prefix.
    #[must_use]
    pub fn new() -> Self {
        let mut prefix = Uuid::new_v4().simple().to_string();
        prefix.truncate(12);
        Self {
            prefix,
            counter: AtomicU64::new(0),
        }
    }

    /// Returns the process-wide source.
    #[must_use]
    pub fn global() -> &'static ChangeTokenSource {
        &GLOBAL
    }

    /// Issues the next token.
    pub fn next_token(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{:012}", self.prefix, n)
    }
}

impl Default for ChangeTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Stamps a new token from the global source onto the document root.
pub(crate) fn stamp_change_token(document: &mut Document) -> WorkDocResult<String> {
    let token = ChangeTokenSource::global().next_token();
    let root = document.root();
    document.set_attr(root, CHANGE_TOKEN_ATTR, token.clone())?;
    Ok(token)
}

/// Reads the change token stamped on a document, if any.
#[must_use]
pub fn change_token_of(document: &Document) -> Option<&str> {
    document.attr(document.root(), CHANGE_TOKEN_ATTR)
}
