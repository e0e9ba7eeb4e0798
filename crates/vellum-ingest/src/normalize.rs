//! Cleanup of extracted text before chunking.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static HORIZONTAL_WS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\x0B\x0C]+").expect("valid regex"));
static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static INVISIBLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[\u{200B}\u{200C}\u{200D}\u{FEFF}]").expect("valid regex"));

/// Normalize raw extracted text: collapse runs of horizontal whitespace
/// (tabs included) to a single space while preserving newlines, collapse
/// three or more consecutive newlines to a paragraph break, strip zero-width
/// and other invisible code points, and trim the ends.
///
/// Pure and total; empty input yields empty output.
#[must_use]
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let text = HORIZONTAL_WS.replace_all(raw, " ");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    let text: Cow<'_, str> = INVISIBLE.replace_all(&text, "");
    text.trim().to_owned()
}
