//! Object reference helpers

use crate::tokenizer::unquote;

/// Split a column reference into table and column.
///
/// Accepts `Table.Column`, `'Table'.'Column'` and `Table[Column]`.
/// Returns `None` when no separator is found.
pub fn split_column_ref(reference: &str) -> Option<(String, String)> {
    let reference = reference.trim();

    if let Some(inner) = reference.strip_suffix(']') {
        if let Some(open) = inner.rfind('[') {
            let table = unquote(&inner[..open]);
            let column = &inner[open + 1..];
            return Some((table.to_string(), column.to_string()));
        }
    }

    let split_at = match reference.chars().next() {
        Some(quote @ ('\'' | '"')) => {
            let close = reference[1..].find(quote)? + 1;
            reference[close + 1..].find('.').map(|dot| close + 1 + dot)
        }
        _ => reference.find('.'),
    }?;

    let table = unquote(&reference[..split_at]);
    let column = unquote(&reference[split_at + 1..]);
    Some((table.to_string(), column.to_string()))
}

/// Count `[name]` occurrences across texts (case-sensitive).
///
/// A `]` inside the name is written `]]` in DAX.
pub fn count_references<'a>(name: &str, texts: impl IntoIterator<Item = &'a str>) -> usize {
    let needle = format!("[{}]", name.replace(']', "]]"));
    texts
        .into_iter()
        .map(|text| text.matches(needle.as_str()).count())
        .sum()
}
