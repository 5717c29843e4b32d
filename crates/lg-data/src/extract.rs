//! Response-body extraction helpers.
//!
//! Two families:
//!
//! - **Substring scans**: find `search`, take everything up to the next
//!   `terminator`, continue after it.  Works on HTML and loosely structured
//!   text.
//! - **JSON paths**: dotted key paths (`"item.seller.id"`) into a parsed
//!   `serde_json::Value`.  Bodies may be a single object or an array of them.

use serde_json::Value;

use crate::{DataError, DataResult};

// ── Substring scans ───────────────────────────────────────────────────────────

/// Find the first value in `haystack` delimited by `search` and `terminator`.
///
/// Returns the value and the byte offset just past it.  A `search` match with
/// no following terminator yields `None`.
pub fn substring_after<'a>(
    haystack:   &'a str,
    search:     &str,
    terminator: char,
) -> Option<(&'a str, usize)> {
    let start = haystack.find(search)? + search.len();
    let len = haystack[start..].find(terminator)?;
    Some((&haystack[start..start + len], start + len))
}

/// Every value delimited by `search` and `terminator`, left to right.
pub fn find_all<'a>(haystack: &'a str, search: &str, terminator: char) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut rest = haystack;
    while let Some((value, end)) = substring_after(rest, search, terminator) {
        out.push(value);
        rest = &rest[end..];
    }
    out
}

/// Substring search configuration for key/value pairs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairPattern {
    pub key_search:         String,
    pub key_terminator:     char,
    pub value_search:       String,
    pub value_terminator:   char,
    /// `true` if the key appears before its value in the text.
    pub key_precedes_value: bool,
    /// Keep scanning after the first pair.
    pub multiple:           bool,
}

/// Scan `haystack` for key/value pairs described by `pattern`.
///
/// Stops at the first incomplete pair.
pub fn find_pairs(haystack: &str, pattern: &PairPattern) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut rest = haystack;
    loop {
        let (first, second) = if pattern.key_precedes_value {
            ((&pattern.key_search, pattern.key_terminator), (&pattern.value_search, pattern.value_terminator))
        } else {
            ((&pattern.value_search, pattern.value_terminator), (&pattern.key_search, pattern.key_terminator))
        };
        let Some((a, end_a)) = substring_after(rest, first.0, first.1) else { break };
        let Some((b, end_b)) = substring_after(&rest[end_a..], second.0, second.1) else { break };
        let (key, value) = if pattern.key_precedes_value { (a, b) } else { (b, a) };
        out.push((key.to_owned(), value.to_owned()));
        rest = &rest[end_a + end_b..];
        if !pattern.multiple {
            break;
        }
    }
    out
}

// ── JSON paths ────────────────────────────────────────────────────────────────

/// Parse `body` and return its records: the elements of a top-level array, or
/// the single top-level value otherwise.
pub fn json_records(body: &str) -> DataResult<Vec<Value>> {
    let parsed: Value = serde_json::from_str(body)
        .map_err(|e| DataError::Extract(format!("invalid JSON body: {e}")))?;
    Ok(match parsed {
        Value::Array(items) => items,
        other => vec![other],
    })
}

/// Follow a dotted key path into `value`.
pub fn json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Scalar at `path` rendered as a string.  Objects, arrays and nulls yield
/// `None`.
pub fn json_string(value: &Value, path: &str) -> Option<String> {
    match json_path(value, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
