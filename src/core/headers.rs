// TunnelWatch - core/headers.rs
//
// Extraction of the JSON header object embedded mid-line after `headers=`.
// Core layer: pure string processing, never fails loudly. Any problem yields
// `None`, which callers treat exactly like "no headers field".

use serde_json::Value;
use std::collections::BTreeMap;

/// Locate the brace-balanced region starting at the first `{` at or after
/// `start` and return its byte range (inclusive of both braces).
///
/// Depth counting (rather than a search for the next `}`) keeps nested
/// objects inside header values intact. Braces inside JSON string literals
/// are counted like any other; malformed results are rejected later by the
/// JSON parser.
fn balanced_object_span(line: &str, start: usize) -> Option<(usize, usize)> {
    let open = start + line.get(start..)?.find('{')?;
    let mut depth: usize = 0;
    for (offset, byte) in line.as_bytes()[open..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((open, open + offset + 1));
                }
            }
            _ => {}
        }
    }
    None
}

/// Collapse one header value to a single string.
///
/// Lists keep their first element (or become `""` when empty); strings pass
/// through as-is; any other JSON value is rendered as compact JSON text.
fn flatten_value(value: Value) -> String {
    match value {
        Value::Array(items) => items.into_iter().next().map(scalar_text).unwrap_or_default(),
        other => scalar_text(other),
    }
}

fn scalar_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Extract the header mapping from `line`, scanning from byte index `start`.
///
/// Returns `None` when no balanced `{...}` region exists, when the region is
/// not a JSON object, or when the object is empty.
pub fn extract_headers(line: &str, start: usize) -> Option<BTreeMap<String, String>> {
    let (open, close) = balanced_object_span(line, start)?;
    let blob = &line[open..close];

    let object = match serde_json::from_str::<Value>(blob) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            tracing::debug!("Header blob is valid JSON but not an object; ignoring");
            return None;
        }
        Err(e) => {
            tracing::debug!(error = %e, "Header blob failed to parse; ignoring");
            return None;
        }
    };

    let headers: BTreeMap<String, String> = object
        .into_iter()
        .map(|(key, value)| (key, flatten_value(value)))
        .collect();

    if headers.is_empty() {
        None
    } else {
        Some(headers)
    }
}
