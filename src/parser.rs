//! Tolerant extraction of structured payloads from free-form oracle text.
//!
//! Oracles are prompted to emit JSON but routinely wrap it in markdown fences
//! or surrounding prose. The parser strips fences, tries a direct parse, and
//! on failure rescans for the first bracket- or brace-delimited span. A bare
//! array is normalised to `{"items": [...]}` so downstream aggregation always
//! sees an object. Parse failure yields `None`, never an error: a sample with
//! an unusable payload is still a sample.

use serde_json::Value;

/// Parse a structured payload out of a raw oracle response.
pub fn parse_payload(raw: &str) -> Option<Value> {
    let content = strip_code_fence(raw.trim());

    if let Ok(parsed) = serde_json::from_str::<Value>(content) {
        return Some(normalize(parsed));
    }

    // Direct parse failed; look for a delimited span inside surrounding text.
    let span = find_delimited_span(content)?;
    let parsed = serde_json::from_str::<Value>(span).ok()?;
    Some(normalize(parsed))
}

/// A bare array becomes `{"items": [...]}`; objects pass through.
fn normalize(value: Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut map = serde_json::Map::new();
            map.insert("items".to_string(), Value::Array(items));
            Value::Object(map)
        }
        other => other,
    }
}

/// Remove a leading/trailing markdown code fence, if present.
///
/// Handles both ```` ```json ```` and bare ```` ``` ```` openers. An unclosed
/// fence drops only the opening line.
fn strip_code_fence(content: &str) -> &str {
    if !content.starts_with("```") {
        return content;
    }
    let body = match content.find('\n') {
        Some(idx) => &content[idx + 1..],
        None => return content,
    };
    match body.rfind("```") {
        Some(idx) => body[..idx].trim(),
        None => body.trim(),
    }
}

/// Find the first balanced `{...}` or `[...]` span in the text.
fn find_delimited_span(content: &str) -> Option<&str> {
    let start = content.find(['{', '['])?;
    let remainder = &content[start..];
    let open = remainder.chars().next()?;
    let close = if open == '{' { '}' } else { ']' };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in remainder.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&remainder[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
