//! Dot-notation paths into JSON documents.
//!
//! Supported syntax: an optional leading `$`, dot-separated keys, `[n]`
//! array indexes (also written as a bare numeric key) and `*` / `[*]`
//! wildcards over arrays and object values.

use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

fn parse_path(path: &str) -> Option<Vec<Segment>> {
    let path = path.trim();
    let path = path.strip_prefix('$').unwrap_or(path);
    let path = path.strip_prefix('.').unwrap_or(path);

    let mut segments = Vec::new();
    if path.is_empty() {
        return Some(segments);
    }

    for part in path.split('.') {
        let (key, mut brackets) = match part.find('[') {
            Some(i) => (&part[..i], &part[i..]),
            None => (part, ""),
        };
        match key {
            "" if brackets.is_empty() => return None,
            "" => {}
            "*" => segments.push(Segment::Wildcard),
            k => segments.push(Segment::Key(k.to_string())),
        }
        while !brackets.is_empty() {
            let inner_end = brackets.find(']')?;
            let inner = brackets[1..inner_end].trim();
            segments.push(match inner {
                "*" => Segment::Wildcard,
                n => Segment::Index(n.parse().ok()?),
            });
            brackets = &brackets[inner_end + 1..];
            if !brackets.is_empty() && !brackets.starts_with('[') {
                return None;
            }
        }
    }
    Some(segments)
}

/// Values at `path` within `data`. Wildcards may yield several.
pub fn extract_path<'a>(data: &'a Value, path: &str) -> Vec<&'a Value> {
    let Some(segments) = parse_path(path) else {
        debug!("Unsupported JSON path '{}'", path);
        return Vec::new();
    };

    let mut current = vec![data];
    for segment in &segments {
        let mut next = Vec::new();
        for value in current {
            match (segment, value) {
                (Segment::Key(key), Value::Object(map)) => next.extend(map.get(key)),
                (Segment::Key(key), Value::Array(arr)) => {
                    if let Ok(idx) = key.parse::<usize>() {
                        next.extend(arr.get(idx));
                    }
                }
                (Segment::Index(idx), Value::Array(arr)) => next.extend(arr.get(*idx)),
                (Segment::Wildcard, Value::Array(arr)) => next.extend(arr.iter()),
                (Segment::Wildcard, Value::Object(map)) => next.extend(map.values()),
                _ => {}
            }
        }
        current = next;
    }
    current
}

/// Flatten JSON values into strings.
///
/// Strings are taken verbatim, numbers and booleans are formatted, arrays
/// contribute their elements and objects are serialised. Nulls are dropped.
pub fn values_to_strings(values: &[&Value]) -> Vec<String> {
    let mut out = Vec::new();
    for value in values {
        push_value(value, &mut out);
    }
    out
}

fn push_value(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push(s.clone()),
        Value::Bool(b) => out.push(b.to_string()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Array(items) => items.iter().for_each(|v| push_value(v, out)),
        Value::Object(_) => out.push(value.to_string()),
    }
}

/// Evaluate `path` against a JSON body, or against each JSON-LD block when
/// the body is not JSON.
pub fn evaluate(body: &str, json_ld: &[String], path: &str) -> Vec<String> {
    if let Ok(data) = serde_json::from_str::<Value>(body) {
        return values_to_strings(&extract_path(&data, path));
    }

    let mut out = Vec::new();
    for block in json_ld {
        match serde_json::from_str::<Value>(block) {
            Ok(data) => out.extend(values_to_strings(&extract_path(&data, path))),
            Err(e) => debug!("Skipping malformed JSON-LD block: {}", e),
        }
    }
    out
}
