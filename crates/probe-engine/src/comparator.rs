//! Response comparison.
//!
//! Both sides are canonicalized to sorted-key, 4-space-indented JSON text
//! before comparing; `ignored_properties` is projected out of the observed
//! side only, never the expected side. `serde_json::Value` here is backed by
//! a `BTreeMap` (the `preserve_order` feature is not enabled anywhere in this
//! workspace), so object keys are already lexicographically sorted once
//! serialized — no extra sort step is needed.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

pub struct Comparison {
    pub matches: bool,
    /// Canonical form of the observed response, stored on the result record
    /// regardless of outcome.
    pub canonical_observed: String,
    /// Present only when `matches` is false.
    pub diff: String,
}

/// Compares `observed` against `expected`, projecting `ignored_properties`
/// out of `observed` only.
pub fn compare(observed: &Value, expected: &Value, ignored_properties: &HashSet<String>) -> Comparison {
    let canonical_observed = canonicalize(observed, ignored_properties);
    let canonical_expected = canonicalize(expected, &HashSet::new());

    if canonical_observed == canonical_expected {
        Comparison {
            matches: true,
            canonical_observed,
            diff: String::new(),
        }
    } else {
        Comparison {
            matches: false,
            diff: render_diff(&canonical_expected, &canonical_observed),
            canonical_observed,
        }
    }
}

fn canonicalize(value: &Value, ignored_properties: &HashSet<String>) -> String {
    let projected = project(value, ignored_properties);
    pretty(&projected)
}

/// Drops `ignored_properties` keys from a top-level object. A non-object
/// value (array, scalar, null) passes through unchanged — projection simply
/// does not apply.
fn project(value: &Value, ignored_properties: &HashSet<String>) -> Value {
    match value.as_object() {
        Some(map) => {
            let filtered: serde_json::Map<String, Value> = map
                .iter()
                .filter(|(key, _)| !ignored_properties.contains(key.as_str()))
                .map(|(key, v)| (key.clone(), v.clone()))
                .collect();
            Value::Object(filtered)
        }
        None => value.clone(),
    }
}

fn pretty(value: &Value) -> String {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut serializer)
        .expect("a serde_json::Value always serializes");
    String::from_utf8(buf).expect("serde_json never emits non-utf8 bytes")
}

/// Renders a two-column, line-oriented diff table. Not a compatibility
/// contract — only meant to make a mismatch legible in a log or report.
fn render_diff(expected: &str, observed: &str) -> String {
    const COLUMN_WIDTH: usize = 60;

    let expected_lines: Vec<&str> = expected.lines().collect();
    let observed_lines: Vec<&str> = observed.lines().collect();
    let rows = expected_lines.len().max(observed_lines.len());

    let mut out = String::new();
    out.push_str(&format!(
        "{:<width$} | {}\n",
        "Valid response",
        "Your response",
        width = COLUMN_WIDTH
    ));
    out.push_str(&"-".repeat(COLUMN_WIDTH * 2 + 4));
    out.push('\n');

    for i in 0..rows {
        let left = expected_lines.get(i).copied().unwrap_or("");
        let right = observed_lines.get(i).copied().unwrap_or("");
        let marker = if left == right { "   " } else { " * " };
        out.push_str(&format!("{:<width$}{marker}| {}\n", left, right, width = COLUMN_WIDTH));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_objects_match_regardless_of_key_order() {
        let observed = json!({"b": 2, "a": 1});
        let expected = json!({"a": 1, "b": 2});
        let comparison = compare(&observed, &expected, &HashSet::new());
        assert!(comparison.matches);
        assert!(comparison.diff.is_empty());
    }

    #[test]
    fn ignored_properties_are_dropped_from_the_observed_side_only() {
        let observed = json!({"id": "abc", "value": 1});
        let expected = json!({"value": 1});
        let ignored = HashSet::from(["id".to_string()]);
        let comparison = compare(&observed, &expected, &ignored);
        assert!(comparison.matches);
    }

    #[test]
    fn mismatched_values_produce_a_nonempty_diff() {
        let observed = json!({"value": 2});
        let expected = json!({"value": 1});
        let comparison = compare(&observed, &expected, &HashSet::new());
        assert!(!comparison.matches);
        assert!(comparison.diff.contains('*'));
    }

    #[test]
    fn non_object_responses_are_compared_without_projection() {
        let observed = json!([1, 2, 3]);
        let expected = json!([1, 2, 3]);
        let ignored = HashSet::from(["irrelevant".to_string()]);
        let comparison = compare(&observed, &expected, &ignored);
        assert!(comparison.matches);
    }
}
