//! Typed accessors over resolved node parameters.

use crate::value::as_number;
use nodeflow_workflow::WorkflowNode;
use serde_json::{Map, Value as JsonValue};

/// A non-blank string parameter.
pub(crate) fn string<'a>(node: &'a WorkflowNode, key: &str) -> Option<&'a str> {
    node.str_parameter(key).filter(|s| !s.trim().is_empty())
}

/// A non-negative integer parameter, accepting numeric strings.
pub(crate) fn millis(node: &WorkflowNode, key: &str) -> Option<u64> {
    node.parameter(key)
        .and_then(as_number)
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n as u64)
}

/// An object parameter.
pub(crate) fn object<'a>(node: &'a WorkflowNode, key: &str) -> Option<&'a Map<String, JsonValue>> {
    node.parameter(key).and_then(JsonValue::as_object)
}

/// A parameter that is present and not `null`.
pub(crate) fn present<'a>(node: &'a WorkflowNode, key: &str) -> Option<&'a JsonValue> {
    node.parameter(key).filter(|v| !v.is_null())
}

/// Whether a raw (unresolved) parameter still carries a placeholder.
pub(crate) fn is_templated(node: &WorkflowNode, key: &str) -> bool {
    node.str_parameter(key)
        .is_some_and(nodeflow_workflow::template::contains_placeholder)
}

/// Reads a list of strings from an array or a comma-separated string.
pub(crate) fn string_list(value: Option<&JsonValue>) -> Vec<String> {
    match value {
        Some(JsonValue::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(JsonValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_lists_from_either_shape() {
        assert_eq!(
            string_list(Some(&json!("a@x.io, b@x.io,"))),
            vec!["a@x.io", "b@x.io"]
        );
        assert_eq!(string_list(Some(&json!(["a@x.io", 7, " "]))), vec!["a@x.io"]);
        assert!(string_list(None).is_empty());
    }

    #[test]
    fn millis_accepts_numeric_strings() {
        let node = WorkflowNode::new("w", "wait")
            .with_parameter("a", json!("250"))
            .with_parameter("b", json!(-1))
            .with_parameter("c", json!("soon"));
        assert_eq!(millis(&node, "a"), Some(250));
        assert_eq!(millis(&node, "b"), None);
        assert_eq!(millis(&node, "c"), None);
    }
}
