//! Loose JSON value helpers shared by the condition executor and the
//! plugin operators.

use serde_json::{Number, Value as JsonValue};
use std::cmp::Ordering;

/// Truthiness of a resolved value.
///
/// `null`, `false`, `0`, `""`, `"false"`, `"0"`, `[]` and `{}` are false.
#[must_use]
pub fn truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => {
            let s = s.trim();
            !(s.is_empty() || s.eq_ignore_ascii_case("false") || s == "0")
        }
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(map) => !map.is_empty(),
    }
}

/// Reads a number, accepting numeric strings and booleans.
#[must_use]
pub fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        JsonValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Renders a value as plain text: strings verbatim, `null` empty,
/// everything else as compact JSON.
#[must_use]
pub fn as_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Builds a JSON number, keeping integral values integral.
#[must_use]
pub fn number(value: f64) -> JsonValue {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        JsonValue::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
    }
}

/// Loose equality: numbers compare numerically across representations,
/// everything else structurally.
#[must_use]
pub fn loose_eq(left: &JsonValue, right: &JsonValue) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (
            JsonValue::String(_) | JsonValue::Number(_),
            JsonValue::String(_) | JsonValue::Number(_),
        ) => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a == b,
            _ => as_text(left) == as_text(right),
        },
        _ => false,
    }
}

/// Orders two values numerically when both are numeric, else as text.
#[must_use]
pub fn compare(left: &JsonValue, right: &JsonValue) -> Option<Ordering> {
    match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (left, right) {
            (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
            _ => None,
        },
    }
}

/// Total order over JSON values for sorting.
///
/// Values of different kinds order as null, booleans, numbers, strings,
/// arrays, objects. Within a kind, numbers compare numerically, strings
/// and booleans naturally, arrays element-wise and objects by their JSON text.
#[must_use]
pub fn sort_order(left: &JsonValue, right: &JsonValue) -> Ordering {
    fn rank(value: &JsonValue) -> u8 {
        match value {
            JsonValue::Null => 0,
            JsonValue::Bool(_) => 1,
            JsonValue::Number(_) => 2,
            JsonValue::String(_) => 3,
            JsonValue::Array(_) => 4,
            JsonValue::Object(_) => 5,
        }
    }

    match (left, right) {
        (JsonValue::Bool(a), JsonValue::Bool(b)) => a.cmp(b),
        (JsonValue::Number(a), JsonValue::Number(b)) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.total_cmp(&b)
        }
        (JsonValue::String(a), JsonValue::String(b)) => a.cmp(b),
        (JsonValue::Array(a), JsonValue::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| sort_order(x, y))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (JsonValue::Object(_), JsonValue::Object(_)) => left.to_string().cmp(&right.to_string()),
        _ => rank(left).cmp(&rank(right)),
    }
}

/// Returns true for `null`, empty strings, arrays and objects.
#[must_use]
pub fn is_empty(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(map) => map.is_empty(),
        _ => false,
    }
}
