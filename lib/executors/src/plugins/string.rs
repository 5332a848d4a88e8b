//! `string.*` operators.

use super::failed;
use crate::value::{as_number, as_text};
use nodeflow_workflow::PluginMap;
use serde_json::{Value as JsonValue, json};

fn char_index(value: Option<&JsonValue>, len: usize, default: usize) -> usize {
    value
        .and_then(as_number)
        .map_or(default, |n| (n.max(0.0) as usize).min(len))
}

#[must_use]
pub fn plugins() -> PluginMap {
    PluginMap::new("string")
        .with("concat", |args| {
            Ok(JsonValue::String(args.all().iter().map(as_text).collect()))
        })
        .with("upper", |args| Ok(json!(args.str(0)?.to_uppercase())))
        .with("lower", |args| Ok(json!(args.str(0)?.to_lowercase())))
        .with("trim", |args| Ok(json!(args.str(0)?.trim())))
        .with("length", |args| Ok(json!(args.str(0)?.chars().count())))
        .with("replace", |args| {
            Ok(json!(args.str(0)?.replace(args.str(1)?, args.str(2)?)))
        })
        .with("split", |args| {
            let text = args.str(0)?;
            let separator = args.get(1).and_then(JsonValue::as_str).unwrap_or(",");
            if separator.is_empty() {
                return Ok(json!(text.chars().map(String::from).collect::<Vec<_>>()));
            }
            Ok(json!(text.split(separator).collect::<Vec<_>>()))
        })
        .with("join", |args| {
            let separator = args.get(1).and_then(JsonValue::as_str).unwrap_or(",");
            let parts: Vec<String> = args.array(0)?.iter().map(as_text).collect();
            Ok(json!(parts.join(separator)))
        })
        .with("substring", |args| {
            let chars: Vec<char> = args.str(0)?.chars().collect();
            let start = char_index(args.get(1), chars.len(), 0);
            let end = char_index(args.get(2), chars.len(), chars.len()).max(start);
            Ok(json!(chars[start..end].iter().collect::<String>()))
        })
        .with("contains", |args| Ok(json!(args.str(0)?.contains(args.str(1)?))))
        .with("startsWith", |args| {
            Ok(json!(args.str(0)?.starts_with(args.str(1)?)))
        })
        .with("endsWith", |args| Ok(json!(args.str(0)?.ends_with(args.str(1)?))))
        .with("repeat", |args| {
            let count = args.number(1)?;
            if !(0.0..=10_000.0).contains(&count) {
                return Err(failed("repeat count must be between 0 and 10000"));
            }
            Ok(json!(args.str(0)?.repeat(count as usize)))
        })
}
