//! `convert.*` operators.

use super::failed;
use crate::value::{as_number, as_text, number, truthy};
use nodeflow_workflow::PluginMap;
use serde_json::{Value as JsonValue, json};

#[must_use]
pub fn plugins() -> PluginMap {
    PluginMap::new("convert")
        .with("toString", |args| Ok(json!(as_text(args.value(0)?))))
        .with("toNumber", |args| {
            let value = args.value(0)?;
            as_number(value)
                .filter(|n| n.is_finite())
                .map(number)
                .ok_or_else(|| failed(format!("cannot convert {value} to a number")))
        })
        .with("toBoolean", |args| Ok(json!(truthy(args.value(0)?))))
        .with("parseJson", |args| {
            serde_json::from_str(args.str(0)?)
                .map_err(|err| failed(format!("invalid JSON: {err}")))
        })
        .with("toJson", |args| {
            let value = args.value(0)?;
            let pretty = args.get(1).is_some_and(truthy);
            let text = if pretty {
                serde_json::to_string_pretty(value)
            } else {
                serde_json::to_string(value)
            };
            text.map(JsonValue::String)
                .map_err(|err| failed(err.to_string()))
        })
        .with("toArray", |args| {
            Ok(match args.get(0) {
                None | Some(JsonValue::Null) => json!([]),
                Some(JsonValue::Array(items)) => JsonValue::Array(items.clone()),
                Some(other) => json!([other]),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::call;

    #[test]
    fn conversions() {
        let map = plugins();
        assert_eq!(
            call(&map, "toString", &[json!({"a": 1})]).expect("toString"),
            json!(r#"{"a":1}"#)
        );
        assert_eq!(call(&map, "toNumber", &[json!(" 42 ")]).expect("toNumber"), json!(42));
        assert_eq!(call(&map, "toBoolean", &[json!("false")]).expect("toBoolean"), json!(false));
        assert_eq!(
            call(&map, "parseJson", &[json!(r#"{"ok":true}"#)]).expect("parseJson"),
            json!({"ok": true})
        );
        assert_eq!(call(&map, "toJson", &[json!([1, 2])]).expect("toJson"), json!("[1,2]"));
        assert_eq!(call(&map, "toArray", &[json!("x")]).expect("toArray"), json!(["x"]));
    }

    #[test]
    fn failed_conversions() {
        assert!(call(&plugins(), "toNumber", &[json!("abc")]).is_err());
        assert!(call(&plugins(), "parseJson", &[json!("{")]).is_err());
    }
}
