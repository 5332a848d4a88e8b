//! `dict.*` operators over JSON objects.

use super::failed;
use nodeflow_workflow::PluginMap;
use serde_json::{Map, Value as JsonValue, json};

/// Follows a dotted path; numeric segments index arrays.
fn lookup<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            JsonValue::Object(map) => map.get(segment),
            JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

#[must_use]
pub fn plugins() -> PluginMap {
    PluginMap::new("dict")
        .with("get", |args| {
            let found = lookup(args.value(0)?, args.str(1)?).cloned();
            Ok(found.or_else(|| args.get(2).cloned()).unwrap_or(JsonValue::Null))
        })
        .with("set", |args| {
            let mut object = args.object(0)?.clone();
            object.insert(args.str(1)?.to_string(), args.value(2)?.clone());
            Ok(JsonValue::Object(object))
        })
        .with("has", |args| Ok(json!(lookup(args.value(0)?, args.str(1)?).is_some())))
        .with("keys", |args| Ok(json!(args.object(0)?.keys().collect::<Vec<_>>())))
        .with("values", |args| {
            Ok(JsonValue::Array(args.object(0)?.values().cloned().collect()))
        })
        .with("merge", |args| {
            let mut merged = Map::new();
            for index in 0..args.len() {
                merged.extend(args.object(index)?.clone());
            }
            Ok(JsonValue::Object(merged))
        })
        .with("remove", |args| {
            let mut object = args.object(0)?.clone();
            object.remove(args.str(1)?);
            Ok(JsonValue::Object(object))
        })
        .with("pick", |args| {
            let object = args.object(0)?;
            let picked: Map<String, JsonValue> = args
                .array(1)?
                .iter()
                .filter_map(JsonValue::as_str)
                .filter_map(|key| object.get(key).map(|v| (key.to_string(), v.clone())))
                .collect();
            Ok(JsonValue::Object(picked))
        })
        .with("entries", |args| {
            Ok(JsonValue::Array(
                args.object(0)?
                    .iter()
                    .map(|(key, value)| json!({"key": key, "value": value}))
                    .collect(),
            ))
        })
        .with("fromEntries", |args| {
            let mut object = Map::new();
            for entry in args.array(0)? {
                let key = entry
                    .get("key")
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| failed("every entry needs a string key"))?;
                let value = entry.get("value").cloned().unwrap_or(JsonValue::Null);
                object.insert(key.to_string(), value);
            }
            Ok(JsonValue::Object(object))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::call;

    #[test]
    fn object_operators() {
        let map = plugins();
        let user = json!({"name": "Ada", "address": {"city": "London"}, "tags": ["a", "b"]});
        assert_eq!(
            call(&map, "get", &[user.clone(), json!("address.city")]).expect("get"),
            json!("London")
        );
        assert_eq!(
            call(&map, "get", &[user.clone(), json!("tags.1")]).expect("get"),
            json!("b")
        );
        assert_eq!(
            call(&map, "get", &[user.clone(), json!("missing"), json!("n/a")]).expect("get"),
            json!("n/a")
        );
        assert_eq!(
            call(&map, "merge", &[json!({"a": 1}), json!({"a": 2, "b": 3})]).expect("merge"),
            json!({"a": 2, "b": 3})
        );
        assert_eq!(
            call(&map, "pick", &[user, json!(["name"])]).expect("pick"),
            json!({"name": "Ada"})
        );
        assert_eq!(
            call(&map, "fromEntries", &[json!([{"key": "k", "value": 1}])]).expect("fromEntries"),
            json!({"k": 1})
        );
    }

    #[test]
    fn set_requires_an_object() {
        assert!(call(&plugins(), "set", &[json!([1]), json!("k"), json!(1)]).is_err());
    }
}
