//! `list.*` operators.

use super::failed;
use crate::value::{as_number, loose_eq, sort_order};
use nodeflow_workflow::PluginMap;
use serde_json::{Value as JsonValue, json};

fn bound(value: Option<&JsonValue>, len: usize, default: usize) -> usize {
    value.and_then(as_number).map_or(default, |n| {
        let n = n as i64;
        let len = len as i64;
        let index = if n < 0 { len + n } else { n };
        index.clamp(0, len) as usize
    })
}

#[must_use]
pub fn plugins() -> PluginMap {
    PluginMap::new("list")
        .with("length", |args| Ok(json!(args.array(0)?.len())))
        .with("first", |args| {
            Ok(args.array(0)?.first().cloned().unwrap_or(JsonValue::Null))
        })
        .with("last", |args| {
            Ok(args.array(0)?.last().cloned().unwrap_or(JsonValue::Null))
        })
        .with("get", |args| {
            let items = args.array(0)?;
            let index = args.number(1)?;
            if index < 0.0 || index.fract() != 0.0 {
                return Err(failed(format!("invalid index {index}")));
            }
            Ok(items.get(index as usize).cloned().unwrap_or(JsonValue::Null))
        })
        .with("append", |args| {
            let mut items = args.array(0)?.clone();
            items.extend(args.all().iter().skip(1).cloned());
            Ok(JsonValue::Array(items))
        })
        .with("concat", |args| {
            let mut items = Vec::new();
            for index in 0..args.len() {
                items.extend(args.array(index)?.iter().cloned());
            }
            Ok(JsonValue::Array(items))
        })
        .with("reverse", |args| {
            Ok(JsonValue::Array(args.array(0)?.iter().rev().cloned().collect()))
        })
        .with("sort", |args| {
            let mut items = args.array(0)?.clone();
            items.sort_by(sort_order);
            if args.get(1).and_then(JsonValue::as_str) == Some("desc") {
                items.reverse();
            }
            Ok(JsonValue::Array(items))
        })
        .with("unique", |args| {
            let mut unique: Vec<JsonValue> = Vec::new();
            for item in args.array(0)? {
                if !unique.contains(item) {
                    unique.push(item.clone());
                }
            }
            Ok(JsonValue::Array(unique))
        })
        .with("slice", |args| {
            let items = args.array(0)?;
            let start = bound(args.get(1), items.len(), 0);
            let end = bound(args.get(2), items.len(), items.len()).max(start);
            Ok(JsonValue::Array(items[start..end].to_vec()))
        })
        .with("contains", |args| {
            let needle = args.value(1)?;
            Ok(json!(args.array(0)?.iter().any(|item| loose_eq(item, needle))))
        })
        .with("pluck", |args| {
            let field = args.str(1)?;
            Ok(JsonValue::Array(
                args.array(0)?
                    .iter()
                    .map(|item| item.get(field).cloned().unwrap_or(JsonValue::Null))
                    .collect(),
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::call;

    #[test]
    fn list_operators() {
        let map = plugins();
        let items = json!([3, 1, 2, 1]);
        assert_eq!(call(&map, "length", &[items.clone()]).expect("length"), json!(4));
        assert_eq!(call(&map, "last", &[items.clone()]).expect("last"), json!(1));
        assert_eq!(call(&map, "sort", &[items.clone()]).expect("sort"), json!([1, 1, 2, 3]));
        assert_eq!(call(&map, "unique", &[items.clone()]).expect("unique"), json!([3, 1, 2]));
        assert_eq!(
            call(&map, "slice", &[items.clone(), json!(1), json!(-1)]).expect("slice"),
            json!([1, 2])
        );
        assert_eq!(
            call(&map, "append", &[json!([1]), json!(2), json!(3)]).expect("append"),
            json!([1, 2, 3])
        );
        assert_eq!(
            call(&map, "pluck", &[json!([{"id": 1}, {"name": "x"}]), json!("id")]).expect("pluck"),
            json!([1, null])
        );
        assert_eq!(call(&map, "get", &[items, json!(9)]).expect("get"), json!(null));
    }

    #[test]
    fn sort_handles_mixed_kinds() {
        let map = plugins();
        let mixed = json!(["b", 2, null, {"k": 1}, "a", 1, [0], true]);
        assert_eq!(
            call(&map, "sort", &[mixed.clone()]).expect("sort"),
            json!([null, true, 1, 2, "a", "b", [0], {"k": 1}])
        );
        assert_eq!(
            call(&map, "sort", &[mixed, json!("desc")]).expect("sort"),
            json!([{"k": 1}, [0], "b", "a", 2, 1, true, null])
        );
    }

    #[test]
    fn non_list_argument_is_rejected() {
        assert!(call(&plugins(), "reverse", &[json!("abc")]).is_err());
        assert!(call(&plugins(), "get", &[json!([1]), json!(-1)]).is_err());
    }
}
