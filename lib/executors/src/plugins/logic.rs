//! `logic.*` operators.

use crate::value::{loose_eq, truthy};
use nodeflow_workflow::PluginMap;
use serde_json::{Value as JsonValue, json};

#[must_use]
pub fn plugins() -> PluginMap {
    PluginMap::new("logic")
        .with("and", |args| Ok(json!(!args.is_empty() && args.all().iter().all(truthy))))
        .with("or", |args| Ok(json!(args.all().iter().any(truthy))))
        .with("not", |args| Ok(json!(!truthy(args.value(0)?))))
        .with("equals", |args| Ok(json!(loose_eq(args.value(0)?, args.value(1)?))))
        .with("notEquals", |args| {
            Ok(json!(!loose_eq(args.value(0)?, args.value(1)?)))
        })
        .with("ifElse", |args| {
            let chosen = if truthy(args.value(0)?) { 1 } else { 2 };
            Ok(args.get(chosen).cloned().unwrap_or(JsonValue::Null))
        })
        .with("coalesce", |args| {
            Ok(args
                .all()
                .iter()
                .find(|value| !value.is_null())
                .cloned()
                .unwrap_or(JsonValue::Null))
        })
}
