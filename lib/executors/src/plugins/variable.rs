//! `variable.*` operators over the run's variables.

use super::failed;
use crate::value::{as_number, number};
use nodeflow_workflow::PluginMap;
use serde_json::{Value as JsonValue, json};

#[must_use]
pub fn plugins() -> PluginMap {
    PluginMap::new("variable")
        .with("get", |args| {
            let found = args.variables().get(args.str(0)?);
            Ok(found.or_else(|| args.get(1).cloned()).unwrap_or(JsonValue::Null))
        })
        .with("set", |args| {
            let value = args.get(1).cloned().unwrap_or(JsonValue::Null);
            args.variables().set(args.str(0)?, value.clone());
            Ok(value)
        })
        .with("has", |args| Ok(json!(args.variables().get(args.str(0)?).is_some())))
        .with("increment", |args| {
            let name = args.str(0)?;
            let by = match args.get(1) {
                Some(_) => args.number(1)?,
                None => 1.0,
            };
            let current = match args.variables().get(name) {
                None | Some(JsonValue::Null) => 0.0,
                Some(value) => as_number(&value)
                    .ok_or_else(|| failed(format!("variable {name} is not a number")))?,
            };
            let next = number(current + by);
            args.variables().set(name, next.clone());
            Ok(next)
        })
}
