//! Category plugin maps: stateless operators registered as
//! `<category>.<name>` node types.

use crate::value::as_number;
use nodeflow_workflow::{PluginArgs, PluginError, PluginMap};

pub mod convert;
pub mod dict;
pub mod list;
pub mod logic;
pub mod math;
pub mod string;
pub mod variable;

/// Every built-in plugin category.
#[must_use]
pub fn all_plugin_maps() -> Vec<PluginMap> {
    vec![
        string::plugins(),
        math::plugins(),
        logic::plugins(),
        list::plugins(),
        dict::plugins(),
        convert::plugins(),
        variable::plugins(),
    ]
}

pub(crate) fn failed(reason: impl Into<String>) -> PluginError {
    PluginError::Failed {
        reason: reason.into(),
    }
}

/// Collects numeric arguments; a single array argument is spread.
pub(crate) fn numbers(args: &PluginArgs<'_>) -> Result<Vec<f64>, PluginError> {
    let values = match args.all() {
        [serde_json::Value::Array(items)] => items.as_slice(),
        all => all,
    };
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            as_number(value).ok_or_else(|| PluginError::InvalidArgument {
                index,
                reason: "expected a number".to_string(),
            })
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_distinct_and_populated() {
        let maps = all_plugin_maps();
        let mut categories: Vec<&str> = maps.iter().map(PluginMap::category).collect();
        categories.sort_unstable();
        assert_eq!(
            categories,
            vec!["convert", "dict", "list", "logic", "math", "string", "variable"]
        );
        assert!(maps.iter().all(|map| !map.is_empty()));
    }
}
