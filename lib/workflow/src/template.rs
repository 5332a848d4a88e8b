//! `{{placeholder}}` resolution against a layered namespace.
//!
//! Resolution is lenient: a path that resolves to nothing renders as the
//! empty string instead of failing the run. Callers that want the opposite
//! use [`try_resolve`].
//!
//! Lookup rules:
//! - `{{json.email}}` reads namespace `json` when the first segment names a
//!   supplied namespace.
//! - `{{email}}` is tried against `context`, `state` and `json`, in that
//!   order, and the first hit wins.
//! - Segments may index arrays: `items.0.id` and `items[0].id` are equal.
//! - A string that is exactly one placeholder keeps the raw value's type.
//!   Placeholders inside longer strings are interpolated.
//! - Placeholders rooted at `env` or `secrets` are left untouched when that
//!   namespace was not supplied.

use crate::context::WorkflowContext;
use crate::error::TemplateError;
use crate::execution::ExecutionState;
use nodeflow_core::Secrets;
use regex::{Captures, Regex};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("placeholder pattern is a valid regex")
});

/// Namespaces that fall back in this order for unqualified paths.
const FALLBACK_ORDER: [&str; 3] = ["context", "state", "json"];

/// Opt-in namespaces whose placeholders survive when not supplied.
const DEFERRED_ROOTS: [&str; 2] = ["env", "secrets"];

/// The data a template can see.
#[derive(Debug, Clone, Default)]
pub struct Namespaces {
    scopes: BTreeMap<String, JsonValue>,
}

impl Namespaces {
    /// Creates namespaces from the three standard scopes.
    #[must_use]
    pub fn new(context: JsonValue, state: JsonValue, json: JsonValue) -> Self {
        Self::default()
            .with_scope("context", context)
            .with_scope("state", state)
            .with_scope("json", json)
    }

    /// Builds the standard scopes for a run: the serialized context, node
    /// results keyed by node ID, and the trigger payload.
    #[must_use]
    pub fn for_run(context: &WorkflowContext, state: &ExecutionState) -> Self {
        Self::new(
            context.to_json(),
            state.to_json(),
            context.trigger_data.clone(),
        )
    }

    /// Adds or replaces a named scope.
    #[must_use]
    pub fn with_scope(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.scopes.insert(name.into(), value);
        self
    }

    /// Exposes the process environment as `env`.
    #[must_use]
    pub fn with_process_env(self) -> Self {
        self.with_env(std::env::vars())
    }

    /// Exposes the given variables as `env`.
    #[must_use]
    pub fn with_env<I, K, V>(self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: Map<String, JsonValue> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), JsonValue::String(v.into())))
            .collect();
        self.with_scope("env", JsonValue::Object(map))
    }

    /// Exposes injected secrets as `secrets`.
    #[must_use]
    pub fn with_secrets(self, secrets: &Secrets) -> Self {
        let map: Map<String, JsonValue> = secrets
            .iter()
            .map(|(k, v)| (k.to_string(), JsonValue::String(v.to_string())))
            .collect();
        self.with_scope("secrets", JsonValue::Object(map))
    }

    fn lookup(&self, path: &str) -> Lookup<'_> {
        let segments = split_path(path);
        let Some((root, rest)) = segments.split_first() else {
            return Lookup::Missing;
        };

        if let Some(scope) = self.scopes.get(root.as_str()) {
            if let Some(value) = walk(scope, rest) {
                return Lookup::Found(value);
            }
        } else if DEFERRED_ROOTS.contains(&root.as_str()) {
            return Lookup::Deferred;
        }

        FALLBACK_ORDER
            .iter()
            .filter_map(|name| self.scopes.get(*name))
            .find_map(|scope| walk(scope, &segments))
            .map_or(Lookup::Missing, Lookup::Found)
    }
}

enum Lookup<'a> {
    Found(&'a JsonValue),
    Missing,
    Deferred,
}

/// Splits `a.b[0].c` into `["a", "b", "0", "c"]`.
fn split_path(path: &str) -> Vec<String> {
    path.replace('[', ".")
        .replace(']', "")
        .split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

fn walk<'a>(root: &'a JsonValue, segments: &[String]) -> Option<&'a JsonValue> {
    segments.iter().try_fold(root, |value, segment| match value {
        JsonValue::Object(map) => map.get(segment),
        JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Renders a value for interpolation into a longer string.
fn to_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Resolves every placeholder in a value, leniently.
///
/// Strings are resolved, arrays and objects are walked recursively, and
/// all other leaves pass through untouched.
#[must_use]
pub fn resolve(template: &JsonValue, namespaces: &Namespaces) -> JsonValue {
    match template {
        JsonValue::String(s) => resolve_str(s, namespaces),
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(|v| resolve(v, namespaces)).collect())
        }
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve(v, namespaces)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolves every placeholder in a value, failing on the first miss.
///
/// # Errors
///
/// Returns [`TemplateError::UnresolvedPath`] naming the first path that
/// resolved to nothing.
pub fn try_resolve(
    template: &JsonValue,
    namespaces: &Namespaces,
) -> Result<JsonValue, TemplateError> {
    match template {
        JsonValue::String(s) => resolve_str_with(s, namespaces, true),
        JsonValue::Array(items) => items
            .iter()
            .map(|v| try_resolve(v, namespaces))
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),
        JsonValue::Object(map) => map
            .iter()
            .map(|(k, v)| try_resolve(v, namespaces).map(|v| (k.clone(), v)))
            .collect::<Result<Map<_, _>, _>>()
            .map(JsonValue::Object),
        other => Ok(other.clone()),
    }
}

/// Resolves a single string leniently.
#[must_use]
pub fn resolve_str(template: &str, namespaces: &Namespaces) -> JsonValue {
    resolve_str_with(template, namespaces, false)
        .unwrap_or_else(|_| JsonValue::String(String::new()))
}

/// Resolves a string and always renders the result as text.
#[must_use]
pub fn render(template: &str, namespaces: &Namespaces) -> String {
    to_text(&resolve_str(template, namespaces))
}

/// Returns true if the string still contains a placeholder.
#[must_use]
pub fn contains_placeholder(text: &str) -> bool {
    PLACEHOLDER.is_match(text)
}

fn resolve_str_with(
    template: &str,
    namespaces: &Namespaces,
    strict: bool,
) -> Result<JsonValue, TemplateError> {
    if let Some(caps) = PLACEHOLDER.captures(template) {
        let whole = caps.get(0).map(|m| m.as_str().len()) == Some(template.len());
        if whole {
            let path = &caps[1];
            return match namespaces.lookup(path) {
                Lookup::Found(value) => Ok(value.clone()),
                Lookup::Deferred => Ok(JsonValue::String(template.to_string())),
                Lookup::Missing if strict => Err(TemplateError::UnresolvedPath {
                    path: path.to_string(),
                }),
                Lookup::Missing => Ok(JsonValue::String(String::new())),
            };
        }
    } else {
        return Ok(JsonValue::String(template.to_string()));
    }

    let mut first_miss = None;
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        match namespaces.lookup(&caps[1]) {
            Lookup::Found(value) => to_text(value),
            Lookup::Deferred => caps[0].to_string(),
            Lookup::Missing => {
                first_miss.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });

    match first_miss {
        Some(path) if strict => Err(TemplateError::UnresolvedPath { path }),
        _ => Ok(JsonValue::String(rendered.into_owned())),
    }
}
