//! Per-run execution context.
//!
//! The context is read-mostly: everything except `variables` is fixed when
//! the run starts. `variables` is shared between the engine and every node
//! task of the run so `set-variable` writes are visible downstream.

use crate::trigger::WorkflowTrigger;
use nodeflow_core::{ExecutionId, Secrets};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Identity of the user that started a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Permission level.
    #[serde(default)]
    pub level: u32,
}

/// Inbound HTTP request shape, for webhook-triggered runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub body: JsonValue,
}

/// Mutable, run-scoped variable map.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct Variables(Arc<RwLock<Map<String, JsonValue>>>);

impl Variables {
    /// Creates an empty variable map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a variable map from a JSON object; other values yield an empty map.
    #[must_use]
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(map) => Self::from(map),
            _ => Self::new(),
        }
    }

    /// Returns a copy of a variable's value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<JsonValue> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Sets a variable, returning the previous value.
    pub fn set(&self, name: impl Into<String>, value: JsonValue) -> Option<JsonValue> {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value)
    }

    /// Returns a point-in-time copy of all variables.
    #[must_use]
    pub fn snapshot(&self) -> Map<String, JsonValue> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl From<Map<String, JsonValue>> for Variables {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(Arc::new(RwLock::new(map)))
    }
}

impl PartialEq for Variables {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.snapshot() == other.snapshot()
    }
}

impl Serialize for Variables {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Variables {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::deserialize(deserializer).map(Self::from)
    }
}

/// Data threaded through every executor call of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowContext {
    pub execution_id: ExecutionId,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
    #[serde(default)]
    pub trigger: WorkflowTrigger,
    /// Arbitrary trigger payload, exposed to templates as `json`.
    #[serde(default)]
    pub trigger_data: JsonValue,
    #[serde(default)]
    pub variables: Variables,
    #[serde(skip)]
    pub secrets: Secrets,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestInfo>,
}

impl WorkflowContext {
    /// Creates a context for a manual run with a fresh execution ID.
    #[must_use]
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            tenant_id: tenant_id.into(),
            user_id: None,
            user: None,
            trigger: WorkflowTrigger::manual(),
            trigger_data: JsonValue::Null,
            variables: Variables::new(),
            secrets: Secrets::new(),
            request: None,
        }
    }

    /// Sets the trigger payload.
    #[must_use]
    pub fn with_trigger_data(mut self, data: JsonValue) -> Self {
        self.trigger_data = data;
        self
    }

    /// Sets the trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: WorkflowTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Replaces the variables with the entries of a JSON object.
    #[must_use]
    pub fn with_variables(mut self, variables: JsonValue) -> Self {
        self.variables = Variables::from_json(variables);
        self
    }

    /// Sets the injected secrets.
    #[must_use]
    pub fn with_secrets(mut self, secrets: Secrets) -> Self {
        self.secrets = secrets;
        self
    }

    /// Sets the acting user.
    #[must_use]
    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user_id = Some(user.id.clone());
        self.user = Some(user);
        self
    }

    /// Sets the inbound request.
    #[must_use]
    pub fn with_request(mut self, request: RequestInfo) -> Self {
        self.request = Some(request);
        self
    }

    /// Returns the context as JSON, as seen by templates.
    ///
    /// Secrets are never included.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn variables_are_shared_between_clones() {
        let ctx = WorkflowContext::new("acme").with_variables(json!({"count": 1}));
        let copy = ctx.clone();
        copy.variables.set("count", json!(2));
        assert_eq!(ctx.variables.get("count"), Some(json!(2)));
    }

    #[test]
    fn secrets_never_serialize() {
        let ctx = WorkflowContext::new("acme")
            .with_secrets(Secrets::new().with("API_KEY", "hunter2"))
            .with_trigger_data(json!({"email": "a@b.com"}));
        let rendered = ctx.to_json().to_string();
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("API_KEY"));
        assert!(!format!("{ctx:?}").contains("hunter2"));
    }

    #[test]
    fn to_json_uses_camel_case() {
        let ctx = WorkflowContext::new("acme")
            .with_user(UserInfo {
                id: "u1".to_string(),
                email: Some("u1@example.com".to_string()),
                level: 2,
            })
            .with_trigger_data(json!({"email": "a@b.com"}));
        let value = ctx.to_json();
        assert_eq!(value["tenantId"], json!("acme"));
        assert_eq!(value["userId"], json!("u1"));
        assert_eq!(value["user"]["level"], json!(2));
        assert_eq!(value["triggerData"]["email"], json!("a@b.com"));
        assert_eq!(value["trigger"]["kind"], json!("manual"));
    }

    #[test]
    fn non_object_variables_are_empty() {
        let ctx = WorkflowContext::new("acme").with_variables(json!("nope"));
        assert!(ctx.variables.snapshot().is_empty());
    }
}
