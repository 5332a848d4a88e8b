//! Node types for workflow graphs.
//!
//! A node is one unit of work. Its `type` selects the executor from the
//! registry, and its `parameters` are handed to that executor after
//! template resolution.

use crate::retry::RetrySettings;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Editor metadata. Ignored during execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// What the engine does once a node has failed and its retries are spent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnError {
    /// Fail the run and end this branch. Sibling branches still finish.
    #[default]
    StopWorkflow,
    /// Follow only the node's `error`-labelled edges. The run does not fail.
    ContinueErrorOutput,
    /// Follow the node's regular edges as if it had succeeded. The run does
    /// not fail.
    ContinueRegularOutput,
    /// End this branch without failing the run.
    SkipNode,
}

impl OnError {
    /// Returns true if a failure under this policy fails the run.
    #[must_use]
    pub fn fails_run(&self) -> bool {
        matches!(self, Self::StopWorkflow)
    }
}

/// A node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    /// Unique within the workflow.
    pub id: String,
    /// Registry key of the executor that runs this node.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Human-readable label.
    #[serde(default)]
    pub label: String,
    /// Executor parameters; string leaves may contain `{{placeholders}}`.
    #[serde(default)]
    pub parameters: Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Best-effort node: a failure here does not fail the run.
    ///
    /// Shorthand for `onError: continueRegularOutput`; an explicit
    /// `on_error` wins.
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<OnError>,
    /// Skip this node when any predecessor that ran has failed.
    #[serde(default)]
    pub skip_on_fail: bool,
    /// Executor tried once when this node's own executor has failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_node_type: Option<String>,
    /// Disabled nodes are recorded as skipped and their edges still fire.
    #[serde(default)]
    pub disabled: bool,
    /// Overrides the workflow-level retry settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetrySettings>,
}

impl WorkflowNode {
    /// Creates a node with no parameters.
    #[must_use]
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            node_type: node_type.into(),
            parameters: Map::new(),
            position: None,
            optional: false,
            on_error: None,
            skip_on_fail: false,
            fallback_node_type: None,
            disabled: false,
            retry_policy: None,
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets a single parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Replaces all parameters with the entries of a JSON object.
    ///
    /// Non-object values leave the parameters empty.
    #[must_use]
    pub fn with_parameters(mut self, parameters: JsonValue) -> Self {
        self.parameters = match parameters {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        self
    }

    /// Marks the node as best-effort.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_on_error(mut self, policy: OnError) -> Self {
        self.on_error = Some(policy);
        self
    }

    /// Skips the node when a predecessor failed.
    #[must_use]
    pub fn skip_on_fail(mut self) -> Self {
        self.skip_on_fail = true;
        self
    }

    /// Sets the executor tried when this node fails.
    #[must_use]
    pub fn with_fallback(mut self, node_type: impl Into<String>) -> Self {
        self.fallback_node_type = Some(node_type.into());
        self
    }

    /// Returns the failure policy in effect.
    #[must_use]
    pub fn error_policy(&self) -> OnError {
        match self.on_error {
            Some(policy) => policy,
            None if self.optional => OnError::ContinueRegularOutput,
            None => OnError::StopWorkflow,
        }
    }

    /// Marks the node as disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Sets node-level retry settings.
    #[must_use]
    pub fn with_retry(mut self, settings: RetrySettings) -> Self {
        self.retry_policy = Some(settings);
        self
    }

    /// Returns a parameter by key.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&JsonValue> {
        self.parameters.get(key)
    }

    /// Returns a parameter as a string slice, if it is a string.
    #[must_use]
    pub fn str_parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(JsonValue::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_editor_shape() {
        let node: WorkflowNode = serde_json::from_value(json!({
            "id": "fetch",
            "type": "http-request",
            "label": "Fetch user",
            "parameters": {"url": "{{json.endpoint}}"},
            "position": {"x": 10.0, "y": 20.0}
        }))
        .expect("deserialize node");

        assert_eq!(node.node_type, "http-request");
        assert_eq!(node.str_parameter("url"), Some("{{json.endpoint}}"));
        assert!(!node.optional);
        assert!(!node.disabled);
        assert!(node.retry_policy.is_none());
    }

    #[test]
    fn builder_sets_flags() {
        let node = WorkflowNode::new("n1", "wait")
            .with_parameter("durationMs", 5)
            .optional()
            .disabled();
        assert_eq!(node.label, "n1");
        assert_eq!(node.parameter("durationMs"), Some(&json!(5)));
        assert!(node.optional);
        assert!(node.disabled);
    }

    #[test]
    fn error_policy_defaults_and_overrides() {
        assert_eq!(WorkflowNode::new("n", "t").error_policy(), OnError::StopWorkflow);
        assert_eq!(
            WorkflowNode::new("n", "t").optional().error_policy(),
            OnError::ContinueRegularOutput
        );
        assert_eq!(
            WorkflowNode::new("n", "t")
                .optional()
                .with_on_error(OnError::SkipNode)
                .error_policy(),
            OnError::SkipNode
        );
        assert!(OnError::StopWorkflow.fails_run());
        assert!(!OnError::ContinueErrorOutput.fails_run());
    }

    #[test]
    fn failure_handling_fields_deserialize() {
        let node: WorkflowNode = serde_json::from_value(json!({
            "id": "fetch",
            "type": "http-request",
            "onError": "continueErrorOutput",
            "skipOnFail": true,
            "fallbackNodeType": "transform"
        }))
        .expect("deserialize node");

        assert_eq!(node.on_error, Some(OnError::ContinueErrorOutput));
        assert!(node.skip_on_fail);
        assert_eq!(node.fallback_node_type.as_deref(), Some("transform"));
    }

    #[test]
    fn with_parameters_ignores_non_objects() {
        let node = WorkflowNode::new("n1", "transform").with_parameters(json!([1, 2]));
        assert!(node.parameters.is_empty());
    }
}
