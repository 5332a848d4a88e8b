//! The `transform` executor.

use async_trait::async_trait;
use nodeflow_workflow::{
    ErrorCode, ExecutionState, NodeExecutor, NodeResult, ValidationResult, WorkflowContext,
    WorkflowNode,
};
use serde_json::{Map, Value as JsonValue};

/// Reshapes data. The output is the resolved `mapping`, or the resolved
/// `value`; `pick` keeps only the listed keys of an object output.
#[derive(Debug, Default)]
pub struct TransformExecutor;

fn pick(output: JsonValue, keys: &[JsonValue]) -> JsonValue {
    match output {
        JsonValue::Object(map) => {
            let picked: Map<String, JsonValue> = keys
                .iter()
                .filter_map(JsonValue::as_str)
                .filter_map(|key| map.get(key).map(|v| (key.to_string(), v.clone())))
                .collect();
            JsonValue::Object(picked)
        }
        other => other,
    }
}

#[async_trait]
impl NodeExecutor for TransformExecutor {
    fn node_type(&self) -> &str {
        "transform"
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        _context: &WorkflowContext,
        _state: &ExecutionState,
    ) -> NodeResult {
        let output = match (node.parameter("mapping"), node.parameter("value")) {
            (Some(mapping), _) => mapping.clone(),
            (None, Some(value)) => value.clone(),
            (None, None) => {
                return NodeResult::failure(
                    ErrorCode::ValidationError,
                    "transform needs mapping or value",
                );
            }
        };
        let output = match node.parameter("pick").and_then(JsonValue::as_array) {
            Some(keys) => pick(output, keys),
            None => output,
        };
        NodeResult::success(output)
    }

    fn validate(&self, node: &WorkflowNode) -> ValidationResult {
        let mut result = ValidationResult::ok();
        match node.parameter("mapping") {
            Some(JsonValue::Object(_)) => {}
            Some(_) => result.error("mapping must be an object"),
            None if node.parameter("value").is_none() => {
                result.error("one of mapping or value is required");
            }
            None => {}
        }
        if let Some(keys) = node.parameter("pick") {
            if !keys.is_array() {
                result.error("pick must be a list of keys");
            }
        }
        result
    }
}
