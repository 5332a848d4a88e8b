//! The `set-variable` executor.

use async_trait::async_trait;
use nodeflow_workflow::{
    ErrorCode, ExecutionState, NodeExecutor, NodeResult, ValidationResult, WorkflowContext,
    WorkflowNode,
};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

/// Writes run variables: `{name, value}` or `{variables: {..}}`. The
/// output echoes what was written.
#[derive(Debug, Default)]
pub struct SetVariableExecutor;

#[async_trait]
impl NodeExecutor for SetVariableExecutor {
    fn node_type(&self) -> &str {
        "set-variable"
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &WorkflowContext,
        _state: &ExecutionState,
    ) -> NodeResult {
        let mut written = Map::new();
        if let Some(name) = node.str_parameter("name").filter(|n| !n.trim().is_empty()) {
            let value = node.parameter("value").cloned().unwrap_or(JsonValue::Null);
            written.insert(name.to_string(), value);
        }
        if let Some(variables) = node.parameter("variables").and_then(JsonValue::as_object) {
            written.extend(variables.clone());
        }
        if written.is_empty() {
            return NodeResult::failure(
                ErrorCode::ValidationError,
                "set-variable needs a name or a variables object",
            );
        }
        for (name, value) in &written {
            context.variables.set(name.clone(), value.clone());
        }
        debug!(node_id = %node.id, count = written.len(), "variables set");
        NodeResult::success(JsonValue::Object(written))
    }

    fn validate(&self, node: &WorkflowNode) -> ValidationResult {
        let mut result = ValidationResult::ok();
        let has_name = match node.parameter("name") {
            None => false,
            Some(JsonValue::String(name)) if !name.trim().is_empty() => true,
            Some(_) => {
                result.error("name must be a non-empty string");
                true
            }
        };
        let has_variables = match node.parameter("variables") {
            None => false,
            Some(JsonValue::Object(_)) => true,
            Some(_) => {
                result.error("variables must be an object");
                true
            }
        };
        if !has_name && !has_variables {
            result.error("one of name or variables is required");
        }
        result
    }
}
