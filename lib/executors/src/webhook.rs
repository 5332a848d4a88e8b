//! The `webhook-response` executor.

use crate::error::WebhookError;
use crate::params;
use async_trait::async_trait;
use nodeflow_core::ExecutionId;
use nodeflow_workflow::{
    ErrorCode, ExecutionState, NodeExecutor, NodeResult, ValidationResult, WorkflowContext,
    WorkflowNode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::debug;

/// The HTTP response a webhook-triggered run hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub status_code: u16,
    pub headers: Map<String, JsonValue>,
    pub body: JsonValue,
}

/// Delivers a response to whoever is waiting on a webhook run.
#[async_trait]
pub trait WebhookResponder: Send + Sync {
    async fn respond(
        &self,
        execution_id: &ExecutionId,
        response: &WebhookResponse,
    ) -> Result<(), WebhookError>;
}

/// Builds a webhook response from `{statusCode, headers, body}` and hands
/// it to the configured responder. The response is always the output.
#[derive(Default)]
pub struct WebhookResponseExecutor {
    responder: Option<Arc<dyn WebhookResponder>>,
}

impl WebhookResponseExecutor {
    #[must_use]
    pub fn new(responder: Option<Arc<dyn WebhookResponder>>) -> Self {
        Self { responder }
    }
}

fn status_code(node: &WorkflowNode) -> Option<u16> {
    match node.parameter("statusCode") {
        None | Some(JsonValue::Null) => Some(200),
        Some(_) => params::millis(node, "statusCode")
            .and_then(|code| u16::try_from(code).ok())
            .filter(|code| (100..=599).contains(code)),
    }
}

#[async_trait]
impl NodeExecutor for WebhookResponseExecutor {
    fn node_type(&self) -> &str {
        "webhook-response"
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &WorkflowContext,
        _state: &ExecutionState,
    ) -> NodeResult {
        let Some(status_code) = status_code(node) else {
            return NodeResult::failure(
                ErrorCode::ValidationError,
                "statusCode must be between 100 and 599",
            );
        };
        let response = WebhookResponse {
            status_code,
            headers: params::object(node, "headers").cloned().unwrap_or_default(),
            body: node.parameter("body").cloned().unwrap_or(JsonValue::Null),
        };
        let output = serde_json::to_value(&response).unwrap_or(JsonValue::Null);

        if let Some(responder) = &self.responder {
            if let Err(err) = responder.respond(&context.execution_id, &response).await {
                return NodeResult::failure(ErrorCode::ExecutionFailed, err.to_string())
                    .with_output(output);
            }
            debug!(node_id = %node.id, status_code, "webhook response delivered");
        }
        NodeResult::success(output)
    }

    fn validate(&self, node: &WorkflowNode) -> ValidationResult {
        let mut result = ValidationResult::ok();
        if status_code(node).is_none() && !params::is_templated(node, "statusCode") {
            result.error("statusCode must be between 100 and 599");
        }
        if let Some(headers) = node.parameter("headers") {
            if !headers.is_object() {
                result.error("headers must be an object");
            }
        }
        result
    }
}
