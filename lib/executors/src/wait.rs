//! The `wait` executor.

use crate::params;
use crate::value::loose_eq;
use async_trait::async_trait;
use nodeflow_workflow::{
    ErrorCode, ExecutionState, NodeExecutor, NodeResult, ValidationResult, WorkflowContext,
    WorkflowNode,
};
use serde_json::{Value as JsonValue, json};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;

const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_UNTIL_TIMEOUT_MS: u64 = 60_000;
const LONG_WAIT_MS: u64 = 3_600_000;

/// Suspends one branch, either for `durationMs` or until a run variable
/// equals a value (`until: {variable, equals}`).
///
/// Only the node's own task sleeps; sibling branches keep running.
#[derive(Debug, Default)]
pub struct WaitExecutor;

impl WaitExecutor {
    async fn until(
        node: &WorkflowNode,
        context: &WorkflowContext,
        variable: &str,
        expected: &JsonValue,
    ) -> NodeResult {
        let poll = Duration::from_millis(
            params::millis(node, "pollIntervalMs")
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
                .max(1),
        );
        let timeout_ms = params::millis(node, "timeoutMs").unwrap_or(DEFAULT_UNTIL_TIMEOUT_MS);
        let started = Instant::now();
        let deadline = started + Duration::from_millis(timeout_ms);

        loop {
            if let Some(value) = context.variables.get(variable) {
                if loose_eq(&value, expected) {
                    return NodeResult::success(json!({
                        "waitedMs": started.elapsed().as_millis() as u64,
                        "variable": variable,
                        "value": value,
                    }));
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return NodeResult::failure(
                    ErrorCode::Timeout,
                    format!(
                        "variable {variable} did not reach the expected value within {timeout_ms}ms"
                    ),
                );
            }
            sleep(poll.min(deadline - now)).await;
        }
    }
}

#[async_trait]
impl NodeExecutor for WaitExecutor {
    fn node_type(&self) -> &str {
        "wait"
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &WorkflowContext,
        _state: &ExecutionState,
    ) -> NodeResult {
        if let Some(until) = params::object(node, "until") {
            let Some(variable) = until.get("variable").and_then(JsonValue::as_str) else {
                return NodeResult::failure(
                    ErrorCode::ValidationError,
                    "until.variable is required",
                );
            };
            let expected = until.get("equals").unwrap_or(&JsonValue::Null);
            debug!(node_id = %node.id, variable, "waiting for variable");
            return Self::until(node, context, variable, expected).await;
        }

        let Some(duration_ms) = params::millis(node, "durationMs") else {
            return NodeResult::failure(
                ErrorCode::ValidationError,
                "wait needs a non-negative durationMs or an until clause",
            );
        };
        debug!(node_id = %node.id, duration_ms, "waiting");
        sleep(Duration::from_millis(duration_ms)).await;
        NodeResult::success(json!({ "waitedMs": duration_ms }))
    }

    fn validate(&self, node: &WorkflowNode) -> ValidationResult {
        let mut result = ValidationResult::ok();
        match (node.parameter("until"), node.parameter("durationMs")) {
            (Some(JsonValue::Object(until)), _) => {
                if !until.get("variable").is_some_and(JsonValue::is_string) {
                    result.error("until.variable must be a string");
                }
                if let Some(timeout) = params::millis(node, "timeoutMs") {
                    if timeout > LONG_WAIT_MS {
                        result.warn(format!("timeoutMs of {timeout}ms exceeds one hour"));
                    }
                }
            }
            (Some(_), _) => result.error("until must be an object"),
            (None, Some(_)) => match params::millis(node, "durationMs") {
                Some(ms) if ms > LONG_WAIT_MS => {
                    result.warn(format!("durationMs of {ms}ms exceeds one hour"));
                }
                Some(_) => {}
                None if params::is_templated(node, "durationMs") => {}
                None => result.error("durationMs must be a non-negative number"),
            },
            (None, None) => result.error("one of durationMs or until is required"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn sleeps_for_duration() {
        let started = Instant::now();
        let result = WaitExecutor
            .execute(
                &WorkflowNode::new("w", "wait").with_parameter("durationMs", 5_000),
                &WorkflowContext::new("acme"),
                &ExecutionState::new(),
            )
            .await;
        assert!(result.is_success());
        assert_eq!(result.output["waitedMs"], 5_000);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn until_resolves_when_variable_changes() {
        let context = Arc::new(WorkflowContext::new("acme"));
        let node = WorkflowNode::new("w", "wait")
            .with_parameter("until", json!({"variable": "ready", "equals": true}))
            .with_parameter("pollIntervalMs", 5)
            .with_parameter("timeoutMs", 2_000);

        let setter = {
            let context = Arc::clone(&context);
            tokio::spawn(async move {
                sleep(Duration::from_millis(30)).await;
                context.variables.set("ready", json!(true));
            })
        };
        let result = WaitExecutor
            .execute(&node, &context, &ExecutionState::new())
            .await;
        setter.await.expect("setter task");

        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.output["value"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn until_times_out() {
        let node = WorkflowNode::new("w", "wait")
            .with_parameter("until", json!({"variable": "ready", "equals": true}))
            .with_parameter("timeoutMs", 500);
        let result = WaitExecutor
            .execute(&node, &WorkflowContext::new("acme"), &ExecutionState::new())
            .await;
        assert_eq!(result.error_code, Some(ErrorCode::Timeout));
    }

    #[test]
    fn validation_warns_on_long_waits() {
        let long = WaitExecutor.validate(
            &WorkflowNode::new("w", "wait").with_parameter("durationMs", 7_200_000),
        );
        assert!(long.valid);
        assert_eq!(long.warnings.len(), 1);

        assert!(!WaitExecutor.validate(&WorkflowNode::new("w", "wait")).valid);
        assert!(
            !WaitExecutor
                .validate(&WorkflowNode::new("w", "wait").with_parameter("durationMs", "soon"))
                .valid
        );
    }
}
