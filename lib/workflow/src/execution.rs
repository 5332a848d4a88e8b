//! Execution state and records.
//!
//! A run moves `pending -> running -> {success, error}`. The engine owns
//! the [`ExecutionState`]; executors only ever see a read-only snapshot.
//! When the frontier empties the state is frozen into an
//! [`ExecutionRecord`], which is both returned to the caller and handed
//! to the record store.

use crate::error::ErrorCode;
use crate::trigger::TriggerKind;
use chrono::{DateTime, Utc};
use nodeflow_core::ExecutionId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet};

/// Overall state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Success,
    Error,
}

impl RunStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// Outcome of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Success,
    Error,
    /// The node was disabled and never dispatched.
    Skipped,
}

/// Result of executing one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
    pub status: NodeStatus,
    /// Visible to downstream nodes and templates as `state.<nodeId>.output`.
    #[serde(default)]
    pub output: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub timestamp: DateTime<Utc>,
    /// Wall time of the final attempt, in milliseconds.
    #[serde(default)]
    pub duration: u64,
    /// Number of executor calls made, including retries.
    #[serde(default)]
    pub attempts: u32,
}

impl NodeResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(output: JsonValue) -> Self {
        Self {
            status: NodeStatus::Success,
            output,
            error: None,
            error_code: None,
            timestamp: Utc::now(),
            duration: 0,
            attempts: 0,
        }
    }

    /// Creates a failed result with a classified code.
    #[must_use]
    pub fn failure(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Error,
            output: JsonValue::Null,
            error: Some(message.into()),
            error_code: Some(code.into()),
            timestamp: Utc::now(),
            duration: 0,
            attempts: 0,
        }
    }

    /// Creates a result for a node that was not dispatched.
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Skipped,
            output: JsonValue::Null,
            error: Some(reason.into()),
            error_code: None,
            timestamp: Utc::now(),
            duration: 0,
            attempts: 0,
        }
    }

    /// Attaches an output, e.g. a response body kept for inspection on failure.
    #[must_use]
    pub fn with_output(mut self, output: JsonValue) -> Self {
        self.output = output;
        self
    }

    /// Returns true if the node succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == NodeStatus::Success
    }

    /// Returns true if the node failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == NodeStatus::Error
    }
}

/// Mutable, engine-owned state of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    /// Node ID to recorded result.
    pub results: BTreeMap<String, NodeResult>,
    /// Nodes scheduled for the current step.
    pub frontier: Vec<String>,
    /// Nodes dispatched so far.
    pub visited: BTreeSet<String>,
    /// Node IDs in the order their results were recorded.
    pub visit_order: Vec<String>,
    pub status: RunStatus,
}

impl ExecutionState {
    /// Creates an empty, pending state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a node visited. Returns false if it was already visited.
    pub fn mark_visited(&mut self, node_id: &str) -> bool {
        self.visited.insert(node_id.to_string())
    }

    /// Returns true if the node was already dispatched.
    #[must_use]
    pub fn is_visited(&self, node_id: &str) -> bool {
        self.visited.contains(node_id)
    }

    /// Records a node's result.
    pub fn record(&mut self, node_id: impl Into<String>, result: NodeResult) {
        let node_id = node_id.into();
        if !self.results.contains_key(&node_id) {
            self.visit_order.push(node_id.clone());
        }
        self.results.insert(node_id, result);
    }

    /// Returns a node's recorded result.
    #[must_use]
    pub fn result(&self, node_id: &str) -> Option<&NodeResult> {
        self.results.get(node_id)
    }

    /// Returns the recorded results as a JSON object keyed by node ID.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        let map: Map<String, JsonValue> = self
            .results
            .iter()
            .map(|(id, result)| {
                (
                    id.clone(),
                    serde_json::to_value(result).unwrap_or(JsonValue::Null),
                )
            })
            .collect();
        JsonValue::Object(map)
    }
}

/// Per-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    pub nodes_executed: u32,
    pub success_nodes: u32,
    pub failed_nodes: u32,
    pub skipped_nodes: u32,
    /// Nodes that needed more than one attempt.
    pub retried_nodes: u32,
    /// Extra attempts across all nodes.
    pub total_retries: u32,
    /// Sum of node durations, in milliseconds.
    pub total_duration_ms: u64,
}

impl ExecutionMetrics {
    /// Counts a recorded node result.
    pub fn observe(&mut self, result: &NodeResult) {
        match result.status {
            NodeStatus::Success => self.success_nodes += 1,
            NodeStatus::Error => self.failed_nodes += 1,
            NodeStatus::Skipped => {
                self.skipped_nodes += 1;
                return;
            }
        }
        self.nodes_executed += 1;
        if result.attempts > 1 {
            self.retried_nodes += 1;
            self.total_retries += result.attempts - 1;
        }
        self.total_duration_ms += result.duration;
    }
}

/// The persisted and returned artifact of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub workflow_id: String,
    pub tenant_id: String,
    pub triggered_by: TriggerKind,
    pub status: RunStatus,
    pub state: ExecutionState,
    pub metrics: ExecutionMetrics,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Milliseconds.
    pub duration: u64,
    /// Single human-readable summary when the run did not succeed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

/// What a trigger entry point hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    pub execution_id: ExecutionId,
    pub workflow_id: String,
    pub status: RunStatus,
    pub state: ExecutionState,
    pub metrics: ExecutionMetrics,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ExecutionRecord> for ExecutionResponse {
    fn from(record: ExecutionRecord) -> Self {
        Self {
            execution_id: record.id,
            workflow_id: record.workflow_id,
            status: record.status,
            state: record.state,
            metrics: record.metrics,
            start_time: record.start_time,
            end_time: record.end_time,
            duration: record.duration,
            error: record.error,
        }
    }
}
