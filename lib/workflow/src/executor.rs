//! The contract every node type implements.
//!
//! Executors are registered once at startup and shared by every run, so
//! they must be `Send + Sync` and keep per-run data out of `self`.
//!
//! Domain failures never escape `execute`: an executor classifies what
//! went wrong into a [`NodeResult`] with an [`ErrorCode`], and the engine
//! decides whether the run survives it.
//!
//! [`ErrorCode`]: crate::error::ErrorCode

use crate::context::WorkflowContext;
use crate::execution::{ExecutionState, NodeResult};
use crate::node::WorkflowNode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of static node validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// A passing result with no messages.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Records an error and marks the result invalid.
    pub fn error(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(message.into());
    }

    /// Records a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Records an error if `field` is missing or an empty string.
    pub fn require(&mut self, node: &WorkflowNode, field: &str) {
        let present = match node.parameter(field) {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        };
        if !present {
            self.error(format!("missing required parameter: {field}"));
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::ok()
    }
}

/// Which namespaces the engine exposes when resolving a node's parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateAccess {
    /// `context`, `state` and `json`.
    #[default]
    Run,
    /// Additionally the process environment as `env` and the injected
    /// secrets as `secrets`.
    Privileged,
}

/// A pluggable implementation of one node type.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Registry key.
    fn node_type(&self) -> &str;

    /// Performs one attempt. `node.parameters` are already resolved.
    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &WorkflowContext,
        state: &ExecutionState,
    ) -> NodeResult;

    /// Static, side-effect-free validation of a node's raw parameters.
    fn validate(&self, node: &WorkflowNode) -> ValidationResult;

    /// Whether outgoing edges are selected by branch label.
    fn is_branching(&self) -> bool {
        false
    }

    /// The branch label carried by a result, read from `output.branch`.
    fn branch_label(&self, _node: &WorkflowNode, result: &NodeResult) -> Option<String> {
        result
            .output
            .get("branch")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }

    /// Namespaces this executor needs for parameter resolution.
    fn template_access(&self) -> TemplateAccess {
        TemplateAccess::Run
    }

    /// Parameters the engine must pass through unresolved.
    fn raw_parameters(&self) -> &[&str] {
        &[]
    }
}
