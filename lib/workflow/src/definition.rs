//! Workflow definition types.
//!
//! A workflow is immutable for the lifetime of a run. It is owned by the
//! definition store and loaded read-only per execution.

use crate::edge::WorkflowEdge;
use crate::error::GraphError;
use crate::graph::WorkflowGraph;
use crate::node::WorkflowNode;
use crate::retry::RetrySettings;
use crate::trigger::WorkflowTrigger;
use serde::{Deserialize, Serialize};

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Declared triggers; enabled ones with a node id act as entry points.
    #[serde(default)]
    pub triggers: Vec<WorkflowTrigger>,
    /// Retry settings for nodes that do not declare their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetrySettings>,
    /// Owning tenant, when the store is multi-tenant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

impl Workflow {
    /// Creates an empty, enabled workflow.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            enabled: true,
            version: 1,
            triggers: Vec::new(),
            retry_policy: None,
            tenant_id: None,
        }
    }

    /// Adds a node.
    #[must_use]
    pub fn with_node(mut self, node: WorkflowNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds an edge.
    #[must_use]
    pub fn with_edge(mut self, edge: WorkflowEdge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Adds a trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: WorkflowTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Sets the workflow-level retry settings.
    #[must_use]
    pub fn with_retry(mut self, settings: RetrySettings) -> Self {
        self.retry_policy = Some(settings);
        self
    }

    /// Sets the owning tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Marks the workflow as disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Returns a node by ID.
    #[must_use]
    pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|node| node.id == node_id)
    }

    /// Builds the graph view of this workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if node IDs collide or an edge references a
    /// missing node.
    pub fn graph(&self) -> Result<WorkflowGraph<'_>, GraphError> {
        WorkflowGraph::build(self)
    }
}
