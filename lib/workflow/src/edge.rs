//! Edge types for workflow graphs.

use serde::{Deserialize, Serialize};

/// Label of the edges followed when a node fails under
/// [`OnError::ContinueErrorOutput`](crate::node::OnError::ContinueErrorOutput).
pub const ERROR_LABEL: &str = "error";

/// A directed connection between two nodes.
///
/// The optional `label` selects the edge when its source is a branching
/// node. Edges out of non-branching nodes fire on success, except those
/// labelled [`ERROR_LABEL`], which only fire on routed failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub id: String,
    /// Source node ID.
    pub source: String,
    /// Target node ID.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl WorkflowEdge {
    /// Creates an unlabeled edge.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            label: None,
        }
    }

    /// Sets the branch label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns true if this edge is selected by the given branch label.
    #[must_use]
    pub fn matches(&self, branch: &str) -> bool {
        self.label.as_deref() == Some(branch)
    }

    /// Returns true if this edge carries a node's failure output.
    #[must_use]
    pub fn is_error_output(&self) -> bool {
        self.matches(ERROR_LABEL)
    }
}
