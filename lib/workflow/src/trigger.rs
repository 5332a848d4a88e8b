//! Trigger types for workflow initiation.
//!
//! A trigger records how and why a run started. It may point at a graph
//! node to use as the entry point, but does not have to.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// The kind of event that started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// User-initiated.
    #[default]
    Manual,
    /// Time-based.
    Schedule,
    /// Inbound HTTP webhook.
    Webhook,
    /// Application or integration event.
    Event,
    /// Any kind this build does not know about.
    #[serde(other)]
    Other,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Schedule => write!(f, "schedule"),
            Self::Webhook => write!(f, "webhook"),
            Self::Event => write!(f, "event"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Identifies how a run started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTrigger {
    /// Entry node for the run; empty means "use the graph's root nodes".
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub kind: TriggerKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
}

fn default_enabled() -> bool {
    true
}

impl WorkflowTrigger {
    /// Creates an enabled trigger of the given kind with no entry node.
    #[must_use]
    pub fn new(kind: TriggerKind) -> Self {
        Self {
            node_id: String::new(),
            kind,
            enabled: true,
            metadata: Map::new(),
        }
    }

    /// Creates a manual trigger with no entry node.
    #[must_use]
    pub fn manual() -> Self {
        Self::new(TriggerKind::Manual)
    }

    /// Sets the entry node.
    #[must_use]
    pub fn at_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns the entry node ID, if one is set.
    #[must_use]
    pub fn entry_node(&self) -> Option<&str> {
        (!self.node_id.is_empty()).then_some(self.node_id.as_str())
    }
}

impl Default for WorkflowTrigger {
    fn default() -> Self {
        Self::manual()
    }
}
