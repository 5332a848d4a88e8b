//! Workflow execution engine for nodeflow.
//!
//! This crate provides:
//! - The workflow model: nodes, edges, triggers and definitions
//! - Graph validation and entry-node discovery (petgraph)
//! - `{{placeholder}}` template resolution
//! - The node executor contract, the executor registry and plugin maps
//! - Retry settings and the pluggable retry policy
//! - The execution engine and its records
//! - Collaborator traits for definitions, records and secrets, plus the
//!   trigger entry point that wires them together

pub mod context;
pub mod definition;
pub mod edge;
pub mod engine;
pub mod error;
pub mod execution;
pub mod executor;
pub mod graph;
pub mod node;
pub mod registry;
pub mod retry;
pub mod service;
pub mod store;
pub mod template;
pub mod trigger;

pub use context::{RequestInfo, UserInfo, Variables, WorkflowContext};
pub use definition::Workflow;
pub use edge::{ERROR_LABEL, WorkflowEdge};
pub use engine::{EngineConfig, WorkflowEngine, WorkflowValidation};
pub use error::{EngineError, ErrorCode, GraphError, PluginError, StoreError, TemplateError};
pub use execution::{
    ExecutionMetrics, ExecutionRecord, ExecutionResponse, ExecutionState, NodeResult, NodeStatus,
    RunStatus,
};
pub use executor::{NodeExecutor, TemplateAccess, ValidationResult};
pub use graph::WorkflowGraph;
pub use node::{OnError, Position, WorkflowNode};
pub use registry::{ExecutorRegistry, PluginArgs, PluginFn, PluginMap};
pub use retry::{Backoff, BackoffRetryPolicy, NoRetryPolicy, RetryPolicy, RetrySettings};
pub use service::{TriggerRequest, TriggerService};
pub use store::{DefinitionStore, ExecutionRecordStore, InMemoryStore, SecretsProvider};
pub use template::Namespaces;
pub use trigger::{TriggerKind, WorkflowTrigger};
