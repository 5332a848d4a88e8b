//! Error types for the workflow crate.
//!
//! Two families live here:
//! - [`ErrorCode`]: the taxonomy carried by failed [`NodeResult`]s and
//!   execution records. Executors never raise errors, they classify them.
//! - `GraphError`, `EngineError`, `StoreError`: rootcause contexts for the
//!   fallible engine and collaborator APIs.
//!
//! [`NodeResult`]: crate::execution::NodeResult

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Classified failure kind of a node or run.
///
/// Serializes as its taxonomy key (`"VALIDATION_ERROR"`, `"HTTP_503"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Malformed workflow or node parameters. Never retried.
    ValidationError,
    /// Referenced workflow, node or entity is missing.
    NotFound,
    /// Remote call returned a non-2xx status.
    Http(u16),
    /// An executor's operation exceeded its deadline.
    Timeout,
    /// Connection refused by the remote host.
    ConnectionRefused,
    /// Host name could not be resolved.
    DnsError,
    /// Generic mail delivery failure.
    EmailSendError,
    /// Generic HTTP transport failure.
    HttpError,
    /// Engine-level run deadline exceeded.
    ExecutionTimeout,
    /// The run was cancelled before the node settled.
    Cancelled,
    /// Executor failed without a more specific classification.
    ExecutionFailed,
    /// Data-access collaborator failure.
    DbalError,
    /// Executor-defined code.
    Custom(String),
}

impl ErrorCode {
    /// Returns true if the default classification considers this retryable.
    ///
    /// 5xx, 429 and 408 responses and transport-level failures qualify.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(status) => *status >= 500 || *status == 429 || *status == 408,
            Self::Timeout | Self::ConnectionRefused | Self::DnsError => true,
            _ => false,
        }
    }

    /// Parses a taxonomy key. Unknown keys become [`ErrorCode::Custom`].
    #[must_use]
    pub fn parse(key: &str) -> Self {
        match key {
            "VALIDATION_ERROR" => Self::ValidationError,
            "NOT_FOUND" => Self::NotFound,
            "TIMEOUT" => Self::Timeout,
            "CONNECTION_REFUSED" => Self::ConnectionRefused,
            "DNS_ERROR" => Self::DnsError,
            "EMAIL_SEND_ERROR" => Self::EmailSendError,
            "HTTP_ERROR" => Self::HttpError,
            "EXECUTION_TIMEOUT" => Self::ExecutionTimeout,
            "CANCELLED" => Self::Cancelled,
            "EXECUTION_FAILED" => Self::ExecutionFailed,
            "DBAL_ERROR" => Self::DbalError,
            other => match other.strip_prefix("HTTP_").map(str::parse::<u16>) {
                Some(Ok(status)) => Self::Http(status),
                _ => Self::Custom(other.to_string()),
            },
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationError => write!(f, "VALIDATION_ERROR"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Http(status) => write!(f, "HTTP_{status}"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::ConnectionRefused => write!(f, "CONNECTION_REFUSED"),
            Self::DnsError => write!(f, "DNS_ERROR"),
            Self::EmailSendError => write!(f, "EMAIL_SEND_ERROR"),
            Self::HttpError => write!(f, "HTTP_ERROR"),
            Self::ExecutionTimeout => write!(f, "EXECUTION_TIMEOUT"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::ExecutionFailed => write!(f, "EXECUTION_FAILED"),
            Self::DbalError => write!(f, "DBAL_ERROR"),
            Self::Custom(key) => write!(f, "{key}"),
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(key: &str) -> Self {
        Self::parse(key)
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        Ok(Self::parse(&key))
    }
}

/// Errors from building or validating a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Two nodes share the same ID.
    DuplicateNode { node_id: String },
    /// An edge references a source node that does not exist.
    UnknownEdgeSource { edge_id: String, node_id: String },
    /// An edge references a target node that does not exist.
    UnknownEdgeTarget { edge_id: String, node_id: String },
    /// A referenced node does not exist.
    NodeNotFound { node_id: String },
    /// The workflow has no nodes at all.
    EmptyWorkflow,
    /// Every node has an incoming edge, so no entry node can be chosen.
    NoEntryNode,
    /// Graph contains cycles.
    CycleDetected,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateNode { node_id } => write!(f, "duplicate node id: {node_id}"),
            Self::UnknownEdgeSource { edge_id, node_id } => {
                write!(f, "edge '{edge_id}' references unknown source node '{node_id}'")
            }
            Self::UnknownEdgeTarget { edge_id, node_id } => {
                write!(f, "edge '{edge_id}' references unknown target node '{node_id}'")
            }
            Self::NodeNotFound { node_id } => write!(f, "node not found: {node_id}"),
            Self::EmptyWorkflow => write!(f, "workflow has no nodes"),
            Self::NoEntryNode => write!(f, "workflow has no entry node"),
            Self::CycleDetected => write!(f, "graph contains cycles"),
        }
    }
}

impl std::error::Error for GraphError {}

impl GraphError {
    /// Returns the taxonomy code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NodeNotFound { .. } => ErrorCode::NotFound,
            _ => ErrorCode::ValidationError,
        }
    }
}

/// Errors that prevent a run from starting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The workflow failed validation.
    Validation {
        workflow_id: String,
        errors: Vec<String>,
    },
    /// Workflow not found in the definition store.
    WorkflowNotFound { workflow_id: String },
    /// The workflow is disabled.
    WorkflowDisabled { workflow_id: String },
    /// The trigger references a node that does not exist.
    EntryNodeNotFound { node_id: String },
    /// An execution with this ID is already running.
    AlreadyRunning { execution_id: String },
    /// No execution with this ID is running or recorded for the tenant.
    ExecutionNotFound { execution_id: String },
    /// Loading collaborator data failed (use as context wrapper).
    Collaborator { operation: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation {
                workflow_id,
                errors,
            } => write!(
                f,
                "workflow {workflow_id} failed validation: {}",
                errors.join("; ")
            ),
            Self::WorkflowNotFound { workflow_id } => {
                write!(f, "workflow not found: {workflow_id}")
            }
            Self::WorkflowDisabled { workflow_id } => {
                write!(f, "workflow {workflow_id} is disabled")
            }
            Self::EntryNodeNotFound { node_id } => {
                write!(f, "trigger references unknown node: {node_id}")
            }
            Self::AlreadyRunning { execution_id } => {
                write!(f, "execution {execution_id} is already running")
            }
            Self::ExecutionNotFound { execution_id } => {
                write!(f, "execution not found: {execution_id}")
            }
            Self::Collaborator { operation } => write!(f, "{operation} failed"),
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    /// Returns the taxonomy code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::WorkflowNotFound { .. }
            | Self::EntryNodeNotFound { .. }
            | Self::ExecutionNotFound { .. } => ErrorCode::NotFound,
            Self::Collaborator { .. } => ErrorCode::ExecutionFailed,
            _ => ErrorCode::ValidationError,
        }
    }
}

/// Errors from the persistence and secrets collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be read or written.
    Io { reason: String },
    /// A stored document could not be decoded.
    Decode { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { reason } => write!(f, "store i/o failed: {reason}"),
            Self::Decode { reason } => write!(f, "stored document is malformed: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from strict template resolution.
///
/// Messages name the unresolved path only, never resolved values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A placeholder path resolved to nothing.
    UnresolvedPath { path: String },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedPath { path } => write!(f, "unresolved template path: {path}"),
        }
    }
}

impl std::error::Error for TemplateError {}

/// Errors returned by plugin operator functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// An argument is missing or has the wrong shape.
    InvalidArgument { index: usize, reason: String },
    /// The operation itself failed.
    Failed { reason: String },
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { index, reason } => {
                write!(f, "invalid argument {index}: {reason}")
            }
            Self::Failed { reason } => write!(f, "operation failed: {reason}"),
        }
    }
}

impl std::error::Error for PluginError {}

impl PluginError {
    /// Returns the taxonomy code a plugin node reports for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument { .. } => ErrorCode::ValidationError,
            Self::Failed { .. } => ErrorCode::ExecutionFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_keys_roundtrip_through_parse() {
        for code in [
            ErrorCode::ValidationError,
            ErrorCode::NotFound,
            ErrorCode::Http(503),
            ErrorCode::Timeout,
            ErrorCode::ConnectionRefused,
            ErrorCode::DnsError,
            ErrorCode::EmailSendError,
            ErrorCode::HttpError,
            ErrorCode::ExecutionTimeout,
            ErrorCode::Cancelled,
        ] {
            assert_eq!(ErrorCode::parse(&code.to_string()), code);
        }
    }

    #[test]
    fn http_error_is_not_parsed_as_status() {
        assert_eq!(ErrorCode::parse("HTTP_ERROR"), ErrorCode::HttpError);
        assert_eq!(ErrorCode::parse("HTTP_404"), ErrorCode::Http(404));
    }

    #[test]
    fn unknown_keys_are_custom() {
        assert_eq!(
            ErrorCode::parse("RATE_LIMITED"),
            ErrorCode::Custom("RATE_LIMITED".to_string())
        );
    }

    #[test]
    fn retry_classification() {
        assert!(ErrorCode::Http(500).is_retryable());
        assert!(ErrorCode::Http(429).is_retryable());
        assert!(!ErrorCode::Http(404).is_retryable());
        assert!(ErrorCode::Timeout.is_retryable());
        assert!(ErrorCode::DnsError.is_retryable());
        assert!(!ErrorCode::ValidationError.is_retryable());
        assert!(!ErrorCode::ExecutionTimeout.is_retryable());
    }

    #[test]
    fn error_code_serializes_as_key() {
        let json = serde_json::to_string(&ErrorCode::Http(502)).expect("serialize");
        assert_eq!(json, "\"HTTP_502\"");
        let parsed: ErrorCode = serde_json::from_str("\"TIMEOUT\"").expect("deserialize");
        assert_eq!(parsed, ErrorCode::Timeout);
    }

    #[test]
    fn graph_error_display() {
        let err = GraphError::UnknownEdgeTarget {
            edge_id: "e1".to_string(),
            node_id: "ghost".to_string(),
        };
        assert!(err.to_string().contains("unknown target node 'ghost'"));
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn engine_error_codes() {
        let err = EngineError::WorkflowNotFound {
            workflow_id: "wf-1".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(err.to_string().contains("wf-1"));

        let err = EngineError::Validation {
            workflow_id: "wf-1".to_string(),
            errors: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(err.to_string().contains("a; b"));

        let err = EngineError::ExecutionNotFound {
            execution_id: "exec_1".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
