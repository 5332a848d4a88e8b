//! Error types for the executor collaborators.
//!
//! Transports report failures as these enums. Executors translate them
//! into [`ErrorCode`]s on the node result; they never cross the engine.

use nodeflow_workflow::ErrorCode;
use std::fmt;

/// Errors from a [`MailTransport`](crate::email::MailTransport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    /// The transport refused the message.
    Rejected { reason: String },
    /// The transport could not be reached.
    Unavailable { reason: String },
}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { reason } => write!(f, "message rejected: {reason}"),
            Self::Unavailable { reason } => write!(f, "mail transport unavailable: {reason}"),
        }
    }
}

impl std::error::Error for MailError {}

/// Errors from a [`DataAccess`](crate::dbal::DataAccess) backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataAccessError {
    /// The entity record does not exist.
    NotFound { entity: String, id: String },
    /// A record with this ID already exists.
    Conflict { entity: String, id: String },
    /// The request was malformed.
    Invalid { reason: String },
    /// The backend failed.
    Backend { reason: String },
}

impl fmt::Display for DataAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Conflict { entity, id } => write!(f, "{entity} already exists: {id}"),
            Self::Invalid { reason } => write!(f, "invalid data request: {reason}"),
            Self::Backend { reason } => write!(f, "data access failed: {reason}"),
        }
    }
}

impl std::error::Error for DataAccessError {}

impl DataAccessError {
    /// Returns the taxonomy code a DBAL node reports for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Invalid { .. } => ErrorCode::ValidationError,
            Self::Conflict { .. } | Self::Backend { .. } => ErrorCode::DbalError,
        }
    }
}

/// Errors from a [`WebhookResponder`](crate::webhook::WebhookResponder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    /// No caller is waiting on this execution any more.
    NoPendingRequest { execution_id: String },
    /// A response was already delivered for this execution.
    AlreadyResponded { execution_id: String },
}

impl fmt::Display for WebhookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPendingRequest { execution_id } => {
                write!(f, "no pending webhook request for {execution_id}")
            }
            Self::AlreadyResponded { execution_id } => {
                write!(f, "webhook response already sent for {execution_id}")
            }
        }
    }
}

impl std::error::Error for WebhookError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_access_codes() {
        let not_found = DataAccessError::NotFound {
            entity: "User".to_string(),
            id: "7".to_string(),
        };
        assert_eq!(not_found.code(), ErrorCode::NotFound);
        assert_eq!(not_found.to_string(), "User not found: 7");

        let invalid = DataAccessError::Invalid {
            reason: "id is required".to_string(),
        };
        assert_eq!(invalid.code(), ErrorCode::ValidationError);

        let conflict = DataAccessError::Conflict {
            entity: "User".to_string(),
            id: "7".to_string(),
        };
        assert_eq!(conflict.code(), ErrorCode::DbalError);
    }

    #[test]
    fn mail_error_display() {
        let err = MailError::Unavailable {
            reason: "smtp down".to_string(),
        };
        assert!(err.to_string().contains("smtp down"));
    }
}
