//! Execution identifiers.
//!
//! Workflow and node ids are authored strings owned by the definition
//! store. Execution ids are minted here, using ULID so records sort by
//! start time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

const EXECUTION_PREFIX: &str = "exec";

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Unique identifier for a single workflow execution.
///
/// Displays as `exec_<ulid>`; parsing accepts the prefixed or the bare form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Ulid);

impl ExecutionId {
    /// Creates a new execution ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates an ID from a ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{EXECUTION_PREFIX}_{}", self.0)
    }
}

impl FromStr for ExecutionId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .strip_prefix(EXECUTION_PREFIX)
            .and_then(|rest| rest.strip_prefix('_'))
            .unwrap_or(s);

        Ulid::from_str(raw).map(Self).map_err(|e| ParseIdError {
            id_type: "ExecutionId",
            reason: e.to_string(),
        })
    }
}

impl From<Ulid> for ExecutionId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_exec_prefix() {
        let id = ExecutionId::new();
        assert!(id.to_string().starts_with("exec_"));
    }

    #[test]
    fn parse_with_and_without_prefix() {
        let id = ExecutionId::new();
        let parsed: ExecutionId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);

        let bare: ExecutionId = id.as_ulid().to_string().parse().expect("should parse");
        assert_eq!(id, bare);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = "exec_nope".parse::<ExecutionId>().unwrap_err();
        assert_eq!(err.id_type, "ExecutionId");
    }

    #[test]
    fn later_ids_sort_after_earlier_ones() {
        let first = ExecutionId::from_ulid(Ulid::from_parts(1_000, 1));
        let second = ExecutionId::from_ulid(Ulid::from_parts(2_000, 1));
        assert!(first < second);
    }

    #[test]
    fn serializes_as_bare_ulid() {
        let id = ExecutionId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.as_ulid()));
    }
}
