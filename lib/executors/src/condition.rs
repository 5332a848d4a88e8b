//! The `condition` executor: the branching node type.

use crate::params;
use crate::value::{compare, is_empty, loose_eq, truthy};
use async_trait::async_trait;
use nodeflow_workflow::{
    ErrorCode, ExecutionState, NodeExecutor, NodeResult, ValidationResult, WorkflowContext,
    WorkflowNode,
};
use serde_json::{Value as JsonValue, json};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A binary (or unary) predicate over resolved values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "==" | "===" | "equals" => Self::Equals,
            "!=" | "!==" | "notEquals" => Self::NotEquals,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterOrEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessOrEqual,
            "contains" => Self::Contains,
            "startsWith" => Self::StartsWith,
            "endsWith" => Self::EndsWith,
            "isEmpty" => Self::IsEmpty,
            "isNotEmpty" => Self::IsNotEmpty,
            other => return Err(format!("unknown operator: {other}")),
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::GreaterThan => ">",
            Self::GreaterOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessOrEqual => "<=",
            Self::Contains => "contains",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::IsEmpty => "isEmpty",
            Self::IsNotEmpty => "isNotEmpty",
        };
        f.write_str(s)
    }
}

impl Operator {
    /// Applies the operator. Ordering operators are false for values that
    /// cannot be ordered.
    #[must_use]
    pub fn apply(self, left: &JsonValue, right: &JsonValue) -> bool {
        let ordered = |accept: fn(Ordering) -> bool| compare(left, right).is_some_and(accept);
        match self {
            Self::Equals => loose_eq(left, right),
            Self::NotEquals => !loose_eq(left, right),
            Self::GreaterThan => ordered(Ordering::is_gt),
            Self::GreaterOrEqual => ordered(Ordering::is_ge),
            Self::LessThan => ordered(Ordering::is_lt),
            Self::LessOrEqual => ordered(Ordering::is_le),
            Self::Contains => match left {
                JsonValue::String(s) => s.contains(&crate::value::as_text(right)),
                JsonValue::Array(items) => items.iter().any(|item| loose_eq(item, right)),
                JsonValue::Object(map) => right.as_str().is_some_and(|key| map.contains_key(key)),
                _ => false,
            },
            Self::StartsWith => left
                .as_str()
                .is_some_and(|s| s.starts_with(&crate::value::as_text(right))),
            Self::EndsWith => left
                .as_str()
                .is_some_and(|s| s.ends_with(&crate::value::as_text(right))),
            Self::IsEmpty => is_empty(left),
            Self::IsNotEmpty => !is_empty(left),
        }
    }
}

/// Evaluates a predicate and labels its outcome for edge selection.
///
/// Either `condition` (truthiness) or `left`/`operator`/`right`. The output
/// is `{result, branch}`, with `branch` defaulting to `"true"`/`"false"`
/// unless `trueLabel`/`falseLabel` rename it.
#[derive(Debug, Default)]
pub struct ConditionExecutor;

impl ConditionExecutor {
    fn evaluate(node: &WorkflowNode) -> Result<bool, String> {
        if let Some(operator) = node.parameter("operator") {
            let operator: Operator = operator
                .as_str()
                .ok_or("operator must be a string")?
                .parse()?;
            let left = node.parameter("left").unwrap_or(&JsonValue::Null);
            let right = node.parameter("right").unwrap_or(&JsonValue::Null);
            return Ok(operator.apply(left, right));
        }
        match node.parameter("condition") {
            Some(condition) => Ok(truthy(condition)),
            None => Err("missing condition or operator".to_string()),
        }
    }

    fn label<'a>(node: &'a WorkflowNode, key: &str, default: &'a str) -> &'a str {
        node.str_parameter(key)
            .filter(|s| !s.is_empty())
            .unwrap_or(default)
    }
}

#[async_trait]
impl NodeExecutor for ConditionExecutor {
    fn node_type(&self) -> &str {
        "condition"
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        _context: &WorkflowContext,
        _state: &ExecutionState,
    ) -> NodeResult {
        match Self::evaluate(node) {
            Ok(result) => {
                let branch = if result {
                    Self::label(node, "trueLabel", "true")
                } else {
                    Self::label(node, "falseLabel", "false")
                };
                NodeResult::success(json!({ "result": result, "branch": branch }))
            }
            Err(reason) => NodeResult::failure(ErrorCode::ValidationError, reason),
        }
    }

    fn validate(&self, node: &WorkflowNode) -> ValidationResult {
        let mut result = ValidationResult::ok();
        match node.parameter("operator") {
            Some(JsonValue::String(op)) => {
                if !params::is_templated(node, "operator") {
                    if let Err(reason) = op.parse::<Operator>() {
                        result.error(reason);
                    }
                }
                if node.parameter("left").is_none() {
                    result.error("missing required parameter: left");
                }
            }
            Some(_) => result.error("operator must be a string"),
            None => {
                if node.parameter("condition").is_none() {
                    result.error("missing required parameter: condition");
                }
            }
        }
        result
    }

    fn is_branching(&self) -> bool {
        true
    }
}
