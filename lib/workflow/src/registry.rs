//! Node type to executor mapping.
//!
//! The registry is built once during startup and then handed to the engine
//! behind an `Arc`; nothing can register executors after that point.
//!
//! Besides hand-written executors it accepts [`PluginMap`]s: named pure
//! functions that are each wrapped in a small adapter executor keyed
//! `<category>.<name>`.

use crate::context::{Variables, WorkflowContext};
use crate::error::PluginError;
use crate::execution::{ExecutionState, NodeResult};
use crate::executor::{NodeExecutor, ValidationResult};
use crate::node::WorkflowNode;
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Positional arguments handed to a plugin function.
#[derive(Debug, Clone, Copy)]
pub struct PluginArgs<'a> {
    args: &'a [JsonValue],
    variables: &'a Variables,
}

impl<'a> PluginArgs<'a> {
    /// Wraps an argument list.
    #[must_use]
    pub fn new(args: &'a [JsonValue], variables: &'a Variables) -> Self {
        Self { args, variables }
    }

    /// All arguments.
    #[must_use]
    pub fn all(&self) -> &'a [JsonValue] {
        self.args
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// The run's variables, for operators that read or write them.
    #[must_use]
    pub fn variables(&self) -> &'a Variables {
        self.variables
    }

    /// Returns an argument, or `None` if absent.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'a JsonValue> {
        self.args.get(index)
    }

    /// Returns a required argument.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidArgument`] if the argument is absent.
    pub fn value(&self, index: usize) -> Result<&'a JsonValue, PluginError> {
        self.args.get(index).ok_or_else(|| invalid(index, "missing"))
    }

    /// Returns a required string argument.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidArgument`] if absent or not a string.
    pub fn str(&self, index: usize) -> Result<&'a str, PluginError> {
        self.value(index)?
            .as_str()
            .ok_or_else(|| invalid(index, "expected a string"))
    }

    /// Returns a required numeric argument. Numeric strings are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidArgument`] if absent or not numeric.
    pub fn number(&self, index: usize) -> Result<f64, PluginError> {
        let value = self.value(index)?;
        value
            .as_f64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| invalid(index, "expected a number"))
    }

    /// Returns a required array argument.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidArgument`] if absent or not an array.
    pub fn array(&self, index: usize) -> Result<&'a Vec<JsonValue>, PluginError> {
        self.value(index)?
            .as_array()
            .ok_or_else(|| invalid(index, "expected an array"))
    }

    /// Returns a required object argument.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidArgument`] if absent or not an object.
    pub fn object(&self, index: usize) -> Result<&'a Map<String, JsonValue>, PluginError> {
        self.value(index)?
            .as_object()
            .ok_or_else(|| invalid(index, "expected an object"))
    }
}

fn invalid(index: usize, reason: &str) -> PluginError {
    PluginError::InvalidArgument {
        index,
        reason: reason.to_string(),
    }
}

/// A plugin operator.
pub type PluginFn = Arc<dyn Fn(PluginArgs<'_>) -> Result<JsonValue, PluginError> + Send + Sync>;

/// A category of named plugin operators.
#[derive(Clone)]
pub struct PluginMap {
    category: String,
    functions: BTreeMap<String, PluginFn>,
}

impl PluginMap {
    /// Creates an empty map for a category.
    #[must_use]
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            functions: BTreeMap::new(),
        }
    }

    /// Adds an operator.
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(PluginArgs<'_>) -> Result<JsonValue, PluginError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Looks up one operator.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&PluginFn> {
        self.functions.get(name)
    }

    /// Operator names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl std::fmt::Debug for PluginMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginMap")
            .field("category", &self.category)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Adapts one plugin function to the executor contract.
struct PluginExecutor {
    node_type: String,
    function: PluginFn,
}

impl PluginExecutor {
    fn args(node: &WorkflowNode) -> Vec<JsonValue> {
        match node.parameter("args") {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Array(items)) => items.clone(),
            Some(single) => vec![single.clone()],
        }
    }
}

#[async_trait]
impl NodeExecutor for PluginExecutor {
    fn node_type(&self) -> &str {
        &self.node_type
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &WorkflowContext,
        _state: &ExecutionState,
    ) -> NodeResult {
        let args = Self::args(node);
        match (self.function)(PluginArgs::new(&args, &context.variables)) {
            Ok(output) => NodeResult::success(output),
            Err(err) => NodeResult::failure(err.code(), err.to_string()),
        }
    }

    fn validate(&self, node: &WorkflowNode) -> ValidationResult {
        let mut result = ValidationResult::ok();
        if node.parameter("args").is_none() {
            result.warn(format!("{} called without args", self.node_type));
        }
        result
    }
}

/// Maps node type names to executors.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an executor under its own node type.
    ///
    /// Returns the executor it replaced, if any.
    pub fn register(&mut self, executor: Arc<dyn NodeExecutor>) -> Option<Arc<dyn NodeExecutor>> {
        let node_type = executor.node_type().to_string();
        debug!(node_type = %node_type, "registering executor");
        self.executors.insert(node_type, executor)
    }

    /// Registers an executor, builder-style.
    #[must_use]
    pub fn with(mut self, executor: Arc<dyn NodeExecutor>) -> Self {
        self.register(executor);
        self
    }

    /// Registers every operator of a plugin map as `<category>.<name>`.
    pub fn register_plugins(&mut self, plugins: PluginMap) {
        debug!(category = %plugins.category, count = plugins.len(), "registering plugin map");
        for (name, function) in plugins.functions {
            let node_type = format!("{}.{name}", plugins.category);
            self.executors.insert(
                node_type.clone(),
                Arc::new(PluginExecutor {
                    node_type,
                    function,
                }),
            );
        }
    }

    /// Returns the executor for a node type.
    #[must_use]
    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(node_type).cloned()
    }

    #[must_use]
    pub fn contains(&self, node_type: &str) -> bool {
        self.executors.contains_key(node_type)
    }

    /// All registered node types, sorted.
    #[must_use]
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<_> = self.executors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("node_types", &self.node_types())
            .finish()
    }
}
