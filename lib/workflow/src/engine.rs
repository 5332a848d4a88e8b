//! Workflow execution engine.
//!
//! The engine walks a workflow's graph in steps. Every step takes the
//! current frontier, dispatches each node to its executor on its own task,
//! waits for the whole frontier to settle, records the results, and
//! resolves the outgoing edges of every settled node. A node joins the
//! next frontier only once all of its predecessors that can still run have
//! settled or been pruned, so a join sees the output of every ancestor.
//!
//! What happens after a failure is the node's [`OnError`] policy. The
//! default fails the run and ends the branch, while sibling branches keep
//! going. Cancellation and the run deadline both stop dispatching; tasks
//! already in flight are detached, not aborted.

use crate::context::WorkflowContext;
use crate::definition::Workflow;
use crate::edge::WorkflowEdge;
use crate::error::{EngineError, ErrorCode, GraphError};
use crate::execution::{
    ExecutionMetrics, ExecutionRecord, ExecutionState, NodeResult, RunStatus,
};
use crate::executor::{NodeExecutor, TemplateAccess, ValidationResult};
use crate::graph::WorkflowGraph;
use crate::node::{OnError, WorkflowNode};
use crate::registry::ExecutorRegistry;
use crate::retry::{BackoffRetryPolicy, RetryPolicy, RetrySettings};
use crate::store::ExecutionRecordStore;
use crate::template::{self, Namespaces};
use crate::trigger::WorkflowTrigger;
use chrono::Utc;
use nodeflow_core::{ExecutionId, Secrets};
use rootcause::prelude::Report;
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, instrument, warn};

/// Result of validating a whole workflow.
pub type WorkflowValidation = ValidationResult;

/// Engine-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Overall deadline per run. `None` means unbounded.
    pub run_timeout: Option<Duration>,
}

struct RunHandle {
    tenant_id: String,
    cancel: CancellationToken,
    reason: Option<String>,
}

type RunningRuns = Arc<Mutex<HashMap<ExecutionId, RunHandle>>>;

/// Removes a run from the running set when the run ends, however it ends.
struct RunGuard {
    running: RunningRuns,
    execution_id: ExecutionId,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.execution_id);
    }
}

/// Why a run stopped before its frontier emptied.
struct Halt {
    code: ErrorCode,
    message: String,
}

/// Everything a node task needs, owned so it can cross `tokio::spawn`.
struct Dispatch {
    executor: Arc<dyn NodeExecutor>,
    node: WorkflowNode,
    /// Tried once after the retries are spent, with its own parameters.
    fallback: Option<(Arc<dyn NodeExecutor>, WorkflowNode)>,
    context: Arc<WorkflowContext>,
    state: Arc<ExecutionState>,
    retry: RetrySettings,
    policy: Arc<dyn RetryPolicy>,
    cancel: CancellationToken,
}

/// Executes workflows against a fixed executor registry.
pub struct WorkflowEngine {
    registry: Arc<ExecutorRegistry>,
    config: EngineConfig,
    retry_policy: Arc<dyn RetryPolicy>,
    record_store: Option<Arc<dyn ExecutionRecordStore>>,
    running: RunningRuns,
}

impl WorkflowEngine {
    /// Creates an engine with default configuration and backoff retries.
    #[must_use]
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            registry,
            config: EngineConfig::default(),
            retry_policy: Arc::new(BackoffRetryPolicy),
            record_store: None,
            running: Arc::default(),
        }
    }

    /// Sets the engine configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Hands every finished record to a store.
    #[must_use]
    pub fn with_record_store(mut self, store: Arc<dyn ExecutionRecordStore>) -> Self {
        self.record_store = Some(store);
        self
    }

    /// Returns the executor registry.
    #[must_use]
    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    /// Validates a workflow without running it.
    ///
    /// Checks graph structure, cycles, entry nodes, that every enabled node
    /// has a registered executor, and each executor's own validation.
    #[must_use]
    pub fn validate_workflow(&self, workflow: &Workflow) -> WorkflowValidation {
        let mut validation = ValidationResult::ok();

        let graph = match workflow.graph() {
            Ok(graph) => graph,
            Err(err) => {
                validation.error(err.to_string());
                return validation;
            }
        };
        if let Err(err) = graph.validate() {
            validation.error(err.to_string());
        }
        if graph.node_count() > 0 {
            if let Err(err) = graph.entry_nodes(&WorkflowTrigger::manual(), &workflow.triggers) {
                validation.error(err.to_string());
            }
        }

        for node in workflow.nodes.iter().filter(|n| !n.disabled) {
            let Some(executor) = self.registry.get(&node.node_type) else {
                validation.error(format!(
                    "node '{}': unknown node type '{}'",
                    node.id, node.node_type
                ));
                continue;
            };
            let result = executor.validate(node);
            for error in result.errors {
                validation.error(format!("node '{}': {error}", node.id));
            }
            for warning in result.warnings {
                validation.warn(format!("node '{}': {warning}", node.id));
            }
            if let Some(fallback) = &node.fallback_node_type {
                if !self.registry.contains(fallback) {
                    validation.error(format!(
                        "node '{}': unknown fallback node type '{fallback}'",
                        node.id
                    ));
                }
            }
            if node.error_policy() == OnError::ContinueErrorOutput
                && !graph.outgoing(&node.id).iter().any(|e| e.is_error_output())
            {
                validation.warn(format!(
                    "node '{}': routes failures to error edges but has none",
                    node.id
                ));
            }
        }

        validation
    }

    /// Runs a workflow to completion.
    ///
    /// Node failures, cancellation and the run deadline all produce an
    /// `Ok` record with status `error`.
    ///
    /// # Errors
    ///
    /// Returns an error, without executing anything, if the workflow is
    /// disabled or invalid, the trigger names a missing node, or the
    /// execution ID is already running.
    #[instrument(skip_all, fields(
        execution_id = %context.execution_id,
        workflow_id = %workflow.id,
        tenant_id = %context.tenant_id,
    ))]
    pub async fn execute_workflow(
        &self,
        workflow: &Workflow,
        context: WorkflowContext,
    ) -> Result<ExecutionRecord, Report<EngineError>> {
        if !workflow.enabled {
            return Err(EngineError::WorkflowDisabled {
                workflow_id: workflow.id.clone(),
            }
            .into());
        }

        let validation = self.validate_workflow(workflow);
        if !validation.valid {
            warn!(errors = ?validation.errors, "workflow failed validation");
            return Err(EngineError::Validation {
                workflow_id: workflow.id.clone(),
                errors: validation.errors,
            }
            .into());
        }

        let graph = workflow.graph().map_err(|err| EngineError::Validation {
            workflow_id: workflow.id.clone(),
            errors: vec![err.to_string()],
        })?;
        let entries: Vec<String> = graph
            .entry_nodes(&context.trigger, &workflow.triggers)
            .map_err(|err| match err {
                GraphError::NodeNotFound { node_id } => EngineError::EntryNodeNotFound { node_id },
                other => EngineError::Validation {
                    workflow_id: workflow.id.clone(),
                    errors: vec![other.to_string()],
                },
            })?
            .into_iter()
            .map(|node| node.id.clone())
            .collect();

        let (_guard, cancel) = self.register_run(context.execution_id, &context.tenant_id)?;

        info!(entries = ?entries, "workflow execution started");
        let record = self.run(workflow, &graph, entries, context, cancel).await;
        info!(
            status = ?record.status,
            duration_ms = record.duration,
            nodes_executed = record.metrics.nodes_executed,
            "workflow execution finished"
        );

        if let Some(store) = &self.record_store {
            if let Err(err) = store.save(&record).await {
                warn!(error = %err, "failed to persist execution record");
            }
        }

        Ok(record)
    }

    /// Requests cancellation of a running execution.
    ///
    /// Returns false if no run with this ID is in progress.
    pub fn cancel(&self, execution_id: &ExecutionId, reason: impl Into<String>) -> bool {
        self.cancel_where(execution_id, reason.into(), |_| true)
    }

    /// Requests cancellation of a running execution owned by a tenant.
    ///
    /// Returns false if no run with this ID is in progress for the tenant.
    pub fn cancel_for_tenant(
        &self,
        execution_id: &ExecutionId,
        tenant_id: &str,
        reason: impl Into<String>,
    ) -> bool {
        self.cancel_where(execution_id, reason.into(), |handle| {
            handle.tenant_id == tenant_id
        })
    }

    /// Returns true if a run with this ID is in progress.
    #[must_use]
    pub fn is_running(&self, execution_id: &ExecutionId) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(execution_id)
    }

    /// Returns true if a run with this ID is in progress for the tenant.
    #[must_use]
    pub fn is_running_for(&self, execution_id: &ExecutionId, tenant_id: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(execution_id)
            .is_some_and(|handle| handle.tenant_id == tenant_id)
    }

    fn cancel_where(
        &self,
        execution_id: &ExecutionId,
        reason: String,
        owned: impl Fn(&RunHandle) -> bool,
    ) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(handle) = running.get_mut(execution_id).filter(|handle| owned(handle)) else {
            return false;
        };
        warn!(execution_id = %execution_id, reason = %reason, "cancelling execution");
        handle.reason.get_or_insert(reason);
        handle.cancel.cancel();
        true
    }

    fn register_run(
        &self,
        execution_id: ExecutionId,
        tenant_id: &str,
    ) -> Result<(RunGuard, CancellationToken), Report<EngineError>> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.contains_key(&execution_id) {
            return Err(EngineError::AlreadyRunning {
                execution_id: execution_id.to_string(),
            }
            .into());
        }
        let cancel = CancellationToken::new();
        running.insert(
            execution_id,
            RunHandle {
                tenant_id: tenant_id.to_string(),
                cancel: cancel.clone(),
                reason: None,
            },
        );
        Ok((
            RunGuard {
                running: Arc::clone(&self.running),
                execution_id,
            },
            cancel,
        ))
    }

    fn cancel_reason(&self, execution_id: &ExecutionId) -> String {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(execution_id)
            .and_then(|handle| handle.reason.clone())
            .unwrap_or_else(|| "cancelled".to_string())
    }

    async fn run(
        &self,
        workflow: &Workflow,
        graph: &WorkflowGraph<'_>,
        entries: Vec<String>,
        context: WorkflowContext,
        cancel: CancellationToken,
    ) -> ExecutionRecord {
        let start_time = Utc::now();
        let started = Instant::now();
        let deadline = self.config.run_timeout.map(|timeout| started + timeout);
        let secrets = context.secrets.clone();
        let context = Arc::new(context);

        let mut state = ExecutionState::new();
        let mut metrics = ExecutionMetrics::default();
        let mut readiness = Readiness::new(graph, &entries);
        let mut failures: Vec<(String, NodeResult)> = Vec::new();
        let mut halt: Option<Halt> = None;

        state.status = RunStatus::Running;
        state.frontier = entries;

        while !state.frontier.is_empty() {
            if cancel.is_cancelled() {
                halt = Some(self.cancelled_halt(&context.execution_id));
            } else if deadline.is_some_and(|d| Instant::now() >= d) {
                halt = Some(self.deadline_halt());
            }
            if let Some(halt) = &halt {
                for node_id in std::mem::take(&mut state.frontier) {
                    let result = NodeResult::failure(halt.code.clone(), halt.message.clone());
                    metrics.observe(&result);
                    state.record(node_id, result);
                }
                break;
            }

            let frontier = std::mem::take(&mut state.frontier);
            debug!(frontier = ?frontier, "dispatching frontier");

            let snapshot = Arc::new(state.clone());
            let mut next: Vec<String> = Vec::new();
            let mut settled: Vec<(String, NodeResult)> = Vec::new();
            let mut blocked: HashSet<String> = HashSet::new();
            let mut in_flight: Vec<(String, JoinHandle<NodeResult>)> = Vec::new();

            for node_id in frontier {
                if !state.mark_visited(&node_id) {
                    debug!(node_id = %node_id, "node already dispatched");
                    continue;
                }
                let Some(node) = graph.node(&node_id) else {
                    settled.push((
                        node_id.clone(),
                        NodeResult::failure(
                            ErrorCode::NotFound,
                            format!("node not found: {node_id}"),
                        ),
                    ));
                    continue;
                };
                if node.disabled {
                    debug!(node_id = %node_id, "skipping disabled node");
                    settled.push((node_id, NodeResult::skipped("node is disabled")));
                    continue;
                }
                if node.skip_on_fail && predecessor_failed(graph, &state, &node_id) {
                    debug!(node_id = %node_id, "skipping node after upstream failure");
                    blocked.insert(node_id.clone());
                    settled.push((node_id, NodeResult::skipped("an upstream node failed")));
                    continue;
                }
                let Some(executor) = self.registry.get(&node.node_type) else {
                    settled.push((
                        node_id,
                        NodeResult::failure(
                            ErrorCode::ValidationError,
                            format!("unknown node type: {}", node.node_type),
                        ),
                    ));
                    continue;
                };
                let fallback = node
                    .fallback_node_type
                    .as_deref()
                    .and_then(|node_type| self.registry.get(node_type))
                    .map(|fallback| {
                        let resolved =
                            resolve_parameters(node, fallback.as_ref(), &context, &snapshot);
                        (fallback, resolved)
                    });

                let dispatch = Dispatch {
                    node: resolve_parameters(node, executor.as_ref(), &context, &snapshot),
                    fallback,
                    retry: node
                        .retry_policy
                        .clone()
                        .or_else(|| workflow.retry_policy.clone())
                        .unwrap_or_default(),
                    executor,
                    context: Arc::clone(&context),
                    state: Arc::clone(&snapshot),
                    policy: Arc::clone(&self.retry_policy),
                    cancel: cancel.clone(),
                };
                let handle = tokio::spawn(run_node(dispatch).in_current_span());
                in_flight.push((node_id, handle));
            }

            let (ids, handles): (Vec<_>, Vec<_>) = in_flight.into_iter().unzip();
            tokio::select! {
                results = futures::future::join_all(handles) => {
                    for (node_id, joined) in ids.into_iter().zip(results) {
                        let result = joined.unwrap_or_else(|err| {
                            warn!(node_id = %node_id, error = %err, "node task failed to complete");
                            NodeResult::failure(
                                ErrorCode::ExecutionFailed,
                                "executor task panicked",
                            )
                        });
                        settled.push((node_id, result));
                    }
                }
                () = cancel.cancelled() => {
                    let stop = self.cancelled_halt(&context.execution_id);
                    for node_id in ids {
                        let result = NodeResult::failure(stop.code.clone(), stop.message.clone());
                        settled.push((node_id, result));
                    }
                    halt = Some(stop);
                }
                () = sleep_until(deadline) => {
                    let stop = self.deadline_halt();
                    for node_id in ids {
                        let result = NodeResult::failure(stop.code.clone(), stop.message.clone());
                        settled.push((node_id, result));
                    }
                    halt = Some(stop);
                }
            }

            for (node_id, mut result) in settled {
                if !secrets.is_empty() {
                    redact_result(&mut result, &secrets);
                }
                metrics.observe(&result);

                let node = graph.node(&node_id);
                if result.is_error() {
                    let code = result.error_code.clone().unwrap_or(ErrorCode::ExecutionFailed);
                    let policy = node.map_or(OnError::StopWorkflow, WorkflowNode::error_policy);
                    if policy.fails_run() {
                        warn!(node_id = %node_id, code = %code, "node failed, stopping branch");
                        failures.push((node_id.clone(), result.clone()));
                    } else {
                        warn!(
                            node_id = %node_id,
                            code = %code,
                            policy = ?policy,
                            "node failed, continuing"
                        );
                    }
                }

                if halt.is_none() {
                    let fired = match node {
                        Some(node) if !blocked.contains(&node_id) => {
                            self.select_targets(graph, node, &result)
                        }
                        _ => Vec::new(),
                    };
                    for target in readiness.settle(graph, &node_id, &fired) {
                        if !state.is_visited(&target) && !next.contains(&target) {
                            next.push(target);
                        }
                    }
                }
                state.record(node_id, result);
            }

            if halt.is_some() {
                break;
            }
            state.frontier = next;
        }

        let end_time = Utc::now();
        let duration = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (error, error_code) = match (&halt, failures.first()) {
            (Some(halt), _) => (Some(halt.message.clone()), Some(halt.code.clone())),
            (None, Some((node_id, result))) => {
                let mut message = format!(
                    "node '{node_id}' failed: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                );
                if failures.len() > 1 {
                    message.push_str(&format!(" (and {} more failed nodes)", failures.len() - 1));
                }
                (Some(message), result.error_code.clone())
            }
            (None, None) => (None, None),
        };
        state.status = if error.is_some() {
            RunStatus::Error
        } else {
            RunStatus::Success
        };

        ExecutionRecord {
            id: context.execution_id,
            workflow_id: workflow.id.clone(),
            tenant_id: context.tenant_id.clone(),
            triggered_by: context.trigger.kind,
            status: state.status,
            state,
            metrics,
            start_time,
            end_time,
            duration,
            error,
            error_code,
        }
    }

    /// Picks the targets reached from a settled node.
    ///
    /// Successful and skipped nodes fire their regular edges. A failed node
    /// fires what its error policy allows.
    fn select_targets(
        &self,
        graph: &WorkflowGraph<'_>,
        node: &WorkflowNode,
        result: &NodeResult,
    ) -> Vec<String> {
        let edges = graph.outgoing(&node.id);
        let selected: Vec<String> = if result.is_error() {
            match node.error_policy() {
                OnError::ContinueErrorOutput => edges
                    .iter()
                    .filter(|edge| edge.is_error_output())
                    .map(|edge| edge.target.clone())
                    .collect(),
                OnError::ContinueRegularOutput => self.regular_targets(node, &edges, result),
                OnError::StopWorkflow | OnError::SkipNode => Vec::new(),
            }
        } else {
            self.regular_targets(node, &edges, result)
        };
        debug!(node_id = %node.id, targets = ?selected, "selected outgoing edges");
        selected
    }

    fn regular_targets(
        &self,
        node: &WorkflowNode,
        edges: &[&WorkflowEdge],
        result: &NodeResult,
    ) -> Vec<String> {
        let branching = if node.disabled {
            None
        } else {
            self.registry
                .get(&node.node_type)
                .filter(|executor| executor.is_branching())
                .map(|executor| executor.branch_label(node, result))
        };

        match branching {
            Some(Some(label)) => edges
                .iter()
                .filter(|edge| edge.matches(&label))
                .map(|edge| edge.target.clone())
                .collect(),
            Some(None) => Vec::new(),
            None => edges
                .iter()
                .filter(|edge| !edge.is_error_output())
                .map(|edge| edge.target.clone())
                .collect(),
        }
    }

    fn cancelled_halt(&self, execution_id: &ExecutionId) -> Halt {
        let reason = self.cancel_reason(execution_id);
        warn!(reason = %reason, "execution cancelled");
        Halt {
            code: ErrorCode::Cancelled,
            message: format!("execution cancelled: {reason}"),
        }
    }

    fn deadline_halt(&self) -> Halt {
        let timeout = self.config.run_timeout.unwrap_or_default();
        warn!(timeout_ms = timeout.as_millis(), "execution deadline exceeded");
        Halt {
            code: ErrorCode::ExecutionTimeout,
            message: format!("execution exceeded its deadline of {}ms", timeout.as_millis()),
        }
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("record_store", &self.record_store.is_some())
            .finish_non_exhaustive()
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Decides when a node may join the frontier.
///
/// A node is ready once every incoming edge from a node reachable in this
/// run has resolved and at least one of them fired. A node whose edges all
/// resolved without firing is pruned, which resolves its own outgoing
/// edges in turn.
struct Readiness {
    /// Unresolved incoming edges per node.
    pending: HashMap<String, usize>,
    /// Nodes reached by at least one fired edge.
    activated: HashSet<String>,
    /// Nodes already dispatched or pruned, entries included.
    scheduled: HashSet<String>,
}

impl Readiness {
    fn new(graph: &WorkflowGraph<'_>, entries: &[String]) -> Self {
        let mut pending: HashMap<String, usize> = HashMap::new();
        for node_id in graph.reachable_from(entries) {
            for edge in graph.outgoing(node_id) {
                *pending.entry(edge.target.clone()).or_default() += 1;
            }
        }
        Self {
            pending,
            activated: HashSet::new(),
            scheduled: entries.iter().cloned().collect(),
        }
    }

    /// Resolves the outgoing edges of a settled node. Returns the nodes
    /// that became ready.
    fn settle(
        &mut self,
        graph: &WorkflowGraph<'_>,
        node_id: &str,
        fired: &[String],
    ) -> Vec<String> {
        self.activated.extend(fired.iter().cloned());

        let mut ready = Vec::new();
        let mut resolving = vec![node_id.to_string()];
        while let Some(source) = resolving.pop() {
            for edge in graph.outgoing(&source) {
                let Some(remaining) = self.pending.get_mut(&edge.target) else {
                    continue;
                };
                *remaining = remaining.saturating_sub(1);
                if *remaining > 0 || !self.scheduled.insert(edge.target.clone()) {
                    continue;
                }
                if self.activated.contains(&edge.target) {
                    ready.push(edge.target.clone());
                } else {
                    debug!(node_id = %edge.target, "no incoming edge fired, pruning node");
                    resolving.push(edge.target.clone());
                }
            }
        }
        ready
    }
}

/// Returns true if any predecessor of the node recorded a failure.
fn predecessor_failed(graph: &WorkflowGraph<'_>, state: &ExecutionState, node_id: &str) -> bool {
    graph
        .incoming(node_id)
        .iter()
        .any(|edge| state.result(&edge.source).is_some_and(NodeResult::is_error))
}

/// Resolves a node's parameters against the run's namespaces.
fn resolve_parameters(
    node: &WorkflowNode,
    executor: &dyn NodeExecutor,
    context: &WorkflowContext,
    state: &ExecutionState,
) -> WorkflowNode {
    let mut namespaces = Namespaces::for_run(context, state);
    if executor.template_access() == TemplateAccess::Privileged {
        namespaces = namespaces
            .with_process_env()
            .with_secrets(&context.secrets);
    }
    let raw = executor.raw_parameters();

    let parameters: Map<String, JsonValue> = node
        .parameters
        .iter()
        .map(|(key, value)| {
            let value = if raw.contains(&key.as_str()) {
                value.clone()
            } else {
                template::resolve(value, &namespaces)
            };
            (key.clone(), value)
        })
        .collect();

    WorkflowNode {
        parameters,
        ..node.clone()
    }
}

/// Runs one node, retrying per the node's settings, then trying its
/// fallback executor if it still failed.
#[instrument(skip_all, fields(node_id = %dispatch.node.id, node_type = %dispatch.node.node_type))]
async fn run_node(dispatch: Dispatch) -> NodeResult {
    let Dispatch {
        executor,
        node,
        fallback,
        context,
        state,
        retry,
        policy,
        cancel,
    } = dispatch;

    let mut attempt = 0u32;
    let failed = loop {
        attempt += 1;
        let started = Instant::now();
        let mut result = executor.execute(&node, &context, &state).await;
        result.duration = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        result.attempts = attempt;

        if !result.is_error() {
            debug!(attempt, duration_ms = result.duration, "node succeeded");
            return result;
        }
        let code = result
            .error_code
            .get_or_insert(ErrorCode::ExecutionFailed)
            .clone();
        let Some(delay) = policy.next_delay(&retry, &code, attempt) else {
            break result;
        };

        warn!(attempt, code = %code, delay_ms = delay.as_millis(), "retrying node");
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = cancel.cancelled() => return result,
        }
    };

    let Some((fallback, fallback_node)) = fallback else {
        return failed;
    };
    if cancel.is_cancelled() {
        return failed;
    }
    warn!(fallback = fallback.node_type(), "node failed, trying fallback executor");
    let started = Instant::now();
    let mut recovered = fallback.execute(&fallback_node, &context, &state).await;
    if !recovered.is_success() {
        debug!("fallback executor failed too");
        return failed;
    }
    recovered.duration = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    recovered.attempts = attempt + 1;
    recovered
}

/// Masks secret values that leaked into a node's error or output.
fn redact_result(result: &mut NodeResult, secrets: &Secrets) {
    if let Some(error) = &mut result.error {
        if secrets.leaks_into(error) {
            *error = secrets.redact(error);
        }
    }
    redact_value(&mut result.output, secrets);
}

fn redact_value(value: &mut JsonValue, secrets: &Secrets) {
    match value {
        JsonValue::String(s) if secrets.leaks_into(s) => *s = secrets.redact(s),
        JsonValue::Array(items) => items.iter_mut().for_each(|v| redact_value(v, secrets)),
        JsonValue::Object(map) => map.values_mut().for_each(|v| redact_value(v, secrets)),
        _ => {}
    }
}
