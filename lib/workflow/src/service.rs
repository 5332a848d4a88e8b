//! Trigger entry point.
//!
//! Ties the collaborators together: loads the definition for the caller's
//! tenant, injects that tenant's secrets, builds the run context from the
//! trigger request, runs the engine and projects the record into an
//! [`ExecutionResponse`]. Status queries, listings and aborts are scoped to
//! the caller's tenant the same way.

use crate::context::{RequestInfo, UserInfo, WorkflowContext};
use crate::engine::WorkflowEngine;
use crate::error::EngineError;
use crate::execution::{ExecutionResponse, RunStatus};
use crate::store::{DefinitionStore, ExecutionRecordStore, SecretsProvider};
use crate::trigger::WorkflowTrigger;
use nodeflow_core::{ExecutionId, Secrets};
use rootcause::prelude::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, instrument};

/// What a caller supplies to start a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    #[serde(default)]
    pub trigger_data: JsonValue,
    #[serde(default)]
    pub variables: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestInfo>,
    /// Defaults to a manual trigger with no entry node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<WorkflowTrigger>,
    /// Pre-assigned ID, so the caller can cancel the run while it executes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<ExecutionId>,
}

/// Starts runs on behalf of callers.
pub struct TriggerService {
    definitions: Arc<dyn DefinitionStore>,
    secrets: Option<Arc<dyn SecretsProvider>>,
    records: Option<Arc<dyn ExecutionRecordStore>>,
    engine: Arc<WorkflowEngine>,
}

impl TriggerService {
    /// Creates a service without a secrets provider.
    #[must_use]
    pub fn new(definitions: Arc<dyn DefinitionStore>, engine: Arc<WorkflowEngine>) -> Self {
        Self {
            definitions,
            secrets: None,
            records: None,
            engine,
        }
    }

    /// Injects secrets from a provider into every run.
    #[must_use]
    pub fn with_secrets_provider(mut self, provider: Arc<dyn SecretsProvider>) -> Self {
        self.secrets = Some(provider);
        self
    }

    /// Answers status and listing queries from a record store. Use the
    /// store the engine persists to.
    #[must_use]
    pub fn with_record_store(mut self, records: Arc<dyn ExecutionRecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    /// Returns the engine, e.g. to cancel a run.
    #[must_use]
    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    /// Loads and runs a workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow cannot be loaded or does not exist
    /// for this tenant, secrets cannot be fetched, or the engine refuses
    /// to start the run.
    #[instrument(
        skip(self, request, user),
        fields(workflow_id = %workflow_id, tenant_id = %tenant_id)
    )]
    pub async fn trigger(
        &self,
        workflow_id: &str,
        tenant_id: &str,
        request: TriggerRequest,
        user: Option<UserInfo>,
    ) -> Result<ExecutionResponse, Report<EngineError>> {
        let workflow = self
            .definitions
            .load_workflow(workflow_id, tenant_id)
            .await
            .context(EngineError::Collaborator {
                operation: "loading workflow definition".to_string(),
            })?
            .ok_or_else(|| EngineError::WorkflowNotFound {
                workflow_id: workflow_id.to_string(),
            })?;

        let secrets = match &self.secrets {
            Some(provider) => provider
                .secrets_for(tenant_id)
                .await
                .context(EngineError::Collaborator {
                    operation: "loading tenant secrets".to_string(),
                })?,
            None => Secrets::new(),
        };

        let mut context = WorkflowContext::new(tenant_id)
            .with_trigger(request.trigger.unwrap_or_default())
            .with_trigger_data(request.trigger_data)
            .with_variables(request.variables)
            .with_secrets(secrets);
        if let Some(execution_id) = request.execution_id {
            context.execution_id = execution_id;
        }
        if let Some(user) = user {
            context = context.with_user(user);
        }
        if let Some(inbound) = request.request {
            context = context.with_request(inbound);
        }

        info!(execution_id = %context.execution_id, "triggering workflow");
        let record = self.engine.execute_workflow(&workflow, context).await?;
        Ok(ExecutionResponse::from(record))
    }

    /// Returns `running` while the engine executes the run, else the
    /// recorded final status.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionNotFound` if the tenant has no such run, or an
    /// error if the record store fails.
    pub async fn execution_status(
        &self,
        execution_id: &ExecutionId,
        tenant_id: &str,
    ) -> Result<RunStatus, Report<EngineError>> {
        if self.engine.is_running_for(execution_id, tenant_id) {
            return Ok(RunStatus::Running);
        }
        Ok(self.execution(execution_id, tenant_id).await?.status)
    }

    /// Returns a finished run.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionNotFound` if the tenant has no such record, or an
    /// error if the record store fails.
    pub async fn execution(
        &self,
        execution_id: &ExecutionId,
        tenant_id: &str,
    ) -> Result<ExecutionResponse, Report<EngineError>> {
        let not_found = || EngineError::ExecutionNotFound {
            execution_id: execution_id.to_string(),
        };
        let Some(records) = &self.records else {
            return Err(not_found().into());
        };
        let record = records
            .load(execution_id, tenant_id)
            .await
            .context(EngineError::Collaborator {
                operation: "loading execution record".to_string(),
            })?
            .ok_or_else(not_found)?;
        Ok(ExecutionResponse::from(record))
    }

    /// Lists a tenant's finished runs of a workflow, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the record store fails.
    pub async fn list_executions(
        &self,
        workflow_id: &str,
        tenant_id: &str,
    ) -> Result<Vec<ExecutionResponse>, Report<EngineError>> {
        let Some(records) = &self.records else {
            return Ok(Vec::new());
        };
        let records = records
            .list(workflow_id, tenant_id)
            .await
            .context(EngineError::Collaborator {
                operation: "listing execution records".to_string(),
            })?;
        Ok(records.into_iter().map(ExecutionResponse::from).collect())
    }

    /// Cancels a run on behalf of its tenant.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionNotFound` if the tenant has no such run in
    /// progress.
    #[instrument(skip(self), fields(execution_id = %execution_id, tenant_id = %tenant_id))]
    pub fn abort_execution(
        &self,
        execution_id: &ExecutionId,
        tenant_id: &str,
    ) -> Result<(), Report<EngineError>> {
        if self
            .engine
            .cancel_for_tenant(execution_id, tenant_id, "aborted by caller")
        {
            return Ok(());
        }
        Err(EngineError::ExecutionNotFound {
            execution_id: execution_id.to_string(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WorkflowContext;
    use crate::definition::Workflow;
    use crate::error::ErrorCode;
    use crate::execution::{ExecutionState, NodeResult};
    use crate::executor::{NodeExecutor, TemplateAccess, ValidationResult};
    use crate::node::WorkflowNode;
    use crate::registry::ExecutorRegistry;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    /// Echoes its resolved parameters.
    struct Echo {
        access: TemplateAccess,
        node_type: &'static str,
    }

    #[async_trait]
    impl NodeExecutor for Echo {
        fn node_type(&self) -> &str {
            self.node_type
        }

        async fn execute(
            &self,
            node: &WorkflowNode,
            _context: &WorkflowContext,
            _state: &ExecutionState,
        ) -> NodeResult {
            NodeResult::success(json!(node.parameters))
        }

        fn validate(&self, _node: &WorkflowNode) -> ValidationResult {
            ValidationResult::ok()
        }

        fn template_access(&self) -> TemplateAccess {
            self.access
        }
    }

    /// Sleeps for `sleepMs`, then succeeds.
    struct Nap;

    #[async_trait]
    impl NodeExecutor for Nap {
        fn node_type(&self) -> &str {
            "nap"
        }

        async fn execute(
            &self,
            node: &WorkflowNode,
            _context: &WorkflowContext,
            _state: &ExecutionState,
        ) -> NodeResult {
            let ms = node.parameter("sleepMs").and_then(JsonValue::as_u64).unwrap_or(0);
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            NodeResult::success(json!({"slept": ms}))
        }

        fn validate(&self, _node: &WorkflowNode) -> ValidationResult {
            ValidationResult::ok()
        }
    }

    fn service(store: Arc<InMemoryStore>) -> TriggerService {
        let registry = ExecutorRegistry::new()
            .with(Arc::new(Echo {
                access: TemplateAccess::Run,
                node_type: "echo",
            }))
            .with(Arc::new(Echo {
                access: TemplateAccess::Privileged,
                node_type: "privileged-echo",
            }))
            .with(Arc::new(Nap));
        let engine =
            Arc::new(WorkflowEngine::new(Arc::new(registry)).with_record_store(store.clone()));
        TriggerService::new(store.clone(), engine)
            .with_secrets_provider(store.clone())
            .with_record_store(store)
    }

    #[tokio::test]
    async fn trigger_runs_stored_workflow() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_workflow(
                Workflow::new("greet", "Greet").with_node(
                    WorkflowNode::new("hello", "echo")
                        .with_parameter("to", "{{json.email}}")
                        .with_parameter("counter", "{{context.variables.count}}"),
                ),
            )
            .await;

        let response = service(store.clone())
            .trigger(
                "greet",
                "acme",
                TriggerRequest {
                    trigger_data: json!({"email": "a@b.com"}),
                    variables: json!({"count": 3}),
                    ..TriggerRequest::default()
                },
                None,
            )
            .await
            .expect("trigger");

        assert_eq!(response.status, RunStatus::Success);
        let output = &response.state.results["hello"].output;
        assert_eq!(output["to"], json!("a@b.com"));
        assert_eq!(output["counter"], json!(3));
        assert!(store.record(&response.execution_id).await.is_some());
    }

    #[tokio::test]
    async fn unknown_workflow_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let err = service(store)
            .trigger("ghost", "acme", TriggerRequest::default(), None)
            .await
            .unwrap_err();
        assert_eq!(err.current_context().code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn other_tenants_cannot_trigger() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_workflow(
                Workflow::new("private", "Private")
                    .with_tenant("acme")
                    .with_node(WorkflowNode::new("a", "echo")),
            )
            .await;
        let err = service(store)
            .trigger("private", "globex", TriggerRequest::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            EngineError::WorkflowNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn secrets_reach_privileged_executors_but_not_the_record() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_secrets("acme", Secrets::new().with("API_KEY", "k-123"))
            .await;
        store
            .put_workflow(
                Workflow::new("call", "Call")
                    .with_node(
                        WorkflowNode::new("plain", "echo")
                            .with_parameter("auth", "Bearer {{secrets.API_KEY}}"),
                    )
                    .with_node(
                        WorkflowNode::new("privileged", "privileged-echo")
                            .with_parameter("auth", "Bearer {{secrets.API_KEY}}"),
                    ),
            )
            .await;

        let response = service(store.clone())
            .trigger("call", "acme", TriggerRequest::default(), None)
            .await
            .expect("trigger");

        let results = &response.state.results;
        assert_eq!(
            results["plain"].output["auth"],
            json!("Bearer {{secrets.API_KEY}}")
        );
        assert_eq!(results["privileged"].output["auth"], json!("Bearer [REDACTED]"));

        let record = store.record(&response.execution_id).await.expect("saved");
        let rendered = serde_json::to_string(&record).expect("serialize");
        assert!(!rendered.contains("k-123"));
    }

    #[tokio::test]
    async fn user_and_request_are_threaded_into_context() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_workflow(
                Workflow::new("who", "Who").with_node(
                    WorkflowNode::new("a", "echo")
                        .with_parameter("user", "{{context.user.email}}")
                        .with_parameter("method", "{{context.request.method}}"),
                ),
            )
            .await;
        let execution_id = ExecutionId::new();
        let response = service(store)
            .trigger(
                "who",
                "acme",
                TriggerRequest {
                    request: Some(RequestInfo {
                        method: "POST".to_string(),
                        ..RequestInfo::default()
                    }),
                    execution_id: Some(execution_id),
                    ..TriggerRequest::default()
                },
                Some(UserInfo {
                    id: "u1".to_string(),
                    email: Some("u1@acme.test".to_string()),
                    level: 1,
                }),
            )
            .await
            .expect("trigger");

        assert_eq!(response.execution_id, execution_id);
        let output = &response.state.results["a"].output;
        assert_eq!(output["user"], json!("u1@acme.test"));
        assert_eq!(output["method"], json!("POST"));
    }

    #[tokio::test]
    async fn finished_runs_are_queryable_by_their_tenant_only() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_workflow(
                Workflow::new("shared", "Shared").with_node(WorkflowNode::new("a", "echo")),
            )
            .await;
        let service = service(store);

        let acme = service
            .trigger("shared", "acme", TriggerRequest::default(), None)
            .await
            .expect("trigger");
        service
            .trigger("shared", "globex", TriggerRequest::default(), None)
            .await
            .expect("trigger");

        let status = service
            .execution_status(&acme.execution_id, "acme")
            .await
            .expect("status");
        assert_eq!(status, RunStatus::Success);
        let fetched = service
            .execution(&acme.execution_id, "acme")
            .await
            .expect("execution");
        assert_eq!(fetched, acme);

        let err = service
            .execution_status(&acme.execution_id, "globex")
            .await
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            EngineError::ExecutionNotFound { .. }
        ));
        assert_eq!(err.current_context().code(), ErrorCode::NotFound);

        let listed = service
            .list_executions("shared", "acme")
            .await
            .expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].execution_id, acme.execution_id);
        assert!(
            service
                .list_executions("shared", "initech")
                .await
                .expect("list")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn abort_requires_the_owning_tenant() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_workflow(
                Workflow::new("slow", "Slow")
                    .with_node(WorkflowNode::new("nap", "nap").with_parameter("sleepMs", 30_000)),
            )
            .await;
        let service = Arc::new(service(store));
        let execution_id = ExecutionId::new();

        let run = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let request = TriggerRequest {
                    execution_id: Some(execution_id),
                    ..TriggerRequest::default()
                };
                service.trigger("slow", "acme", request, None).await
            })
        };
        while !service.engine().is_running(&execution_id) {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let status = service
            .execution_status(&execution_id, "acme")
            .await
            .expect("status");
        assert_eq!(status, RunStatus::Running);
        assert!(service.execution_status(&execution_id, "globex").await.is_err());

        let err = service.abort_execution(&execution_id, "globex").unwrap_err();
        assert_eq!(err.current_context().code(), ErrorCode::NotFound);
        assert!(service.engine().is_running(&execution_id));

        service
            .abort_execution(&execution_id, "acme")
            .expect("abort");
        let response = run.await.expect("join").expect("trigger");
        assert_eq!(response.status, RunStatus::Error);
        assert_eq!(
            response.error.as_deref(),
            Some("execution cancelled: aborted by caller")
        );
        assert!(service.abort_execution(&execution_id, "acme").is_err());
    }
}
