//! Built-in node executors for nodeflow.
//!
//! [`Builtins`] wires the executors to their optional collaborators and
//! produces an [`ExecutorRegistry`]; [`builtin_registry`] is the same with
//! every collaborator left out (mock email, no data access, no webhook
//! delivery).

pub mod condition;
pub mod dbal;
pub mod email;
pub mod error;
pub mod http;
pub mod plugins;
pub mod transform;
pub mod variable;
pub mod wait;
pub mod webhook;

mod params;
mod value;

pub use condition::{ConditionExecutor, Operator};
pub use dbal::{
    DataAccess, DbalReadExecutor, DbalWriteExecutor, InMemoryDataAccess, ListPage, ListQuery,
    SortDirection,
};
pub use email::{Attachment, EmailMessage, EmailSendExecutor, MailTransport};
pub use error::{DataAccessError, MailError, WebhookError};
pub use http::{HttpRequestConfig, HttpRequestExecutor};
pub use plugins::all_plugin_maps;
pub use transform::TransformExecutor;
pub use variable::SetVariableExecutor;
pub use wait::WaitExecutor;
pub use webhook::{WebhookResponder, WebhookResponse, WebhookResponseExecutor};

use nodeflow_workflow::ExecutorRegistry;
use std::sync::Arc;
use tracing::debug;

/// Collaborators for the built-in executors.
#[derive(Default, Clone)]
pub struct Builtins {
    http: HttpRequestConfig,
    mail: Option<Arc<dyn MailTransport>>,
    data: Option<Arc<dyn DataAccess>>,
    webhook: Option<Arc<dyn WebhookResponder>>,
}

impl Builtins {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_http_config(mut self, config: HttpRequestConfig) -> Self {
        self.http = config;
        self
    }

    #[must_use]
    pub fn with_mail_transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.mail = Some(transport);
        self
    }

    #[must_use]
    pub fn with_data_access(mut self, backend: Arc<dyn DataAccess>) -> Self {
        self.data = Some(backend);
        self
    }

    #[must_use]
    pub fn with_webhook_responder(mut self, responder: Arc<dyn WebhookResponder>) -> Self {
        self.webhook = Some(responder);
        self
    }

    /// Builds a registry holding every built-in executor and plugin map.
    #[must_use]
    pub fn registry(&self) -> ExecutorRegistry {
        let mut email = EmailSendExecutor::new();
        if let Some(transport) = &self.mail {
            email = email.with_transport(Arc::clone(transport));
        }

        let mut registry = ExecutorRegistry::new()
            .with(Arc::new(HttpRequestExecutor::new(self.http.clone())))
            .with(Arc::new(email))
            .with(Arc::new(ConditionExecutor))
            .with(Arc::new(TransformExecutor))
            .with(Arc::new(SetVariableExecutor))
            .with(Arc::new(WaitExecutor))
            .with(Arc::new(DbalReadExecutor::new(self.data.clone())))
            .with(Arc::new(DbalWriteExecutor::new(self.data.clone())))
            .with(Arc::new(WebhookResponseExecutor::new(self.webhook.clone())));
        for plugins in all_plugin_maps() {
            registry.register_plugins(plugins);
        }
        debug!(
            executors = registry.len(),
            mail = self.mail.is_some(),
            data_access = self.data.is_some(),
            "built executor registry"
        );
        registry
    }
}

/// A registry of every built-in with no collaborators configured.
#[must_use]
pub fn builtin_registry() -> ExecutorRegistry {
    Builtins::new().registry()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_workflow::{
        ErrorCode, ExecutionState, NodeResult, RunStatus, Workflow, WorkflowContext, WorkflowEdge,
        WorkflowEngine, WorkflowNode,
    };
    use serde_json::{Value as JsonValue, json};

    fn engine() -> WorkflowEngine {
        WorkflowEngine::new(Arc::new(builtin_registry()))
    }

    #[test]
    fn registers_every_builtin_type() {
        let registry = builtin_registry();
        for node_type in [
            "http-request",
            "email-send",
            "condition",
            "transform",
            "wait",
            "set-variable",
            "dbal-read",
            "dbal-write",
            "webhook-response",
            "string.upper",
            "math.add",
            "logic.and",
            "list.length",
            "dict.get",
            "convert.toNumber",
            "variable.set",
        ] {
            assert!(registry.contains(node_type), "{node_type} is not registered");
        }
    }

    async fn execute(
        registry: &ExecutorRegistry,
        node_type: &str,
        parameters: &JsonValue,
    ) -> NodeResult {
        let executor = registry.get(node_type).expect("registered");
        let node = WorkflowNode::new("n", node_type).with_parameters(parameters.clone());
        executor
            .execute(&node, &WorkflowContext::new("acme"), &ExecutionState::new())
            .await
    }

    #[tokio::test]
    async fn empty_parameters_fail_with_classified_codes() {
        let registry = Builtins::new()
            .with_data_access(Arc::new(InMemoryDataAccess::new()))
            .registry();
        let empty = json!({});
        let expected = [
            ("http-request", ErrorCode::DnsError),
            ("email-send", ErrorCode::ValidationError),
            ("condition", ErrorCode::ValidationError),
            ("transform", ErrorCode::ValidationError),
            ("set-variable", ErrorCode::ValidationError),
            ("wait", ErrorCode::ValidationError),
            ("dbal-read", ErrorCode::ValidationError),
            ("dbal-write", ErrorCode::ValidationError),
        ];

        for (node_type, code) in expected {
            let result = execute(&registry, node_type, &empty).await;
            assert!(result.is_error(), "{node_type} accepted empty parameters");
            assert_eq!(result.error_code, Some(code), "{node_type}");

            let executor = registry.get(node_type).expect("registered");
            let validation = executor.validate(&WorkflowNode::new("n", node_type));
            assert!(!validation.valid, "{node_type} validated empty parameters");
            assert!(!validation.errors.is_empty(), "{node_type}");
        }

        let webhook = execute(&registry, "webhook-response", &empty).await;
        assert!(webhook.is_success());
        assert_eq!(webhook.output["statusCode"], 200);
    }

    #[tokio::test]
    async fn data_executors_without_backend_fail_as_execution_errors() {
        let registry = builtin_registry();
        let params = json!({"entity": "User", "operation": "create", "data": {"id": "u1"}});
        for node_type in ["dbal-read", "dbal-write"] {
            let result = execute(&registry, node_type, &params).await;
            assert_eq!(result.error_code, Some(ErrorCode::ExecutionFailed), "{node_type}");
        }
    }

    #[tokio::test]
    async fn malformed_parameters_fail_instead_of_panicking() {
        let registry = Builtins::new()
            .with_data_access(Arc::new(InMemoryDataAccess::new()))
            .registry();
        let hostile = json!({
            "url": 42,
            "method": ["GET"],
            "headers": "nope",
            "to": {"a": 1},
            "subject": null,
            "operator": 7,
            "mapping": "x",
            "name": false,
            "durationMs": -5,
            "until": "later",
            "entity": [],
            "operation": "explode",
            "statusCode": 9000,
            "args": [{"x": 1}, -1, "abc"],
        });
        let expected = [
            ("http-request", ErrorCode::DnsError),
            ("email-send", ErrorCode::ValidationError),
            ("condition", ErrorCode::ValidationError),
            ("set-variable", ErrorCode::ValidationError),
            ("wait", ErrorCode::ValidationError),
            ("dbal-read", ErrorCode::ValidationError),
            ("dbal-write", ErrorCode::ValidationError),
            ("webhook-response", ErrorCode::ValidationError),
        ];
        for (node_type, code) in expected {
            let result = execute(&registry, node_type, &hostile).await;
            assert_eq!(result.error_code, Some(code), "{node_type}");
        }

        // plugin failures on junk input must still carry a code
        for node_type in registry.node_types().into_iter().filter(|t| t.contains('.')) {
            for parameters in [json!({}), hostile.clone()] {
                let result = execute(&registry, node_type, &parameters).await;
                if result.is_error() {
                    assert!(result.error_code.is_some(), "{node_type} failed without a code");
                }
            }
        }
    }

    #[tokio::test]
    async fn unresolvable_endpoint_fails_with_resolution_error() {
        let workflow = Workflow::new("wf", "call out").with_node(
            WorkflowNode::new("call", "http-request").with_parameter("url", "{{json.endpoint}}"),
        );
        let record = engine()
            .execute_workflow(&workflow, WorkflowContext::new("acme").with_trigger_data(json!({})))
            .await
            .expect("run");

        assert_eq!(record.status, RunStatus::Error);
        assert_eq!(record.error_code, Some(ErrorCode::DnsError));
        assert_eq!(record.state.results["call"].error_code, Some(ErrorCode::DnsError));
    }

    #[tokio::test]
    async fn email_without_transport_succeeds_in_mock_mode() {
        let workflow = Workflow::new("wf", "welcome").with_node(
            WorkflowNode::new("mail", "email-send")
                .with_parameter("to", "{{json.email}}")
                .with_parameter("subject", "Welcome {{json.name}}")
                .with_parameter("template", "Hi {{data.first}}")
                .with_parameter("data", json!({"first": "{{json.name}}"})),
        );
        let context = WorkflowContext::new("acme")
            .with_trigger_data(json!({"email": "ada@example.com", "name": "Ada"}));

        let record = engine()
            .execute_workflow(&workflow, context)
            .await
            .expect("run");

        assert_eq!(record.status, RunStatus::Success);
        let output = &record.state.results["mail"].output;
        assert!(
            output["messageId"]
                .as_str()
                .is_some_and(|id| id.starts_with("mock-"))
        );
        assert_eq!(output["subject"], "Welcome Ada");
        assert_eq!(output["to"], json!(["ada@example.com"]));
    }

    #[tokio::test]
    async fn condition_routes_plugin_results() {
        let workflow = Workflow::new("wf", "route")
            .with_node(
                WorkflowNode::new("sum", "math.add")
                    .with_parameter("args", json!(["{{json.a}}", "{{json.b}}"])),
            )
            .with_node(
                WorkflowNode::new("check", "condition")
                    .with_parameter("left", "{{state.sum.output}}")
                    .with_parameter("operator", ">")
                    .with_parameter("right", 10),
            )
            .with_node(
                WorkflowNode::new("big", "set-variable")
                    .with_parameter("name", "size")
                    .with_parameter("value", "big"),
            )
            .with_node(
                WorkflowNode::new("small", "set-variable")
                    .with_parameter("name", "size")
                    .with_parameter("value", "small"),
            )
            .with_edge(WorkflowEdge::new("e1", "sum", "check"))
            .with_edge(WorkflowEdge::new("e2", "check", "big").with_label("true"))
            .with_edge(WorkflowEdge::new("e3", "check", "small").with_label("false"));
        let context = WorkflowContext::new("acme").with_trigger_data(json!({"a": 7, "b": 6}));
        let variables = context.variables.clone();

        let record = engine()
            .execute_workflow(&workflow, context)
            .await
            .expect("run");

        assert_eq!(record.status, RunStatus::Success);
        assert_eq!(record.state.results["sum"].output, json!(13));
        assert_eq!(record.state.results["check"].output["branch"], "true");
        assert!(record.state.results.contains_key("big"));
        assert!(!record.state.results.contains_key("small"));
        assert_eq!(variables.get("size"), Some(JsonValue::from("big")));
    }

    #[tokio::test]
    async fn data_access_is_scoped_to_the_run_tenant() {
        let backend: Arc<dyn DataAccess> = Arc::new(InMemoryDataAccess::new());
        let engine =
            WorkflowEngine::new(Arc::new(Builtins::new().with_data_access(backend).registry()));
        let workflow = Workflow::new("wf", "store")
            .with_node(
                WorkflowNode::new("save", "dbal-write")
                    .with_parameter("entity", "Order")
                    .with_parameter("operation", "create")
                    .with_parameter(
                        "data",
                        json!({"id": "{{json.id}}", "total": "{{json.total}}"}),
                    ),
            )
            .with_node(
                WorkflowNode::new("load", "dbal-read")
                    .with_parameter("entity", "Order")
                    .with_parameter("id", "{{json.id}}"),
            )
            .with_edge(WorkflowEdge::new("e1", "save", "load"));

        let record = engine
            .execute_workflow(
                &workflow,
                WorkflowContext::new("acme").with_trigger_data(json!({"id": "o-1", "total": 30})),
            )
            .await
            .expect("run");

        assert_eq!(record.status, RunStatus::Success);
        assert_eq!(record.state.results["load"].output, json!({"id": "o-1", "total": 30}));
    }
}
