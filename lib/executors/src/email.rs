//! The `email-send` executor and its transport seam.

use crate::error::MailError;
use crate::params;
use async_trait::async_trait;
use chrono::Utc;
use nodeflow_workflow::template::{self, Namespaces};
use nodeflow_workflow::{
    ErrorCode, ExecutionState, NodeExecutor, NodeResult, TemplateAccess, ValidationResult,
    WorkflowContext, WorkflowNode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tracing::{debug, info};
use ulid::Ulid;

/// A file attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Inline content, usually base64.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Location the transport fetches the content from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A fully resolved message, ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub html: bool,
    pub attachments: Vec<Attachment>,
}

/// Delivers messages. Returns the transport's message ID.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<String, MailError>;
}

/// Sends one email per attempt.
///
/// Without a transport the executor runs in mock mode: nothing is sent and
/// the output carries a synthetic `mock-` message ID.
#[derive(Default)]
pub struct EmailSendExecutor {
    transport: Option<Arc<dyn MailTransport>>,
}

impl EmailSendExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Renders `template` against the run namespaces plus `data`; falls back
    /// to the already resolved `body`.
    fn body(node: &WorkflowNode, context: &WorkflowContext, state: &ExecutionState) -> String {
        match params::string(node, "template") {
            Some(raw) => {
                let data = node.parameter("data").cloned().unwrap_or(JsonValue::Null);
                let namespaces = Namespaces::for_run(context, state)
                    .with_process_env()
                    .with_secrets(&context.secrets)
                    .with_scope("data", data);
                template::render(raw, &namespaces)
            }
            None => node
                .parameter("body")
                .map(crate::value::as_text)
                .unwrap_or_default(),
        }
    }

    fn message(
        node: &WorkflowNode,
        context: &WorkflowContext,
        state: &ExecutionState,
    ) -> Result<EmailMessage, String> {
        let to = params::string_list(node.parameter("to"));
        if to.is_empty() {
            return Err("no recipients after resolution".to_string());
        }
        let cc = params::string_list(node.parameter("cc"));
        let bcc = params::string_list(node.parameter("bcc"));
        if let Some(bad) = to.iter().chain(&cc).chain(&bcc).find(|a| !looks_like_email(a)) {
            return Err(format!("invalid email address: {bad}"));
        }
        let subject = params::string(node, "subject")
            .ok_or("subject is empty after resolution")?
            .to_string();
        let attachments = match params::present(node, "attachments") {
            None => Vec::new(),
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|err| format!("invalid attachments: {err}"))?,
        };
        Ok(EmailMessage {
            from: params::string(node, "from").map(str::to_string),
            to,
            cc,
            bcc,
            subject,
            body: Self::body(node, context, state),
            html: node
                .parameter("html")
                .is_some_and(crate::value::truthy),
            attachments,
        })
    }
}

/// Permissive address check: one `@`, a non-empty local part, and a dotted
/// domain, with no whitespace.
fn looks_like_email(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !address.chars().any(char::is_whitespace)
}

#[async_trait]
impl NodeExecutor for EmailSendExecutor {
    fn node_type(&self) -> &str {
        "email-send"
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &WorkflowContext,
        state: &ExecutionState,
    ) -> NodeResult {
        let message = match Self::message(node, context, state) {
            Ok(message) => message,
            Err(reason) => return NodeResult::failure(ErrorCode::ValidationError, reason),
        };

        let (message_id, mock) = match &self.transport {
            Some(transport) => match transport.send(&message).await {
                Ok(id) => (id, false),
                Err(err) => {
                    return NodeResult::failure(
                        ErrorCode::EmailSendError,
                        format!("failed to send email: {err}"),
                    );
                }
            },
            None => {
                debug!(node_id = %node.id, "no mail transport configured, mocking send");
                (format!("mock-{}", Ulid::new()), true)
            }
        };
        info!(node_id = %node.id, recipients = message.to.len(), mock, "email sent");

        NodeResult::success(json!({
            "messageId": message_id,
            "mock": mock,
            "to": message.to,
            "cc": message.cc,
            "bcc": message.bcc,
            "subject": message.subject,
            "attachments": message.attachments.len(),
            "sentAt": Utc::now().to_rfc3339(),
        }))
    }

    fn validate(&self, node: &WorkflowNode) -> ValidationResult {
        let mut result = ValidationResult::ok();
        result.require(node, "to");
        result.require(node, "subject");
        if params::string(node, "body").is_none() && params::string(node, "template").is_none() {
            result.error("one of body or template is required");
        }
        for field in ["to", "cc", "bcc"] {
            for address in params::string_list(node.parameter(field)) {
                if !template::contains_placeholder(&address) && !looks_like_email(&address) {
                    result.error(format!("invalid email address in {field}: {address}"));
                }
            }
        }
        if let Some(attachments) = params::present(node, "attachments") {
            if !attachments.is_array() && !attachments.is_string() {
                result.error("attachments must be a list");
            }
        }
        result
    }

    fn template_access(&self) -> TemplateAccess {
        TemplateAccess::Privileged
    }

    fn raw_parameters(&self) -> &[&str] {
        &["template"]
    }
}
