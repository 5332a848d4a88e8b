//! The `http-request` executor.

use crate::params;
use async_trait::async_trait;
use nodeflow_workflow::{
    ErrorCode, ExecutionState, NodeExecutor, NodeResult, TemplateAccess, ValidationResult,
    WorkflowContext, WorkflowNode,
};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Method, Url};
use serde_json::{Map, Value as JsonValue, json};
use std::error::Error as _;
use std::time::Duration;
use tracing::{debug, instrument};

const METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Longest per-node timeout that validates without a warning.
const TIMEOUT_WARNING_MS: u64 = 120_000;

/// Client-wide defaults for outbound requests.
#[derive(Debug, Clone)]
pub struct HttpRequestConfig {
    /// Applied when a node sets no `timeout`.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpRequestConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("nodeflow/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpRequestConfig {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Performs one HTTP request per attempt.
///
/// Parameters: `url`, `method` (default `GET`), `headers`, `body`, and
/// `timeout` in milliseconds. Non-2xx responses fail with `HTTP_<status>`
/// and keep the response in the output.
pub struct HttpRequestExecutor {
    client: Client,
    config: HttpRequestConfig,
}

impl HttpRequestExecutor {
    #[must_use]
    pub fn new(config: HttpRequestConfig) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    fn headers(&self, node: &WorkflowNode) -> Result<HeaderMap, NodeResult> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(agent) = HeaderValue::from_str(&self.config.user_agent) {
            headers.insert(USER_AGENT, agent);
        }
        for (name, value) in params::object(node, "headers").into_iter().flatten() {
            let text = crate::value::as_text(value);
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                NodeResult::failure(
                    ErrorCode::ValidationError,
                    format!("invalid header name: {name}"),
                )
            })?;
            let value = HeaderValue::from_str(&text).map_err(|_| {
                NodeResult::failure(
                    ErrorCode::ValidationError,
                    format!("invalid value for header {name}"),
                )
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

impl Default for HttpRequestExecutor {
    fn default() -> Self {
        Self::new(HttpRequestConfig::default())
    }
}

fn parse_url(raw: &str) -> Result<Url, NodeResult> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(NodeResult::failure(
            ErrorCode::DnsError,
            "request URL is empty; no host to resolve",
        ));
    }
    let url = Url::parse(raw).map_err(|err| {
        NodeResult::failure(ErrorCode::ValidationError, format!("invalid request URL: {err}"))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(NodeResult::failure(
            ErrorCode::ValidationError,
            format!("unsupported URL scheme: {}", url.scheme()),
        ));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(NodeResult::failure(
            ErrorCode::DnsError,
            "request URL has no host to resolve",
        ));
    }
    Ok(url)
}

/// Maps a transport failure onto the error taxonomy.
fn classify(err: &reqwest::Error) -> ErrorCode {
    if err.is_timeout() {
        return ErrorCode::Timeout;
    }
    if err.is_builder() {
        return ErrorCode::ValidationError;
    }
    if err.is_connect() {
        let mut source = err.source();
        while let Some(cause) = source {
            let text = cause.to_string().to_lowercase();
            if text.contains("dns") || text.contains("lookup") || text.contains("resolve") {
                return ErrorCode::DnsError;
            }
            source = cause.source();
        }
        return ErrorCode::ConnectionRefused;
    }
    ErrorCode::HttpError
}

fn response_headers(headers: &HeaderMap) -> JsonValue {
    let map: Map<String, JsonValue> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), JsonValue::String(v.to_string())))
        })
        .collect();
    JsonValue::Object(map)
}

#[async_trait]
impl NodeExecutor for HttpRequestExecutor {
    fn node_type(&self) -> &str {
        "http-request"
    }

    #[instrument(name = "http_request", skip_all, fields(node_id = %node.id))]
    async fn execute(
        &self,
        node: &WorkflowNode,
        _context: &WorkflowContext,
        _state: &ExecutionState,
    ) -> NodeResult {
        let url = match parse_url(node.str_parameter("url").unwrap_or_default()) {
            Ok(url) => url,
            Err(result) => return result,
        };
        let method_name = node
            .str_parameter("method")
            .unwrap_or("GET")
            .to_ascii_uppercase();
        if !METHODS.contains(&method_name.as_str()) {
            return NodeResult::failure(
                ErrorCode::ValidationError,
                format!("unsupported HTTP method: {method_name}"),
            );
        }
        let method = match Method::from_bytes(method_name.as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                return NodeResult::failure(
                    ErrorCode::ValidationError,
                    format!("unsupported HTTP method: {method_name}"),
                );
            }
        };
        let headers = match self.headers(node) {
            Ok(headers) => headers,
            Err(result) => return result,
        };
        let timeout = params::millis(node, "timeout")
            .map(Duration::from_millis)
            .unwrap_or(self.config.timeout);

        let mut request = self
            .client
            .request(method, url)
            .headers(headers)
            .timeout(timeout);
        match params::present(node, "body") {
            None => {}
            Some(JsonValue::String(text)) => request = request.body(text.clone()),
            Some(other) => request = request.body(other.to_string()),
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                let code = classify(&err);
                debug!(%code, "http request failed");
                return NodeResult::failure(code, format!("request failed: {}", err.without_url()));
            }
        };

        let status = response.status();
        let headers = response_headers(response.headers());
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                return NodeResult::failure(
                    classify(&err),
                    format!("failed to read response body: {}", err.without_url()),
                );
            }
        };
        let body = serde_json::from_str(&text).unwrap_or(JsonValue::String(text));
        let status_text = status.canonical_reason().unwrap_or_default();
        let output = json!({
            "status": status.as_u16(),
            "statusText": status_text,
            "headers": headers,
            "body": body,
        });
        debug!(status = status.as_u16(), "http request completed");

        if status.is_success() {
            NodeResult::success(output)
        } else {
            NodeResult::failure(
                ErrorCode::Http(status.as_u16()),
                format!("HTTP {} {status_text}", status.as_u16()),
            )
            .with_output(output)
        }
    }

    fn validate(&self, node: &WorkflowNode) -> ValidationResult {
        let mut result = ValidationResult::ok();
        result.require(node, "url");
        if let Some(method) = node.str_parameter("method") {
            if !params::is_templated(node, "method")
                && !METHODS.contains(&method.to_ascii_uppercase().as_str())
            {
                result.error(format!("unsupported HTTP method: {method}"));
            }
        }
        if let Some(headers) = node.parameter("headers") {
            if !headers.is_object() && !headers.is_string() {
                result.error("headers must be an object");
            }
        }
        if let Some(timeout) = params::millis(node, "timeout") {
            if timeout > TIMEOUT_WARNING_MS {
                result.warn(format!(
                    "timeout of {timeout}ms exceeds {TIMEOUT_WARNING_MS}ms"
                ));
            }
        }
        result
    }

    fn template_access(&self) -> TemplateAccess {
        TemplateAccess::Privileged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    async fn run(node: WorkflowNode) -> NodeResult {
        HttpRequestExecutor::default()
            .execute(&node, &WorkflowContext::new("acme"), &ExecutionState::new())
            .await
    }

    #[tokio::test]
    async fn get_parses_json_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/users/7")
            .match_header("user-agent", Matcher::Regex("^nodeflow/".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":7,"name":"Ada"}"#)
            .create_async()
            .await;

        let node = WorkflowNode::new("fetch", "http-request")
            .with_parameter("url", format!("{}/users/7", server.url()));
        let result = run(node).await;

        mock.assert_async().await;
        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.output["status"], 200);
        assert_eq!(result.output["statusText"], "OK");
        assert_eq!(result.output["body"]["name"], "Ada");
        assert_eq!(result.output["headers"]["content-type"], "application/json");
    }

    #[tokio::test]
    async fn object_bodies_are_sent_as_json() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/orders")
            .match_header("content-type", "application/json")
            .match_header("x-trace", "abc")
            .match_body(Matcher::Json(json!({"sku": "A-1", "qty": 2})))
            .with_status(201)
            .with_body("created")
            .create_async()
            .await;

        let node = WorkflowNode::new("post", "http-request")
            .with_parameter("url", format!("{}/orders", server.url()))
            .with_parameter("method", "post")
            .with_parameter("headers", json!({"X-Trace": "abc"}))
            .with_parameter("body", json!({"sku": "A-1", "qty": 2}));
        let result = run(node).await;

        mock.assert_async().await;
        assert!(result.is_success());
        assert_eq!(result.output["status"], 201);
        assert_eq!(result.output["body"], "created");
    }

    #[tokio::test]
    async fn non_success_status_keeps_body() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/flaky")
            .with_status(503)
            .with_body(r#"{"error":"maintenance"}"#)
            .create_async()
            .await;

        let node = WorkflowNode::new("fetch", "http-request")
            .with_parameter("url", format!("{}/flaky", server.url()));
        let result = run(node).await;

        assert!(result.is_error());
        assert_eq!(result.error_code, Some(ErrorCode::Http(503)));
        assert!(result.error_code.as_ref().is_some_and(ErrorCode::is_retryable));
        assert_eq!(result.output["body"]["error"], "maintenance");
    }

    #[tokio::test]
    async fn empty_url_is_a_resolution_failure() {
        let node = WorkflowNode::new("fetch", "http-request").with_parameter("url", "");
        let result = run(node).await;
        assert_eq!(result.error_code, Some(ErrorCode::DnsError));
    }

    #[tokio::test]
    async fn closed_port_is_connection_refused() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let node = WorkflowNode::new("fetch", "http-request")
            .with_parameter("url", format!("http://127.0.0.1:{port}/"));
        let result = run(node).await;
        assert_eq!(result.error_code, Some(ErrorCode::ConnectionRefused));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let hold = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let node = WorkflowNode::new("fetch", "http-request")
            .with_parameter("url", format!("http://{addr}/slow"))
            .with_parameter("timeout", 100);
        let result = run(node).await;
        hold.abort();

        assert_eq!(result.error_code, Some(ErrorCode::Timeout));
    }

    #[tokio::test]
    async fn query_strings_stay_out_of_error_messages() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let node = WorkflowNode::new("fetch", "http-request")
            .with_parameter("url", format!("http://127.0.0.1:{port}/?token=s3cr3t"));
        let result = run(node).await;
        let message = result.error.expect("error message");
        assert!(!message.contains("s3cr3t"), "{message}");
    }

    #[test]
    fn validation_rules() {
        let executor = HttpRequestExecutor::default();

        let missing = executor.validate(&WorkflowNode::new("n", "http-request"));
        assert!(!missing.valid);

        let bad_method = executor.validate(
            &WorkflowNode::new("n", "http-request")
                .with_parameter("url", "https://example.com")
                .with_parameter("method", "TRACE"),
        );
        assert_eq!(bad_method.errors, vec!["unsupported HTTP method: TRACE"]);

        let slow = executor.validate(
            &WorkflowNode::new("n", "http-request")
                .with_parameter("url", "{{json.endpoint}}")
                .with_parameter("timeout", 300_000),
        );
        assert!(slow.valid);
        assert_eq!(slow.warnings.len(), 1);
    }
}
