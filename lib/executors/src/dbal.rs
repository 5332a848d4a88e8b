//! `dbal-read` and `dbal-write`: entity access through a tenant-scoped
//! [`DataAccess`] backend.

use crate::error::DataAccessError;
use crate::params;
use crate::value::sort_order;
use async_trait::async_trait;
use nodeflow_workflow::{
    ErrorCode, ExecutionState, NodeExecutor, NodeResult, ValidationResult, WorkflowContext,
    WorkflowNode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

pub const DEFAULT_LIMIT: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Parameters of a list request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    /// Equality match on every key.
    pub filter: Map<String, JsonValue>,
    pub sort: Option<(String, SortDirection)>,
    /// 1-based.
    pub page: u64,
    pub limit: u64,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filter: Map::new(),
            sort: None,
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// One page of list results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub data: Vec<JsonValue>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub has_more: bool,
}

/// Entity storage used by the DBAL executors. Every call is scoped to the
/// tenant of the running workflow.
#[async_trait]
pub trait DataAccess: Send + Sync {
    async fn read(
        &self,
        tenant_id: &str,
        entity: &str,
        id: &str,
    ) -> Result<Option<JsonValue>, DataAccessError>;

    async fn list(
        &self,
        tenant_id: &str,
        entity: &str,
        query: &ListQuery,
    ) -> Result<ListPage, DataAccessError>;

    /// Stores a new record; `data.id` must be a unique string.
    async fn create(
        &self,
        tenant_id: &str,
        entity: &str,
        data: Map<String, JsonValue>,
    ) -> Result<JsonValue, DataAccessError>;

    /// Merges `data` into an existing record.
    async fn update(
        &self,
        tenant_id: &str,
        entity: &str,
        id: &str,
        data: Map<String, JsonValue>,
    ) -> Result<JsonValue, DataAccessError>;

    /// Returns whether a record was removed.
    async fn delete(&self, tenant_id: &str, entity: &str, id: &str)
    -> Result<bool, DataAccessError>;
}

type Collection = BTreeMap<String, Map<String, JsonValue>>;

/// A [`DataAccess`] backend held in memory, for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryDataAccess {
    collections: RwLock<HashMap<(String, String), Collection>>,
}

impl InMemoryDataAccess {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(tenant_id: &str, entity: &str) -> (String, String) {
    (tenant_id.to_string(), entity.to_string())
}

fn matches(record: &Map<String, JsonValue>, filter: &Map<String, JsonValue>) -> bool {
    filter
        .iter()
        .all(|(field, expected)| record.get(field) == Some(expected))
}

#[async_trait]
impl DataAccess for InMemoryDataAccess {
    async fn read(
        &self,
        tenant_id: &str,
        entity: &str,
        id: &str,
    ) -> Result<Option<JsonValue>, DataAccessError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&key(tenant_id, entity))
            .and_then(|records| records.get(id))
            .map(|record| JsonValue::Object(record.clone())))
    }

    async fn list(
        &self,
        tenant_id: &str,
        entity: &str,
        query: &ListQuery,
    ) -> Result<ListPage, DataAccessError> {
        let collections = self.collections.read().await;
        let mut rows: Vec<&Map<String, JsonValue>> = collections
            .get(&key(tenant_id, entity))
            .into_iter()
            .flat_map(BTreeMap::values)
            .filter(|record| matches(record, &query.filter))
            .collect();

        if let Some((field, direction)) = &query.sort {
            rows.sort_by(|a, b| {
                let ordering = match (a.get(field), b.get(field)) {
                    (Some(a), Some(b)) => sort_order(a, b),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        let total = rows.len() as u64;
        let page = query.page.max(1);
        let limit = query.limit.max(1);
        let start = (page - 1).saturating_mul(limit);
        let data = rows
            .into_iter()
            .skip(usize::try_from(start).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|record| JsonValue::Object(record.clone()))
            .collect();
        Ok(ListPage {
            data,
            total,
            page,
            limit,
            has_more: start.saturating_add(limit) < total,
        })
    }

    async fn create(
        &self,
        tenant_id: &str,
        entity: &str,
        data: Map<String, JsonValue>,
    ) -> Result<JsonValue, DataAccessError> {
        let Some(id) = data.get("id").and_then(JsonValue::as_str).map(str::to_string) else {
            return Err(DataAccessError::Invalid {
                reason: "id is required".to_string(),
            });
        };
        let mut collections = self.collections.write().await;
        let records = collections.entry(key(tenant_id, entity)).or_default();
        if records.contains_key(&id) {
            return Err(DataAccessError::Conflict {
                entity: entity.to_string(),
                id,
            });
        }
        records.insert(id, data.clone());
        Ok(JsonValue::Object(data))
    }

    async fn update(
        &self,
        tenant_id: &str,
        entity: &str,
        id: &str,
        data: Map<String, JsonValue>,
    ) -> Result<JsonValue, DataAccessError> {
        let mut collections = self.collections.write().await;
        let record = collections
            .get_mut(&key(tenant_id, entity))
            .and_then(|records| records.get_mut(id))
            .ok_or_else(|| DataAccessError::NotFound {
                entity: entity.to_string(),
                id: id.to_string(),
            })?;
        record.extend(data);
        record.insert("id".to_string(), JsonValue::String(id.to_string()));
        Ok(JsonValue::Object(record.clone()))
    }

    async fn delete(
        &self,
        tenant_id: &str,
        entity: &str,
        id: &str,
    ) -> Result<bool, DataAccessError> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(&key(tenant_id, entity))
            .is_some_and(|records| records.remove(id).is_some()))
    }
}

fn unavailable() -> NodeResult {
    NodeResult::failure(
        ErrorCode::ExecutionFailed,
        "no data access backend is configured",
    )
}

fn failed(err: &DataAccessError) -> NodeResult {
    NodeResult::failure(err.code(), err.to_string())
}

fn require_entity(node: &WorkflowNode) -> Result<&str, NodeResult> {
    params::string(node, "entity")
        .ok_or_else(|| NodeResult::failure(ErrorCode::ValidationError, "entity is required"))
}

/// Reads one record by `id`, or lists records matching `filter`.
///
/// List output is `{data, total, page, limit, hasMore}`.
#[derive(Default)]
pub struct DbalReadExecutor {
    backend: Option<Arc<dyn DataAccess>>,
}

impl DbalReadExecutor {
    #[must_use]
    pub fn new(backend: Option<Arc<dyn DataAccess>>) -> Self {
        Self { backend }
    }

    fn query(node: &WorkflowNode) -> ListQuery {
        let sort = match node.parameter("sort") {
            Some(JsonValue::String(field)) => Some((field.clone(), SortDirection::Asc)),
            Some(JsonValue::Object(order)) => order.iter().next().map(|(field, dir)| {
                let direction = match dir.as_str() {
                    Some(d) if d.eq_ignore_ascii_case("desc") => SortDirection::Desc,
                    _ => SortDirection::Asc,
                };
                (field.clone(), direction)
            }),
            _ => None,
        };
        ListQuery {
            filter: params::object(node, "filter").cloned().unwrap_or_default(),
            sort,
            page: params::millis(node, "page").unwrap_or(1),
            limit: params::millis(node, "limit").unwrap_or(DEFAULT_LIMIT),
        }
    }
}

#[async_trait]
impl NodeExecutor for DbalReadExecutor {
    fn node_type(&self) -> &str {
        "dbal-read"
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &WorkflowContext,
        _state: &ExecutionState,
    ) -> NodeResult {
        let Some(backend) = &self.backend else {
            return unavailable();
        };
        let entity = match require_entity(node) {
            Ok(entity) => entity,
            Err(result) => return result,
        };
        let tenant = context.tenant_id.as_str();

        if let Some(id) = params::string(node, "id") {
            debug!(node_id = %node.id, entity, "reading record");
            return match backend.read(tenant, entity, id).await {
                Ok(Some(record)) => NodeResult::success(record),
                Ok(None) => failed(&DataAccessError::NotFound {
                    entity: entity.to_string(),
                    id: id.to_string(),
                }),
                Err(err) => failed(&err),
            };
        }

        let query = Self::query(node);
        debug!(node_id = %node.id, entity, limit = query.limit, "listing records");
        match backend.list(tenant, entity, &query).await {
            Ok(page) => NodeResult::success(json!(page)),
            Err(err) => failed(&err),
        }
    }

    fn validate(&self, node: &WorkflowNode) -> ValidationResult {
        let mut result = ValidationResult::ok();
        result.require(node, "entity");
        if let Some(filter) = node.parameter("filter") {
            if !filter.is_object() && !filter.is_string() {
                result.error("filter must be an object");
            }
        }
        if node.parameter("limit").is_some()
            && params::millis(node, "limit").is_none()
            && !params::is_templated(node, "limit")
        {
            result.error("limit must be a non-negative number");
        }
        if self.backend.is_none() {
            result.warn("no data access backend is configured");
        }
        result
    }
}

/// The mutating operations of `dbal-write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    Create,
    Update,
    Delete,
}

impl WriteOperation {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Creates, updates or deletes one record.
#[derive(Default)]
pub struct DbalWriteExecutor {
    backend: Option<Arc<dyn DataAccess>>,
}

impl DbalWriteExecutor {
    #[must_use]
    pub fn new(backend: Option<Arc<dyn DataAccess>>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl NodeExecutor for DbalWriteExecutor {
    fn node_type(&self) -> &str {
        "dbal-write"
    }

    async fn execute(
        &self,
        node: &WorkflowNode,
        context: &WorkflowContext,
        _state: &ExecutionState,
    ) -> NodeResult {
        let Some(backend) = &self.backend else {
            return unavailable();
        };
        let entity = match require_entity(node) {
            Ok(entity) => entity,
            Err(result) => return result,
        };
        let Some(operation) = node.str_parameter("operation").and_then(WriteOperation::parse)
        else {
            return NodeResult::failure(
                ErrorCode::ValidationError,
                "operation must be create, update or delete",
            );
        };
        let tenant = context.tenant_id.as_str();
        let id = params::string(node, "id");
        let data = params::object(node, "data").cloned();
        debug!(node_id = %node.id, entity, ?operation, "writing record");

        let outcome = match (operation, id, data) {
            (WriteOperation::Create, id, Some(mut data)) => {
                if let Some(id) = id {
                    data.insert("id".to_string(), JsonValue::String(id.to_string()));
                }
                backend.create(tenant, entity, data).await
            }
            (WriteOperation::Update, Some(id), Some(data)) => {
                backend.update(tenant, entity, id, data).await
            }
            (WriteOperation::Delete, Some(id), _) => backend
                .delete(tenant, entity, id)
                .await
                .map(|deleted| json!({ "id": id, "deleted": deleted })),
            (WriteOperation::Delete | WriteOperation::Update, None, _) => {
                return NodeResult::failure(ErrorCode::ValidationError, "id is required");
            }
            (_, _, None) => {
                return NodeResult::failure(ErrorCode::ValidationError, "data must be an object");
            }
        };
        match outcome {
            Ok(output) => NodeResult::success(output),
            Err(err) => failed(&err),
        }
    }

    fn validate(&self, node: &WorkflowNode) -> ValidationResult {
        let mut result = ValidationResult::ok();
        result.require(node, "entity");
        result.require(node, "operation");
        let operation = node.str_parameter("operation");
        match operation.map(|op| (op, WriteOperation::parse(op))) {
            Some((op, None)) if !params::is_templated(node, "operation") => {
                result.error(format!("unsupported operation: {op}"));
            }
            Some((_, Some(WriteOperation::Update | WriteOperation::Delete))) => {
                result.require(node, "id");
            }
            _ => {}
        }
        if matches!(
            operation.and_then(WriteOperation::parse),
            Some(WriteOperation::Create | WriteOperation::Update)
        ) {
            result.require(node, "data");
        }
        if self.backend.is_none() {
            result.warn("no data access backend is configured");
        }
        result
    }
}
