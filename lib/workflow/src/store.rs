//! Collaborator interfaces for persistence and secrets.
//!
//! The engine depends on these traits only. [`InMemoryStore`] implements
//! all three and backs tests and single-process deployments.

use crate::definition::Workflow;
use crate::error::StoreError;
use crate::execution::ExecutionRecord;
use async_trait::async_trait;
use nodeflow_core::{ExecutionId, Secrets};
use rootcause::prelude::Report;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Loads workflow definitions.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Returns the workflow, or `None` if it does not exist or belongs to
    /// another tenant.
    async fn load_workflow(
        &self,
        workflow_id: &str,
        tenant_id: &str,
    ) -> Result<Option<Workflow>, Report<StoreError>>;
}

/// Keeps finished execution records and answers tenant-scoped queries.
#[async_trait]
pub trait ExecutionRecordStore: Send + Sync {
    async fn save(&self, record: &ExecutionRecord) -> Result<(), Report<StoreError>>;

    /// Returns a record, or `None` if it does not exist or belongs to
    /// another tenant.
    async fn load(
        &self,
        execution_id: &ExecutionId,
        tenant_id: &str,
    ) -> Result<Option<ExecutionRecord>, Report<StoreError>>;

    /// Returns a tenant's records for a workflow, oldest first.
    async fn list(
        &self,
        workflow_id: &str,
        tenant_id: &str,
    ) -> Result<Vec<ExecutionRecord>, Report<StoreError>>;
}

/// Supplies the secrets injected into a tenant's runs.
#[async_trait]
pub trait SecretsProvider: Send + Sync {
    async fn secrets_for(&self, tenant_id: &str) -> Result<Secrets, Report<StoreError>>;
}

/// Returns true if a workflow is visible to the tenant.
///
/// Workflows without an owning tenant are visible to every tenant.
#[must_use]
pub fn visible_to(workflow: &Workflow, tenant_id: &str) -> bool {
    workflow
        .tenant_id
        .as_deref()
        .is_none_or(|owner| owner == tenant_id)
}

/// In-process definition, record and secrets store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    workflows: RwLock<HashMap<String, Workflow>>,
    records: RwLock<Vec<ExecutionRecord>>,
    secrets: RwLock<HashMap<String, Secrets>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a workflow definition.
    pub async fn put_workflow(&self, workflow: Workflow) {
        self.workflows
            .write()
            .await
            .insert(workflow.id.clone(), workflow);
    }

    /// Sets the secrets for a tenant.
    pub async fn put_secrets(&self, tenant_id: impl Into<String>, secrets: Secrets) {
        self.secrets.write().await.insert(tenant_id.into(), secrets);
    }

    /// Returns every saved record, oldest first.
    pub async fn records(&self) -> Vec<ExecutionRecord> {
        self.records.read().await.clone()
    }

    /// Returns a saved record by execution ID.
    pub async fn record(&self, execution_id: &ExecutionId) -> Option<ExecutionRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|record| &record.id == execution_id)
            .cloned()
    }
}

#[async_trait]
impl DefinitionStore for InMemoryStore {
    async fn load_workflow(
        &self,
        workflow_id: &str,
        tenant_id: &str,
    ) -> Result<Option<Workflow>, Report<StoreError>> {
        let workflows = self.workflows.read().await;
        Ok(workflows
            .get(workflow_id)
            .filter(|workflow| visible_to(workflow, tenant_id))
            .cloned())
    }
}

#[async_trait]
impl ExecutionRecordStore for InMemoryStore {
    async fn save(&self, record: &ExecutionRecord) -> Result<(), Report<StoreError>> {
        debug!(execution_id = %record.id, "saving execution record");
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn load(
        &self,
        execution_id: &ExecutionId,
        tenant_id: &str,
    ) -> Result<Option<ExecutionRecord>, Report<StoreError>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|record| &record.id == execution_id && record.tenant_id == tenant_id)
            .cloned())
    }

    async fn list(
        &self,
        workflow_id: &str,
        tenant_id: &str,
    ) -> Result<Vec<ExecutionRecord>, Report<StoreError>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|record| record.workflow_id == workflow_id && record.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SecretsProvider for InMemoryStore {
    async fn secrets_for(&self, tenant_id: &str) -> Result<Secrets, Report<StoreError>> {
        Ok(self
            .secrets
            .read()
            .await
            .get(tenant_id)
            .cloned()
            .unwrap_or_default())
    }
}
