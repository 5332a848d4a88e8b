//! File-backed definition store and environment-backed secrets.

use async_trait::async_trait;
use nodeflow_core::Secrets;
use nodeflow_workflow::store::visible_to;
use nodeflow_workflow::{DefinitionStore, SecretsProvider, StoreError, Workflow};
use rootcause::prelude::Report;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

/// Reads `<dir>/<workflow-id>.json`.
#[derive(Debug, Clone)]
pub struct FsDefinitionStore {
    dir: PathBuf,
}

impl FsDefinitionStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Maps an ID to its file, refusing IDs that would leave the directory.
    fn path_for(&self, workflow_id: &str) -> Option<PathBuf> {
        let safe = !workflow_id.is_empty()
            && workflow_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !workflow_id.starts_with('.');
        safe.then(|| self.dir.join(format!("{workflow_id}.json")))
    }
}

#[async_trait]
impl DefinitionStore for FsDefinitionStore {
    async fn load_workflow(
        &self,
        workflow_id: &str,
        tenant_id: &str,
    ) -> Result<Option<Workflow>, Report<StoreError>> {
        let Some(path) = self.path_for(workflow_id) else {
            debug!(workflow_id, "rejecting workflow id");
            return Ok(None);
        };
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StoreError::Io {
                    reason: format!("{}: {err}", path.display()),
                }
                .into());
            }
        };
        let workflow: Workflow = serde_json::from_str(&text).map_err(|e| StoreError::Decode {
            reason: format!("{}: {e}", path.display()),
        })?;
        if workflow.id != workflow_id {
            return Err(StoreError::Decode {
                reason: format!(
                    "{} declares id '{}', expected '{workflow_id}'",
                    path.display(),
                    workflow.id
                ),
            }
            .into());
        }
        Ok(visible_to(&workflow, tenant_id).then_some(workflow))
    }
}

/// Collects environment variables with a prefix as secrets.
///
/// `NODEFLOW_SECRET_API_KEY=...` becomes `secrets.API_KEY`. Every tenant
/// receives the same set.
#[derive(Debug, Clone)]
pub struct EnvSecretsProvider {
    prefix: String,
}

impl EnvSecretsProvider {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn collect<I>(&self, vars: I) -> Secrets
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut secrets = Secrets::new();
        for (name, value) in vars {
            if let Some(key) = name.strip_prefix(&self.prefix) {
                if !key.is_empty() {
                    secrets.insert(key, value);
                }
            }
        }
        secrets
    }
}

#[async_trait]
impl SecretsProvider for EnvSecretsProvider {
    async fn secrets_for(&self, tenant_id: &str) -> Result<Secrets, Report<StoreError>> {
        let secrets = self.collect(std::env::vars());
        debug!(tenant_id, count = secrets.len(), "loaded secrets from environment");
        Ok(secrets)
    }
}
