//! Runs and validates nodeflow workflows from the command line.
//!
//! The execution response is printed to stdout as JSON; logs go to stderr.

mod fs_store;
mod settings;

use clap::{Parser, Subcommand};
use fs_store::{EnvSecretsProvider, FsDefinitionStore};
use nodeflow_core::ExecutionId;
use nodeflow_executors::Builtins;
use nodeflow_workflow::{
    DefinitionStore, EngineConfig, RunStatus, TriggerRequest, TriggerService, WorkflowEngine,
    WorkflowTrigger,
};
use rootcause::prelude::{Report, ResultExt};
use serde_json::Value as JsonValue;
use settings::RunnerConfig;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "nodeflow-runner", version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON).
    #[arg(long, env = "NODEFLOW_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a workflow once and print its execution record.
    Run {
        workflow_id: String,

        #[arg(long, default_value = "default")]
        tenant: String,

        /// Trigger payload, available to templates as `json`.
        #[arg(long, value_name = "JSON")]
        trigger_data: Option<String>,

        /// Initial run variables.
        #[arg(long, value_name = "JSON")]
        variables: Option<String>,
    },
    /// Check a workflow definition without running it.
    Validate {
        workflow_id: String,

        #[arg(long, default_value = "default")]
        tenant: String,
    },
}

/// Failures of the runner itself, as opposed to failed runs.
#[derive(Debug)]
enum RunnerError {
    Config { reason: String },
    InvalidJson { flag: &'static str, reason: String },
    WorkflowNotFound { workflow_id: String },
    Execution,
    Output { reason: String },
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "invalid configuration: {reason}"),
            Self::InvalidJson { flag, reason } => write!(f, "--{flag} is not valid JSON: {reason}"),
            Self::WorkflowNotFound { workflow_id } => {
                write!(f, "workflow not found: {workflow_id}")
            }
            Self::Execution => write!(f, "workflow could not be executed"),
            Self::Output { reason } => write!(f, "failed to write output: {reason}"),
        }
    }
}

impl std::error::Error for RunnerError {}

fn parse_json(flag: &'static str, raw: Option<String>) -> Result<JsonValue, RunnerError> {
    match raw {
        None => Ok(JsonValue::Null),
        Some(text) => serde_json::from_str(&text).map_err(|e| RunnerError::InvalidJson {
            flag,
            reason: e.to_string(),
        }),
    }
}

struct Runner {
    definitions: Arc<FsDefinitionStore>,
    secrets: Arc<EnvSecretsProvider>,
    engine: Arc<WorkflowEngine>,
}

impl Runner {
    fn new(config: &RunnerConfig) -> Self {
        let registry = Builtins::new()
            .with_http_config(config.http.executor_config())
            .registry();
        let engine = WorkflowEngine::new(Arc::new(registry)).with_config(EngineConfig {
            run_timeout: config.run_timeout(),
        });
        Self {
            definitions: Arc::new(FsDefinitionStore::new(&config.workflows_dir)),
            secrets: Arc::new(EnvSecretsProvider::new(&config.secrets.env_prefix)),
            engine: Arc::new(engine),
        }
    }

    async fn run(
        &self,
        workflow_id: &str,
        tenant: &str,
        trigger_data: JsonValue,
        variables: JsonValue,
    ) -> Result<RunStatus, Report<RunnerError>> {
        let service = TriggerService::new(self.definitions.clone(), Arc::clone(&self.engine))
            .with_secrets_provider(self.secrets.clone());
        let execution_id = ExecutionId::new();
        let request = TriggerRequest {
            trigger_data,
            variables,
            trigger: Some(WorkflowTrigger::manual()),
            execution_id: Some(execution_id),
            ..TriggerRequest::default()
        };

        let run = service.trigger(workflow_id, tenant, request, None);
        tokio::pin!(run);
        let response = tokio::select! {
            response = &mut run => response,
            _ = tokio::signal::ctrl_c() => {
                warn!(%execution_id, "interrupted, cancelling run");
                self.engine.cancel(&execution_id, "interrupted by user");
                run.await
            }
        }
        .context(RunnerError::Execution)?;

        let status = response.status;
        let output = serde_json::to_string_pretty(&response).map_err(|e| RunnerError::Output {
            reason: e.to_string(),
        })?;
        println!("{output}");
        info!(%execution_id, ?status, "run finished");
        Ok(status)
    }

    /// Prints validation messages and returns whether the workflow is valid.
    async fn validate(&self, workflow_id: &str, tenant: &str) -> Result<bool, Report<RunnerError>> {
        let workflow = self
            .definitions
            .load_workflow(workflow_id, tenant)
            .await
            .context(RunnerError::WorkflowNotFound {
                workflow_id: workflow_id.to_string(),
            })?
            .ok_or_else(|| RunnerError::WorkflowNotFound {
                workflow_id: workflow_id.to_string(),
            })?;

        let validation = self.engine.validate_workflow(&workflow);
        for message in &validation.errors {
            println!("error: {message}");
        }
        for message in &validation.warnings {
            println!("warning: {message}");
        }
        if validation.valid {
            println!("{workflow_id}: ok");
        }
        Ok(validation.valid)
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode, Report<RunnerError>> {
    let config = RunnerConfig::load(cli.config.as_deref()).map_err(|e| RunnerError::Config {
        reason: e.to_string(),
    })?;
    info!(workflows_dir = %config.workflows_dir.display(), "loaded configuration");
    let runner = Runner::new(&config);

    match cli.command {
        Command::Run {
            workflow_id,
            tenant,
            trigger_data,
            variables,
        } => {
            let trigger_data = parse_json("trigger-data", trigger_data)?;
            let variables = parse_json("variables", variables)?;
            let status = runner
                .run(&workflow_id, &tenant, trigger_data, variables)
                .await?;
            Ok(exit_code(status == RunStatus::Success))
        }
        Command::Validate {
            workflow_id,
            tenant,
        } => Ok(exit_code(runner.validate(&workflow_id, &tenant).await?)),
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match dispatch(Cli::parse()).await {
        Ok(code) => code,
        Err(report) => {
            error!("{report}");
            ExitCode::FAILURE
        }
    }
}
