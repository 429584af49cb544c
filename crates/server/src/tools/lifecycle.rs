//! worker_lifecycle and worker_status tool implementations.

use offcache_client::{ActivationReport, InstallReport, Worker};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    /// Pre-cache the manifest; activates too when skip-waiting is configured.
    Install,
    /// Sweep old-version stores and start intercepting.
    Activate,
}

/// Input parameters for worker_lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerLifecycleParams {
    pub action: LifecycleAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WorkerLifecycleOutput {
    Install(InstallReport),
    Activate(ActivationReport),
}

/// Implementation of the worker_lifecycle tool.
pub async fn lifecycle_impl(worker: &Worker, params: WorkerLifecycleParams) -> Result<CallToolResult, McpError> {
    let output = match params.action {
        LifecycleAction::Install => WorkerLifecycleOutput::Install(worker.install().await?),
        LifecycleAction::Activate => WorkerLifecycleOutput::Activate(worker.activate().await?),
    };
    json_result(&output)
}

/// Implementation of the worker_status tool.
pub async fn status_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    json_result(&worker.status().await?)
}
