//! worker_message tool implementation.

use offcache_client::{Worker, WorkerMessage};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Input parameters for worker_message.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerMessageParams {
    /// e.g. `{"type": "pre_cache", "urls": ["/projects/"]}`
    pub message: WorkerMessage,
}

pub async fn message_impl(worker: &Worker, params: WorkerMessageParams) -> Result<CallToolResult, McpError> {
    json_result(&worker.handle_message(params.message).await?)
}
