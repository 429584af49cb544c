//! MCP tool implementations.
//!
//! Each tool maps one inbound worker event (an intercepted fetch, a lifecycle
//! step, a page message, a sync trigger) onto the shared [`Worker`].
//!
//! [`Worker`]: offcache_client::Worker

pub mod fetch;
pub mod lifecycle;
pub mod message;
pub mod outbox;

pub use fetch::{CacheFetchParams, fetch_impl};
pub use lifecycle::{WorkerLifecycleParams, lifecycle_impl, status_impl};
pub use message::{WorkerMessageParams, message_impl};
pub use outbox::{OutboxSubmitParams, OutboxSyncParams, submit_impl, sync_impl};

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use crate::error::ToolError;

/// Pretty JSON text result, the shape every tool returns.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(ToolError::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
