//! MCP server handler implementation.
//!
//! Routes tool calls to the shared worker. Every tool is a thin adapter; the
//! behaviour lives in `offcache_client::Worker`.

use std::sync::Arc;

use offcache_client::Worker;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use crate::tools::{
    CacheFetchParams, OutboxSubmitParams, OutboxSyncParams, WorkerLifecycleParams, WorkerMessageParams, fetch_impl,
    lifecycle_impl, message_impl, status_impl, submit_impl, sync_impl,
};

/// The MCP server handler for offcache.
#[derive(Clone)]
pub struct OffcacheServer {
    worker: Arc<Worker>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl OffcacheServer {
    pub fn new(worker: Arc<Worker>) -> Self {
        Self { worker, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Fetch a URL the way a controlled page would: answered from the versioned caches or the network according to its route strategy, with offline fallbacks."
    )]
    async fn cache_fetch(&self, params: Parameters<CacheFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.worker, params.0).await
    }

    #[tool(
        description = "Drive the worker lifecycle. 'install' pre-caches the manifest (atomic, retryable); 'activate' deletes caches from older versions and starts intercepting."
    )]
    async fn worker_lifecycle(&self, params: Parameters<WorkerLifecycleParams>) -> Result<CallToolResult, McpError> {
        lifecycle_impl(&self.worker, params.0).await
    }

    #[tool(description = "Report the worker version, lifecycle state, stores with entry counts, and queued submissions.")]
    async fn worker_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.worker).await
    }

    #[tool(description = "Post a message to the worker: skip_waiting, query_version, pre_cache {urls}, or clear_caches.")]
    async fn worker_message(&self, params: Parameters<WorkerMessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(&self.worker, params.0).await
    }

    #[tool(description = "POST a form submission. Queued in the outbox for background sync if the network is unreachable.")]
    async fn outbox_submit(&self, params: Parameters<OutboxSubmitParams>) -> Result<CallToolResult, McpError> {
        submit_impl(&self.worker, params.0).await
    }

    #[tool(description = "Background-sync trigger: replay queued submissions for a tag in order, removing those delivered.")]
    async fn outbox_sync(&self, params: Parameters<OutboxSyncParams>) -> Result<CallToolResult, McpError> {
        sync_impl(&self.worker, params.0).await
    }
}

impl ServerHandler for OffcacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "offcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::worker;

    #[tokio::test]
    async fn test_all_tools_registered() {
        let (worker, _) = worker().await;
        let server = OffcacheServer::new(worker);

        let mut names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            ["cache_fetch", "outbox_submit", "outbox_sync", "worker_lifecycle", "worker_message", "worker_status"]
        );
    }

    #[tokio::test]
    async fn test_server_info() {
        let (worker, _) = worker().await;
        let info = OffcacheServer::new(worker).get_info();
        assert_eq!(info.server_info.name, "offcache");
        assert!(info.capabilities.tools.is_some());
    }
}
