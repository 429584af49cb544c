//! cache_fetch tool implementation.
//!
//! Runs a GET through the worker exactly as an intercepted page request would:
//! classified, answered by the route's strategy, or passed straight to the
//! network when the worker is not active or does not handle the URL.

use chrono::Utc;
use offcache_client::{Destination, LifecycleState, Request, ResponseSource, Strategy, Worker, header};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::error::ToolError;

/// Input parameters for cache_fetch.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheFetchParams {
    /// Absolute URL, or a path resolved against the configured origin.
    pub url: String,

    /// Request destination as a browser would set it ("document", "image", ...).
    #[serde(default)]
    pub destination: Destination,

    /// Optional Accept header; `text/html` marks a page navigation.
    #[serde(default)]
    pub accept: Option<String>,
}

/// Output structure for cache_fetch.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheFetchOutput {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// Strategy that answered, or `None` when the request passed through.
    pub strategy: Option<Strategy>,
    pub source: ResponseSource,
    /// Body as text when it is valid UTF-8.
    pub body: Option<String>,
    pub body_bytes: usize,
    /// ISO8601 timestamp of when the response was produced.
    pub served_at: String,
}

/// Implementation of the cache_fetch tool.
pub async fn fetch_impl(worker: &Worker, params: CacheFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(ToolError::InvalidInput("url cannot be empty".into()).into());
    }

    let url = worker.resolve(&params.url)?;
    let mut request = Request::get(url).with_destination(params.destination);
    if let Some(accept) = params.accept.as_deref() {
        request = request.with_header(header::ACCEPT, accept);
    }

    let strategy = match worker.state().await {
        LifecycleState::Active => worker.classify(&request),
        _ => None,
    };
    let response = worker.respond(&request).await?;

    let output = CacheFetchOutput {
        url: response.url.to_string(),
        status: response.status.as_u16(),
        content_type: response.content_type().map(str::to_string),
        strategy,
        source: response.source.clone(),
        body: std::str::from_utf8(&response.body).ok().map(str::to_string),
        body_bytes: response.body.len(),
        served_at: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    };

    json_result(&output)
}
