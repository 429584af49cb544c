//! outbox_submit and outbox_sync tool implementations.
//!
//! `outbox_submit` stands in for the contact form posting while the page may
//! be offline; `outbox_sync` is the background-sync trigger.

use offcache_client::{CONTACT_SYNC, SubmitOutcome, Worker};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::error::ToolError;

/// Input parameters for outbox_submit.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OutboxSubmitParams {
    /// Endpoint URL or origin-relative path.
    pub endpoint: String,

    /// Request body, sent as-is.
    pub body: String,

    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Sync tag to queue under if the network is down (default: "contact-sync").
    #[serde(default = "default_tag")]
    pub tag: String,
}

/// Input parameters for outbox_sync.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OutboxSyncParams {
    #[serde(default = "default_tag")]
    pub tag: String,
}

fn default_content_type() -> String {
    "application/x-www-form-urlencoded".into()
}

fn default_tag() -> String {
    CONTACT_SYNC.into()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OutboxSubmitOutput {
    pub endpoint: String,
    pub tag: String,
    #[serde(flatten)]
    pub outcome: SubmitOutcome,
}

/// Implementation of the outbox_submit tool.
pub async fn submit_impl(worker: &Worker, params: OutboxSubmitParams) -> Result<CallToolResult, McpError> {
    if params.endpoint.trim().is_empty() {
        return Err(ToolError::InvalidInput("endpoint cannot be empty".into()).into());
    }

    let outcome = worker
        .submit(&params.tag, &params.endpoint, &params.content_type, params.body.into_bytes())
        .await?;

    json_result(&OutboxSubmitOutput { endpoint: params.endpoint, tag: params.tag, outcome })
}

/// Implementation of the outbox_sync tool.
pub async fn sync_impl(worker: &Worker, params: OutboxSyncParams) -> Result<CallToolResult, McpError> {
    json_result(&worker.sync(&params.tag).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{json, worker};

    fn submit(body: &str) -> OutboxSubmitParams {
        OutboxSubmitParams {
            endpoint: "/submit-form".into(),
            body: body.into(),
            content_type: default_content_type(),
            tag: default_tag(),
        }
    }

    #[test]
    fn test_params_defaults() {
        let params: OutboxSubmitParams = serde_json::from_str(r#"{"endpoint":"/submit-form","body":"a=1"}"#).unwrap();
        assert_eq!(params.tag, "contact-sync");
        assert_eq!(params.content_type, "application/x-www-form-urlencoded");

        let params: OutboxSyncParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.tag, "contact-sync");
    }

    #[tokio::test]
    async fn test_submit_online() {
        let (worker, network) = worker().await;
        network.page("/submit-form", "application/json", "{}");

        let output = json(&submit_impl(&worker, submit("name=a")).await.unwrap());
        assert_eq!(output["outcome"], "sent");
        assert_eq!(output["status"], 200);
    }

    #[tokio::test]
    async fn test_offline_submit_then_sync() {
        let (worker, network) = worker().await;

        let a = json(&submit_impl(&worker, submit("name=a")).await.unwrap());
        let b = json(&submit_impl(&worker, submit("name=b")).await.unwrap());
        assert_eq!(a["outcome"], "queued");
        assert_eq!(b["outcome"], "queued");

        let params = OutboxSyncParams { tag: default_tag() };
        let report = json(&sync_impl(&worker, params.clone()).await.unwrap());
        assert_eq!(report["delivered"].as_array().unwrap().len(), 0);
        assert_eq!(report["pending"].as_array().unwrap().len(), 2);

        network.page("/submit-form", "application/json", "{}");
        let report = json(&sync_impl(&worker, params).await.unwrap());
        assert_eq!(report["delivered"], serde_json::json!([a["id"], b["id"]]));
        assert!(report["pending"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_empty_endpoint() {
        let (worker, _) = worker().await;
        let params = OutboxSubmitParams { endpoint: String::new(), ..submit("x") };
        assert!(submit_impl(&worker, params).await.is_err());
    }
}
