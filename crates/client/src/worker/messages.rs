//! Commands posted to the worker by client pages.

use offcache_core::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{LifecycleState, Worker};
use crate::fetch::Request;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Activate a waiting worker without waiting for old pages to close.
    SkipWaiting,
    QueryVersion,
    /// Add these URLs to the dynamic store, all or nothing.
    PreCache { urls: Vec<String> },
    /// Delete every store, current version included.
    ClearCaches,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageReply {
    Activated { version: String, deleted: Vec<String> },
    /// Nothing to do; reports the current state.
    Ack { state: LifecycleState },
    Version { version: String, stores: Vec<String> },
    PreCached { count: usize },
    Cleared { deleted: usize },
}

impl Worker {
    pub async fn handle_message(&self, message: WorkerMessage) -> Result<MessageReply, Error> {
        tracing::debug!(?message, "message received");
        match message {
            WorkerMessage::SkipWaiting => self.skip_waiting_now().await,
            WorkerMessage::QueryVersion => Ok(MessageReply::Version {
                version: self.version.clone(),
                stores: self.stores.names().iter().map(|name| name.to_string()).collect(),
            }),
            WorkerMessage::PreCache { urls } => self.pre_cache(&urls).await,
            WorkerMessage::ClearCaches => self.clear_caches().await,
        }
    }

    async fn skip_waiting_now(&self) -> Result<MessageReply, Error> {
        let state = self.state().await;
        if state != LifecycleState::Waiting {
            return Ok(MessageReply::Ack { state });
        }
        let report = self.activate().await?;
        Ok(MessageReply::Activated { version: report.version, deleted: report.deleted })
    }

    async fn pre_cache(&self, urls: &[String]) -> Result<MessageReply, Error> {
        if urls.is_empty() {
            return Err(Error::InvalidInput("pre_cache needs at least one URL".to_string()));
        }
        let urls = urls.iter().map(|input| self.resolve(input)).collect::<Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(urls.len());
        for url in urls {
            let request = Request::get(url);
            let response = self.network.fetch(&request).await?;
            if !response.is_success() {
                return Err(Error::HttpError(format!("{} returned {}", request.url, response.status)));
            }
            entries.push(("GET".to_string(), request.url.to_string(), response.to_cached()));
        }

        let count = entries.len();
        self.stores.dynamic.put_all(entries).await?;
        tracing::info!(count, store = self.stores.dynamic.name(), "pre-cached");
        Ok(MessageReply::PreCached { count })
    }

    async fn clear_caches(&self) -> Result<MessageReply, Error> {
        let mut deleted = 0;
        for name in self.db.store_names().await? {
            if self.db.delete_store(&name).await? {
                deleted += 1;
            }
        }
        tracing::info!(deleted, "cleared all stores");
        Ok(MessageReply::Cleared { deleted })
    }
}
