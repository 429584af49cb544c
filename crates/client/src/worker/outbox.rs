//! Offline form submissions and their replay on a sync trigger.
//!
//! Delivery is at-least-once: an entry is deleted only after the endpoint
//! answered 2xx, so a crash between delivery and delete replays it.

use offcache_core::{Error, NewOutboxEntry, OutboxEntry};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use super::Worker;
use crate::fetch::Request;

/// Tag used by the contact form.
pub const CONTACT_SYNC: &str = "contact-sync";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The endpoint answered; `status` may still be an error status.
    Sent { status: u16 },
    /// The network was unreachable; the submission waits for the next sync.
    Queued { id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SyncReport {
    pub tag: String,
    pub delivered: Vec<i64>,
    pub pending: Vec<i64>,
}

impl Worker {
    /// POST `payload` to `endpoint`, queueing it under `tag` if the network
    /// is unreachable.
    pub async fn submit(
        &self, tag: &str, endpoint: &str, content_type: &str, payload: Vec<u8>,
    ) -> Result<SubmitOutcome, Error> {
        if tag.trim().is_empty() {
            return Err(Error::InvalidInput("sync tag is empty".to_string()));
        }
        let url = self.resolve(endpoint)?;
        let request = Request::post(url.clone(), content_type, payload.clone());

        match self.network.fetch(&request).await {
            Ok(response) => Ok(SubmitOutcome::Sent { status: response.status.as_u16() }),
            Err(e) if e.is_network() => {
                let id = self
                    .db
                    .enqueue_outbox(NewOutboxEntry {
                        tag: tag.to_string(),
                        endpoint: url.to_string(),
                        content_type: content_type.to_string(),
                        payload,
                    })
                    .await?;
                tracing::info!(id, tag, endpoint = %url, error = %e, "submission queued for sync");
                Ok(SubmitOutcome::Queued { id })
            }
            Err(e) => Err(e),
        }
    }

    /// Replay every entry queued under `tag`, oldest first.
    ///
    /// Entries that fail to reach the endpoint or come back non-2xx stay
    /// queued for the next trigger.
    pub async fn sync(&self, tag: &str) -> Result<SyncReport, Error> {
        let entries = self.db.list_outbox(Some(tag)).await?;
        if entries.is_empty() {
            if tag == CONTACT_SYNC {
                tracing::debug!(tag, "nothing to sync");
            } else {
                tracing::info!(tag, "sync for unknown tag drained nothing");
            }
        }

        let mut report = SyncReport { tag: tag.to_string(), delivered: Vec::new(), pending: Vec::new() };
        for entry in entries {
            let id = entry.id;
            if self.replay(entry).await {
                report.delivered.push(id);
            } else {
                report.pending.push(id);
            }
        }

        tracing::info!(
            tag,
            delivered = report.delivered.len(),
            pending = report.pending.len(),
            "sync finished"
        );
        Ok(report)
    }

    /// Deliver one entry and delete it on success. Returns whether it left the queue.
    async fn replay(&self, entry: OutboxEntry) -> bool {
        let url = match Url::parse(&entry.endpoint) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(id = entry.id, endpoint = %entry.endpoint, error = %e, "unparsable outbox endpoint");
                return false;
            }
        };

        let request = Request::post(url, &entry.content_type, entry.payload);
        match self.network.fetch(&request).await {
            Ok(response) if response.is_success() => match self.db.delete_outbox(entry.id).await {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(id = entry.id, error = %e, "delivered but could not dequeue");
                    false
                }
            },
            Ok(response) => {
                tracing::debug!(id = entry.id, status = response.status.as_u16(), "replay rejected, keeping");
                false
            }
            Err(e) if !e.is_network() => {
                // the endpoint answered; replaying would deliver it twice
                tracing::warn!(id = entry.id, error = %e, "delivered but response unreadable, dequeuing");
                match self.db.delete_outbox(entry.id).await {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(id = entry.id, error = %e, "delivered but could not dequeue");
                        false
                    }
                }
            }
            Err(e) => {
                tracing::debug!(id = entry.id, error = %e, "replay failed, keeping");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reqwest::Method;

    use super::*;
    use crate::worker::testing::{MockNetwork, active_worker, url};

    const FORM: &str = "application/x-www-form-urlencoded";

    #[tokio::test]
    async fn test_submit_online_is_sent() {
        let network = Arc::new(MockNetwork::new());
        let worker = active_worker(network.clone()).await;
        network.respond(&url("/submit-form"), 200, "application/json", "{}");

        let outcome = worker.submit(CONTACT_SYNC, "/submit-form", FORM, b"name=a".to_vec()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Sent { status: 200 });
        assert_eq!(worker.db.outbox_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_submit_rejected_is_not_queued() {
        let network = Arc::new(MockNetwork::new());
        let worker = active_worker(network.clone()).await;
        network.respond(&url("/submit-form"), 422, "application/json", "{}");

        let outcome = worker.submit(CONTACT_SYNC, "/submit-form", FORM, b"name=".to_vec()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Sent { status: 422 });
        assert_eq!(worker.db.outbox_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offline_submissions_replay_in_order() {
        let network = Arc::new(MockNetwork::new());
        let worker = active_worker(network.clone()).await;

        let a = worker.submit(CONTACT_SYNC, "/submit-form", FORM, b"A".to_vec()).await.unwrap();
        let b = worker.submit(CONTACT_SYNC, "/submit-form", FORM, b"B".to_vec()).await.unwrap();
        let (SubmitOutcome::Queued { id: a }, SubmitOutcome::Queued { id: b }) = (a, b) else {
            panic!("expected both submissions to be queued");
        };
        assert!(a < b);

        network.respond(&url("/submit-form"), 200, "application/json", "{}");
        let report = worker.sync(CONTACT_SYNC).await.unwrap();
        assert_eq!(report.delivered, vec![a, b]);
        assert!(report.pending.is_empty());
        assert_eq!(worker.db.outbox_len().await.unwrap(), 0);
        // two failed submits, two replays
        assert_eq!(network.calls_with(Method::POST, &url("/submit-form")), 4);
    }

    #[tokio::test]
    async fn test_partial_delivery_keeps_failures() {
        let network = Arc::new(MockNetwork::new());
        let worker = active_worker(network.clone()).await;

        let SubmitOutcome::Queued { id: a } =
            worker.submit(CONTACT_SYNC, "/api/a", FORM, b"A".to_vec()).await.unwrap()
        else {
            panic!("expected A to be queued");
        };
        let SubmitOutcome::Queued { id: b } =
            worker.submit(CONTACT_SYNC, "/api/b", FORM, b"B".to_vec()).await.unwrap()
        else {
            panic!("expected B to be queued");
        };

        network.respond(&url("/api/a"), 201, "application/json", "{}");
        network.respond(&url("/api/b"), 500, "text/plain", "boom");
        let report = worker.sync(CONTACT_SYNC).await.unwrap();
        assert_eq!(report.delivered, vec![a]);
        assert_eq!(report.pending, vec![b]);

        let left = worker.db.list_outbox(Some(CONTACT_SYNC)).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].payload, b"B");

        network.respond(&url("/api/b"), 200, "application/json", "{}");
        let report = worker.sync(CONTACT_SYNC).await.unwrap();
        assert_eq!(report.delivered, vec![b]);
        assert_eq!(worker.db.outbox_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sync_only_drains_its_tag() {
        let network = Arc::new(MockNetwork::new());
        let worker = active_worker(network.clone()).await;
        worker.submit("newsletter-sync", "/api/subscribe", FORM, b"x".to_vec()).await.unwrap();
        network.respond(&url("/api/subscribe"), 200, "application/json", "{}");

        let report = worker.sync(CONTACT_SYNC).await.unwrap();
        assert!(report.delivered.is_empty());
        assert_eq!(worker.db.outbox_len().await.unwrap(), 1);

        let report = worker.sync("unknown-tag").await.unwrap();
        assert!(report.delivered.is_empty() && report.pending.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_reply_is_not_queued() {
        let network = Arc::new(MockNetwork::new());
        let worker = active_worker(network.clone()).await;
        network.oversized(&url("/submit-form"));

        let err = worker.submit(CONTACT_SYNC, "/submit-form", FORM, b"name=a".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::FetchTooLarge(_)));
        assert_eq!(worker.db.outbox_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_oversized_replay_is_dequeued_once() {
        let network = Arc::new(MockNetwork::new());
        let worker = active_worker(network.clone()).await;
        let SubmitOutcome::Queued { id } =
            worker.submit(CONTACT_SYNC, "/submit-form", FORM, b"A".to_vec()).await.unwrap()
        else {
            panic!("expected the submission to be queued");
        };

        network.oversized(&url("/submit-form"));
        let report = worker.sync(CONTACT_SYNC).await.unwrap();
        assert_eq!(report.delivered, vec![id]);
        assert_eq!(worker.db.outbox_len().await.unwrap(), 0);

        worker.sync(CONTACT_SYNC).await.unwrap();
        assert_eq!(network.calls_with(Method::POST, &url("/submit-form")), 2);
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_tag() {
        let worker = active_worker(Arc::new(MockNetwork::new())).await;
        let err = worker.submit(" ", "/submit-form", FORM, vec![]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
