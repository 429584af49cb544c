//! Install and activate.

use std::collections::HashSet;

use offcache_core::{CachedResponse, Error};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use super::{LifecycleState, Worker, WorkerEvent};
use crate::fetch::Request;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InstallReport {
    pub version: String,
    /// Store the manifest was written to.
    pub store: String,
    /// Distinct manifest entries now cached.
    pub cached: usize,
    /// State after install, and after activation when skip-waiting applied.
    pub state: LifecycleState,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ActivationReport {
    pub version: String,
    /// Stores from other versions removed by the sweep.
    pub deleted: Vec<String>,
}

impl Worker {
    /// Pre-cache the install manifest into the static store.
    ///
    /// Every manifest URL must come back 2xx or nothing is written and the
    /// state is restored, so install can simply be retried. Reinstalling an
    /// active worker refreshes the manifest without leaving `Active`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstallFailed`] when any manifest fetch or the write
    /// fails, or the activation error when skip-waiting activation fails.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let report = {
            let _transition = self.transition.lock().await;
            let previous = self.state().await;
            let refreshing = previous == LifecycleState::Active;
            if !refreshing {
                self.set_state(LifecycleState::Installing).await;
            }

            let cached = match self.precache_manifest().await {
                Ok(cached) => cached,
                Err(e) => {
                    self.set_state(previous).await;
                    tracing::warn!(version = %self.version, error = %e, "install failed");
                    return Err(Error::InstallFailed(e.to_string()));
                }
            };

            if !refreshing {
                self.set_state(LifecycleState::Waiting).await;
            }
            self.broadcast(WorkerEvent::Installed { version: self.version.clone() });
            tracing::info!(version = %self.version, cached, "installed");

            InstallReport {
                version: self.version.clone(),
                store: self.stores.statics.name().to_string(),
                cached,
                state: self.state().await,
            }
        };

        if self.skip_waiting && report.state == LifecycleState::Waiting {
            self.activate().await?;
            return Ok(InstallReport { state: self.state().await, ..report });
        }
        Ok(report)
    }

    async fn precache_manifest(&self) -> Result<usize, Error> {
        let entries = self.fetch_manifest().await?;
        let cached = entries.iter().map(|(_, url, _)| url.as_str()).collect::<HashSet<_>>().len();
        self.stores.statics.put_all(entries).await?;
        Ok(cached)
    }

    /// Resume a previous run of this version whose manifest is already on disk.
    ///
    /// The worker comes back `Waiting`, and `Active` when skip-waiting is set,
    /// so a restart without network still serves from its stores.
    pub(super) async fn restore(&self) -> Result<(), Error> {
        if !self.manifest_cached().await? {
            return Ok(());
        }
        tracing::info!(version = %self.version, "manifest already cached, resuming");
        self.set_state(LifecycleState::Waiting).await;
        if self.skip_waiting {
            self.activate().await?;
        }
        Ok(())
    }

    async fn manifest_cached(&self) -> Result<bool, Error> {
        if self.precache.is_empty() {
            return Ok(false);
        }
        for url in &self.precache {
            if self.stores.statics.get("GET", url.as_str()).await?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Fetch every manifest URL concurrently. The first failure aborts the rest.
    async fn fetch_manifest(&self) -> Result<Vec<(String, String, CachedResponse)>, Error> {
        let mut set = JoinSet::new();
        for (index, url) in self.precache.iter().cloned().enumerate() {
            let network = self.network.clone();
            set.spawn(async move {
                let request = Request::get(url);
                let result = network.fetch(&request).await;
                (index, request, result)
            });
        }

        let mut fetched = Vec::with_capacity(self.precache.len());
        while let Some(joined) = set.join_next().await {
            let (index, request, result) =
                joined.map_err(|e| Error::Network(format!("manifest fetch aborted: {e}")))?;
            let response = result?;
            if !response.is_success() {
                return Err(Error::HttpError(format!("{} returned {}", request.url, response.status)));
            }
            fetched.push((index, request.url.to_string(), response.to_cached()));
        }

        fetched.sort_by_key(|(index, _, _)| *index);
        Ok(fetched
            .into_iter()
            .map(|(_, url, cached)| ("GET".to_string(), url, cached))
            .collect())
    }

    /// Take control: sweep stores from other versions, claim clients and
    /// start intercepting.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] before a successful install; storage errors
    /// during the sweep, after which the worker is back in `Waiting`.
    pub async fn activate(&self) -> Result<ActivationReport, Error> {
        let _transition = self.transition.lock().await;
        let state = self.state().await;
        if matches!(state, LifecycleState::New | LifecycleState::Installing) {
            return Err(Error::InvalidState(format!("cannot activate from {state:?}")));
        }

        self.set_state(LifecycleState::Activating).await;
        let deleted = match self.sweep_stale_stores().await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.set_state(LifecycleState::Waiting).await;
                tracing::warn!(version = %self.version, error = %e, "activation failed");
                return Err(e);
            }
        };

        *self.controlling.write().await = true;
        self.set_state(LifecycleState::Active).await;
        self.broadcast(WorkerEvent::Activated { version: self.version.clone() });
        tracing::info!(version = %self.version, deleted = deleted.len(), "activated");

        Ok(ActivationReport { version: self.version.clone(), deleted })
    }

    async fn sweep_stale_stores(&self) -> Result<Vec<String>, Error> {
        let keep = self.stores.names();
        let mut deleted = Vec::new();
        for name in self.db.store_names().await? {
            if keep.contains(&name.as_str()) {
                continue;
            }
            if self.db.delete_store(&name).await? {
                tracing::debug!(store = %name, "deleted stale store");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }
}
