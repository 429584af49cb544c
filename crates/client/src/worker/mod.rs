//! The offline cache manager.
//!
//! A [`Worker`] owns three versioned stores (static, dynamic, image), the
//! route table and a lifecycle state. It answers intercepted requests with
//! one of four strategies, sweeps stores from older versions on activation,
//! and replays queued form submissions on a sync trigger.
//!
//! Requests are only intercepted while the worker is [`LifecycleState::Active`];
//! before that they go straight to the network.

pub mod background;
mod lifecycle;
mod messages;
mod outbox;
mod strategy;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use offcache_core::{AppConfig, CacheDb, CacheStore, Error};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, broadcast};
use url::Url;

use crate::fetch::{self, Network, Request, Response};
use crate::route::{RouteTable, Strategy};

pub use background::BackgroundTasks;
pub use lifecycle::{ActivationReport, InstallReport};
pub use messages::{MessageReply, WorkerMessage};
pub use outbox::{CONTACT_SYNC, SubmitOutcome, SyncReport};

/// Where the worker is in its install/activate cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Constructed, nothing cached yet.
    New,
    Installing,
    /// Installed; an older version may still be in control.
    Waiting,
    Activating,
    /// Intercepting requests.
    Active,
}

/// Broadcast to client pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
    Installed { version: String },
    Activated { version: String },
}

/// The three stores of the running version.
#[derive(Debug, Clone)]
pub struct StoreSet {
    pub statics: CacheStore,
    pub dynamic: CacheStore,
    pub images: CacheStore,
}

impl StoreSet {
    async fn open(db: &CacheDb, config: &AppConfig) -> Result<Self, Error> {
        Ok(Self {
            statics: db.open_store(&config.store_name("static")).await?,
            dynamic: db.open_store(&config.store_name("dynamic")).await?,
            images: db.open_store(&config.store_name("image")).await?,
        })
    }

    /// Names kept on activation; every other store is swept.
    pub fn names(&self) -> [&str; 3] {
        [self.statics.name(), self.dynamic.name(), self.images.name()]
    }
}

/// Per-store summary for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoreStatus {
    pub name: String,
    pub entries: usize,
    /// Belongs to the running version.
    pub current: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerStatus {
    pub version: String,
    pub state: LifecycleState,
    pub controlling: bool,
    pub stores: Vec<StoreStatus>,
    pub outbox_pending: usize,
    pub background_tasks: usize,
}

pub struct Worker {
    version: String,
    origin: Url,
    db: CacheDb,
    network: Arc<dyn Network>,
    routes: RouteTable,
    stores: StoreSet,
    precache: Vec<Url>,
    offline_page: Url,
    fallback_image: Url,
    skip_waiting: bool,
    state: RwLock<LifecycleState>,
    /// Serializes install and activate.
    transition: Mutex<()>,
    controlling: RwLock<bool>,
    events: broadcast::Sender<WorkerEvent>,
    tasks: BackgroundTasks,
}

impl Worker {
    /// Build a worker for the configured version, opening its stores.
    ///
    /// A previous run of the same version whose manifest is still cached is
    /// resumed rather than starting from `New`.
    ///
    /// # Errors
    ///
    /// Fails if the origin or any manifest/fallback URL does not resolve, if a
    /// route list cannot be compiled, or if the stores cannot be opened.
    pub async fn new(config: &AppConfig, db: CacheDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        let origin = fetch::canonicalize(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let resolve = |input: &str| {
            fetch::resolve(&origin, input).map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))
        };

        let precache = config
            .precache
            .iter()
            .map(String::as_str)
            .map(&resolve)
            .collect::<Result<Vec<_>, _>>()?;
        let offline_page = resolve(&config.offline_page)?;
        let fallback_image = resolve(&config.fallback_image)?;

        let routes = RouteTable::from_config(config, origin.clone())?;
        let stores = StoreSet::open(&db, config).await?;
        let (events, _) = broadcast::channel(16);

        let worker = Self {
            version: config.version.clone(),
            origin,
            db,
            network,
            routes,
            stores,
            precache,
            offline_page,
            fallback_image,
            skip_waiting: config.skip_waiting,
            state: RwLock::new(LifecycleState::New),
            transition: Mutex::new(()),
            controlling: RwLock::new(false),
            events,
            tasks: BackgroundTasks::new(),
        };
        worker.restore().await?;
        Ok(worker)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn stores(&self) -> &StoreSet {
        &self.stores
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    async fn set_state(&self, next: LifecycleState) {
        let mut state = self.state.write().await;
        if *state != next {
            tracing::info!(version = %self.version, from = ?*state, to = ?next, "lifecycle transition");
            *state = next;
        }
    }

    /// Whether open client pages have been claimed by this worker.
    pub async fn is_controlling(&self) -> bool {
        *self.controlling.read().await
    }

    /// Receive lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    fn broadcast(&self, event: WorkerEvent) {
        // no receivers is fine; pages may not be listening yet
        let _ = self.events.send(event);
    }

    /// Resolve a page-supplied URL against the origin.
    pub fn resolve(&self, input: &str) -> Result<Url, Error> {
        fetch::resolve(&self.origin, input).map_err(|e| Error::InvalidUrl(e.to_string()))
    }

    /// Strategy that would answer `request`, or `None` for pass-through.
    pub fn classify(&self, request: &Request) -> Option<Strategy> {
        self.routes.classify(request)
    }

    /// Answer an intercepted request.
    ///
    /// Returns `None` when the worker is not active or the request is not
    /// one it handles; the caller should then send it to the network as-is.
    /// When `Some`, the response is always usable: failures have already been
    /// turned into a placeholder, offline page or 503.
    pub async fn handle_fetch(&self, request: &Request) -> Option<Response> {
        if self.state().await != LifecycleState::Active {
            return None;
        }
        let strategy = self.classify(request)?;
        tracing::debug!(url = %request.url, %strategy, "intercepted");
        Some(self.run_strategy(strategy, request).await)
    }

    /// Answer a request, intercepting when possible and otherwise passing it
    /// straight to the network.
    pub async fn respond(&self, request: &Request) -> Result<Response, Error> {
        match self.handle_fetch(request).await {
            Some(response) => Ok(response),
            None => self.network.fetch(request).await,
        }
    }

    /// Wait for in-flight background refreshes.
    pub async fn settle(&self) {
        self.tasks.settle().await;
    }

    pub async fn status(&self) -> Result<WorkerStatus, Error> {
        let current = self.stores.names();
        let mut stores = Vec::new();
        for name in self.db.store_names().await? {
            let entries = self.db.open_store(&name).await?.len().await?;
            let is_current = current.contains(&name.as_str());
            stores.push(StoreStatus { name, entries, current: is_current });
        }

        Ok(WorkerStatus {
            version: self.version.clone(),
            state: self.state().await,
            controlling: self.is_controlling().await,
            stores,
            outbox_pending: self.db.outbox_len().await?,
            background_tasks: self.tasks.pending(),
        })
    }
}
