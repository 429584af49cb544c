//! Scripted network and worker fixtures for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use offcache_core::{AppConfig, CacheDb, Error};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use tokio::sync::Semaphore;

use super::{LifecycleState, Worker};
use crate::fetch::{Network, Request, Response, ResponseSource};

pub(crate) const ORIGIN: &str = "https://site.test";

pub(crate) fn url(path: &str) -> String {
    format!("{ORIGIN}{path}")
}

#[derive(Clone)]
enum Reply {
    Respond { status: u16, content_type: String, body: Vec<u8> },
    Fail,
    TooLarge,
}

/// In-process network with per-URL replies.
///
/// Unknown URLs fail like an unreachable host. When gated, every fetch waits
/// for a permit before answering.
pub(crate) struct MockNetwork {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<(Method, String)>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockNetwork {
    pub(crate) fn new() -> Self {
        Self { replies: Mutex::new(HashMap::new()), calls: Mutex::new(Vec::new()), gate: None }
    }

    pub(crate) fn gated(gate: Arc<Semaphore>) -> Self {
        Self { gate: Some(gate), ..Self::new() }
    }

    pub(crate) fn respond(&self, url: &str, status: u16, content_type: &str, body: &str) {
        self.replies.lock().unwrap().insert(
            url.to_string(),
            Reply::Respond { status, content_type: content_type.to_string(), body: body.as_bytes().to_vec() },
        );
    }

    pub(crate) fn fail(&self, url: &str) {
        self.replies.lock().unwrap().insert(url.to_string(), Reply::Fail);
    }

    /// Answer `url` with a body over the size cap.
    pub(crate) fn oversized(&self, url: &str) {
        self.replies.lock().unwrap().insert(url.to_string(), Reply::TooLarge);
    }

    pub(crate) fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(_, u)| u == url).count()
    }

    pub(crate) fn calls_with(&self, method: Method, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, u)| *m == method && u == url)
            .count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls
            .lock()
            .unwrap()
            .push((request.method.clone(), request.url.to_string()));

        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.map_err(|e| Error::Network(e.to_string()))?;
            permit.forget();
        }

        let reply = self.replies.lock().unwrap().get(request.url.as_str()).cloned();
        match reply {
            Some(Reply::Respond { status, content_type, body }) => {
                let mut headers = HeaderMap::new();
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(&content_type).unwrap());
                Ok(Response {
                    url: request.url.clone(),
                    status: StatusCode::from_u16(status).unwrap(),
                    headers,
                    body: Bytes::from(body),
                    source: ResponseSource::Network,
                })
            }
            Some(Reply::TooLarge) => Err(Error::FetchTooLarge(format!("{} body over limit", request.url))),
            Some(Reply::Fail) | None => Err(Error::Network(format!("{} unreachable", request.url))),
        }
    }
}

/// Config with an empty store prefix so store names read `static-v1` etc.
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        origin: ORIGIN.to_string(),
        version: "v1".to_string(),
        store_prefix: String::new(),
        precache: vec!["/".into(), "/offline.html".into(), "/img/fallback.png".into()],
        offline_page: "/offline.html".into(),
        fallback_image: "/img/fallback.png".into(),
        ..Default::default()
    }
}

/// Script successful replies for every manifest URL in `test_config`.
pub(crate) fn seed_manifest(network: &MockNetwork) {
    network.respond(&url("/"), 200, "text/html", "<h1>home</h1>");
    network.respond(&url("/offline.html"), 200, "text/html", "<h1>offline</h1>");
    network.respond(&url("/img/fallback.png"), 200, "image/png", "fallback-png");
}

/// Installed and activated worker over an in-memory database.
pub(crate) async fn active_worker(network: Arc<MockNetwork>) -> Worker {
    active_worker_with(network, CacheDb::open_in_memory().await.unwrap(), test_config()).await
}

pub(crate) async fn active_worker_with(network: Arc<MockNetwork>, db: CacheDb, config: AppConfig) -> Worker {
    seed_manifest(&network);
    let worker = Worker::new(&config, db, network).await.unwrap();
    worker.install().await.unwrap();
    assert_eq!(worker.state().await, LifecycleState::Active);
    worker
}
