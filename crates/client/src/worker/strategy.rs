//! Fetch strategies.
//!
//! Each strategy turns a request into a response and never fails: a storage
//! error is treated as a miss, and when neither store nor network can answer
//! the caller gets a deterministic fallback (placeholder image, offline page
//! or 503). Refreshes behind a cache hit run as detached tasks and cannot
//! touch the response already returned.

use offcache_core::{CacheStore, Error};
use reqwest::Method;

use super::Worker;
use crate::fetch::{Request, Response, ResponseSource};
use crate::route::Strategy;

impl Worker {
    pub(crate) async fn run_strategy(&self, strategy: Strategy, request: &Request) -> Response {
        match strategy {
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::ImageCacheFirst => self.image_cache_first(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }

    /// Static store, then network. Misses that succeed are stored.
    async fn cache_first(&self, request: &Request) -> Response {
        let store = &self.stores.statics;
        if let Some(hit) = self.lookup(store, request).await {
            return hit;
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                self.store_response(store, request, &response).await;
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "cache-first miss and network failed");
                if request.accepts_html() {
                    self.offline_fallback(request).await
                } else {
                    Response::unavailable(request.url.clone(), "resource unavailable offline")
                }
            }
        }
    }

    /// Image store, then network, then the placeholder image. A hit also
    /// refreshes the stored copy in the background.
    async fn image_cache_first(&self, request: &Request) -> Response {
        let store = &self.stores.images;
        if let Some(hit) = self.lookup(store, request).await {
            self.spawn_refresh(store, request);
            return hit;
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                self.store_response(store, request, &response).await;
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "image unavailable, serving placeholder");
                self.image_fallback(request).await
            }
        }
    }

    /// Network, then the dynamic store, then 503. A live attempt always
    /// comes first.
    async fn network_first(&self, request: &Request) -> Response {
        let store = &self.stores.dynamic;
        match self.network.fetch(request).await {
            Ok(response) => {
                self.store_response(store, request, &response).await;
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "network-first failed, consulting cache");
                match self.lookup(store, request).await {
                    Some(hit) => hit,
                    None => Response::unavailable(request.url.clone(), "service unavailable offline"),
                }
            }
        }
    }

    /// Dynamic store immediately with a background refresh, or on a miss the
    /// network, then the offline page.
    async fn stale_while_revalidate(&self, request: &Request) -> Response {
        let store = &self.stores.dynamic;
        if let Some(hit) = self.lookup(store, request).await {
            self.spawn_refresh(store, request);
            return hit;
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                self.store_response(store, request, &response).await;
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "page unavailable, serving offline page");
                self.offline_fallback(request).await
            }
        }
    }

    async fn lookup(&self, store: &CacheStore, request: &Request) -> Option<Response> {
        match store.get(Method::GET.as_str(), request.url.as_str()).await {
            Ok(Some(cached)) => {
                tracing::debug!(url = %request.url, store = store.name(), "cache hit");
                let source = ResponseSource::Cache { store: store.name().to_string() };
                Some(Response::from_cached(request.url.clone(), cached, source))
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(url = %request.url, store = store.name(), error = %e, "cache read failed");
                None
            }
        }
    }

    /// Store a successful response. Non-2xx responses are returned to the
    /// page but never cached.
    async fn store_response(&self, store: &CacheStore, request: &Request, response: &Response) {
        if !response.is_success() {
            tracing::debug!(url = %request.url, status = response.status.as_u16(), "not caching");
            return;
        }
        if let Err(e) = store
            .put(Method::GET.as_str(), request.url.as_str(), &response.to_cached())
            .await
        {
            tracing::warn!(url = %request.url, store = store.name(), error = %e, "cache write failed");
        }
    }

    fn spawn_refresh(&self, store: &CacheStore, request: &Request) {
        let network = self.network.clone();
        let store = store.clone();
        let request = request.clone();
        self.tasks.spawn("refresh", request.url.to_string(), async move {
            let response = network.fetch(&request).await?;
            if response.is_success() {
                store
                    .put(Method::GET.as_str(), request.url.as_str(), &response.to_cached())
                    .await?;
                tracing::debug!(url = %request.url, store = store.name(), "refreshed");
            }
            Ok::<_, Error>(())
        });
    }

    async fn offline_fallback(&self, request: &Request) -> Response {
        self.precached_fallback(&self.offline_page, request, "offline").await
    }

    async fn image_fallback(&self, request: &Request) -> Response {
        self.precached_fallback(&self.fallback_image, request, "image unavailable offline")
            .await
    }

    /// Serve `fallback` from the static store under the request's URL, or a
    /// 503 if it was never cached.
    async fn precached_fallback(&self, fallback: &url::Url, request: &Request, message: &str) -> Response {
        match self.stores.statics.get(Method::GET.as_str(), fallback.as_str()).await {
            Ok(Some(cached)) => Response::from_cached(request.url.clone(), cached, ResponseSource::Fallback),
            Ok(None) => Response::unavailable(request.url.clone(), message),
            Err(e) => {
                tracing::warn!(fallback = %fallback, error = %e, "fallback read failed");
                Response::unavailable(request.url.clone(), message)
            }
        }
    }
}
