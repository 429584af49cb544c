//! Responses handed back to client pages.

use bytes::Bytes;
use offcache_core::CachedResponse;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

/// Where a response came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache { store: String },
    /// Synthetic or placeholder answer used when neither cache nor network could serve.
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl Response {
    /// 2xx responses are the only ones written to a store.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Snapshot for storage. Header values that are not valid UTF-8 are skipped.
    pub fn to_cached(&self) -> CachedResponse {
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        CachedResponse::new(self.status.as_u16(), headers, self.body.to_vec())
    }

    pub fn from_cached(url: Url, cached: CachedResponse, source: ResponseSource) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in &cached.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                headers.append(name, value);
            }
        }
        let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self { url, status, headers, body: Bytes::from(cached.body), source }
    }

    /// The 503 returned when nothing else can answer.
    pub fn unavailable(url: Url, message: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        Self {
            url,
            status: StatusCode::SERVICE_UNAVAILABLE,
            headers,
            body: Bytes::copy_from_slice(message.as_bytes()),
            source: ResponseSource::Fallback,
        }
    }
}
