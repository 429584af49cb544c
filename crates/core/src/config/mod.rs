//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFCACHE_*)
//! 2. TOML config file (if OFFCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OFFCACHE_*)
/// 2. TOML config file (if OFFCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding stores and the outbox.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin the worker serves; relative URLs resolve against it.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Version tag embedded in every store name.
    ///
    /// Bumping it orphans all stores of the previous version; they are
    /// deleted on the next activation.
    #[serde(default = "default_version")]
    pub version: String,

    /// Optional prefix for store names (`{prefix}-{kind}-{version}`).
    #[serde(default = "default_store_prefix")]
    pub store_prefix: String,

    /// URLs fetched into the static store on install.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Page served when an HTML request cannot be answered.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Placeholder served when an image cannot be answered.
    #[serde(default = "default_fallback_image")]
    pub fallback_image: String,

    /// Prefixes that always try the network first (APIs, form endpoints).
    #[serde(default = "default_network_first_prefixes")]
    pub network_first_prefixes: Vec<String>,

    /// Prefixes served cache-first (static assets, fonts, CDN hosts).
    #[serde(default = "default_cache_first_prefixes")]
    pub cache_first_prefixes: Vec<String>,

    /// File extensions served cache-first.
    #[serde(default = "default_cache_first_extensions")]
    pub cache_first_extensions: Vec<String>,

    /// File extensions treated as images.
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    /// Third-party hosts the worker may intercept.
    ///
    /// Empty means no host filtering.
    #[serde(default)]
    pub allowlist_hosts: Vec<String>,

    /// Activate as soon as install completes instead of waiting.
    #[serde(default = "default_true")]
    pub skip_waiting: bool,

    /// User-Agent string for outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to read per response.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Transport timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./offcache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:4321".into()
}

fn default_version() -> String {
    "v1".into()
}

fn default_store_prefix() -> String {
    "offcache".into()
}

fn default_precache() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/offline.html",
        "/manifest.json",
        "/assets/images/fallback.webp",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_offline_page() -> String {
    "/offline.html".into()
}

fn default_fallback_image() -> String {
    "/assets/images/fallback.webp".into()
}

fn default_network_first_prefixes() -> Vec<String> {
    ["/api/", "/contact", "/submit-form"].into_iter().map(String::from).collect()
}

fn default_cache_first_prefixes() -> Vec<String> {
    [
        "/assets/",
        "/images/",
        "/icons/",
        "/fonts/",
        "https://cdn.jsdelivr.net/",
        "https://cdnjs.cloudflare.com/",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_cache_first_extensions() -> Vec<String> {
    ["css", "js", "woff", "woff2", "ttf"].into_iter().map(String::from).collect()
}

fn default_image_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "webp", "avif", "gif", "svg"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_user_agent() -> String {
    "offcache/0.1".into()
}

fn default_max_bytes() -> usize {
    10_485_760 // 10MB
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            version: default_version(),
            store_prefix: default_store_prefix(),
            precache: default_precache(),
            offline_page: default_offline_page(),
            fallback_image: default_fallback_image(),
            network_first_prefixes: default_network_first_prefixes(),
            cache_first_prefixes: default_cache_first_prefixes(),
            cache_first_extensions: default_cache_first_extensions(),
            image_extensions: default_image_extensions(),
            allowlist_hosts: Vec::new(),
            skip_waiting: true,
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Store name for `kind` under the running version.
    pub fn store_name(&self, kind: &str) -> String {
        if self.store_prefix.is_empty() {
            format!("{kind}-{}", self.version)
        } else {
            format!("{}-{kind}-{}", self.store_prefix, self.version)
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OFFCACHE_`
    /// 2. TOML file from `OFFCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file or environment cannot be parsed, or
    /// if validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("OFFCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("OFFCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
