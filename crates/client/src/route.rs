//! Route classification.
//!
//! Maps a request to the strategy that answers it. The policy is a single
//! ordered table of (matcher, strategy) rules; the first matching rule wins
//! and the last rule always matches.

use std::fmt;

use offcache_core::{AppConfig, Error};
use regex::Regex;
use reqwest::Method;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::fetch::{Destination, Request};

/// How a request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
    ImageCacheFirst,
    StaleWhileRevalidate,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::NetworkFirst => "network-first",
            Strategy::CacheFirst => "cache-first",
            Strategy::ImageCacheFirst => "image-cache-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        };
        f.write_str(name)
    }
}

/// Predicate half of a rule.
#[derive(Debug, Clone)]
pub enum Matcher {
    Destination(Destination),
    /// Case-insensitive file extension on the URL path.
    Extension(Regex),
    /// `http(s)://` entries match the start of the full URL, others the start of the path.
    Prefix(Vec<String>),
    Always,
}

impl Matcher {
    /// Build an extension matcher; `None` when the list is empty.
    pub fn extensions(extensions: &[String]) -> Result<Option<Self>, Error> {
        let alternatives: Vec<String> = extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.'))
            .filter(|ext| !ext.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Ok(None);
        }

        let pattern = format!(r"(?i)\.(?:{})$", alternatives.join("|"));
        let regex = Regex::new(&pattern).map_err(|e| Error::InvalidInput(format!("extension list: {e}")))?;
        Ok(Some(Matcher::Extension(regex)))
    }

    pub fn matches(&self, request: &Request) -> bool {
        match self {
            Matcher::Destination(destination) => request.destination == *destination,
            Matcher::Extension(regex) => regex.is_match(request.url.path()),
            Matcher::Prefix(prefixes) => prefixes.iter().any(|prefix| {
                if prefix.starts_with("http://") || prefix.starts_with("https://") {
                    request.url.as_str().starts_with(prefix.as_str())
                } else {
                    request.url.path().starts_with(prefix.as_str())
                }
            }),
            Matcher::Always => true,
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    matcher: Matcher,
    strategy: Strategy,
}

/// Ordered classification table plus the request filters that bypass it.
#[derive(Debug, Clone)]
pub struct RouteTable {
    origin: Url,
    allowlist_hosts: Vec<String>,
    rules: Vec<Rule>,
}

impl RouteTable {
    /// Build the table from config, in priority order:
    /// images, network-first prefixes, cache-first prefixes and extensions,
    /// then stale-while-revalidate for everything else.
    pub fn from_config(config: &AppConfig, origin: Url) -> Result<Self, Error> {
        let mut table = Self { origin, allowlist_hosts: config.allowlist_hosts.clone(), rules: Vec::new() };

        table.push(Matcher::Destination(Destination::Image), Strategy::ImageCacheFirst);
        if let Some(matcher) = Matcher::extensions(&config.image_extensions)? {
            table.push(matcher, Strategy::ImageCacheFirst);
        }
        table.push(Matcher::Prefix(config.network_first_prefixes.clone()), Strategy::NetworkFirst);
        table.push(Matcher::Prefix(config.cache_first_prefixes.clone()), Strategy::CacheFirst);
        if let Some(matcher) = Matcher::extensions(&config.cache_first_extensions)? {
            table.push(matcher, Strategy::CacheFirst);
        }
        table.push(Matcher::Always, Strategy::StaleWhileRevalidate);

        Ok(table)
    }

    fn push(&mut self, matcher: Matcher, strategy: Strategy) {
        self.rules.push(Rule { matcher, strategy });
    }

    /// Pick the strategy for `request`, or `None` when it must pass through
    /// untouched (non-GET, non-HTTP, or a host outside the allow-list).
    pub fn classify(&self, request: &Request) -> Option<Strategy> {
        if request.method != Method::GET {
            return None;
        }
        if !matches!(request.url.scheme(), "http" | "https") {
            return None;
        }
        if !self.host_allowed(&request.url) {
            return None;
        }

        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(request))
            .map(|rule| rule.strategy)
    }

    fn host_allowed(&self, url: &Url) -> bool {
        if self.allowlist_hosts.is_empty() {
            return true;
        }
        match url.host_str() {
            Some(host) => {
                Some(host) == self.origin.host_str() || self.allowlist_hosts.iter().any(|h| h.eq_ignore_ascii_case(host))
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        let origin = Url::parse("https://site.test").unwrap();
        RouteTable::from_config(&AppConfig::default(), origin).unwrap()
    }

    fn get(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_non_get_ignored() {
        let request = Request::new(Method::POST, Url::parse("https://site.test/contact").unwrap());
        assert_eq!(table().classify(&request), None);
    }

    #[test]
    fn test_non_http_scheme_ignored() {
        let request = get("chrome-extension://abcdef/content.js");
        assert_eq!(table().classify(&request), None);
    }

    #[test]
    fn test_image_by_extension() {
        assert_eq!(table().classify(&get("https://site.test/gallery/a.PNG")), Some(Strategy::ImageCacheFirst));
        assert_eq!(table().classify(&get("https://site.test/x/photo.jpeg")), Some(Strategy::ImageCacheFirst));
    }

    #[test]
    fn test_image_by_destination() {
        let request = get("https://site.test/render?id=3").with_destination(Destination::Image);
        assert_eq!(table().classify(&request), Some(Strategy::ImageCacheFirst));
    }

    #[test]
    fn test_image_wins_over_cache_first_prefix() {
        assert_eq!(
            table().classify(&get("https://site.test/assets/images/hero.webp")),
            Some(Strategy::ImageCacheFirst)
        );
    }

    #[test]
    fn test_image_wins_over_network_first_prefix() {
        assert_eq!(table().classify(&get("https://site.test/api/avatar.png")), Some(Strategy::ImageCacheFirst));
    }

    #[test]
    fn test_network_first_prefixes() {
        assert_eq!(table().classify(&get("https://site.test/api/projects")), Some(Strategy::NetworkFirst));
        assert_eq!(table().classify(&get("https://site.test/contact")), Some(Strategy::NetworkFirst));
        assert_eq!(table().classify(&get("https://site.test/submit-form?x=1")), Some(Strategy::NetworkFirst));
    }

    #[test]
    fn test_network_first_wins_over_extension() {
        assert_eq!(table().classify(&get("https://site.test/api/config.js")), Some(Strategy::NetworkFirst));
    }

    #[test]
    fn test_cache_first_prefix_and_extension() {
        assert_eq!(table().classify(&get("https://site.test/fonts/display.woff2")), Some(Strategy::CacheFirst));
        assert_eq!(table().classify(&get("https://site.test/bundle.css")), Some(Strategy::CacheFirst));
        assert_eq!(
            table().classify(&get("https://cdn.jsdelivr.net/npm/lib@1/dist/lib.min.js")),
            Some(Strategy::CacheFirst)
        );
    }

    #[test]
    fn test_absolute_prefix_does_not_match_path() {
        // "/assets/" is a path prefix; it must not match a query containing it
        assert_eq!(
            table().classify(&get("https://site.test/search?q=/assets/")),
            Some(Strategy::StaleWhileRevalidate)
        );
    }

    #[test]
    fn test_default_is_stale_while_revalidate() {
        assert_eq!(table().classify(&get("https://site.test/")), Some(Strategy::StaleWhileRevalidate));
        assert_eq!(
            table().classify(&get("https://site.test/projects/orbit")),
            Some(Strategy::StaleWhileRevalidate)
        );
    }

    #[test]
    fn test_allowlist_filters_foreign_hosts() {
        let config = AppConfig { allowlist_hosts: vec!["cdn.jsdelivr.net".into()], ..Default::default() };
        let table = RouteTable::from_config(&config, Url::parse("https://site.test").unwrap()).unwrap();

        assert_eq!(table.classify(&get("https://tracker.example/pixel")), None);
        assert_eq!(table.classify(&get("https://cdn.jsdelivr.net/x.js")), Some(Strategy::CacheFirst));
        assert_eq!(table.classify(&get("https://site.test/about")), Some(Strategy::StaleWhileRevalidate));
    }

    #[test]
    fn test_empty_extension_list_skips_rule() {
        let config = AppConfig { image_extensions: Vec::new(), ..Default::default() };
        let table = RouteTable::from_config(&config, Url::parse("https://site.test").unwrap()).unwrap();
        assert_eq!(table.classify(&get("https://site.test/a.png")), Some(Strategy::StaleWhileRevalidate));
    }

    #[test]
    fn test_strategy_display_matches_serde() {
        for strategy in [
            Strategy::NetworkFirst,
            Strategy::CacheFirst,
            Strategy::ImageCacheFirst,
            Strategy::StaleWhileRevalidate,
        ] {
            let json = serde_json::to_string(&strategy).unwrap();
            assert_eq!(json, format!("\"{strategy}\""));
        }
    }
}
