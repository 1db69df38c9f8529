//! Network layer.
//!
//! The engine talks to the network only through the [`Network`] trait.
//! HTTP error statuses come back as ordinary responses; only transport
//! failures (connection refused, DNS, timeout) are errors. The core imposes
//! no timeout of its own; `FetchClient` applies the configured one.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::{Client, Method, header};
use shellcache_core::{AppConfig, Error, RequestDescriptor};

use crate::response::Response;

/// Header sent on navigations while navigation preload is enabled.
pub const NAVIGATION_PRELOAD_HEADER: &str = "service-worker-navigation-preload";

/// Per-fetch options set by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub navigation_preload: bool,
}

/// Fetches requests from the network.
#[async_trait::async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &RequestDescriptor, options: FetchOptions) -> Result<Response, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "shellcache/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "shellcache/0.1".to_string(), timeout: Duration::from_millis(20000), max_redirects: 5 }
    }
}

impl FetchConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), ..Default::default() }
    }
}

/// reqwest-backed [`Network`].
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: Client,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: &FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http })
    }
}

fn collect_headers(headers: &header::HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    collected
}

#[async_trait::async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &RequestDescriptor, options: FetchOptions) -> Result<Response, Error> {
        let start = Instant::now();
        let method = Method::from_bytes(request.method().as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {}", request.method(), e)))?;

        let mut builder = self.http.request(method, request.url().as_str());
        if options.navigation_preload && request.is_navigation() {
            builder = builder.header(NAVIGATION_PRELOAD_HEADER, "true");
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("{}: {}", request.url(), e)))?;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {}", e)))?;

        tracing::debug!(
            url = %request.url(),
            status,
            bytes = bytes.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched from network"
        );

        Ok(Response::network(status, headers, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "shellcache/0.1");
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app() {
        let app = AppConfig { user_agent: "inventory/2.0".into(), timeout_ms: 1500, ..Default::default() };
        let config = FetchConfig::from_app(&app);
        assert_eq!(config.user_agent, "inventory/2.0");
        assert_eq!(config.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_collect_headers_joins_duplicates() {
        let mut headers = header::HeaderMap::new();
        headers.append(header::CACHE_CONTROL, "no-cache".parse().unwrap());
        headers.append(header::CACHE_CONTROL, "no-store".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "text/html".parse().unwrap());

        let collected = collect_headers(&headers);
        assert_eq!(collected.get("cache-control").unwrap(), "no-cache, no-store");
        assert_eq!(collected.get("content-type").unwrap(), "text/html");
    }

    #[tokio::test]
    async fn test_fetch_client_new() {
        let client = FetchClient::new(&FetchConfig::default());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_network_error() {
        let client = FetchClient::new(&FetchConfig { timeout: Duration::from_millis(500), ..Default::default() }).unwrap();
        let base = url::Url::parse("http://127.0.0.1:9/").unwrap();
        let request = RequestDescriptor::parse("GET", "/index.html", &base).unwrap();

        let result = client.fetch(&request, FetchOptions::default()).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }
}
