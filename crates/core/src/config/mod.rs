//! Application configuration with layered loading.
//!
//! Configuration is loaded with figment from two layers:
//!
//! 1. TOML config file (when a path is given)
//! 2. Built-in defaults
//!
//! Nothing is read from the environment. The loaded value is injected into
//! the lifecycle controller; there is no global configuration state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Error;
use crate::classify::ApiPathPattern;
use crate::request::ResourceType;
use crate::strategy::{ApiPolicy, StaticPolicy};

mod validation;

pub use validation::ConfigError;

/// Freshness windows in seconds; 0 means the entry never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlConfig {
    #[serde(default = "default_static_ttl")]
    pub static_asset_secs: u64,

    #[serde(default = "default_api_ttl")]
    pub api_call_secs: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self { static_asset_secs: default_static_ttl(), api_call_secs: default_api_ttl() }
    }
}

impl TtlConfig {
    pub fn static_asset(&self) -> Option<Duration> {
        (self.static_asset_secs > 0).then(|| Duration::from_secs(self.static_asset_secs))
    }

    pub fn api_call(&self) -> Option<Duration> {
        (self.api_call_secs > 0).then(|| Duration::from_secs(self.api_call_secs))
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Release version tag; drives the namespace name and reclamation.
    #[serde(default = "default_version_tag")]
    pub version_tag: String,

    /// Optional namespace prefix (`{prefix}-{tag}`).
    #[serde(default)]
    pub namespace_prefix: Option<String>,

    /// Origin the application is served from.
    #[serde(default = "default_app_origin")]
    pub app_origin: String,

    /// Assets pre-populated at install, in order.
    #[serde(default = "default_app_shell")]
    pub app_shell: Vec<String>,

    /// Stored document served to navigations when the network is down.
    #[serde(default = "default_shell_document")]
    pub shell_document: String,

    /// Additional paths always treated as static assets.
    #[serde(default)]
    pub static_manifest: Vec<String>,

    #[serde(default = "default_api_path_pattern")]
    pub api_path_pattern: ApiPathPattern,

    /// Cross-origin hosts whose requests are API calls rather than external.
    #[serde(default)]
    pub api_origins: Vec<String>,

    #[serde(default = "default_cacheable_destinations")]
    pub cacheable_destinations: Vec<ResourceType>,

    #[serde(default)]
    pub ttl: TtlConfig,

    #[serde(default)]
    pub static_policy: StaticPolicy,

    #[serde(default)]
    pub api_policy: ApiPolicy,

    /// Enable navigation preload on activation.
    #[serde(default = "default_true")]
    pub navigation_preload: bool,

    /// Activate right after install instead of waiting.
    #[serde(default)]
    pub skip_waiting_on_install: bool,

    /// Status of the offline placeholder document.
    #[serde(default = "default_offline_status")]
    pub offline_status: u16,

    /// Body of the offline placeholder document.
    #[serde(default = "default_offline_body")]
    pub offline_body: String,

    /// Path to the SQLite cache store.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for network requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Network request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_version_tag() -> String {
    "v1".into()
}

fn default_app_origin() -> String {
    "http://localhost:8080".into()
}

fn default_app_shell() -> Vec<String> {
    ["/", "/index.html", "/manifest.webmanifest", "/icon-192.png", "/icon-512.png", "/sw.js"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_shell_document() -> String {
    "/index.html".into()
}

fn default_api_path_pattern() -> ApiPathPattern {
    ApiPathPattern::suffix("/exec")
}

fn default_cacheable_destinations() -> Vec<ResourceType> {
    vec![ResourceType::Script, ResourceType::Style, ResourceType::Image, ResourceType::Font]
}

fn default_static_ttl() -> u64 {
    24 * 60 * 60
}

fn default_api_ttl() -> u64 {
    5 * 60
}

fn default_true() -> bool {
    true
}

fn default_offline_status() -> u16 {
    503
}

fn default_offline_body() -> String {
    "<!doctype html><html><head><meta charset=\"utf-8\"><title>Offline</title></head>\
     <body><h1>You are offline</h1><p>This page is not available offline yet.</p></body></html>"
        .into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./shellcache.sqlite")
}

fn default_user_agent() -> String {
    "shellcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version_tag: default_version_tag(),
            namespace_prefix: None,
            app_origin: default_app_origin(),
            app_shell: default_app_shell(),
            shell_document: default_shell_document(),
            static_manifest: Vec::new(),
            api_path_pattern: default_api_path_pattern(),
            api_origins: Vec::new(),
            cacheable_destinations: default_cacheable_destinations(),
            ttl: TtlConfig::default(),
            static_policy: StaticPolicy::default(),
            api_policy: ApiPolicy::default(),
            navigation_preload: true,
            skip_waiting_on_install: false,
            offline_status: default_offline_status(),
            offline_body: default_offline_body(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parsed application origin.
    pub fn app_origin_url(&self) -> Result<Url, Error> {
        Url::parse(&self.app_origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", self.app_origin)))
    }

    /// Load configuration with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. TOML file at `path` (if given)
    /// 2. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read or parsed
    /// - Validation fails after loading
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::LoadFailed(format!("config file not found: {}", path.display())));
            }
            figment = figment.merge(Toml::file(path));
        }

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
