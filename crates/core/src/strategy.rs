//! Strategy selection: classification to strategy descriptor.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::Classification;
use crate::config::AppConfig;

/// The caching strategies the engine can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
    PassThrough,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::CacheFirst => "cache-first",
            StrategyKind::NetworkFirst => "network-first",
            StrategyKind::StaleWhileRevalidate => "stale-while-revalidate",
            StrategyKind::PassThrough => "pass-through",
        })
    }
}

/// Strategy for static assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StaticPolicy {
    #[default]
    StaleWhileRevalidate,
    CacheFirst,
}

/// Strategy for API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiPolicy {
    #[default]
    StaleWhileRevalidate,
    NetworkFirst,
}

/// A selected strategy with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyDescriptor {
    pub kind: StrategyKind,
    pub namespace: String,
    /// Only meaningful for stale-while-revalidate; `None` never expires.
    pub ttl: Option<Duration>,
}

/// Maps classifications to strategies for one namespace.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    namespace: String,
    static_policy: StaticPolicy,
    api_policy: ApiPolicy,
    static_ttl: Option<Duration>,
    api_ttl: Option<Duration>,
}

impl StrategySelector {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            static_policy: StaticPolicy::default(),
            api_policy: ApiPolicy::default(),
            static_ttl: Some(Duration::from_secs(24 * 60 * 60)),
            api_ttl: Some(Duration::from_secs(5 * 60)),
        }
    }

    pub fn with_static_policy(mut self, policy: StaticPolicy, ttl: Option<Duration>) -> Self {
        self.static_policy = policy;
        self.static_ttl = ttl;
        self
    }

    pub fn with_api_policy(mut self, policy: ApiPolicy, ttl: Option<Duration>) -> Self {
        self.api_policy = policy;
        self.api_ttl = ttl;
        self
    }

    pub fn from_config(config: &AppConfig, namespace: impl Into<String>) -> Self {
        Self::new(namespace)
            .with_static_policy(config.static_policy, config.ttl.static_asset())
            .with_api_policy(config.api_policy, config.ttl.api_call())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn select(&self, classification: Classification) -> StrategyDescriptor {
        let (kind, ttl) = match classification {
            Classification::AppShell => (StrategyKind::NetworkFirst, None),
            Classification::StaticAsset => match self.static_policy {
                StaticPolicy::StaleWhileRevalidate => (StrategyKind::StaleWhileRevalidate, self.static_ttl),
                StaticPolicy::CacheFirst => (StrategyKind::CacheFirst, None),
            },
            Classification::ApiCall => match self.api_policy {
                ApiPolicy::StaleWhileRevalidate => (StrategyKind::StaleWhileRevalidate, self.api_ttl),
                ApiPolicy::NetworkFirst => (StrategyKind::NetworkFirst, None),
            },
            Classification::External | Classification::Unsupported => (StrategyKind::PassThrough, None),
        };
        StrategyDescriptor { kind, namespace: self.namespace.clone(), ttl }
    }
}
