//! Request classification.
//!
//! A declared rule table evaluated in priority order; the first rule that
//! returns a classification wins. The last rule always matches, so
//! classification is total and has no error path.
//!
//! | # | Rule | Result |
//! |---|------|--------|
//! | 1 | method is not GET | `Unsupported` |
//! | 2 | origin is a configured API origin | `ApiCall` |
//! | 3 | origin differs from the app origin | `External` |
//! | 4 | navigation or document destination | `AppShell` |
//! | 5 | path matches the API pattern | `ApiCall` |
//! | 6 | cacheable destination, or listed in the manifest/app shell | `StaticAsset` |
//! | 7 | anything else (same origin) | `StaticAsset` |

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::{Origin, Url};

use crate::config::AppConfig;
use crate::request::{RequestDescriptor, ResourceType};
use crate::Error;

/// Result of classifying a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    AppShell,
    StaticAsset,
    ApiCall,
    External,
    Unsupported,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Classification::AppShell => "app_shell",
            Classification::StaticAsset => "static_asset",
            Classification::ApiCall => "api_call",
            Classification::External => "external",
            Classification::Unsupported => "unsupported",
        })
    }
}

/// How the API path pattern is matched against a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMatch {
    /// Path ends with the value (`/exec`).
    Suffix,
    /// Path starts with the value (`/api/`).
    Prefix,
    /// One path segment equals the value (`api`).
    Segment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiPathPattern {
    pub kind: ApiMatch,
    pub value: String,
}

impl ApiPathPattern {
    pub fn suffix(value: impl Into<String>) -> Self {
        Self { kind: ApiMatch::Suffix, value: value.into() }
    }

    pub fn prefix(value: impl Into<String>) -> Self {
        Self { kind: ApiMatch::Prefix, value: value.into() }
    }

    pub fn segment(value: impl Into<String>) -> Self {
        Self { kind: ApiMatch::Segment, value: value.into() }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self.kind {
            ApiMatch::Suffix => path.ends_with(&self.value),
            ApiMatch::Prefix => path.starts_with(&self.value),
            ApiMatch::Segment => {
                let wanted = self.value.trim_matches('/');
                path.split('/').any(|segment| segment == wanted)
            }
        }
    }
}

type Rule = fn(&Classifier, &RequestDescriptor) -> Option<Classification>;

/// Classification rules in priority order.
const RULES: &[(&str, Rule)] = &[
    ("method", rule_method),
    ("api-origin", rule_api_origin),
    ("origin", rule_origin),
    ("document", rule_document),
    ("api-path", rule_api_path),
    ("static", rule_static),
    ("default", rule_default),
];

fn rule_method(_: &Classifier, req: &RequestDescriptor) -> Option<Classification> {
    (req.method() != "GET").then_some(Classification::Unsupported)
}

fn rule_api_origin(c: &Classifier, req: &RequestDescriptor) -> Option<Classification> {
    c.api_origins.contains(&req.origin()).then_some(Classification::ApiCall)
}

fn rule_origin(c: &Classifier, req: &RequestDescriptor) -> Option<Classification> {
    (req.origin() != c.app_origin).then_some(Classification::External)
}

fn rule_document(_: &Classifier, req: &RequestDescriptor) -> Option<Classification> {
    req.is_document().then_some(Classification::AppShell)
}

fn rule_api_path(c: &Classifier, req: &RequestDescriptor) -> Option<Classification> {
    c.api_path.matches(req.path()).then_some(Classification::ApiCall)
}

fn rule_static(c: &Classifier, req: &RequestDescriptor) -> Option<Classification> {
    (c.cacheable_destinations.contains(&req.destination()) || c.static_paths.contains(req.path()))
        .then_some(Classification::StaticAsset)
}

fn rule_default(c: &Classifier, req: &RequestDescriptor) -> Option<Classification> {
    Some(if req.origin() == c.app_origin { Classification::StaticAsset } else { Classification::External })
}

/// Pure, deterministic request classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
    app_origin: Origin,
    api_origins: Vec<Origin>,
    api_path: ApiPathPattern,
    cacheable_destinations: HashSet<ResourceType>,
    static_paths: HashSet<String>,
}

impl Classifier {
    pub fn new(
        app_origin: &Url, api_path: ApiPathPattern, cacheable_destinations: impl IntoIterator<Item = ResourceType>,
    ) -> Self {
        Self {
            app_origin: app_origin.origin(),
            api_origins: Vec::new(),
            api_path,
            cacheable_destinations: cacheable_destinations.into_iter().collect(),
            static_paths: HashSet::new(),
        }
    }

    /// Treat requests to these origins as API calls instead of external.
    pub fn with_api_origins(mut self, origins: impl IntoIterator<Item = Url>) -> Self {
        self.api_origins = origins.into_iter().map(|u| u.origin()).collect();
        self
    }

    /// Paths (absolute, e.g. `/icon-192.png`) that are always static assets.
    pub fn with_static_paths(mut self, paths: impl IntoIterator<Item = String>) -> Self {
        self.static_paths.extend(paths);
        self
    }

    /// Build from application configuration.
    ///
    /// The static manifest and the app-shell list both count as static paths.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = config.app_origin_url()?;
        let api_origins = config
            .api_origins
            .iter()
            .map(|o| Url::parse(o).map_err(|e| Error::InvalidUrl(format!("{o}: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;
        let static_paths = config
            .static_manifest
            .iter()
            .chain(config.app_shell.iter())
            .map(|p| origin.join(p).map(|u| u.path().to_string()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;

        Ok(Self::new(&origin, config.api_path_pattern.clone(), config.cacheable_destinations.iter().copied())
            .with_api_origins(api_origins)
            .with_static_paths(static_paths))
    }

    pub fn classify(&self, request: &RequestDescriptor) -> Classification {
        for &(name, rule) in RULES {
            if let Some(classification) = rule(self, request) {
                tracing::trace!(rule = name, %classification, url = %request.url(), "classified request");
                return classification;
            }
        }
        Classification::External
    }
}
