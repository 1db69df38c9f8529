//! Request descriptors for intercepted requests.
//!
//! A descriptor is built once per intercepted request and never mutated.
//! It carries only what classification and cache keying need: method,
//! canonical URL, the navigation flag and the resource destination.

pub mod url;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ::url::{Origin, Url};

use crate::cache::hash::compute_cache_key;
pub use self::url::{UrlError, canonicalize};

/// Destination of a request, as reported by the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Document,
    Script,
    Style,
    Image,
    Font,
    #[default]
    Other,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Document => "document",
            ResourceType::Script => "script",
            ResourceType::Style => "style",
            ResourceType::Image => "image",
            ResourceType::Font => "font",
            ResourceType::Other => "other",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = std::convert::Infallible;

    /// Unknown destinations (`fetch`, `worker`, empty) map to `Other`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "document" => ResourceType::Document,
            "script" => ResourceType::Script,
            "style" => ResourceType::Style,
            "image" => ResourceType::Image,
            "font" => ResourceType::Font,
            _ => ResourceType::Other,
        })
    }
}

/// An intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    method: String,
    url: Url,
    navigate: bool,
    destination: ResourceType,
}

impl RequestDescriptor {
    /// Build a descriptor from an already canonical URL.
    pub fn new(method: &str, url: Url) -> Self {
        Self { method: method.trim().to_ascii_uppercase(), url, navigate: false, destination: ResourceType::Other }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    /// Parse a raw URL, resolving relative references against `base`.
    pub fn parse(method: &str, raw: &str, base: &Url) -> Result<Self, UrlError> {
        Ok(Self::new(method, canonicalize(raw, base)?))
    }

    /// Mark the request as a top-level navigation.
    pub fn navigation(mut self) -> Self {
        self.navigate = true;
        self
    }

    pub fn with_destination(mut self, destination: ResourceType) -> Self {
        self.destination = destination;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn origin(&self) -> Origin {
        self.url.origin()
    }

    pub fn is_navigation(&self) -> bool {
        self.navigate
    }

    pub fn destination(&self) -> ResourceType {
        self.destination
    }

    /// Navigations and document loads both render a page.
    pub fn is_document(&self) -> bool {
        self.navigate || self.destination == ResourceType::Document
    }

    /// Store key for this request: method plus canonical URL.
    pub fn cache_key(&self) -> String {
        compute_cache_key(&self.method, self.url.as_str())
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
