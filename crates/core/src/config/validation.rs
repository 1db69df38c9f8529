//! Configuration validation rules.
//!
//! Validation logic for `AppConfig` values after they have been loaded
//! from a file or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `version_tag` is empty, and
    /// `ConfigError::Invalid` if:
    /// - `app_origin` or an `api_origins` entry is not an http(s) URL
    /// - an `app_shell`/`static_manifest` path or `shell_document` doesn't start with `/`
    /// - `api_path_pattern.value` is empty
    /// - `offline_status` is a success status or outside 100..=599
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version_tag.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "version_tag".into(),
                hint: "set version_tag to the release version".into(),
            });
        }

        for (field, value) in
            std::iter::once(("app_origin", &self.app_origin)).chain(self.api_origins.iter().map(|o| ("api_origins", o)))
        {
            match url::Url::parse(value) {
                Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
                Ok(_) => return Err(invalid(field, format!("{value} is not an http(s) origin"))),
                Err(e) => return Err(invalid(field, format!("{value}: {e}"))),
            }
        }

        for (field, paths) in [("app_shell", &self.app_shell), ("static_manifest", &self.static_manifest)] {
            if let Some(path) = paths.iter().find(|p| !p.starts_with('/')) {
                return Err(invalid(field, format!("path {path:?} must start with '/'")));
            }
        }
        if !self.shell_document.starts_with('/') {
            return Err(invalid("shell_document", "must start with '/'"));
        }
        if !self.app_shell.contains(&self.shell_document) {
            tracing::warn!(
                shell_document = %self.shell_document,
                "shell_document is not pre-populated by app_shell; offline navigations fall back to the placeholder"
            );
        }

        if self.api_path_pattern.value.is_empty() {
            return Err(invalid("api_path_pattern", "value must not be empty"));
        }

        if (200..300).contains(&self.offline_status) {
            return Err(invalid("offline_status", "must not be a success status"));
        }
        if !(100..=599).contains(&self.offline_status) {
            return Err(invalid("offline_status", "must be a valid HTTP status"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        Ok(())
    }
}
