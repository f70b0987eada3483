#![forbid(unsafe_code)]

//! Engine configuration as data.
//!
//! ```toml
//! # dashfilter.toml
//! removal_grace_ms = 5000
//! cache_capacity = 256
//! cross_filters_enabled = true
//! ```
//!
//! ```rust,ignore
//! let config = EngineConfig::from_toml_file("dashfilter.toml")?;
//! let config = EngineConfig::from_json_str(json)?;
//! ```
//!
//! Every field has a default, so a partial file only overrides what it names.
//! Loading validates the result and rejects out-of-range values.

use std::path::Path;

use serde::{Deserialize, Serialize};
use web_time::Duration;

/// Tunable engine behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a deleted filter keeps applying before it is purged.
    pub removal_grace_ms: u64,
    /// Maximum panels held by the query augmentation cache.
    pub cache_capacity: usize,
    /// Ingest chart-emitted cross-filters.
    pub cross_filters_enabled: bool,
    /// Aggregate legacy filter-box filters.
    pub legacy_filters_enabled: bool,
    /// Mark filters whose panels all sit in closed tabs as out of scope.
    pub tab_scope_check: bool,
    /// Reset cascade children's selection when a parent selection changes.
    pub reset_dependents_on_parent_change: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            removal_grace_ms: 5_000,
            cache_capacity: 256,
            cross_filters_enabled: true,
            legacy_filters_enabled: true,
            tab_scope_check: true,
            reset_dependents_on_parent_change: true,
        }
    }
}

/// Upper bound on the removal grace period.
const MAX_REMOVAL_GRACE_MS: u64 = 60 * 60 * 1_000;

impl EngineConfig {
    #[must_use]
    pub fn removal_grace(&self) -> Duration {
        Duration::from_millis(self.removal_grace_ms)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, EngineConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validated()
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, EngineConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_json_str(s: &str) -> Result<Self, EngineConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validated()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EngineConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Validation errors; empty when the config is usable.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.cache_capacity == 0 {
            errors.push("cache_capacity must be at least 1".to_owned());
        }
        if self.removal_grace_ms > MAX_REMOVAL_GRACE_MS {
            errors.push(format!(
                "removal_grace_ms must be at most {MAX_REMOVAL_GRACE_MS}, got {}",
                self.removal_grace_ms
            ));
        }
        errors
    }

    fn validated(self) -> Result<Self, EngineConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(EngineConfigError::Validation(errors))
        }
    }
}

/// Errors loading an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum EngineConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}
