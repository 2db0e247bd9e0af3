//! Cache Configuration
//!
//! Controls what a snapshot does after each mutating call. Configurations
//! can be built in code or loaded from JSON.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How a refresh treats nodes whose inputs are missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    /// The first missing input fails the whole refresh.
    Strict,
    /// Nodes with missing inputs are skipped and left un-updated.
    #[default]
    BestEffort,
}

/// Settings shared by every snapshot derived from one builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Refresh every caching node after each `set_value`.
    pub auto_update: bool,

    /// Policy used by the automatic refresh.
    pub update_policy: UpdatePolicy,
}

impl CacheConfig {
    /// Configuration with automatic refresh enabled (best-effort).
    pub fn auto_update() -> Self {
        Self {
            auto_update: true,
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
