//! Configuration Management
//!
//! Operator-supplied settings: the project, optional inline service account
//! key material and the defaults higher-level operations fall back to.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Client configuration
#[derive(Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// GCP project ID
    pub project: String,
    /// Inline service account key (JSON). Absent or empty means ambient credentials.
    #[serde(default)]
    pub json_key: Option<String>,
    #[serde(default)]
    pub default_root_disk_size_gb: u32,
    #[serde(default)]
    pub default_root_disk_type: String,
    #[serde(default)]
    pub default_zone: String,
    /// Compute Engine endpoint override
    #[serde(default)]
    pub compute_endpoint: Option<String>,
    /// Cloud Storage endpoint override
    #[serde(default)]
    pub storage_endpoint: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Security: never print key material
        let json_key = self.json_key.as_ref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("project", &self.project)
            .field("json_key", &json_key)
            .field("default_root_disk_size_gb", &self.default_root_disk_size_gb)
            .field("default_root_disk_type", &self.default_root_disk_type)
            .field("default_zone", &self.default_zone)
            .field("compute_endpoint", &self.compute_endpoint)
            .field("storage_endpoint", &self.storage_endpoint)
            .finish()
    }
}

impl Config {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse JSON configuration")
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse YAML configuration")
    }

    /// Load configuration from disk; `.yml`/`.yaml` files are YAML, anything else JSON
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => Self::from_yaml(&content)?,
            _ => Self::from_json(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Check the settings every client needs
    ///
    /// The project ID is passed to the API as-is. Domain-scoped IDs such as
    /// `example.com:bosh-project` are valid, so only presence is checked here.
    pub fn validate(&self) -> Result<()> {
        if self.project.trim().is_empty() {
            bail!("No GCP project configured");
        }
        Ok(())
    }

    /// Whether inline key material is present
    pub fn has_json_key(&self) -> bool {
        self.json_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}
