//! Registry configuration.
//!
//! A [`RegistryConfig`] describes how a registry links: its parser mode, the
//! supported features per module and the deviation modules per target module.
//! It is stored as TOML; every field is optional.
//!
//! ```toml
//! name = "device"
//! parser-mode = "semver"
//!
//! [features]
//! ietf-interfaces = ["if-mib", "arbitrary-names"]
//!
//! [deviations]
//! ietf-interfaces = ["vendor-deviations"]
//! ```
//!
//! An empty `[features]` table means every feature of every module is supported.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tokio::fs;

use crate::linker::{LinkConfig, ParserMode};

/// Settings for a [`TextSchemaRegistry`](crate::registry::TextSchemaRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RegistryConfig {
    /// Registry name, used in logs
    pub name: String,
    /// Statement parser mode
    pub parser_mode: ParserMode,
    /// Supported features per module
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, BTreeSet<String>>,
    /// Deviation modules per target module
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub deviations: BTreeMap<String, BTreeSet<String>>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            parser_mode: ParserMode::default(),
            features: BTreeMap::new(),
            deviations: BTreeMap::new(),
        }
    }
}

impl RegistryConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse registry config")
    }

    /// Load configuration from a TOML file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read registry config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse registry config from {}", path.display()))
    }

    /// Write configuration as TOML, creating parent directories as needed.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize registry config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write registry config to {}", path.display()))
    }

    /// The link configuration this registry starts with.
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            mode: self.parser_mode,
            supported_features: (!self.features.is_empty()).then(|| self.features.clone()),
            deviations: self.deviations.clone(),
        }
    }
}
