//! Engine configuration
//!
//! Loaded from a YAML file named by `TRAMITE_CONFIG` (default
//! `config/tramite.yaml`). A missing file means defaults. `TRAMITE_CATALOG`
//! and `TRAMITE_PROGRESS` override the data paths.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::geolocation::GeolocationSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Catalog file or directory
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    /// Where progress snapshots are kept
    #[serde(default = "default_progress_path")]
    pub progress_path: PathBuf,
    #[serde(default)]
    pub geolocation: GeolocationSettings,
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("crates/tramite-core/data/catalog.json")
}

fn default_progress_path() -> PathBuf {
    PathBuf::from(".tramite/progress.json")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            progress_path: default_progress_path(),
            geolocation: GeolocationSettings::default(),
        }
    }
}

pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Create loader from TRAMITE_CONFIG env var or default to "config/tramite.yaml"
    pub fn from_env() -> Self {
        let path = std::env::var("TRAMITE_CONFIG")
            .unwrap_or_else(|_| "config/tramite.yaml".to_string());
        Self::new(path)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the file (or defaults) and apply environment overrides
    pub fn load(&self) -> Result<EngineConfig> {
        let mut config = if self.config_path.exists() {
            info!("Loading configuration from {}", self.config_path.display());
            let content = std::fs::read_to_string(&self.config_path)
                .with_context(|| format!("Failed to read {}", self.config_path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", self.config_path.display()))?
        } else {
            EngineConfig::default()
        };

        if let Ok(path) = std::env::var("TRAMITE_CATALOG") {
            config.catalog_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("TRAMITE_PROGRESS") {
            config.progress_path = PathBuf::from(path);
        }

        Ok(config)
    }
}
