//! Configuration for cache layers and build parallelism
//!
//! Stored at `~/.config/wheelhouse/config.toml`. Every section has
//! defaults, so a missing file means a default configuration rather than
//! an error. The orchestration layer loads this and wires the resulting
//! layer list into the cache.

use crate::error::{WheelhouseError, WheelhouseResult};
use crate::wheel::cache::CacheLayer;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelhouseConfig {
    /// Cache layer directories
    pub cache: CacheConfig,

    /// Build behavior
    pub build: BuildConfig,
}

/// Cache layer configuration.
///
/// Layers are ordered project-then-host; a `None` directory leaves that
/// layer unconfigured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Project-local layer directory, the write target for fresh builds
    pub project_dir: Option<PathBuf>,

    /// Host-wide layer directory shared between projects
    pub host_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            project_dir: None,
            host_dir: Some(default_host_dir()),
        }
    }
}

/// Build behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Maximum concurrent wheel builds in the materializer
    pub parallelism: usize,

    /// Directory for the timing report and captured failure output
    pub report_dir: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            report_dir: PathBuf::from("build/wheel-build"),
        }
    }
}

fn default_host_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wheelhouse")
        .join("wheels")
}

impl WheelhouseConfig {
    /// The configured cache layers in priority order
    pub fn layers(&self) -> Vec<(CacheLayer, PathBuf)> {
        let mut layers = Vec::new();
        if let Some(dir) = &self.cache.project_dir {
            layers.push((CacheLayer::Project, dir.clone()));
        }
        if let Some(dir) = &self.cache.host_dir {
            layers.push((CacheLayer::Host, dir.clone()));
        }
        layers
    }
}

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    /// Create a new config manager with the default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wheelhouse")
            .join("config.toml")
    }

    /// Load configuration, falling back to defaults if the file is absent
    pub async fn load(&self) -> WheelhouseResult<WheelhouseConfig> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(WheelhouseConfig::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> WheelhouseResult<WheelhouseConfig> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| WheelhouseError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| WheelhouseError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
