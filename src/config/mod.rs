mod lsp;

pub use lsp::{LspConfig, LspServerConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use directories::BaseDirs;
use thiserror::Error;

use crate::error::{CodescopeError, Result};

const CONFIG_DIR: &str = "codescope";
const MAIN_CONFIG_FILE: &str = "config.toml";

/// Errors from reading or writing a TOML config file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub analysis: AnalysisConfig,
    pub lsp: LspConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Query language servers for references and calls
    pub enrich: bool,
    /// Entity queries in flight at once
    pub concurrency: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enrich: true,
            concurrency: 1,
        }
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
    app_config: AppConfig,
}

impl ConfigManager {
    /// Load from the per-user config directory
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join(MAIN_CONFIG_FILE);
        Ok(Self::from_path(config_path))
    }

    /// Load from an explicit file. A missing or unreadable file yields defaults.
    pub fn from_path(config_path: PathBuf) -> Self {
        let app_config = match Self::load_toml_file(&config_path) {
            Ok(Some(config)) => config,
            Ok(None) => AppConfig::default(),
            Err(e) => {
                tracing::warn!("Failed to load {}: {}", config_path.display(), e);
                AppConfig::default()
            }
        };
        Self {
            config_path,
            app_config,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn app_config(&self) -> &AppConfig {
        &self.app_config
    }

    pub fn into_app_config(self) -> AppConfig {
        self.app_config
    }

    fn get_config_dir() -> Result<PathBuf> {
        BaseDirs::new()
            .map(|dirs| dirs.config_dir().join(CONFIG_DIR))
            .ok_or_else(|| CodescopeError::Config("Could not determine config directory".to_string()))
    }

    /// `Ok(None)` when the file does not exist
    fn load_toml_file<T: for<'de> Deserialize<'de>>(path: &Path) -> std::result::Result<Option<T>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(toml::from_str(&content)?))
    }

    /// Write the default configuration unless a file already exists. Returns whether it wrote.
    pub fn write_default_config(&self) -> Result<bool> {
        if self.config_path.exists() {
            return Ok(false);
        }
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::from)?;
        }

        let content = toml::to_string_pretty(&AppConfig::default()).map_err(ConfigError::from)?;
        std::fs::write(&self.config_path, content).map_err(ConfigError::from)?;
        Ok(true)
    }
}
