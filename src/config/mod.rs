//! Configuration module for the traversal machine
//!
//! Engine configuration is a single [`EngineConfig`] document with one
//! section per concern (compiler, execution, scripting, logging). It can be
//! stored as TOML or JSON; the format is picked from the file extension.
//!
//! # Config Location
//!
//! The default file lives in the platform config directory:
//! - **Linux**: `~/.config/dev.traversal-machine/engine.toml`
//! - **macOS**: `~/Library/Application Support/dev.traversal-machine/engine.toml`
//! - **Windows**: `%APPDATA%\dev.traversal-machine\engine.toml`
//!
//! # Example
//!
//! ```ignore
//! use traversal_machine::config::EngineConfig;
//!
//! let config = EngineConfig::load("engine.toml")?;
//! let machine = Machine::from_config(&config, Registry::standard(), structures);
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{MachineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "dev.traversal-machine";

/// Default config filename
pub const CONFIG_FILE: &str = "engine.toml";

/// Get the platform-specific config directory for the engine
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Path of the default config file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

/// On-disk encoding of a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            other => Err(MachineError::Config(format!(
                "Unsupported config extension {:?} for {:?} (expected .toml or .json)",
                other, path
            ))),
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub compiler: CompilerSettings,
    pub execution: ExecutionSettings,
    pub scripting: ScriptLimits,
    pub logging: LoggingSettings,
}

impl EngineConfig {
    /// Load a config file (TOML or JSON by extension)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            MachineError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config = match format {
            ConfigFormat::Toml => toml::from_str(&content).map_err(|e| {
                MachineError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?,
            ConfigFormat::Json => serde_json::from_str(&content).map_err(|e| {
                MachineError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?,
        };
        tracing::debug!("Loaded engine config from {:?}", path);
        Ok(config)
    }

    /// Load the default config file, falling back to defaults
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load engine config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config (TOML or JSON by extension)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MachineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = match format {
            ConfigFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| MachineError::Config(format!("Failed to serialize config: {}", e)))?,
            ConfigFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| MachineError::Config(format!("Failed to serialize config: {}", e)))?,
        };

        std::fs::write(path, content).map_err(|e| {
            MachineError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}
