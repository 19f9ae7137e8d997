//! Runner settings

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::ConfigError;

/// Runner configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Script execution settings
    pub script: ScriptConfig,
    /// Plugin library resolution
    pub loader: LoaderConfig,
    /// Detached command workers
    pub workers: WorkerConfig,
    /// Per-plugin overrides, keyed by the name used in `LOAD_PLUGIN`
    pub plugins: BTreeMap<String, PluginConfig>,
}

impl AppConfig {
    /// Load config from file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overrides for one plugin
    pub fn plugin(&self, name: &str) -> Option<&PluginConfig> {
        self.plugins.get(name)
    }
}

/// `[script]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Pause between two executed commands (milliseconds)
    pub command_delay_ms: u64,
}

impl ScriptConfig {
    /// Pause between two executed commands
    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }
}

/// `[loader]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directory searched for plugin libraries
    pub directory: PathBuf,
    /// File name prefix
    pub prefix: String,
    /// File name suffix, including the extension
    pub extension: String,
    /// Constructor symbol
    pub entry_point: String,
    /// Destructor symbol
    pub exit_point: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("plugins"),
            prefix: std::env::consts::DLL_PREFIX.to_string(),
            extension: format!("_plugin.{}", std::env::consts::DLL_EXTENSION),
            entry_point: crate::core::plugin::DEFAULT_ENTRY_POINT.to_string(),
            exit_point: crate::core::plugin::DEFAULT_EXIT_POINT.to_string(),
        }
    }
}

impl LoaderConfig {
    /// `<directory>/<prefix><lowercase name><extension>`
    pub fn library_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!(
            "{}{}{}",
            self.prefix,
            name.to_lowercase(),
            self.extension
        ))
    }
}

/// `[workers]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Upper bound of concurrently running detached commands
    pub max_detached: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { max_detached: 8 }
    }
}

/// `[plugins.NAME]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Overrides the plugin's own fault tolerance flag
    pub fault_tolerant: Option<bool>,
    /// Overrides the plugin's own enabled flag
    pub enabled: Option<bool>,
    /// Free-form values handed to the plugin at load time
    pub settings: BTreeMap<String, toml::Value>,
}

impl PluginConfig {
    /// Settings flattened to text; strings are passed without quotes
    pub fn settings(&self) -> BTreeMap<String, String> {
        self.settings
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), text)
            })
            .collect()
    }
}
