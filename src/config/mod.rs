//! Configuration module
//!
//! TOML settings for script execution, plugin resolution and per-plugin
//! overrides

mod settings;

pub use settings::{AppConfig, LoaderConfig, PluginConfig, ScriptConfig, WorkerConfig};

use std::path::PathBuf;
use thiserror::Error;

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "uscript.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read or written
    #[error("Cannot access config {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// Config file is not valid TOML for [`AppConfig`]
    #[error("Invalid config {path}: {source}")]
    Parse {
        /// Config path
        path: PathBuf,
        /// TOML error
        #[source]
        source: toml::de::Error,
    },
    /// Config could not be serialized
    #[error("Cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
