//! Plugin system
//!
//! Supports:
//! - Native plugins (dynamic libraries) with version gating
//! - In-process plugins sharing the same dispatch path
//! - Detached command execution tracked per plugin

mod api;
mod handle;
mod loader;
mod registry;
mod tasks;
mod version;

pub use api::{
    ArgCheck, CommandError, CommandHandler, CommandResult, CommandTable, PluginEntryFn,
    PluginExitFn, PluginInstance, ScriptPlugin, DEFAULT_ENTRY_POINT, DEFAULT_EXIT_POINT,
};
pub use handle::PluginHandle;
pub use loader::{DylibBackend, LibraryBackend, LoadedLibrary, PluginLoader};
pub use registry::PluginRegistry;
pub use tasks::TaskRegistry;
pub use version::{PluginVersion, VersionParseError, VersionRequirement, VersionRule};

use std::path::PathBuf;
use thiserror::Error;

/// Load-time errors
#[derive(Debug, Error)]
pub enum LoadError {
    /// The library file could not be opened
    #[error("Plugin {name}: cannot open {path}: {reason}")]
    LibraryNotFound {
        /// Plugin name
        name: String,
        /// Resolved library path
        path: PathBuf,
        /// Loader message
        reason: String,
    },

    /// A lifecycle symbol is missing from the library
    #[error("Plugin {name}: entry point {symbol} not found")]
    MissingEntryPoint {
        /// Plugin name
        name: String,
        /// Symbol that could not be resolved
        symbol: String,
    },

    /// The constructor returned no instance
    #[error("Plugin {name}: constructor returned no instance")]
    NullInstance {
        /// Plugin name
        name: String,
    },

    /// The reported version is not `MAJOR.MINOR.PATCH.BUILD`
    #[error("Plugin {name}: invalid version [{version}]")]
    InvalidVersion {
        /// Plugin name
        name: String,
        /// Reported text
        version: String,
    },

    /// The reported version fails the `LOAD_PLUGIN` constraint
    #[error("Plugin {name}: version v{reported} does not satisfy {requirement}")]
    VersionMismatch {
        /// Plugin name
        name: String,
        /// Reported version
        reported: PluginVersion,
        /// Requested constraint
        requirement: VersionRequirement,
    },

    /// The plugin failed to bring up its modules
    #[error("Plugin {name}: initialization failed: {reason}")]
    Initialization {
        /// Plugin name
        name: String,
        /// Plugin message
        reason: String,
    },

    /// The plugin rejected its settings
    #[error("Plugin {name}: configuration rejected: {reason}")]
    Configuration {
        /// Plugin name
        name: String,
        /// Plugin message
        reason: String,
    },

    /// A command addresses a plugin that is not in the registry
    #[error("Plugin {name} is not loaded")]
    NotLoaded {
        /// Plugin name
        name: String,
    },

    /// A command the plugin does not provide
    #[error("Line {line}: command {plugin}.{command} not supported")]
    UnsupportedCommand {
        /// Line number (1-based)
        line: usize,
        /// Plugin name
        plugin: String,
        /// Command name
        command: String,
    },
}
