//! # uScript Core Library
//!
//! A line-oriented scripting engine for hardware test automation:
//! - Comment stripping, `$NAME` macro expansion and statement classification
//! - All-or-nothing validation (forward-only GOTO/LABEL, plugin usage)
//! - Dynamically loaded, version-gated plugins with command dispatch tables
//! - Sequential interpretation with fault-tolerant plugins and detached commands
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use uscript_core::{AppConfig, ScriptRunner};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load(Path::new("uscript.toml"))?;
//!     let report = ScriptRunner::new(config).run(Path::new("script.txt"))?;
//!     println!("{} command(s) executed", report.executed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ConfigError, LoaderConfig, PluginConfig};
pub use crate::core::plugin::{
    CommandError, CommandResult, CommandTable, LoadError, PluginHandle, PluginLoader,
    PluginRegistry, PluginVersion, ScriptPlugin,
};
pub use crate::core::runner::{RunReport, RunnerError, ScriptRunner};
pub use crate::core::script::{
    classify, validate, validate_file, CommandEntry, ExecError, Interpreter, MacroTable, Program,
    ScriptError, Statement, TokenKind,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
