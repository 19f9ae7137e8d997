//! Core module containing the script engine
//!
//! This module provides:
//! - Script reading, macro expansion, classification and validation
//! - Plugin loading, version gating and the plugin registry
//! - Program interpretation with detached command support
//! - The end-to-end runner

pub mod plugin;
pub mod runner;
pub mod script;
