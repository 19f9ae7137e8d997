//! Validated program model

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;

use super::macros::MacroTable;
use crate::core::plugin::VersionRequirement;

/// A `LOAD_PLUGIN` directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginRequirement {
    /// Plugin name as written in the script
    pub name: String,
    /// Optional version gate
    pub requirement: Option<VersionRequirement>,
    /// Line of the directive (1-based)
    pub line: usize,
}

/// One executable entry of a program
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandEntry {
    /// Plain dispatch, result discarded
    Command {
        /// Plugin name
        plugin: String,
        /// Command name
        command: String,
        /// Parameters; variable macro references are expanded at run time
        params: String,
        /// Run on the worker pool without waiting
        detached: bool,
    },
    /// Dispatch whose result is bound to a variable macro
    MacroCommand {
        /// Plugin name
        plugin: String,
        /// Command name
        command: String,
        /// Parameters; variable macro references are expanded at run time
        params: String,
        /// Variable macro receiving the result
        result_name: String,
        /// Last bound result, empty until executed
        result_value: String,
    },
    /// Jump to `target` when `expr` holds
    Condition {
        /// Boolean expression; variable macro references are expanded at run time
        expr: String,
        /// Label to jump to
        target: String,
    },
    /// Jump target
    Label {
        /// Label name
        name: String,
    },
}

impl CommandEntry {
    /// Plugin addressed by a dispatching entry
    pub fn plugin(&self) -> Option<&str> {
        match self {
            Self::Command { plugin, .. } | Self::MacroCommand { plugin, .. } => Some(plugin),
            Self::Condition { .. } | Self::Label { .. } => None,
        }
    }

    /// `(plugin, command)` for dispatching entries
    pub fn dispatch_target(&self) -> Option<(&str, &str)> {
        match self {
            Self::Command {
                plugin, command, ..
            }
            | Self::MacroCommand {
                plugin, command, ..
            } => Some((plugin, command)),
            Self::Condition { .. } | Self::Label { .. } => None,
        }
    }
}

impl fmt::Display for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command {
                plugin,
                command,
                params,
                detached,
            } => {
                write!(f, "{plugin}.{command}")?;
                if !params.is_empty() {
                    write!(f, " {params}")?;
                }
                if *detached {
                    write!(f, " &")?;
                }
                Ok(())
            }
            Self::MacroCommand {
                plugin,
                command,
                params,
                result_name,
                ..
            } => {
                write!(f, "{result_name} ?= {plugin}.{command}")?;
                if !params.is_empty() {
                    write!(f, " {params}")?;
                }
                Ok(())
            }
            Self::Condition { expr, target } => write!(f, "IF {expr} GOTO {target}"),
            Self::Label { name } => write!(f, "LABEL {name}"),
        }
    }
}

/// An entry together with where it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramStep {
    /// Source line (1-based)
    pub line: usize,
    /// Expanded line text as validated
    pub text: String,
    /// Parsed entry
    pub entry: CommandEntry,
}

/// A validated script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Program {
    /// `LOAD_PLUGIN` directives in script order
    pub required_plugins: Vec<PluginRequirement>,
    /// Constant and variable macros
    pub macros: MacroTable,
    /// Executable entries in execution order
    pub commands: Vec<ProgramStep>,
}

impl Program {
    /// Create an empty program
    pub fn new() -> Self {
        Self::default()
    }

    /// Declared requirement by plugin name
    pub fn requirement(&self, name: &str) -> Option<&PluginRequirement> {
        self.required_plugins.iter().find(|r| r.name == name)
    }

    /// Names declared with `LOAD_PLUGIN`
    pub fn declared_plugins(&self) -> BTreeSet<&str> {
        self.required_plugins.iter().map(|r| r.name.as_str()).collect()
    }

    /// Names addressed by commands
    pub fn referenced_plugins(&self) -> BTreeSet<&str> {
        self.commands
            .iter()
            .filter_map(|step| step.entry.plugin())
            .collect()
    }

    /// Index of every label in `commands`
    pub fn label_index(&self) -> HashMap<String, usize> {
        self.commands
            .iter()
            .enumerate()
            .filter_map(|(idx, step)| match &step.entry {
                CommandEntry::Label { name } => Some((name.clone(), idx)),
                _ => None,
            })
            .collect()
    }

    /// Number of executable entries
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// No executable entries
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Plugins:")?;
        for req in &self.required_plugins {
            match &req.requirement {
                Some(gate) => writeln!(f, "  {} {}", req.name, gate)?,
                None => writeln!(f, "  {}", req.name)?,
            }
        }

        writeln!(f, "Constants:")?;
        for (name, value) in self.macros.constants() {
            writeln!(f, "  {name} := {value}")?;
        }

        writeln!(f, "Variables:")?;
        for (name, value) in self.macros.variables() {
            writeln!(f, "  {name} = {}", value.unwrap_or("<unbound>"))?;
        }

        writeln!(f, "Commands:")?;
        for step in &self.commands {
            writeln!(f, "  [{:>4}] {}", step.line, step.entry)?;
        }
        Ok(())
    }
}
