//! Per-line statement classification
//!
//! Each line is matched against the six statement shapes in a fixed priority
//! order; the first shape that matches wins. Lines matching nothing are
//! invalid.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::core::plugin::{PluginVersion, VersionRequirement, VersionRule};

use super::COND_TRUE;

static LOAD_PLUGIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^LOAD_PLUGIN\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s+(<=|<|>=|>|==)\s+(v\d+\.\d+\.\d+\.\d+))?$")
        .expect("load plugin pattern")
});

static CONSTANT_MACRO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*:=\s*(\S.*)$").expect("constant macro pattern")
});

static VARIABLE_MACRO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*\?=\s*([A-Z][A-Z0-9_]*)\.([A-Z][A-Z0-9_]*)(?:\s+(.*))?$")
        .expect("variable macro pattern")
});

static COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][A-Z0-9_]*)\.([A-Z][A-Z0-9_]*)(?:\s+(.*))?$").expect("command pattern")
});

static CONDITIONAL_GOTO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:IF\s+(\S(?:.*\S)?)\s+)?GOTO\s+([A-Za-z_][A-Za-z0-9_]*)$")
        .expect("conditional goto pattern")
});

static LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^LABEL\s+([A-Za-z_][A-Za-z0-9_]*)$").expect("label pattern"));

/// Statement kind, in classification priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    /// `LOAD_PLUGIN name [rule vX.Y.Z.W]`
    LoadPlugin,
    /// `NAME := value`
    ConstantMacro,
    /// `NAME ?= PLUGIN.COMMAND [params]`
    VariableMacro,
    /// `PLUGIN.COMMAND [params]`
    Command,
    /// `[IF condition] GOTO label`
    ConditionalGoto,
    /// `LABEL name`
    Label,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoadPlugin => "LOAD_PLUGIN",
            Self::ConstantMacro => "CONSTANT_MACRO",
            Self::VariableMacro => "VARIABLE_MACRO",
            Self::Command => "COMMAND",
            Self::ConditionalGoto => "IF_GOTO_LABEL",
            Self::Label => "LABEL",
        };
        f.write_str(name)
    }
}

/// A classified line with its parsed fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Plugin load directive
    LoadPlugin {
        /// Plugin name
        name: String,
        /// Optional version gate
        requirement: Option<VersionRequirement>,
    },
    /// Constant macro definition
    ConstantMacro {
        /// Macro name
        name: String,
        /// Literal value
        value: String,
    },
    /// Variable macro assignment
    VariableMacro {
        /// Macro name
        name: String,
        /// Plugin name
        plugin: String,
        /// Command name
        command: String,
        /// Raw parameter text (may be empty)
        params: String,
    },
    /// Plain plugin command
    Command {
        /// Plugin name
        plugin: String,
        /// Command name
        command: String,
        /// Raw parameter text (may be empty)
        params: String,
    },
    /// Conditional or unconditional jump
    ConditionalGoto {
        /// Boolean expression, `TRUE` when the `IF` part is absent
        condition: String,
        /// Target label
        label: String,
    },
    /// Jump target
    Label {
        /// Label name
        name: String,
    },
}

impl Statement {
    /// Kind of this statement
    pub fn kind(&self) -> TokenKind {
        match self {
            Self::LoadPlugin { .. } => TokenKind::LoadPlugin,
            Self::ConstantMacro { .. } => TokenKind::ConstantMacro,
            Self::VariableMacro { .. } => TokenKind::VariableMacro,
            Self::Command { .. } => TokenKind::Command,
            Self::ConditionalGoto { .. } => TokenKind::ConditionalGoto,
            Self::Label { .. } => TokenKind::Label,
        }
    }
}

/// Classify one expanded, comment-free line. `None` means the line is invalid.
pub fn classify(line: &str) -> Option<Statement> {
    let statement = classify_load_plugin(line)
        .or_else(|| classify_constant_macro(line))
        .or_else(|| classify_variable_macro(line))
        .or_else(|| classify_command(line))
        .or_else(|| classify_goto(line))
        .or_else(|| classify_label(line));

    match &statement {
        Some(s) => tracing::trace!("{} -> {}", line, s.kind()),
        None => tracing::trace!("{} -> INVALID", line),
    }

    statement
}

fn classify_load_plugin(line: &str) -> Option<Statement> {
    let caps = LOAD_PLUGIN.captures(line)?;
    let requirement = match (caps.get(2), caps.get(3)) {
        (Some(rule), Some(version)) => Some(VersionRequirement {
            rule: rule.as_str().parse::<VersionRule>().ok()?,
            version: version.as_str().parse::<PluginVersion>().ok()?,
        }),
        _ => None,
    };

    Some(Statement::LoadPlugin {
        name: caps[1].to_string(),
        requirement,
    })
}

fn classify_constant_macro(line: &str) -> Option<Statement> {
    let caps = CONSTANT_MACRO.captures(line)?;
    Some(Statement::ConstantMacro {
        name: caps[1].to_string(),
        value: caps[2].trim_end().to_string(),
    })
}

fn classify_variable_macro(line: &str) -> Option<Statement> {
    let caps = VARIABLE_MACRO.captures(line)?;
    Some(Statement::VariableMacro {
        name: caps[1].to_string(),
        plugin: caps[2].to_string(),
        command: caps[3].to_string(),
        params: caps.get(4).map_or("", |m| m.as_str().trim()).to_string(),
    })
}

fn classify_command(line: &str) -> Option<Statement> {
    let caps = COMMAND.captures(line)?;
    Some(Statement::Command {
        plugin: caps[1].to_string(),
        command: caps[2].to_string(),
        params: caps.get(3).map_or("", |m| m.as_str().trim()).to_string(),
    })
}

fn classify_goto(line: &str) -> Option<Statement> {
    let caps = CONDITIONAL_GOTO.captures(line)?;
    Some(Statement::ConditionalGoto {
        condition: caps.get(1).map_or(COND_TRUE, |m| m.as_str()).to_string(),
        label: caps[2].to_string(),
    })
}

fn classify_label(line: &str) -> Option<Statement> {
    let caps = LABEL.captures(line)?;
    Some(Statement::Label {
        name: caps[1].to_string(),
    })
}
