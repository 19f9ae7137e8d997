//! Errors raised while reading and validating a script

use std::path::PathBuf;
use thiserror::Error;

/// Lexical, classification and semantic errors.
///
/// Any of these aborts validation as a whole: a script either validates
/// completely or it is never executed.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The script file could not be read
    #[error("Cannot read script {path}: {source}")]
    Io {
        /// Script path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A block comment was opened inside another block comment
    #[error("Line {line}: nested block comment not supported")]
    NestedComment {
        /// Line number (1-based)
        line: usize,
    },

    /// A block comment end marker without a matching start marker
    #[error("Line {line}: end of block comment without a matching start")]
    DanglingBlockEnd {
        /// Line number (1-based)
        line: usize,
    },

    /// The line matches none of the statement shapes
    #[error("Line {line}: invalid statement [{text}]")]
    InvalidStatement {
        /// Line number (1-based)
        line: usize,
        /// Line text after macro expansion
        text: String,
    },

    /// A macro name was defined twice
    #[error("Line {line}: macro already exists: {name}")]
    DuplicateMacro {
        /// Line number (1-based)
        line: usize,
        /// Macro name
        name: String,
    },

    /// A variable macro assignment was marked for detached execution
    #[error("Line {line}: variable macro {name} cannot be assigned by a detached command")]
    DetachedMacro {
        /// Line number (1-based)
        line: usize,
        /// Macro name
        name: String,
    },

    /// `LOAD_PLUGIN` repeated for the same plugin
    #[error("Line {line}: plugin already declared: {name}")]
    DuplicatePlugin {
        /// Line number (1-based)
        line: usize,
        /// Plugin name
        name: String,
    },

    /// A label that no earlier GOTO refers to
    #[error("Line {line}: label [{label}] without preceding GOTO")]
    OrphanLabel {
        /// Line number (1-based)
        line: usize,
        /// Label name
        label: String,
    },

    /// A label defined more than once
    #[error("Line {line}: duplicate label [{label}]")]
    DuplicateLabel {
        /// Line number (1-based)
        line: usize,
        /// Label name
        label: String,
    },

    /// A GOTO whose label is never defined
    #[error("Line {line}: GOTO {label} without corresponding label")]
    UndefinedLabel {
        /// Line number (1-based) of the first GOTO referring to the label
        line: usize,
        /// Label name
        label: String,
    },

    /// Commands refer to plugins that are never loaded
    #[error("Missing plugins: {}", plugins.join(" "))]
    MissingPlugin {
        /// Every referenced but undeclared plugin, sorted
        plugins: Vec<String>,
    },
}

impl ScriptError {
    /// Line the error points at, when it stems from a single line
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::NestedComment { line }
            | Self::DanglingBlockEnd { line }
            | Self::InvalidStatement { line, .. }
            | Self::DuplicateMacro { line, .. }
            | Self::DetachedMacro { line, .. }
            | Self::DuplicatePlugin { line, .. }
            | Self::OrphanLabel { line, .. }
            | Self::DuplicateLabel { line, .. }
            | Self::UndefinedLabel { line, .. } => Some(*line),
            Self::Io { .. } | Self::MissingPlugin { .. } => None,
        }
    }
}

/// Result alias for the validation pipeline
pub type ScriptResult<T> = Result<T, ScriptError>;
