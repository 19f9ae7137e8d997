//! Script engine
//!
//! Text goes through the following stages:
//! - [`reader`] strips comments and blank lines
//! - [`macros`] expands `$NAME` references
//! - [`classifier`] types each line
//! - [`builder`] turns classified lines into a [`Program`]
//! - [`validator`] checks control flow and plugin usage
//! - [`interpreter`] walks the validated program against the loaded plugins

pub mod builder;
pub mod classifier;
pub mod condition;
pub mod error;
pub mod interpreter;
pub mod macros;
pub mod program;
pub mod reader;
pub mod validator;

pub use classifier::{classify, Statement, TokenKind};
pub use condition::{evaluate, ConditionError};
pub use error::{ScriptError, ScriptResult};
pub use interpreter::{ExecError, ExecStats, Interpreter};
pub use macros::{MacroTable, MacroValue};
pub use program::{CommandEntry, PluginRequirement, Program, ProgramStep};
pub use reader::ScriptLine;
pub use validator::{validate, validate_file, validate_lines};

/// Line comment marker
pub const LINE_COMMENT: char = '#';

/// Block comment start marker (a line on its own)
pub const BLOCK_COMMENT_START: &str = "---";

/// Block comment end marker (a line on its own)
pub const BLOCK_COMMENT_END: &str = "!--";

/// Literal true token in conditions
pub const COND_TRUE: &str = "TRUE";

/// Literal false token in conditions
pub const COND_FALSE: &str = "FALSE";

/// Trailing parameter marker requesting detached execution
pub const THREADED_MARKER: &str = "&";
