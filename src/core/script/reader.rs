//! Script line source
//!
//! Turns a script file into trimmed, comment-free, non-empty lines. Each kept
//! line remembers its 1-based position in the file so later phases can point
//! at it in diagnostics.

use std::path::Path;

use super::error::{ScriptError, ScriptResult};
use super::{BLOCK_COMMENT_END, BLOCK_COMMENT_START, LINE_COMMENT};

/// A kept script line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    /// Line number in the source file (1-based)
    pub number: usize,
    /// Trimmed text with comments removed
    pub text: String,
}

impl ScriptLine {
    /// Create a new line
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

/// Read and clean a script file
pub fn read(path: &Path) -> ScriptResult<Vec<ScriptLine>> {
    let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let lines = read_str(&source)?;
    tracing::debug!("Read {} statements from {}", lines.len(), path.display());
    Ok(lines)
}

/// Apply the line-source rules to in-memory text
pub fn read_str(source: &str) -> ScriptResult<Vec<ScriptLine>> {
    let mut lines = Vec::new();
    let mut in_block: Option<usize> = None;

    for (idx, raw) in source.lines().enumerate() {
        let number = idx + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with(LINE_COMMENT) {
            continue;
        }

        if line == BLOCK_COMMENT_START {
            if in_block.is_some() {
                return Err(ScriptError::NestedComment { line: number });
            }
            in_block = Some(number);
            continue;
        }

        if line == BLOCK_COMMENT_END {
            if in_block.take().is_none() {
                return Err(ScriptError::DanglingBlockEnd { line: number });
            }
            continue;
        }

        if in_block.is_some() {
            continue;
        }

        let text = strip_comment(line);
        if text.is_empty() {
            continue;
        }

        tracing::trace!("{:>4}: {}", number, text);
        lines.push(ScriptLine::new(number, text));
    }

    if let Some(start) = in_block {
        tracing::warn!("Block comment opened at line {} is never closed", start);
    }

    Ok(lines)
}

/// Cut the line at the first unescaped comment marker; `\#` yields a literal `#`
fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&LINE_COMMENT) {
            out.push(LINE_COMMENT);
            chars.next();
            continue;
        }
        if c == LINE_COMMENT {
            break;
        }
        out.push(c);
    }

    out.trim_end().to_string()
}
