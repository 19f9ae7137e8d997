//! Whole-script validation
//!
//! Validation is all-or-nothing: building, the control-flow pass and the
//! plugin-usage pass must all succeed before a [`Program`] is handed out.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use super::builder::ProgramBuilder;
use super::error::{ScriptError, ScriptResult};
use super::program::{CommandEntry, Program};
use super::reader::{self, ScriptLine};

/// Read and validate a script file
pub fn validate_file(path: &Path) -> ScriptResult<Program> {
    let lines = reader::read(path)?;
    validate_lines(&lines)
}

/// Validate in-memory script text
pub fn validate(source: &str) -> ScriptResult<Program> {
    let lines = reader::read_str(source)?;
    validate_lines(&lines)
}

/// Validate already-read lines
pub fn validate_lines(lines: &[ScriptLine]) -> ScriptResult<Program> {
    let mut builder = ProgramBuilder::new();
    for line in lines {
        builder.push(line)?;
    }
    let program = builder.build();

    check_control_flow(&program)?;
    check_plugin_usage(&program)?;

    tracing::debug!("Validated program:\n{}", program);
    Ok(program)
}

/// Every label is reached by an earlier GOTO, is defined once, and every
/// GOTO target exists.
pub fn check_control_flow(program: &Program) -> ScriptResult<()> {
    let mut first_reference: HashMap<&str, usize> = HashMap::new();
    let mut defined: HashSet<&str> = HashSet::new();

    for (idx, step) in program.commands.iter().enumerate() {
        match &step.entry {
            CommandEntry::Condition { target, .. } => {
                first_reference.entry(target.as_str()).or_insert(idx);
            }
            CommandEntry::Label { name } => {
                if !first_reference.get(name.as_str()).is_some_and(|&at| at < idx) {
                    return Err(ScriptError::OrphanLabel {
                        line: step.line,
                        label: name.clone(),
                    });
                }
                if !defined.insert(name.as_str()) {
                    return Err(ScriptError::DuplicateLabel {
                        line: step.line,
                        label: name.clone(),
                    });
                }
            }
            CommandEntry::Command { .. } | CommandEntry::MacroCommand { .. } => {}
        }
    }

    let undefined = first_reference
        .iter()
        .filter(|(label, _)| !defined.contains(*label))
        .min_by_key(|(_, idx)| **idx);

    if let Some((label, &idx)) = undefined {
        return Err(ScriptError::UndefinedLabel {
            line: program.commands[idx].line,
            label: (*label).to_string(),
        });
    }

    Ok(())
}

/// Every addressed plugin is declared; declared but unused plugins are only
/// reported.
pub fn check_plugin_usage(program: &Program) -> ScriptResult<()> {
    let declared = program.declared_plugins();
    let referenced = program.referenced_plugins();

    let missing: Vec<String> = referenced
        .difference(&declared)
        .map(|name| (*name).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ScriptError::MissingPlugin { plugins: missing });
    }

    let unused: BTreeSet<_> = declared.difference(&referenced).collect();
    for name in unused {
        tracing::warn!("Plugin {} is loaded but never used", name);
    }

    Ok(())
}
