//! Program construction from classified lines

use super::classifier::{classify, Statement};
use super::error::{ScriptError, ScriptResult};
use super::program::{CommandEntry, PluginRequirement, Program, ProgramStep};
use super::reader::ScriptLine;
use super::THREADED_MARKER;

/// Accumulates a [`Program`] one line at a time
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand, classify and append one line
    pub fn push(&mut self, line: &ScriptLine) -> ScriptResult<()> {
        let expanded = self.program.macros.expand(&line.text);

        for name in self.program.macros.undefined_references(&expanded) {
            tracing::warn!("Line {}: reference to undefined macro ${}", line.number, name);
        }

        let statement = classify(&expanded).ok_or_else(|| ScriptError::InvalidStatement {
            line: line.number,
            text: expanded.clone(),
        })?;

        match statement {
            Statement::LoadPlugin { name, requirement } => {
                if self.program.requirement(&name).is_some() {
                    return Err(ScriptError::DuplicatePlugin {
                        line: line.number,
                        name,
                    });
                }
                self.program.required_plugins.push(PluginRequirement {
                    name,
                    requirement,
                    line: line.number,
                });
            }
            Statement::ConstantMacro { name, value } => {
                if !self.program.macros.define_constant(&name, &value) {
                    return Err(ScriptError::DuplicateMacro {
                        line: line.number,
                        name,
                    });
                }
            }
            Statement::VariableMacro {
                name,
                plugin,
                command,
                params,
            } => {
                let (params, detached) = split_detached(&params);
                if detached {
                    return Err(ScriptError::DetachedMacro {
                        line: line.number,
                        name,
                    });
                }
                if !self.program.macros.register_variable(&name) {
                    return Err(ScriptError::DuplicateMacro {
                        line: line.number,
                        name,
                    });
                }
                self.append(
                    line.number,
                    expanded,
                    CommandEntry::MacroCommand {
                        plugin,
                        command,
                        params,
                        result_name: name,
                        result_value: String::new(),
                    },
                );
            }
            Statement::Command {
                plugin,
                command,
                params,
            } => {
                let (params, detached) = split_detached(&params);
                self.append(
                    line.number,
                    expanded,
                    CommandEntry::Command {
                        plugin,
                        command,
                        params,
                        detached,
                    },
                );
            }
            Statement::ConditionalGoto { condition, label } => {
                self.append(
                    line.number,
                    expanded,
                    CommandEntry::Condition {
                        expr: condition,
                        target: label,
                    },
                );
            }
            Statement::Label { name } => {
                self.append(line.number, expanded, CommandEntry::Label { name });
            }
        }

        Ok(())
    }

    /// Finish building
    pub fn build(self) -> Program {
        self.program
    }

    fn append(&mut self, line: usize, text: String, entry: CommandEntry) {
        self.program.commands.push(ProgramStep { line, text, entry });
    }
}

/// Split a trailing threading marker off the parameters
fn split_detached(params: &str) -> (String, bool) {
    if params == THREADED_MARKER {
        return (String::new(), true);
    }
    match params.strip_suffix(THREADED_MARKER) {
        Some(rest) if rest.ends_with(char::is_whitespace) => (rest.trim_end().to_string(), true),
        _ => (params.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(src: &[&str]) -> ScriptResult<Program> {
        let mut builder = ProgramBuilder::new();
        for (idx, text) in src.iter().enumerate() {
            builder.push(&ScriptLine::new(idx + 1, *text))?;
        }
        Ok(builder.build())
    }

    #[test]
    fn test_constants_expand_before_classification() {
        let program = build(&["CMD := UART.SEND", "$CMD hello"]).unwrap();
        assert_eq!(program.commands.len(), 1);
        assert_eq!(program.commands[0].text, "UART.SEND hello");
        assert!(matches!(
            &program.commands[0].entry,
            CommandEntry::Command { plugin, params, .. } if plugin == "UART" && params == "hello"
        ));
    }

    #[test]
    fn test_variable_reference_kept_for_runtime() {
        let program = build(&["LOAD_PLUGIN FOO", "PORT ?= FOO.GET_PORT", "FOO.OPEN $PORT"]).unwrap();
        assert_eq!(program.required_plugins.len(), 1);
        assert!(matches!(
            &program.commands[1].entry,
            CommandEntry::Command { params, .. } if params == "$PORT"
        ));
        assert!(program.macros.contains("PORT"));
    }

    #[test]
    fn test_invalid_line_reports_number_and_text() {
        let err = build(&["LOAD_PLUGIN UART", "what is this"]).unwrap_err();
        match err {
            ScriptError::InvalidStatement { line, text } => {
                assert_eq!(line, 2);
                assert_eq!(text, "what is this");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_plugin() {
        let err = build(&["LOAD_PLUGIN UART", "LOAD_PLUGIN UART >= v1.0.0.0"]).unwrap_err();
        assert!(matches!(err, ScriptError::DuplicatePlugin { line: 2, .. }));
    }

    #[test]
    fn test_duplicate_constant_same_value() {
        let err = build(&["A := 1", "A := 1"]).unwrap_err();
        assert!(matches!(err, ScriptError::DuplicateMacro { line: 2, .. }));
    }

    #[test]
    fn test_constant_then_variable_conflict() {
        let err = build(&["A := 1", "A ?= UART.READ"]).unwrap_err();
        assert!(matches!(err, ScriptError::DuplicateMacro { line: 2, .. }));
    }

    #[test]
    fn test_variable_reassignment_allowed() {
        let program = build(&["A ?= UART.READ", "A ?= UART.READ 5"]).unwrap();
        assert_eq!(program.commands.len(), 2);
    }

    #[test]
    fn test_detached_command() {
        let program = build(&["UART.MONITOR 10 &", "UART.SEND a&b"]).unwrap();
        assert!(matches!(
            &program.commands[0].entry,
            CommandEntry::Command { params, detached: true, .. } if params == "10"
        ));
        assert!(matches!(
            &program.commands[1].entry,
            CommandEntry::Command { params, detached: false, .. } if params == "a&b"
        ));
    }

    #[test]
    fn test_detached_variable_macro_rejected() {
        let err = build(&["R ?= UART.READ &"]).unwrap_err();
        assert!(matches!(err, ScriptError::DetachedMacro { line: 1, .. }));
    }

    #[test]
    fn test_split_detached() {
        assert_eq!(split_detached("&"), (String::new(), true));
        assert_eq!(split_detached("1 2 &"), ("1 2".to_string(), true));
        assert_eq!(split_detached("1&"), ("1&".to_string(), false));
        assert_eq!(split_detached(""), (String::new(), false));
    }
}
