//! Program execution
//!
//! A strict sequential walk over the validated commands. Plugin handles are
//! borrowed from the registry for the whole run.
//!
//! Before the real run, [`Interpreter::dry_run`] passes every dispatching
//! entry through its command's argument check while the plugins are still
//! disabled, so a bad argument anywhere in the script stops it before the
//! first side effect.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use super::condition::{evaluate, ConditionError};
use super::program::{CommandEntry, Program};
use crate::core::plugin::{CommandHandler, PluginHandle, PluginRegistry};

/// Execution errors; each one aborts the program
#[derive(Debug, Error)]
pub enum ExecError {
    /// A command addresses a plugin missing from the registry
    #[error("Line {line}: plugin {plugin} is not loaded")]
    UnknownPlugin {
        /// Line number (1-based)
        line: usize,
        /// Plugin name
        plugin: String,
    },

    /// The plugin has no such command
    #[error("Line {line}: command {plugin}.{command} not supported")]
    UnsupportedCommand {
        /// Line number (1-based)
        line: usize,
        /// Plugin name
        plugin: String,
        /// Command name
        command: String,
    },

    /// The plugin is disabled and not fault tolerant
    #[error("Line {line}: plugin {plugin} is not ready")]
    PluginNotReady {
        /// Line number (1-based)
        line: usize,
        /// Plugin name
        plugin: String,
    },

    /// The argument check of a command rejected its parameters
    #[error("Line {line}: [{text}] invalid arguments: {reason}")]
    InvalidArguments {
        /// Line number (1-based)
        line: usize,
        /// Command as checked
        text: String,
        /// Check message
        reason: String,
    },

    /// The handler reported a failure
    #[error("Line {line}: [{text}] failed: {reason}")]
    CommandFailed {
        /// Line number (1-based)
        line: usize,
        /// Command as executed, macros expanded
        text: String,
        /// Handler message
        reason: String,
    },

    /// The condition is malformed after expansion
    #[error("Line {line}: invalid condition [{expr}]: {source}")]
    Condition {
        /// Line number (1-based)
        line: usize,
        /// Condition as evaluated
        expr: String,
        /// Parse failure
        #[source]
        source: ConditionError,
    },

    /// A jump target vanished from the program
    #[error("Line {line}: label [{label}] not found")]
    UnknownLabel {
        /// Line number (1-based)
        line: usize,
        /// Label name
        label: String,
    },
}

impl ExecError {
    /// Line the error points at
    pub fn line(&self) -> usize {
        match self {
            Self::UnknownPlugin { line, .. }
            | Self::UnsupportedCommand { line, .. }
            | Self::PluginNotReady { line, .. }
            | Self::InvalidArguments { line, .. }
            | Self::CommandFailed { line, .. }
            | Self::Condition { line, .. }
            | Self::UnknownLabel { line, .. } => *line,
        }
    }
}

/// Counters of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecStats {
    /// Dispatched commands, detached ones included
    pub executed: usize,
    /// Jumps taken
    pub jumps: usize,
    /// Failures absorbed by fault-tolerant plugins
    pub recovered_failures: usize,
    /// Commands handed to the worker pool
    pub detached: usize,
    /// Pauses inserted between commands
    pub pauses: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running(usize),
    Halted,
}

/// Executes a [`Program`] against a [`PluginRegistry`]
pub struct Interpreter<'r> {
    program: Program,
    registry: &'r PluginRegistry,
    labels: HashMap<String, usize>,
    command_delay: Duration,
    stats: ExecStats,
}

impl<'r> Interpreter<'r> {
    /// Take ownership of a validated program
    pub fn new(program: Program, registry: &'r PluginRegistry) -> Self {
        let labels = program.label_index();
        Self {
            program,
            registry,
            labels,
            command_delay: Duration::ZERO,
            stats: ExecStats::default(),
        }
    }

    /// Pause between two executed commands
    #[must_use]
    pub fn with_command_delay(mut self, delay: Duration) -> Self {
        self.command_delay = delay;
        self
    }

    /// Run to completion. `Ok` means the program halted with success.
    pub fn run(&mut self) -> Result<ExecStats, ExecError> {
        let mut state = State::Running(0);

        while let State::Running(ip) = state {
            state = if ip < self.program.commands.len() {
                self.step(ip).inspect_err(|e| tracing::error!("{}", e))?
            } else {
                State::Halted
            };
        }

        tracing::info!(
            "Program finished: {} command(s), {} jump(s), {} recovered failure(s)",
            self.stats.executed,
            self.stats.jumps,
            self.stats.recovered_failures
        );
        Ok(self.stats)
    }

    /// Check the arguments of every dispatching entry without running any
    /// handler. Jumps are not followed; every entry is visited once.
    /// Returns the number of checked commands.
    pub fn dry_run(&self) -> Result<usize, ExecError> {
        let mut checked = 0;

        for step in &self.program.commands {
            let (plugin, command, params) = match &step.entry {
                CommandEntry::Command {
                    plugin,
                    command,
                    params,
                    ..
                }
                | CommandEntry::MacroCommand {
                    plugin,
                    command,
                    params,
                    ..
                } => (plugin.as_str(), command.as_str(), self.program.macros.expand(params)),
                CommandEntry::Condition { .. } | CommandEntry::Label { .. } => continue,
            };

            let handle = self.registry.get(plugin).ok_or_else(|| ExecError::UnknownPlugin {
                line: step.line,
                plugin: plugin.to_string(),
            })?;
            if !handle.commands().contains(command) {
                if handle.is_fault_tolerant() {
                    continue;
                }
                return Err(ExecError::UnsupportedCommand {
                    line: step.line,
                    plugin: plugin.to_string(),
                    command: command.to_string(),
                });
            }

            checked += 1;
            let Some(check) = handle.commands().check(command) else {
                continue;
            };
            let text = format!("{plugin}.{command} {params}").trim_end().to_string();
            match check(&params) {
                Ok(()) => tracing::trace!("Line {}: [{}] -> arguments OK", step.line, text),
                Err(e) if handle.is_fault_tolerant() => {
                    tracing::warn!(
                        "Line {}: [{}] invalid arguments ({}), fault tolerant, continuing",
                        step.line,
                        text,
                        e
                    );
                }
                Err(e) => {
                    let err = ExecError::InvalidArguments {
                        line: step.line,
                        text,
                        reason: e.to_string(),
                    };
                    tracing::error!("{}", err);
                    return Err(err);
                }
            }
        }

        tracing::info!("Arguments of {} command(s) validated", checked);
        Ok(checked)
    }

    /// Program with the variable macro values bound so far
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Give the program back
    pub fn into_program(self) -> Program {
        self.program
    }

    /// Counters so far
    pub fn stats(&self) -> ExecStats {
        self.stats
    }

    fn step(&mut self, ip: usize) -> Result<State, ExecError> {
        let line = self.program.commands[ip].line;
        let entry = self.program.commands[ip].entry.clone();

        match entry {
            CommandEntry::Command {
                plugin,
                command,
                params,
                detached,
            } => {
                if detached {
                    self.dispatch_detached(line, &plugin, &command, &params)?;
                } else {
                    self.dispatch(line, &plugin, &command, &params)?;
                }
                Ok(State::Running(ip + 1))
            }
            CommandEntry::MacroCommand {
                plugin,
                command,
                params,
                result_name,
                ..
            } => {
                let result = self.dispatch(line, &plugin, &command, &params)?;
                tracing::debug!("Line {}: ${} = [{}]", line, result_name, result);

                self.program.macros.bind(&result_name, result.clone());
                if let CommandEntry::MacroCommand { result_value, .. } =
                    &mut self.program.commands[ip].entry
                {
                    *result_value = result;
                }
                Ok(State::Running(ip + 1))
            }
            CommandEntry::Condition { expr, target } => {
                let expanded = self.program.macros.expand(&expr);
                let holds = evaluate(&expanded).map_err(|source| ExecError::Condition {
                    line,
                    expr: expanded.clone(),
                    source,
                })?;

                if !holds {
                    return Ok(State::Running(ip + 1));
                }

                let Some(&target_ip) = self.labels.get(&target) else {
                    return Err(ExecError::UnknownLabel {
                        line,
                        label: target,
                    });
                };
                self.stats.jumps += 1;
                tracing::debug!("Line {}: [{}] -> GOTO {}", line, expanded, target);
                Ok(State::Running(target_ip))
            }
            CommandEntry::Label { .. } => Ok(State::Running(ip + 1)),
        }
    }

    /// Resolve the handler, applying the enabled and fault tolerance rules.
    /// `None` means the command is skipped as a recovered failure.
    fn resolve(
        &mut self,
        line: usize,
        plugin: &str,
        command: &str,
    ) -> Result<Option<(&'r PluginHandle, CommandHandler)>, ExecError> {
        let registry = self.registry;
        let handle = registry.get(plugin).ok_or_else(|| ExecError::UnknownPlugin {
            line,
            plugin: plugin.to_string(),
        })?;

        let Some(handler) = handle.commands().get(command).cloned() else {
            if handle.is_fault_tolerant() {
                tracing::warn!("Line {}: {}.{} not supported, skipped", line, plugin, command);
                self.stats.recovered_failures += 1;
                return Ok(None);
            }
            return Err(ExecError::UnsupportedCommand {
                line,
                plugin: plugin.to_string(),
                command: command.to_string(),
            });
        };

        if !handle.is_enabled() && !handle.is_fault_tolerant() {
            return Err(ExecError::PluginNotReady {
                line,
                plugin: plugin.to_string(),
            });
        }

        Ok(Some((handle, handler)))
    }

    fn pace(&mut self) {
        if self.stats.executed > 0 && !self.command_delay.is_zero() {
            std::thread::sleep(self.command_delay);
            self.stats.pauses += 1;
        }
        self.stats.executed += 1;
    }

    fn dispatch(
        &mut self,
        line: usize,
        plugin: &str,
        command: &str,
        params: &str,
    ) -> Result<String, ExecError> {
        let Some((handle, handler)) = self.resolve(line, plugin, command)? else {
            return Ok(String::new());
        };

        let params = self.program.macros.expand(params);
        self.pace();

        let started = Instant::now();
        let result = handler(&params);
        let elapsed = started.elapsed();

        match result {
            Ok(output) => {
                tracing::info!(
                    "{}.{} {} -> OK [{}] ({:?})",
                    plugin,
                    command,
                    params,
                    output,
                    elapsed
                );
                Ok(output)
            }
            Err(e) if handle.is_fault_tolerant() => {
                tracing::warn!(
                    "Line {}: {}.{} {} -> FAILED ({}), fault tolerant, continuing",
                    line,
                    plugin,
                    command,
                    params,
                    e
                );
                self.stats.recovered_failures += 1;
                Ok(String::new())
            }
            Err(e) => Err(ExecError::CommandFailed {
                line,
                text: format!("{plugin}.{command} {params}").trim_end().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn dispatch_detached(
        &mut self,
        line: usize,
        plugin: &str,
        command: &str,
        params: &str,
    ) -> Result<(), ExecError> {
        let Some((_, handler)) = self.resolve(line, plugin, command)? else {
            return Ok(());
        };

        let params = self.program.macros.expand(params);
        self.pace();
        self.stats.detached += 1;

        let label = format!("Line {line}: {plugin}.{command} {params}");
        tracing::info!("{} -> detached", label.trim_end());
        self.registry
            .spawn_detached(plugin, label, move || handler(&params));
        Ok(())
    }
}
