//! End-to-end script run
//!
//! read -> validate -> load -> cross-check -> init -> argument dry run ->
//! enable -> interpret -> teardown

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::config::{AppConfig, ConfigError};
use crate::core::plugin::{
    LoadError, PluginHandle, PluginLoader, PluginRegistry, ScriptPlugin, TaskRegistry,
};
use crate::core::script::{validate_file, ExecError, Interpreter, Program, ScriptError};

/// Any failure of a run
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Script failed to read or validate
    #[error(transparent)]
    Script(#[from] ScriptError),
    /// A plugin failed to load or lacks a command
    #[error(transparent)]
    Load(#[from] LoadError),
    /// The program halted with failure
    #[error(transparent)]
    Exec(#[from] ExecError),
    /// The detached worker pool could not be started
    #[error("Cannot start worker pool: {0}")]
    WorkerPool(#[source] std::io::Error),
}

/// Outcome of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Validation only; nothing was loaded or executed
    pub validate_only: bool,
    /// Plugins loaded, in load order
    pub plugins: Vec<String>,
    /// Dispatched commands
    pub executed: usize,
    /// Jumps taken
    pub jumps: usize,
    /// Failures absorbed by fault-tolerant plugins
    pub recovered_failures: usize,
    /// Commands run on the worker pool
    pub detached: usize,
    /// Pauses inserted between commands
    pub pauses: usize,
    /// Detached commands that failed
    pub detached_failures: usize,
}

/// Drives one script through the whole pipeline
pub struct ScriptRunner {
    config: AppConfig,
    loader: PluginLoader,
    builtins: Vec<(String, Box<dyn ScriptPlugin>)>,
    validate_only: bool,
}

impl ScriptRunner {
    /// Runner using shared-library plugins as configured
    pub fn new(config: AppConfig) -> Self {
        let loader = PluginLoader::new(config.loader.clone());
        Self::with_loader(config, loader)
    }

    /// Runner with a custom loader
    pub fn with_loader(config: AppConfig, loader: PluginLoader) -> Self {
        Self {
            config,
            loader,
            builtins: Vec::new(),
            validate_only: false,
        }
    }

    /// Stop after validation
    #[must_use]
    pub fn validate_only(mut self, enabled: bool) -> Self {
        self.validate_only = enabled;
        self
    }

    /// Provide a plugin in-process; `LOAD_PLUGIN` of its name then skips the
    /// library lookup. Its `[plugins.NAME]` section applies as for a library.
    #[must_use]
    pub fn with_builtin(mut self, name: &str, plugin: Box<dyn ScriptPlugin>) -> Self {
        self.builtins.push((name.to_string(), plugin));
        self
    }

    /// Active configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Validate a script file
    pub fn validate(&self, script: &Path) -> Result<Program, RunnerError> {
        tracing::info!("Validating {}", script.display());
        let program = validate_file(script)?;
        tracing::info!(
            "{} plugin(s), {} command(s) validated",
            program.required_plugins.len(),
            program.len()
        );
        Ok(program)
    }

    /// Validate and, unless in validate-only mode, execute a script file
    pub fn run(self, script: &Path) -> Result<RunReport, RunnerError> {
        let program = self.validate(script)?;
        self.execute(program)
    }

    /// Load the plugins of a validated program and execute it
    pub fn execute(self, program: Program) -> Result<RunReport, RunnerError> {
        if self.validate_only {
            return Ok(RunReport {
                validate_only: true,
                ..RunReport::default()
            });
        }

        let tasks =
            TaskRegistry::new(self.config.workers.max_detached).map_err(RunnerError::WorkerPool)?;
        let mut registry = PluginRegistry::new(tasks);
        for (name, plugin) in self.builtins {
            let handle = PluginHandle::in_process(&name, plugin, self.config.plugin(&name))?;
            registry.insert(handle);
        }

        registry.load_program(&program, &self.loader, &self.config.plugins)?;
        registry.cross_check(&program)?;
        registry.init_all()?;

        // plugins stay disabled until every argument of the script checked out
        let checker = Interpreter::new(program, &registry);
        checker.dry_run()?;
        let program = checker.into_program();
        registry.enable_all();

        let mut interpreter = Interpreter::new(program, &registry)
            .with_command_delay(self.config.script.command_delay());
        let result = interpreter.run();
        drop(interpreter);

        // detached work finishes before any plugin is released
        registry.tasks().join_all();
        let detached_failures = registry.tasks().failures();
        let plugins = registry.names().map(str::to_string).collect();
        drop(registry);

        let stats = result?;
        if detached_failures > 0 {
            tracing::warn!("{} detached command(s) failed", detached_failures);
        }

        Ok(RunReport {
            validate_only: false,
            plugins,
            executed: stats.executed,
            jumps: stats.jumps,
            recovered_failures: stats.recovered_failures,
            detached: stats.detached,
            pauses: stats.pauses,
            detached_failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plugin::{CommandError, CommandTable};
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Relay {
        commands: CommandTable,
        fault_tolerant: bool,
        switched: Arc<Mutex<Vec<String>>>,
    }

    impl Relay {
        fn new(fault_tolerant: bool) -> Self {
            let switched = Arc::new(Mutex::new(Vec::new()));
            let log = Arc::clone(&switched);
            Self {
                commands: CommandTable::new()
                    .with("ON", move |params| {
                        log.lock().push(params.to_string());
                        Ok(String::new())
                    })
                    .with_check("ON", |params| match params.parse::<u8>() {
                        Ok(1..=8) => Ok(()),
                        _ => Err(CommandError::new(format!("no relay channel {params}"))),
                    })
                    .with("BROKEN", |_| Err(CommandError::new("relay stuck"))),
                fault_tolerant,
                switched,
            }
        }
    }

    impl ScriptPlugin for Relay {
        fn version(&self) -> &str {
            "2.1.0.0"
        }
        fn commands(&self) -> &CommandTable {
            &self.commands
        }
        fn is_fault_tolerant(&self) -> bool {
            self.fault_tolerant
        }
    }

    fn script(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("script.txt");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn runner(fault_tolerant: bool) -> ScriptRunner {
        ScriptRunner::new(AppConfig::default()).with_builtin("RELAY", Box::new(Relay::new(fault_tolerant)))
    }

    #[test]
    fn test_run_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "LOAD_PLUGIN RELAY >= v2.0.0.0\nRELAY.ON 1\nGOTO END\nRELAY.ON 2\nLABEL END\n");

        let report = runner(false).run(&path).unwrap();
        assert_eq!(report.plugins, vec!["RELAY"]);
        assert_eq!(report.executed, 1);
        assert_eq!(report.jumps, 1);
    }

    #[test]
    fn test_validate_only_skips_loading() {
        let dir = tempfile::tempdir().unwrap();
        // no such library anywhere
        let path = script(&dir, "LOAD_PLUGIN NOPE\nNOPE.RUN\n");

        let report = ScriptRunner::new(AppConfig::default())
            .validate_only(true)
            .run(&path)
            .unwrap();
        assert!(report.validate_only);
        assert_eq!(report.executed, 0);
    }

    #[test]
    fn test_cross_check_before_execution() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "LOAD_PLUGIN RELAY\nRELAY.ON 1\nRELAY.OFF\n");

        let err = runner(false).run(&path).unwrap_err();
        assert!(matches!(err, RunnerError::Load(LoadError::UnsupportedCommand { line: 3, .. })));
    }

    #[test]
    fn test_bad_argument_on_last_line_blocks_first_command() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "LOAD_PLUGIN RELAY\nRELAY.ON 1\nRELAY.ON 2\nRELAY.ON 99\n");

        let relay = Relay::new(false);
        let switched = Arc::clone(&relay.switched);
        let err = ScriptRunner::new(AppConfig::default())
            .with_builtin("RELAY", Box::new(relay))
            .run(&path)
            .unwrap_err();

        assert!(matches!(err, RunnerError::Exec(ExecError::InvalidArguments { line: 4, .. })));
        assert!(switched.lock().is_empty());
    }

    #[test]
    fn test_arguments_checked_then_executed() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "LOAD_PLUGIN RELAY\nRELAY.ON 1\nRELAY.ON 2\n");

        let relay = Relay::new(false);
        let switched = Arc::clone(&relay.switched);
        ScriptRunner::new(AppConfig::default())
            .with_builtin("RELAY", Box::new(relay))
            .run(&path)
            .unwrap();
        assert_eq!(*switched.lock(), vec!["1", "2"]);
    }

    #[test]
    fn test_fault_tolerance_decides_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "LOAD_PLUGIN RELAY\nRELAY.BROKEN\nRELAY.ON 1\n");

        let report = runner(true).run(&path).unwrap();
        assert_eq!(report.recovered_failures, 1);

        let err = runner(false).run(&path).unwrap_err();
        assert!(matches!(err, RunnerError::Exec(ExecError::CommandFailed { line: 2, .. })));
    }

    #[test]
    fn test_config_override_reaches_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "LOAD_PLUGIN RELAY\nRELAY.BROKEN\nRELAY.ON 1\n");
        let config: AppConfig = toml::from_str("[plugins.RELAY]\nfault_tolerant = true\n").unwrap();

        let report = ScriptRunner::new(config)
            .with_builtin("RELAY", Box::new(Relay::new(false)))
            .run(&path)
            .unwrap();
        assert_eq!(report.recovered_failures, 1);
    }

    #[test]
    fn test_detached_failures_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "LOAD_PLUGIN RELAY\nRELAY.BROKEN &\nRELAY.ON 1\n");

        let report = runner(false).run(&path).unwrap();
        assert_eq!(report.detached, 1);
        assert_eq!(report.detached_failures, 1);
    }

    #[test]
    fn test_invalid_script_never_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "LOAD_PLUGIN RELAY\nRELAY.ON 1\nnot a statement\n");

        let err = runner(false).run(&path).unwrap_err();
        assert!(matches!(err, RunnerError::Script(ScriptError::InvalidStatement { line: 3, .. })));
    }
}
