//! Loaded plugins, keyed by script name

use std::collections::BTreeMap;

use super::api::CommandResult;
use super::handle::PluginHandle;
use super::loader::PluginLoader;
use super::tasks::TaskRegistry;
use super::LoadError;
use crate::config::PluginConfig;
use crate::core::script::{PluginRequirement, Program};

/// Owner of every live plugin handle and of the detached tasks using them.
///
/// Dropping the registry releases plugins in reverse load order, each one
/// only after its detached tasks have finished.
pub struct PluginRegistry {
    handles: Vec<PluginHandle>,
    tasks: TaskRegistry,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new(tasks: TaskRegistry) -> Self {
        Self {
            handles: Vec::new(),
            tasks,
        }
    }

    /// Add a handle, returning the one it replaces
    pub fn insert(&mut self, handle: PluginHandle) -> Option<PluginHandle> {
        match self.handles.iter().position(|h| h.name() == handle.name()) {
            Some(idx) => {
                self.tasks.join(handle.name());
                Some(std::mem::replace(&mut self.handles[idx], handle))
            }
            None => {
                self.handles.push(handle);
                None
            }
        }
    }

    /// Load every plugin the program declares. Plugins already registered
    /// (in-process ones) are only version-checked.
    pub fn load_program(
        &mut self,
        program: &Program,
        loader: &PluginLoader,
        overrides: &BTreeMap<String, PluginConfig>,
    ) -> Result<(), LoadError> {
        for requirement in &program.required_plugins {
            if let Some(handle) = self.get(&requirement.name) {
                check_requirement(requirement, handle)?;
                tracing::info!("{} v{} -> built in", handle.name(), handle.version());
                continue;
            }
            let handle = loader.load(requirement, overrides.get(&requirement.name))?;
            self.handles.push(handle);
        }
        Ok(())
    }

    /// Every command the program dispatches must exist in its plugin's
    /// table; fault-tolerant plugins only get a warning.
    pub fn cross_check(&self, program: &Program) -> Result<(), LoadError> {
        for step in &program.commands {
            let Some((plugin, command)) = step.entry.dispatch_target() else {
                continue;
            };
            let handle = self.get(plugin).ok_or_else(|| LoadError::NotLoaded {
                name: plugin.to_string(),
            })?;

            if handle.commands().contains(command) {
                continue;
            }
            if handle.is_fault_tolerant() {
                tracing::warn!(
                    "Line {}: {}.{} is not supported, ignored at run time",
                    step.line,
                    plugin,
                    command
                );
                continue;
            }
            return Err(LoadError::UnsupportedCommand {
                line: step.line,
                plugin: plugin.to_string(),
                command: command.to_string(),
            });
        }
        Ok(())
    }

    /// Initialize every plugin in load order; stops at the first failure
    pub fn init_all(&mut self) -> Result<(), LoadError> {
        for handle in &mut self.handles {
            handle.init()?;
        }
        tracing::debug!("{} plugin(s) initialized", self.handles.len());
        Ok(())
    }

    /// Enable every plugin for real execution
    pub fn enable_all(&mut self) {
        for handle in &mut self.handles {
            handle.enable();
        }
    }

    /// Handle by name
    pub fn get(&self, name: &str) -> Option<&PluginHandle> {
        self.handles.iter().find(|h| h.name() == name)
    }

    /// Names in load order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handles.iter().map(PluginHandle::name)
    }

    /// Number of plugins
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// No plugins
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Run a command on the worker pool, tracked under `plugin`
    pub fn spawn_detached<F>(&self, plugin: &str, label: String, job: F)
    where
        F: FnOnce() -> CommandResult + Send + 'static,
    {
        self.tasks.spawn(plugin, label, job);
    }

    /// Detached task bookkeeping
    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }
}

impl Drop for PluginRegistry {
    fn drop(&mut self) {
        while let Some(handle) = self.handles.pop() {
            self.tasks.join(handle.name());
            drop(handle);
        }
    }
}

/// Version gate of a `LOAD_PLUGIN` directive against a live handle
pub(crate) fn check_requirement(
    requirement: &PluginRequirement,
    handle: &PluginHandle,
) -> Result<(), LoadError> {
    match &requirement.requirement {
        Some(gate) if !gate.matches(handle.version()) => Err(LoadError::VersionMismatch {
            name: requirement.name.clone(),
            reported: handle.version(),
            requirement: *gate,
        }),
        _ => Ok(()),
    }
}
