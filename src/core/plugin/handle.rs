//! Live plugin handle

use std::ptr::NonNull;

use super::api::{CommandTable, PluginExitFn, PluginInstance, ScriptPlugin};
use super::loader::LoadedLibrary;
use super::version::PluginVersion;
use super::LoadError;
use crate::config::PluginConfig;

enum Instance {
    /// Constructed by a library entry point, released through its exit point
    Foreign {
        ptr: NonNull<PluginInstance>,
        exit: PluginExitFn,
    },
    /// Constructed in this process
    Owned(Box<dyn ScriptPlugin>),
}

/// A constructed plugin with its dispatch table and effective flags.
///
/// Dropping the handle releases the instance through the plugin's exit point
/// and only then unloads the library.
pub struct PluginHandle {
    name: String,
    version: PluginVersion,
    commands: CommandTable,
    enabled: bool,
    enabled_override: Option<bool>,
    fault_tolerant: bool,
    instance: Instance,
    library: Option<Box<dyn LoadedLibrary>>,
}

// SAFETY: the instance behind `ptr` is a `Box<dyn ScriptPlugin>`, which is
// `Send + Sync`. The pointer is only dereferenced during initialization and
// handed back to the exit point on drop.
unsafe impl Send for PluginHandle {}
unsafe impl Sync for PluginHandle {}

impl PluginHandle {
    /// Wrap an instance returned by a library entry point
    pub(crate) fn foreign(
        name: &str,
        ptr: NonNull<PluginInstance>,
        exit: PluginExitFn,
        library: Box<dyn LoadedLibrary>,
    ) -> Self {
        Self::with_instance(name, Instance::Foreign { ptr, exit }, Some(library))
    }

    /// Handle for a plugin living in this process, with no library behind it
    pub fn in_process(
        name: &str,
        plugin: Box<dyn ScriptPlugin>,
        config: Option<&PluginConfig>,
    ) -> Result<Self, LoadError> {
        let mut handle = Self::with_instance(name, Instance::Owned(plugin), None);
        handle.initialize(config)?;
        Ok(handle)
    }

    fn with_instance(name: &str, instance: Instance, library: Option<Box<dyn LoadedLibrary>>) -> Self {
        Self {
            name: name.to_string(),
            version: PluginVersion::default(),
            commands: CommandTable::new(),
            enabled: false,
            enabled_override: None,
            fault_tolerant: false,
            instance,
            library,
        }
    }

    fn plugin_mut(&mut self) -> &mut dyn ScriptPlugin {
        match &mut self.instance {
            // SAFETY: `ptr` came non-null from the entry point and stays
            // valid until the exit point runs in `drop`.
            Instance::Foreign { ptr, .. } => unsafe { ptr.as_mut() }.0.as_mut(),
            Instance::Owned(plugin) => plugin.as_mut(),
        }
    }

    /// Configure the instance, then capture its version, commands and flags
    pub(crate) fn initialize(&mut self, config: Option<&PluginConfig>) -> Result<(), LoadError> {
        let name = self.name.clone();
        let plugin = self.plugin_mut();

        if let Some(config) = config {
            plugin
                .configure(&config.settings())
                .map_err(|reason| LoadError::Configuration {
                    name: name.clone(),
                    reason,
                })?;
        }

        let reported = plugin.version().to_string();
        let commands = plugin.commands().clone();
        let enabled_override = config.and_then(|c| c.enabled);
        let enabled = enabled_override.unwrap_or_else(|| plugin.is_enabled());
        let fault_tolerant = config
            .and_then(|c| c.fault_tolerant)
            .unwrap_or_else(|| plugin.is_fault_tolerant());

        self.version = reported.parse().map_err(|_| LoadError::InvalidVersion {
            name,
            version: reported,
        })?;
        self.commands = commands;
        self.enabled = enabled;
        self.enabled_override = enabled_override;
        self.fault_tolerant = fault_tolerant;
        Ok(())
    }

    /// Run the plugin's `init` hook
    pub(crate) fn init(&mut self) -> Result<(), LoadError> {
        let name = self.name.clone();
        self.plugin_mut()
            .init()
            .map_err(|reason| LoadError::Initialization { name, reason })
    }

    /// Run the plugin's `enable` hook and refresh the enabled flag; a
    /// configured override still wins
    pub(crate) fn enable(&mut self) {
        let plugin = self.plugin_mut();
        plugin.enable();
        let enabled = plugin.is_enabled();
        self.enabled = self.enabled_override.unwrap_or(enabled);
        tracing::debug!("{} -> enabled: {}", self.name, self.enabled);
    }

    /// Name as used in the script
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reported version
    pub fn version(&self) -> PluginVersion {
        self.version
    }

    /// Dispatch table
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Effective enabled flag
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Effective fault tolerance flag
    pub fn is_fault_tolerant(&self) -> bool {
        self.fault_tolerant
    }

    /// Backed by a shared library
    pub fn is_foreign(&self) -> bool {
        self.library.is_some()
    }
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("commands", &self.commands)
            .field("enabled", &self.enabled)
            .field("fault_tolerant", &self.fault_tolerant)
            .field("foreign", &self.is_foreign())
            .finish()
    }
}

impl Drop for PluginHandle {
    fn drop(&mut self) {
        // handlers may point into library code
        self.commands.clear();

        if let Instance::Foreign { ptr, exit } = self.instance {
            // SAFETY: `ptr` came from the matching entry point and is
            // released exactly once.
            unsafe { exit(ptr.as_ptr()) };
        }

        if self.library.take().is_some() {
            tracing::debug!("{} -> unloaded", self.name);
        }
    }
}
