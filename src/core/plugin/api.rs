//! Plugin API definitions
//!
//! A plugin library exports two C-callable symbols: a constructor returning a
//! heap-allocated [`PluginInstance`] and a destructor taking it back. Plugins
//! written in Rust get both from [`export_plugin!`](crate::export_plugin).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Default constructor symbol
pub const DEFAULT_ENTRY_POINT: &str = "uscript_plugin_entry";

/// Default destructor symbol
pub const DEFAULT_EXIT_POINT: &str = "uscript_plugin_exit";

/// Failure reported by a command handler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CommandError(pub String);

impl CommandError {
    /// Create a new error
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Handler outcome: the command's textual result, empty for none
pub type CommandResult = Result<String, CommandError>;

/// A command implementation; receives the expanded parameter text
pub type CommandHandler = Arc<dyn Fn(&str) -> CommandResult + Send + Sync>;

/// Side-effect free argument check run before the plugin is enabled.
///
/// Variable macros are not bound yet at that point, so `$NAME` references may
/// still appear in the parameters.
pub type ArgCheck = Arc<dyn Fn(&str) -> Result<(), CommandError> + Send + Sync>;

/// Command name to handler lookup
#[derive(Clone, Default)]
pub struct CommandTable {
    handlers: BTreeMap<String, CommandHandler>,
    checks: BTreeMap<String, ArgCheck>,
}

impl CommandTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration
    #[must_use]
    pub fn with<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&str) -> CommandResult + Send + Sync + 'static,
    {
        self.register(name, handler);
        self
    }

    /// Register or replace a handler
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&str) -> CommandResult + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_string(), Arc::new(handler));
    }

    /// Builder-style registration of an argument check
    #[must_use]
    pub fn with_check<F>(mut self, name: &str, check: F) -> Self
    where
        F: Fn(&str) -> Result<(), CommandError> + Send + Sync + 'static,
    {
        self.register_check(name, check);
        self
    }

    /// Register or replace the argument check of a command
    pub fn register_check<F>(&mut self, name: &str, check: F)
    where
        F: Fn(&str) -> Result<(), CommandError> + Send + Sync + 'static,
    {
        self.checks.insert(name.to_string(), Arc::new(check));
    }

    /// Look up a handler
    pub fn get(&self, name: &str) -> Option<&CommandHandler> {
        self.handlers.get(name)
    }

    /// Look up the argument check of a command; commands without one accept
    /// any parameters
    pub fn check(&self, name: &str) -> Option<&ArgCheck> {
        self.checks.get(name)
    }

    /// Is the command supported
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Command names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// No commands
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Drop every handler and check
    pub fn clear(&mut self) {
        self.handlers.clear();
        self.checks.clear();
    }
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// What a plugin exposes to the interpreter
pub trait ScriptPlugin: Send + Sync {
    /// Reported version, `MAJOR.MINOR.PATCH.BUILD` with optional `v` prefix
    fn version(&self) -> &str;

    /// Supported commands
    fn commands(&self) -> &CommandTable;

    /// Whether the plugin is ready to run commands
    fn is_enabled(&self) -> bool {
        true
    }

    /// Whether command failures should be logged instead of aborting the script
    fn is_fault_tolerant(&self) -> bool {
        false
    }

    /// Apply the `[plugins.NAME.settings]` values. Called once, right after
    /// construction and before anything else.
    fn configure(&mut self, _settings: &BTreeMap<String, String>) -> Result<(), String> {
        Ok(())
    }

    /// Bring up the modules the plugin depends on. Called once every plugin
    /// of the script is loaded and its commands are cross-checked.
    fn init(&mut self) -> Result<(), String> {
        Ok(())
    }

    /// Allow real execution. Called after every argument check of the
    /// script passed; `is_enabled` is read again afterwards.
    fn enable(&mut self) {}
}

/// Heap cell passed across the library boundary; a thin pointer to it is
/// what the entry points exchange.
pub struct PluginInstance(pub Box<dyn ScriptPlugin>);

/// Constructor entry point
#[allow(improper_ctypes_definitions)]
pub type PluginEntryFn = unsafe extern "C" fn() -> *mut PluginInstance;

/// Destructor entry point
#[allow(improper_ctypes_definitions)]
pub type PluginExitFn = unsafe extern "C" fn(*mut PluginInstance);

/// Export the constructor and destructor entry points for a plugin type.
///
/// ```ignore
/// uscript_core::export_plugin!(RelayPlugin::new());
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($ctor:expr) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn uscript_plugin_entry() -> *mut $crate::core::plugin::PluginInstance {
            let plugin: Box<dyn $crate::core::plugin::ScriptPlugin> = Box::new($ctor);
            Box::into_raw(Box::new($crate::core::plugin::PluginInstance(plugin)))
        }

        /// # Safety
        ///
        /// `instance` must come from `uscript_plugin_entry` and not be used
        /// afterwards.
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn uscript_plugin_exit(
            instance: *mut $crate::core::plugin::PluginInstance,
        ) {
            if !instance.is_null() {
                drop(Box::from_raw(instance));
            }
        }
    };
}
