//! Shared-library plugin loading

use std::path::Path;
use std::ptr::NonNull;

use super::api::{PluginEntryFn, PluginExitFn};
use super::handle::PluginHandle;
use super::registry::check_requirement;
use super::LoadError;
use crate::config::{LoaderConfig, PluginConfig};
use crate::core::script::PluginRequirement;

/// Opens dynamic libraries
#[cfg_attr(test, mockall::automock)]
pub trait LibraryBackend: Send + Sync {
    /// Open the library at `path`
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>, String>;
}

/// An open library; dropping it unloads the library
pub trait LoadedLibrary: Send + Sync {
    /// Resolve the constructor symbol
    fn entry_point(&self, symbol: &str) -> Option<PluginEntryFn>;

    /// Resolve the destructor symbol
    fn exit_point(&self, symbol: &str) -> Option<PluginExitFn>;
}

/// [`LibraryBackend`] backed by `libloading`
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibBackend;

struct Dylib {
    library: libloading::Library,
}

impl LoadedLibrary for Dylib {
    fn entry_point(&self, symbol: &str) -> Option<PluginEntryFn> {
        // SAFETY: the symbol is declared with this signature by `export_plugin!`
        unsafe { self.library.get::<PluginEntryFn>(symbol.as_bytes()) }
            .ok()
            .map(|sym| *sym)
    }

    fn exit_point(&self, symbol: &str) -> Option<PluginExitFn> {
        // SAFETY: as above
        unsafe { self.library.get::<PluginExitFn>(symbol.as_bytes()) }
            .ok()
            .map(|sym| *sym)
    }
}

impl LibraryBackend for DylibBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>, String> {
        // SAFETY: loading runs the library's initializers; plugin libraries
        // are trusted by configuration.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| e.to_string())?;
        Ok(Box::new(Dylib { library }))
    }
}

/// Resolves, opens, constructs and version-gates plugins
pub struct PluginLoader {
    settings: LoaderConfig,
    backend: Box<dyn LibraryBackend>,
}

impl PluginLoader {
    /// Loader over real shared libraries
    pub fn new(settings: LoaderConfig) -> Self {
        Self::with_backend(settings, Box::new(DylibBackend))
    }

    /// Loader over a custom backend
    pub fn with_backend(settings: LoaderConfig, backend: Box<dyn LibraryBackend>) -> Self {
        Self { settings, backend }
    }

    /// Resolution settings
    pub fn settings(&self) -> &LoaderConfig {
        &self.settings
    }

    /// Load one plugin. On any failure after the library was opened, the
    /// library is unloaded before the error is returned.
    pub fn load(
        &self,
        requirement: &PluginRequirement,
        config: Option<&PluginConfig>,
    ) -> Result<PluginHandle, LoadError> {
        let name = requirement.name.as_str();
        let path = self.settings.library_path(name);

        let library = self
            .backend
            .open(&path)
            .map_err(|reason| LoadError::LibraryNotFound {
                name: name.to_string(),
                path: path.clone(),
                reason,
            })?;

        let Some(entry) = library.entry_point(&self.settings.entry_point) else {
            return Err(LoadError::MissingEntryPoint {
                name: name.to_string(),
                symbol: self.settings.entry_point.clone(),
            });
        };
        let Some(exit) = library.exit_point(&self.settings.exit_point) else {
            return Err(LoadError::MissingEntryPoint {
                name: name.to_string(),
                symbol: self.settings.exit_point.clone(),
            });
        };

        // SAFETY: resolved with the constructor signature
        let raw = unsafe { entry() };
        let Some(ptr) = NonNull::new(raw) else {
            return Err(LoadError::NullInstance {
                name: name.to_string(),
            });
        };

        // from here on, dropping the handle runs the exit point and unloads
        let mut handle = PluginHandle::foreign(name, ptr, exit, library);
        handle.initialize(config)?;

        check_requirement(requirement, &handle)?;

        tracing::info!(
            "{} v{} [{}] -> loaded",
            name,
            handle.version(),
            handle.commands().names().collect::<Vec<_>>().join(" ")
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plugin::api::{CommandTable, PluginInstance, ScriptPlugin};
    use crate::core::plugin::{PluginVersion, VersionRequirement, VersionRule};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    static EXITS: AtomicUsize = AtomicUsize::new(0);

    struct Fixed(&'static str, CommandTable);

    impl ScriptPlugin for Fixed {
        fn version(&self) -> &str {
            self.0
        }
        fn commands(&self) -> &CommandTable {
            &self.1
        }
    }

    unsafe extern "C" fn entry_v1_1_9_9() -> *mut PluginInstance {
        let table = CommandTable::new().with("OPEN", |_| Ok(String::new()));
        Box::into_raw(Box::new(PluginInstance(Box::new(Fixed("v1.1.9.9", table)))))
    }

    unsafe extern "C" fn entry_v1_2_0_1() -> *mut PluginInstance {
        let table = CommandTable::new().with("OPEN", |_| Ok(String::new()));
        Box::into_raw(Box::new(PluginInstance(Box::new(Fixed("v1.2.0.1", table)))))
    }

    unsafe extern "C" fn entry_null() -> *mut PluginInstance {
        std::ptr::null_mut()
    }

    unsafe extern "C" fn exit_counting(instance: *mut PluginInstance) {
        EXITS.fetch_add(1, Ordering::SeqCst);
        if !instance.is_null() {
            drop(Box::from_raw(instance));
        }
    }

    /// In-memory library with a drop flag
    struct FakeLibrary {
        entry: Option<PluginEntryFn>,
        exit: Option<PluginExitFn>,
        unloaded: Arc<AtomicUsize>,
    }

    impl LoadedLibrary for FakeLibrary {
        fn entry_point(&self, _symbol: &str) -> Option<PluginEntryFn> {
            self.entry
        }
        fn exit_point(&self, _symbol: &str) -> Option<PluginExitFn> {
            self.exit
        }
    }

    impl Drop for FakeLibrary {
        fn drop(&mut self) {
            self.unloaded.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn settings() -> LoaderConfig {
        LoaderConfig {
            directory: PathBuf::from("plugins"),
            prefix: "lib".into(),
            extension: "_plugin.so".into(),
            ..LoaderConfig::default()
        }
    }

    fn requirement(name: &str, gate: Option<VersionRequirement>) -> PluginRequirement {
        PluginRequirement {
            name: name.into(),
            requirement: gate,
            line: 1,
        }
    }

    fn at_least_1_2() -> Option<VersionRequirement> {
        Some(VersionRequirement {
            rule: VersionRule::GreaterOrEqual,
            version: PluginVersion::new(1, 2, 0, 0),
        })
    }

    fn loader_with(
        entry: Option<PluginEntryFn>,
        exit: Option<PluginExitFn>,
        unloaded: &Arc<AtomicUsize>,
    ) -> PluginLoader {
        let unloaded = Arc::clone(unloaded);
        let mut backend = MockLibraryBackend::new();
        backend.expect_open().returning(move |_| {
            let library: Box<dyn LoadedLibrary> = Box::new(FakeLibrary {
                entry,
                exit,
                unloaded: Arc::clone(&unloaded),
            });
            Ok(library)
        });
        PluginLoader::with_backend(settings(), Box::new(backend))
    }

    #[test]
    fn test_path_convention() {
        let mut backend = MockLibraryBackend::new();
        backend
            .expect_open()
            .withf(|path| path == Path::new("plugins/libfoo_plugin.so"))
            .times(1)
            .returning(|_| Err("not found".into()));

        let loader = PluginLoader::with_backend(settings(), Box::new(backend));
        let err = loader.load(&requirement("FOO", None), None).unwrap_err();
        match err {
            LoadError::LibraryNotFound { path, reason, .. } => {
                assert_eq!(path, PathBuf::from("plugins/libfoo_plugin.so"));
                assert_eq!(reason, "not found");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_entry_point_unloads() {
        let unloaded = Arc::new(AtomicUsize::new(0));
        let loader = loader_with(None, Some(exit_counting), &unloaded);

        let err = loader.load(&requirement("FOO", None), None).unwrap_err();
        assert!(matches!(err, LoadError::MissingEntryPoint { ref symbol, .. } if symbol == "uscript_plugin_entry"));
        assert_eq!(unloaded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_exit_point_unloads() {
        let unloaded = Arc::new(AtomicUsize::new(0));
        let loader = loader_with(Some(entry_v1_2_0_1), None, &unloaded);

        let err = loader.load(&requirement("FOO", None), None).unwrap_err();
        assert!(matches!(err, LoadError::MissingEntryPoint { ref symbol, .. } if symbol == "uscript_plugin_exit"));
        assert_eq!(unloaded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_null_instance_unloads() {
        let unloaded = Arc::new(AtomicUsize::new(0));
        let loader = loader_with(Some(entry_null), Some(exit_counting), &unloaded);

        let err = loader.load(&requirement("FOO", None), None).unwrap_err();
        assert!(matches!(err, LoadError::NullInstance { .. }));
        assert_eq!(unloaded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_version_gate() {
        let unloaded = Arc::new(AtomicUsize::new(0));
        let exits_before = EXITS.load(Ordering::SeqCst);

        let old = loader_with(Some(entry_v1_1_9_9), Some(exit_counting), &unloaded);
        let err = old.load(&requirement("FOO", at_least_1_2()), None).unwrap_err();
        assert!(matches!(err, LoadError::VersionMismatch { reported, .. } if reported == PluginVersion::new(1, 1, 9, 9)));
        assert_eq!(unloaded.load(Ordering::SeqCst), 1);
        assert!(EXITS.load(Ordering::SeqCst) > exits_before);

        let new = loader_with(Some(entry_v1_2_0_1), Some(exit_counting), &unloaded);
        let handle = new.load(&requirement("FOO", at_least_1_2()), None).unwrap();
        assert_eq!(handle.name(), "FOO");
        assert!(handle.is_foreign());
        assert!(handle.commands().contains("OPEN"));
        assert_eq!(unloaded.load(Ordering::SeqCst), 1);

        drop(handle);
        assert_eq!(unloaded.load(Ordering::SeqCst), 2);
    }
}
