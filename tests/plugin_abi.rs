//! Plugin entry points exported with `export_plugin!`, loaded through an
//! in-memory library backend

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uscript_core::config::{AppConfig, LoaderConfig, PluginConfig};
use uscript_core::core::plugin::{
    CommandError, CommandTable, LibraryBackend, LoadError, LoadedLibrary, PluginEntryFn,
    PluginExitFn, PluginLoader, ScriptPlugin, DEFAULT_ENTRY_POINT, DEFAULT_EXIT_POINT,
};
use uscript_core::{RunnerError, ScriptRunner};

struct Counter {
    value: Arc<Mutex<i64>>,
    commands: CommandTable,
}

impl Counter {
    fn new() -> Self {
        let value = Arc::new(Mutex::new(0));

        let inc = Arc::clone(&value);
        let get = Arc::clone(&value);
        let is_at = Arc::clone(&value);
        let commands = CommandTable::new()
            .with("INC", move |_| {
                *inc.lock() += 1;
                Ok(String::new())
            })
            .with("GET", move |_| Ok(get.lock().to_string()))
            .with("IS_AT", move |params| {
                let expected: i64 = params
                    .trim()
                    .parse()
                    .map_err(|_| CommandError::new(format!("not a number: {params}")))?;
                Ok(if *is_at.lock() == expected { "TRUE" } else { "FALSE" }.to_string())
            });

        Self { value, commands }
    }
}

impl ScriptPlugin for Counter {
    fn version(&self) -> &str {
        "v1.4.0.2"
    }

    fn commands(&self) -> &CommandTable {
        &self.commands
    }

    fn configure(&mut self, settings: &BTreeMap<String, String>) -> Result<(), String> {
        if let Some(start) = settings.get("start") {
            *self.value.lock() = start.parse().map_err(|_| format!("bad start [{start}]"))?;
        }
        Ok(())
    }
}

uscript_core::export_plugin!(Counter::new());

/// Serves the entry points above for `libcounter_plugin.so` only
struct InMemoryBackend {
    unloaded: Arc<AtomicUsize>,
}

struct InMemoryLibrary {
    unloaded: Arc<AtomicUsize>,
}

impl LoadedLibrary for InMemoryLibrary {
    fn entry_point(&self, symbol: &str) -> Option<PluginEntryFn> {
        (symbol == DEFAULT_ENTRY_POINT).then_some(uscript_plugin_entry as PluginEntryFn)
    }

    fn exit_point(&self, symbol: &str) -> Option<PluginExitFn> {
        (symbol == DEFAULT_EXIT_POINT).then_some(uscript_plugin_exit as PluginExitFn)
    }
}

impl Drop for InMemoryLibrary {
    fn drop(&mut self) {
        self.unloaded.fetch_add(1, Ordering::SeqCst);
    }
}

impl LibraryBackend for InMemoryBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>, String> {
        if path != Path::new("plugins/libcounter_plugin.so") {
            return Err(format!("{}: no such file", path.display()));
        }
        Ok(Box::new(InMemoryLibrary {
            unloaded: Arc::clone(&self.unloaded),
        }))
    }
}

fn loader_config() -> LoaderConfig {
    LoaderConfig {
        directory: PathBuf::from("plugins"),
        prefix: "lib".into(),
        extension: "_plugin.so".into(),
        ..LoaderConfig::default()
    }
}

fn runner(config: AppConfig, unloaded: &Arc<AtomicUsize>) -> ScriptRunner {
    let backend = InMemoryBackend {
        unloaded: Arc::clone(unloaded),
    };
    let loader = PluginLoader::with_backend(config.loader.clone(), Box::new(backend));
    ScriptRunner::with_loader(config, loader)
}

fn write_script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("script.txt");
    std::fs::write(&path, body).unwrap();
    path
}

fn base_config() -> AppConfig {
    AppConfig {
        loader: loader_config(),
        ..AppConfig::default()
    }
}

#[test]
fn test_exported_plugin_runs_script() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        &dir,
        "LOAD_PLUGIN COUNTER >= v1.2.0.0\n\
         COUNTER.INC\n\
         COUNTER.INC\n\
         DONE ?= COUNTER.IS_AT 2\n\
         IF NOT $DONE GOTO FAILED\n\
         COUNTER.INC\n\
         GOTO END\n\
         LABEL FAILED\n\
         COUNTER.IS_AT not-a-number\n\
         LABEL END\n",
    );
    let unloaded = Arc::new(AtomicUsize::new(0));

    let report = runner(base_config(), &unloaded).run(&script).unwrap();

    assert_eq!(report.plugins, vec!["COUNTER"]);
    assert_eq!(report.executed, 4);
    assert_eq!(report.jumps, 1);
    assert_eq!(unloaded.load(Ordering::SeqCst), 1);
}

#[test]
fn test_version_gate_unloads_library() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "LOAD_PLUGIN COUNTER > v1.4.0.2\nCOUNTER.INC\n");
    let unloaded = Arc::new(AtomicUsize::new(0));

    let err = runner(base_config(), &unloaded).run(&script).unwrap_err();

    assert!(matches!(err, RunnerError::Load(LoadError::VersionMismatch { .. })));
    assert_eq!(unloaded.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unknown_library() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "LOAD_PLUGIN COUNTER\nLOAD_PLUGIN GPIO\nGPIO.SET 1\nCOUNTER.INC\n");
    let unloaded = Arc::new(AtomicUsize::new(0));

    let err = runner(base_config(), &unloaded).run(&script).unwrap_err();

    match err {
        RunnerError::Load(LoadError::LibraryNotFound { name, path, .. }) => {
            assert_eq!(name, "GPIO");
            assert_eq!(path, PathBuf::from("plugins/libgpio_plugin.so"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    // COUNTER was loaded first and is released on the way out
    assert_eq!(unloaded.load(Ordering::SeqCst), 1);
}

#[test]
fn test_settings_reach_plugin() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "LOAD_PLUGIN COUNTER\nCOUNTER.INC\nOK ?= COUNTER.IS_AT 8\nIF !$OK GOTO BAD\nGOTO END\nLABEL BAD\nCOUNTER.FAIL_HERE\nLABEL END\n");

    let mut config = base_config();
    let mut counter = PluginConfig::default();
    counter
        .settings
        .insert("start".into(), toml::Value::Integer(7));
    config.plugins.insert("COUNTER".into(), counter);

    // FAIL_HERE is unknown, so the cross-check would reject the script
    // unless the plugin is tolerant; make it so and check the branch skips it
    config.plugins.get_mut("COUNTER").unwrap().fault_tolerant = Some(true);

    let unloaded = Arc::new(AtomicUsize::new(0));
    let report = runner(config, &unloaded).run(&script).unwrap();
    assert_eq!(report.recovered_failures, 0);
    assert_eq!(report.jumps, 1);
}

#[test]
fn test_rejected_settings_unload() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "LOAD_PLUGIN COUNTER\nCOUNTER.INC\n");

    let mut config = base_config();
    let mut counter = PluginConfig::default();
    counter
        .settings
        .insert("start".into(), toml::Value::String("many".into()));
    config.plugins.insert("COUNTER".into(), counter);

    let unloaded = Arc::new(AtomicUsize::new(0));
    let err = runner(config, &unloaded).run(&script).unwrap_err();

    assert!(matches!(err, RunnerError::Load(LoadError::Configuration { .. })));
    assert_eq!(unloaded.load(Ordering::SeqCst), 1);
}
