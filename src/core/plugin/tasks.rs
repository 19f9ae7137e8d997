//! Detached command tasks
//!
//! Commands marked with a trailing `&` run on a blocking worker pool. Each
//! task is tracked under its owning plugin so the plugin can be released only
//! after all of its tasks have finished.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;

use super::api::CommandResult;

/// Worker pool plus the outstanding tasks of each plugin
pub struct TaskRegistry {
    runtime: Runtime,
    pending: Mutex<HashMap<String, Vec<JoinHandle<()>>>>,
    spawned: AtomicUsize,
    failures: Arc<AtomicUsize>,
}

impl TaskRegistry {
    /// Pool running at most `max_detached` tasks at once
    pub fn new(max_detached: usize) -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(max_detached.max(1))
            .thread_name("uscript-detached")
            .enable_time()
            .build()?;

        Ok(Self {
            runtime,
            pending: Mutex::new(HashMap::new()),
            spawned: AtomicUsize::new(0),
            failures: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Start `job` without waiting for it
    pub fn spawn<F>(&self, plugin: &str, label: String, job: F)
    where
        F: FnOnce() -> CommandResult + Send + 'static,
    {
        let failures = Arc::clone(&self.failures);
        let handle = self.runtime.spawn_blocking(move || match job() {
            Ok(output) => tracing::debug!("{} -> detached done [{}]", label, output),
            Err(e) => {
                failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!("{} -> detached failed: {}", label, e);
            }
        });

        self.pending
            .lock()
            .entry(plugin.to_string())
            .or_default()
            .push(handle);
        self.spawned.fetch_add(1, Ordering::Relaxed);
    }

    /// Wait for every task of one plugin.
    ///
    /// Must not be called from inside an async context.
    pub fn join(&self, plugin: &str) {
        let handles = self.pending.lock().remove(plugin).unwrap_or_default();
        if handles.is_empty() {
            return;
        }

        tracing::debug!("Waiting for {} detached task(s) of {}", handles.len(), plugin);
        for handle in handles {
            if let Err(e) = self.runtime.block_on(handle) {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Detached task of {} did not complete: {}", plugin, e);
            }
        }
    }

    /// Wait for every task of every plugin
    pub fn join_all(&self) {
        let plugins: Vec<String> = self.pending.lock().keys().cloned().collect();
        for plugin in plugins {
            self.join(&plugin);
        }
    }

    /// Tasks registered and not yet joined
    pub fn outstanding(&self) -> usize {
        self.pending.lock().values().map(Vec::len).sum()
    }

    /// Tasks started so far
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Tasks that failed or panicked so far
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.join_all();
    }
}
