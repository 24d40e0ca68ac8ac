//! Filesystem watcher: debounced re-indexing of changed source files

use crate::config::Config;
use crate::indexer::Indexer;
use crate::store::Store;
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const STOP_DEADLINE: Duration = Duration::from_secs(5);

/// Watches a project directory and reconciles the store with on-disk
/// changes.
///
/// Events are coalesced by the debouncer: everything inside one quiet
/// window arrives as a de-duplicated batch. A single worker thread drains
/// batches and dispatches per path (an existing file is re-indexed, a
/// missing one is purged), so index actions are serialized with each other.
pub struct ProjectWatcher {
    project_root: PathBuf,
    indexer: Arc<Indexer>,
    config: Config,
    inner: Mutex<Option<WatchInner>>,
    running: AtomicBool,
}

struct WatchInner {
    debouncer: Debouncer<RecommendedWatcher>,
    worker: thread::JoinHandle<()>,
}

impl ProjectWatcher {
    pub fn new(
        store: Arc<Store>,
        project_root: impl AsRef<Path>,
        config: Config,
    ) -> crate::Result<Self> {
        let indexer = Indexer::new(store, project_root, config.clone())?;
        Ok(Self {
            project_root: indexer.project_root().to_path_buf(),
            indexer: Arc::new(indexer),
            config,
            inner: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Begin watching. Idempotent.
    pub fn start(&self) -> crate::Result<()> {
        let mut guard = self.lock_inner();
        if guard.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel::<Vec<PathBuf>>();
        let root = self.project_root.clone();
        let config = self.config.clone();
        let mut debouncer = new_debouncer(
            self.config.debounce(),
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let mut dirty: Vec<PathBuf> = events
                        .into_iter()
                        .map(|e| e.path)
                        .filter(|p| watchable(p, &root, &config))
                        .collect();
                    dirty.sort();
                    dirty.dedup();
                    if !dirty.is_empty() {
                        let _ = tx.send(dirty);
                    }
                }
                Err(error) => tracing::warn!("watch error: {error}"),
            },
        )?;
        debouncer
            .watcher()
            .watch(&self.project_root, RecursiveMode::Recursive)?;

        let worker = spawn_worker(Arc::clone(&self.indexer), rx);
        *guard = Some(WatchInner { debouncer, worker });
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop watching: pending windows are discarded, the worker drains its
    /// delivered batches and is joined with a deadline. An action already
    /// executing runs to completion. Idempotent.
    pub fn stop(&self) {
        let inner = self.lock_inner().take();
        if let Some(inner) = inner {
            // Dropping the debouncer stops the observer and disconnects the
            // batch channel, which ends the worker loop
            drop(inner.debouncer);
            join_with_deadline(inner.worker, STOP_DEADLINE);
        }
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Full synchronous project walk through the indexer
    pub fn index_now(&self, force: bool) -> crate::Result<usize> {
        self.indexer.index_project(force)
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Option<WatchInner>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for ProjectWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_worker(indexer: Arc<Indexer>, rx: Receiver<Vec<PathBuf>>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(batch) = rx.recv() {
            for path in batch {
                // Errors are swallowed: a file may vanish between the event
                // and the action, and one bad file must not stall the watch
                let result = if path.exists() {
                    indexer.index_file(&path, false).map(|_| ())
                } else {
                    indexer.remove_file(&path)
                };
                if let Err(err) = result {
                    tracing::debug!("watch action failed for {}: {err}", path.display());
                }
            }
        }
    })
}

/// A path is watchable when it carries the source extension and no segment
/// of its project-relative form is dot-prefixed or in the ignore set.
fn watchable(path: &Path, root: &Path, config: &Config) -> bool {
    if path.is_dir() {
        return false;
    }
    if path.extension().and_then(|e| e.to_str()) != Some(config.indexing.extension.as_str()) {
        return false;
    }
    let relative = path.strip_prefix(root).unwrap_or(path);
    !config.is_ignored(relative)
}

/// Best-effort join: after the deadline the watcher reports stopped even if
/// the worker is still winding down.
fn join_with_deadline(handle: thread::JoinHandle<()>, deadline: Duration) {
    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = handle.join();
        let _ = done_tx.send(());
    });
    let _ = done_rx.recv_timeout(deadline);
}
