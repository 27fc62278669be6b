//! Filesystem watcher for project roots.
//!
//! # Responsibilities
//! - Recursively watch every registered root
//! - Drop events under muted paths
//! - Coalesce bursts into one event per root
//! - Forget roots that disappear from disk

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::watch::patterns::ExcludeSet;
use crate::watch::WatchError;

/// A coalesced change under a watched root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub root: PathBuf,
    /// First path that changed during the debounce window.
    pub path: PathBuf,
    /// Number of raw changes folded into this event.
    pub coalesced: usize,
}

#[derive(Debug)]
struct WatchEntry {
    root: PathBuf,
    excludes: ExcludeSet,
    pinned: bool,
}

struct Shared {
    watcher: Mutex<RecommendedWatcher>,
    entries: RwLock<HashMap<PathBuf, WatchEntry>>,
}

/// Watches project roots and produces a stream of [`ChangeEvent`]s.
///
/// Must be created inside a Tokio runtime; the debounce loop runs as a task
/// that ends when the watcher is dropped.
pub struct DirectoryWatcher {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("roots", &self.watched_roots())
            .finish()
    }
}

impl DirectoryWatcher {
    /// Create a watcher and the receiving end of its event stream.
    pub fn new(debounce: Duration) -> Result<(Self, mpsc::UnboundedReceiver<ChangeEvent>), WatchError> {
        // notify calls back on its own thread; hop into async land through a channel.
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = raw_tx.send(res);
            },
            Config::default(),
        )?;

        let shared = Arc::new(Shared {
            watcher: Mutex::new(watcher),
            entries: RwLock::new(HashMap::new()),
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_event_loop(
            Arc::downgrade(&shared),
            raw_rx,
            events_tx,
            debounce,
        ));

        Ok((Self { shared }, events_rx))
    }

    /// Watch `root` recursively, suppressing changes matching `exclude`.
    pub fn add_watch(&self, root: &Path, exclude: &[String]) -> Result<(), WatchError> {
        self.add_watch_with(root, ExcludeSet::new(exclude)?)
    }

    /// Like [`add_watch`](Self::add_watch) with an already compiled mute list.
    pub fn add_watch_with(&self, root: &Path, excludes: ExcludeSet) -> Result<(), WatchError> {
        self.insert(root, excludes, false)
    }

    /// A watch that `remove_watch` never tears down (dashboard self-reload).
    pub fn add_pinned_watch(&self, root: &Path, exclude: &[String]) -> Result<(), WatchError> {
        self.insert(root, ExcludeSet::new(exclude)?, true)
    }

    fn insert(&self, root: &Path, excludes: ExcludeSet, pinned: bool) -> Result<(), WatchError> {
        let canonical = root
            .canonicalize()
            .ok()
            .filter(|p| p.is_dir())
            .ok_or_else(|| WatchError::RootUnavailable(root.to_path_buf()))?;

        {
            let mut entries = self.shared.write_entries();
            if let Some(entry) = entries.get_mut(&canonical) {
                debug!(root = %canonical.display(), muted = excludes.patterns().len(), "Watch already active, updating mute list");
                entry.excludes = excludes;
                entry.pinned |= pinned;
                return Ok(());
            }
        }

        self.shared
            .lock_watcher()
            .watch(&canonical, RecursiveMode::Recursive)?;

        info!(
            root = %canonical.display(),
            muted = excludes.patterns().len(),
            pinned,
            "Watching directory"
        );
        self.shared.write_entries().insert(
            canonical.clone(),
            WatchEntry {
                root: canonical,
                excludes,
                pinned,
            },
        );
        Ok(())
    }

    /// Stop watching `root`. Returns whether a watch was removed.
    ///
    /// Pinned watches are kept. Pending events of other roots are unaffected.
    pub fn remove_watch(&self, root: &Path) -> bool {
        let key = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        {
            let mut entries = self.shared.write_entries();
            match entries.get(&key) {
                None => return false,
                Some(entry) if entry.pinned => {
                    debug!(root = %key.display(), "Keeping pinned watch");
                    return false;
                }
                Some(_) => {
                    entries.remove(&key);
                }
            }
        }
        self.shared.unwatch(&key);
        info!(root = %key.display(), "Stopped watching directory");
        true
    }

    pub fn is_watching(&self, root: &Path) -> bool {
        let key = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        self.shared.read_entries().contains_key(&key)
    }

    pub fn watched_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self.shared.read_entries().keys().cloned().collect();
        roots.sort();
        roots
    }
}

impl Shared {
    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<PathBuf, WatchEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<PathBuf, WatchEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_watcher(&self) -> std::sync::MutexGuard<'_, RecommendedWatcher> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unwatch(&self, root: &Path) {
        if let Err(e) = self.lock_watcher().unwatch(root) {
            // Already gone when the directory itself was deleted.
            debug!(root = %root.display(), error = %e, "Unwatch failed");
        }
    }

    /// Fold one raw notify event into the pending batch.
    fn classify(&self, event: Event, pending: &mut Vec<ChangeEvent>) {
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }

        let mut vanished = Vec::new();
        {
            let entries = self.read_entries();
            for path in &event.paths {
                let Some(entry) = owning_entry(&entries, path) else {
                    continue;
                };

                if event.kind.is_remove() && (path == &entry.root || !entry.root.exists()) {
                    vanished.push(entry.root.clone());
                    continue;
                }

                let relative = path.strip_prefix(&entry.root).unwrap_or(path);
                if entry.excludes.is_excluded(relative) {
                    trace!(path = %path.display(), "Muted change ignored");
                    continue;
                }

                match pending.iter_mut().find(|e| e.root == entry.root) {
                    Some(existing) => existing.coalesced += 1,
                    None => pending.push(ChangeEvent {
                        root: entry.root.clone(),
                        path: path.clone(),
                        coalesced: 1,
                    }),
                }
            }
        }

        for root in vanished {
            self.drop_vanished(&root);
            pending.retain(|e| e.root != root);
        }
    }

    fn drop_vanished(&self, root: &Path) {
        if self.write_entries().remove(root).is_some() {
            warn!(root = %root.display(), "Watch root unavailable, dropping watch");
            self.unwatch(root);
        }
    }
}

/// The most specific watched root containing `path`.
fn owning_entry<'a>(entries: &'a HashMap<PathBuf, WatchEntry>, path: &Path) -> Option<&'a WatchEntry> {
    entries
        .values()
        .filter(|entry| path.starts_with(&entry.root))
        .max_by_key(|entry| entry.root.components().count())
}

async fn run_event_loop(
    shared: Weak<Shared>,
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    events_tx: mpsc::UnboundedSender<ChangeEvent>,
    debounce: Duration,
) {
    let mut pending: Vec<ChangeEvent> = Vec::new();
    let mut deadline: Option<Instant> = None;

    loop {
        let next = match deadline {
            None => raw_rx.recv().await,
            Some(at) => match tokio::time::timeout_at(at, raw_rx.recv()).await {
                Ok(next) => next,
                Err(_) => {
                    deadline = None;
                    if !flush(&shared, &mut pending, &events_tx) {
                        break;
                    }
                    continue;
                }
            },
        };

        let Some(result) = next else {
            break;
        };
        let Some(owner) = shared.upgrade() else {
            break;
        };

        match result {
            Ok(event) => owner.classify(event, &mut pending),
            Err(e) => warn!(error = %e, "File watch error"),
        }

        if pending.is_empty() {
            deadline = None;
        } else if deadline.is_none() {
            deadline = Some(Instant::now() + debounce);
        }
    }

    debug!("watcher event loop finished");
}

/// Emit pending events whose root is still watched. Returns false once
/// nobody is listening any more.
fn flush(
    shared: &Weak<Shared>,
    pending: &mut Vec<ChangeEvent>,
    events_tx: &mpsc::UnboundedSender<ChangeEvent>,
) -> bool {
    let Some(shared) = shared.upgrade() else {
        return false;
    };
    let entries = shared.read_entries();
    for event in pending.drain(..) {
        if !entries.contains_key(&event.root) {
            trace!(root = %event.root.display(), "Dropping change for unwatched root");
            continue;
        }
        if events_tx.send(event).is_err() {
            return false;
        }
    }
    true
}
