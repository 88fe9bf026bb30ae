//! Filesystem watcher on the shared git directory.
//!
//! Branch, commit and worktree changes made from any terminal show up under
//! the git common dir, so watching it catches changes made outside treeline:
//!
//! ```text
//! <common-dir>/            watched itself (HEAD, index, packed-refs)
//! ├── refs/**              every directory, recursively
//! ├── logs/**
//! └── worktrees/**
//! ```
//!
//! New directories created under those roots (a new `refs/heads/feature/`)
//! are added to the watch set as they appear. Accepted events pass a 600ms
//! [`RefreshGate`] and then post a signal on a capacity-1 channel: a signal
//! already waiting makes further ones redundant, so they are dropped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{self as chan, Receiver, Sender, TryRecvError};
use notify::event::ModifyKind;
use notify::{EventKind, RecursiveMode, Watcher};
use walkdir::WalkDir;

use crate::git::Repository;

/// Minimum spacing between accepted change signals.
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(600);

/// Subdirectories of the common dir watched recursively.
const WATCH_ROOTS: &[&str] = &["refs", "logs", "worktrees"];

/// Rate limiter for refreshes triggered by filesystem events.
#[derive(Debug, Clone)]
pub struct RefreshGate {
    min_spacing: Duration,
    last_accepted: Option<Instant>,
}

impl Default for RefreshGate {
    fn default() -> Self {
        Self::new(WATCH_DEBOUNCE)
    }
}

impl RefreshGate {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_accepted: None,
        }
    }

    /// Accept if at least `min_spacing` has passed since the last accepted
    /// call, and remember `now` when accepting.
    pub fn should_refresh(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_accepted
            && now.saturating_duration_since(last) < self.min_spacing
        {
            return false;
        }
        self.last_accepted = Some(now);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum WatcherState {
    Stopped,
    Starting,
    Running,
}

/// Directories currently registered with the OS watcher.
struct WatchSet {
    watcher: Box<dyn Watcher + Send>,
    paths: HashSet<PathBuf>,
    roots: Vec<PathBuf>,
}

impl WatchSet {
    /// Watch `path` unless already watched or no longer a directory.
    fn add_dir(&mut self, path: &Path) {
        if self.paths.contains(path) || !path.is_dir() {
            return;
        }
        match self.watcher.watch(path, RecursiveMode::NonRecursive) {
            Ok(()) => {
                self.paths.insert(path.to_path_buf());
            }
            Err(e) => log::debug!("Failed to watch {}: {e}", path.display()),
        }
    }

    fn add_tree(&mut self, root: &Path) {
        for entry in WalkDir::new(root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_dir())
        {
            self.add_dir(entry.path());
        }
    }

    fn is_under_root(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| path.starts_with(root))
    }

    /// A directory created under a root joins the watch set, along with
    /// anything created inside it before the watch was registered.
    fn maybe_watch_new_dir(&mut self, path: &Path) {
        if self.is_under_root(path) && path.is_dir() {
            self.add_tree(path);
        }
    }
}

struct Running {
    done: Sender<()>,
    worker: JoinHandle<()>,
    watch_set: Arc<Mutex<WatchSet>>,
}

/// Watches a repository's git metadata and signals when a refresh is needed.
pub struct ChangeWatcher {
    state: WatcherState,
    signal_tx: Sender<()>,
    signal_rx: Receiver<()>,
    min_spacing: Duration,
    running: Option<Running>,
    common_dir: Option<PathBuf>,
}

impl Default for ChangeWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeWatcher {
    pub fn new() -> Self {
        Self::with_min_spacing(WATCH_DEBOUNCE)
    }

    pub fn with_min_spacing(min_spacing: Duration) -> Self {
        let (signal_tx, signal_rx) = chan::bounded(1);
        Self {
            state: WatcherState::Stopped,
            signal_tx,
            signal_rx,
            min_spacing,
            running: None,
            common_dir: None,
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// Receiver of change signals. Each message means "refresh needed".
    pub fn signals(&self) -> Receiver<()> {
        self.signal_rx.clone()
    }

    pub fn common_dir(&self) -> Option<&Path> {
        self.common_dir.as_deref()
    }

    /// Start watching `repo`'s common dir.
    ///
    /// Does nothing if already running or `enabled` is false. Failing to
    /// resolve the directory or to create the OS watcher leaves the watcher
    /// stopped; returns whether it is running.
    pub fn start(&mut self, repo: &Repository, enabled: bool) -> bool {
        if self.state != WatcherState::Stopped || !enabled {
            return self.state == WatcherState::Running;
        }
        self.state = WatcherState::Starting;
        match repo.git_common_dir() {
            Ok(common_dir) => self.start_at(&common_dir),
            Err(e) => {
                log::warn!("Auto-refresh disabled: {e:#}");
                self.state = WatcherState::Stopped;
                false
            }
        }
    }

    /// Start watching a known common dir.
    pub fn start_at(&mut self, common_dir: &Path) -> bool {
        if self.state == WatcherState::Running {
            return true;
        }
        self.state = WatcherState::Starting;

        let (event_tx, event_rx) = chan::unbounded::<notify::Result<notify::Event>>();
        let watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            // Receiver is gone once the event loop has stopped
            let _ = event_tx.send(res);
        }) {
            Ok(watcher) => watcher,
            Err(e) => {
                log::warn!("Auto-refresh disabled: cannot create file watcher: {e}");
                self.state = WatcherState::Stopped;
                return false;
            }
        };

        let roots: Vec<PathBuf> = WATCH_ROOTS.iter().map(|d| common_dir.join(d)).collect();
        let mut set = WatchSet {
            watcher: Box::new(watcher),
            paths: HashSet::new(),
            roots: roots.clone(),
        };
        set.add_dir(common_dir);
        for root in &roots {
            set.add_tree(root);
        }
        log::debug!(
            "Watching {} directories under {}",
            set.paths.len(),
            common_dir.display()
        );

        let watch_set = Arc::new(Mutex::new(set));
        let (done_tx, done_rx) = chan::bounded::<()>(0);
        let worker = {
            let watch_set = Arc::clone(&watch_set);
            let signal_tx = self.signal_tx.clone();
            let gate = RefreshGate::new(self.min_spacing);
            std::thread::Builder::new()
                .name("treeline-watch".into())
                .spawn(move || event_loop(event_rx, done_rx, watch_set, signal_tx, gate))
        };
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                log::warn!("Auto-refresh disabled: cannot start watch thread: {e}");
                self.state = WatcherState::Stopped;
                return false;
            }
        };

        self.running = Some(Running {
            done: done_tx,
            worker,
            watch_set,
        });
        self.common_dir = Some(common_dir.to_path_buf());
        self.state = WatcherState::Running;
        true
    }

    /// Stop the event loop and release the OS watcher. Idempotent.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            self.state = WatcherState::Stopped;
            return;
        };
        // Disconnecting `done` is the stop signal
        drop(running.done);
        let _ = running.worker.join();
        drop(running.watch_set);
        self.state = WatcherState::Stopped;
        log::debug!("Stopped watching git directory");
    }

    /// Directories currently watched.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let Some(running) = &self.running else {
            return Vec::new();
        };
        let set = running
            .watch_set
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut paths: Vec<_> = set.paths.iter().cloned().collect();
        paths.sort();
        paths
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Write, create, remove and rename count; reads and metadata changes don't.
fn is_relevant(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => false,
    }
}

fn event_loop(
    events: Receiver<notify::Result<notify::Event>>,
    done: Receiver<()>,
    watch_set: Arc<Mutex<WatchSet>>,
    signal_tx: Sender<()>,
    mut gate: RefreshGate,
) {
    loop {
        chan::select! {
            recv(done) -> _ => break,
            recv(events) -> msg => match msg {
                Err(_) => break,
                Ok(Err(e)) => log::debug!("Watcher error: {e}"),
                Ok(Ok(event)) => {
                    if !is_relevant(&event.kind) {
                        continue;
                    }
                    if matches!(event.kind, EventKind::Create(_)) {
                        let mut set = watch_set.lock().unwrap_or_else(PoisonError::into_inner);
                        for path in &event.paths {
                            set.maybe_watch_new_dir(path);
                        }
                    }
                    if gate.should_refresh(Instant::now()) {
                        signal(&done, &signal_tx);
                    }
                }
            },
        }
    }
}

/// Post a change signal unless stopped. Never blocks.
fn signal(done: &Receiver<()>, tx: &Sender<()>) {
    if matches!(done.try_recv(), Err(TryRecvError::Disconnected)) {
        return;
    }
    // Full means a signal is already pending
    let _ = tx.try_send(());
}
