//! Debounced detail loading for the selected worktree.
//!
//! Moving the selection quickly should cost one fetch, for wherever the
//! selection comes to rest. Each selection change:
//!
//! 1. cancels the token of the previous request (in flight or pending),
//! 2. bumps the generation counter,
//! 3. hands the new request to the debounce thread.
//!
//! The debounce thread waits for [`DETAIL_DEBOUNCE`] of quiet. A newer request
//! arriving during the wait replaces the pending one. When the wait expires,
//! the request fires only if its generation is still current; the fetch runs
//! on the rayon pool so the debounce thread stays responsive. A result whose
//! token was cancelled by the time it completes is dropped.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{self as chan, RecvTimeoutError, Sender};

use crate::git::{
    CommandRunner, DiffLimits, DiffPager, LogEntry, RunOptions, WorktreeRecord,
    build_three_part_diff, parse_log, path_to_logging_context,
};
use crate::sync::CancellationToken;

/// Quiet period before a selection's details are fetched.
pub const DETAIL_DEBOUNCE: Duration = Duration::from_millis(200);

/// What to load details for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailTarget {
    pub index: usize,
    pub path: PathBuf,
    pub branch: String,
    pub dirty: bool,
}

impl DetailTarget {
    pub fn new(index: usize, record: &WorktreeRecord) -> Self {
        Self {
            index,
            path: record.path.clone(),
            branch: record.branch.clone(),
            dirty: record.dirty,
        }
    }
}

/// Loaded details for one worktree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailResult {
    pub index: usize,
    pub path: PathBuf,
    /// `git status --short`.
    pub status: String,
    /// Three-part diff, only for dirty worktrees.
    pub diff: String,
    pub log: Vec<LogEntry>,
}

impl DetailResult {
    /// Status text followed by the diff, if any.
    pub fn status_with_diff(&self) -> String {
        if self.diff.is_empty() {
            self.status.clone()
        } else {
            format!("{}\n\n{}", self.status, self.diff)
        }
    }
}

/// Loads details. The token is for early exit between steps; the debouncer
/// discards results of cancelled requests regardless.
pub trait DetailSource: Send + Sync {
    fn fetch(&self, target: &DetailTarget, token: &CancellationToken) -> DetailResult;
}

/// [`DetailSource`] backed by git.
pub struct GitDetailSource {
    runner: Arc<dyn CommandRunner>,
    limits: DiffLimits,
    pager: DiffPager,
    log_entries: usize,
}

impl GitDetailSource {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        limits: DiffLimits,
        pager: DiffPager,
        log_entries: usize,
    ) -> Self {
        Self {
            runner,
            limits,
            pager,
            log_entries,
        }
    }
}

impl DetailSource for GitDetailSource {
    fn fetch(&self, target: &DetailTarget, token: &CancellationToken) -> DetailResult {
        let cwd = Some(target.path.as_path());
        let opts = RunOptions::default();
        let mut result = DetailResult {
            index: target.index,
            path: target.path.clone(),
            status: String::new(),
            diff: String::new(),
            log: Vec::new(),
        };

        result.status = self.runner.run(&["git", "status", "--short"], cwd, &opts);
        if token.is_cancelled() {
            return result;
        }

        let count = format!("-{}", self.log_entries);
        result.log = parse_log(&self.runner.run(
            &["git", "log", &count, "--pretty=format:%h%x09%s"],
            cwd,
            &opts,
        ));

        if target.dirty && !token.is_cancelled() {
            let diff = build_three_part_diff(self.runner.as_ref(), &target.path, &self.limits);
            result.diff = self.pager.apply(&diff);
        }
        result
    }
}

struct Request {
    generation: u64,
    target: DetailTarget,
    token: CancellationToken,
    delay: Duration,
}

struct Shared {
    generation: AtomicU64,
    current: Mutex<CancellationToken>,
}

impl Shared {
    /// Cancel whatever is pending or in flight and start a new generation.
    fn supersede(&self) -> (u64, CancellationToken) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.cancel();
        *current = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (generation, current.clone())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

/// Turns selection changes into at most one detail fetch per resting point.
pub struct DetailDebouncer {
    shared: Arc<Shared>,
    requests: Option<Sender<Request>>,
    worker: Option<JoinHandle<()>>,
    delay: Duration,
}

impl DetailDebouncer {
    /// Start the debounce thread. Results are sent on `results`.
    pub fn new(source: Arc<dyn DetailSource>, results: Sender<DetailResult>) -> Self {
        Self::with_delay(source, results, DETAIL_DEBOUNCE)
    }

    pub fn with_delay(
        source: Arc<dyn DetailSource>,
        results: Sender<DetailResult>,
        delay: Duration,
    ) -> Self {
        let shared = Arc::new(Shared {
            generation: AtomicU64::new(0),
            current: Mutex::new(CancellationToken::new()),
        });
        let (tx, rx) = chan::unbounded::<Request>();
        let worker_shared = Arc::clone(&shared);

        let worker = std::thread::Builder::new()
            .name("treeline-detail".into())
            .spawn(move || debounce_loop(rx, worker_shared, source, results))
            .map_err(|e| log::warn!("Failed to start detail thread: {e}"))
            .ok();

        Self {
            shared,
            requests: Some(tx).filter(|_| worker.is_some()),
            worker,
            delay,
        }
    }

    /// Selection moved to `index` in `worktrees`.
    ///
    /// An out-of-range index only cancels what is pending.
    pub fn on_selection_changed(&self, index: usize, worktrees: &[WorktreeRecord]) {
        self.submit(index, worktrees, self.delay);
    }

    /// Fetch details for `index` immediately, superseding anything pending.
    pub fn request_now(&self, index: usize, worktrees: &[WorktreeRecord]) {
        self.submit(index, worktrees, Duration::ZERO);
    }

    /// Cancel pending and in-flight work without requesting anything new.
    pub fn cancel(&self) {
        self.shared.supersede();
    }

    fn submit(&self, index: usize, worktrees: &[WorktreeRecord], delay: Duration) {
        let (generation, token) = self.shared.supersede();
        let Some(record) = worktrees.get(index) else {
            return;
        };
        let Some(tx) = &self.requests else {
            return;
        };
        let _ = tx.send(Request {
            generation,
            target: DetailTarget::new(index, record),
            token,
            delay,
        });
    }
}

impl Drop for DetailDebouncer {
    fn drop(&mut self) {
        self.shared.supersede();
        // Disconnecting the channel ends the debounce loop
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn debounce_loop(
    rx: chan::Receiver<Request>,
    shared: Arc<Shared>,
    source: Arc<dyn DetailSource>,
    results: Sender<DetailResult>,
) {
    let mut pending: Option<(Request, Instant)> = None;

    loop {
        let next = match &pending {
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            Some((_, deadline)) => {
                rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            }
        };

        match next {
            Ok(request) => {
                let deadline = Instant::now() + request.delay;
                pending = Some((request, deadline));
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Some((request, _)) = pending.take() {
                    fire(request, &shared, &source, &results);
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn fire(
    request: Request,
    shared: &Arc<Shared>,
    source: &Arc<dyn DetailSource>,
    results: &Sender<DetailResult>,
) {
    if !shared.is_current(request.generation) || request.token.is_cancelled() {
        return;
    }
    log::debug!(
        "Loading details for {}",
        path_to_logging_context(&request.target.path)
    );

    let source = Arc::clone(source);
    let results = results.clone();
    rayon::spawn(move || {
        let Request { target, token, .. } = request;
        let result = source.fetch(&target, &token);
        if token.is_cancelled() {
            log::debug!(
                "Dropping stale details for {}",
                path_to_logging_context(&target.path)
            );
            return;
        }
        let _ = results.send(result);
    });
}
