//! Worktree refresh: one listing, one branch-activity query, then one status
//! probe per worktree fanned out over a bounded pool.
//!
//! ```text
//! refresh()
//! ├─ git worktree list --porcelain          (sequential)
//! ├─ git for-each-ref ... refs/heads        (sequential)
//! └─ pool.scope(
//!      ├─ git status --porcelain=v2 --branch [wt-1]  ─┐
//!      ├─ git status --porcelain=v2 --branch [wt-2]   ├─ at most pool_size at once
//!      └─ ...                                        ─┘
//!    ) → results channel → Snapshot
//! ```
//!
//! Records arrive in completion order. Ordering is the consumer's concern.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use crossbeam_channel as chan;

use crate::sync::Semaphore;

use super::parse::BRANCH_ACTIVITY_FORMAT;
use super::{
    CommandRunner, GitError, RunOptions, Snapshot, StatusCounts, WorktreeRecord, parse_branch_activity,
    parse_status_v2, parse_worktree_list,
};

const MIN_POOL_SIZE: usize = 4;
const MAX_POOL_SIZE: usize = 32;

/// Twice the logical CPU count, clamped to `[4, 32]`.
pub fn default_pool_size() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    (cpus * 2).clamp(MIN_POOL_SIZE, MAX_POOL_SIZE)
}

pub struct RefreshEngine {
    repo_root: PathBuf,
    runner: Arc<dyn CommandRunner>,
    pool: rayon::ThreadPool,
    permits: Semaphore,
}

impl RefreshEngine {
    pub fn new(repo_root: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> anyhow::Result<Self> {
        Self::with_pool_size(repo_root, runner, default_pool_size())
    }

    pub fn with_pool_size(
        repo_root: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
        size: usize,
    ) -> anyhow::Result<Self> {
        let size = size.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("treeline-status-{i}"))
            .build()
            .context("Failed to build status probe pool")?;
        Ok(Self {
            repo_root: repo_root.into(),
            runner,
            pool,
            permits: Semaphore::new(size),
        })
    }

    /// Maximum number of status probes running at once.
    pub fn pool_size(&self) -> usize {
        self.permits.capacity()
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Build a complete snapshot of every worktree.
    ///
    /// Never fails: an unreadable listing produces an empty snapshot and a
    /// failed status probe produces a record with zero counts. The runner has
    /// already reported either failure.
    pub fn refresh(&self) -> Snapshot {
        self.try_refresh().unwrap_or_else(|e| {
            log::warn!("Ignoring unparseable worktree list: {e}");
            Snapshot::new(Vec::new())
        })
    }

    /// Like [`refresh`](Self::refresh), but a malformed worktree listing is
    /// returned as an error so the caller can keep its previous snapshot.
    pub fn try_refresh(&self) -> Result<Snapshot, GitError> {
        let cwd = Some(self.repo_root.as_path());
        let listing = self.runner.run(
            &["git", "worktree", "list", "--porcelain"],
            cwd,
            &RunOptions::default(),
        );
        let entries = parse_worktree_list(&listing)?;
        if entries.is_empty() {
            return Ok(Snapshot::new(Vec::new()));
        }

        let activity = parse_branch_activity(&self.runner.run(
            &["git", "for-each-ref", BRANCH_ACTIVITY_FORMAT, "refs/heads"],
            cwd,
            &RunOptions::default(),
        ));

        let (tx, rx) = chan::unbounded::<WorktreeRecord>();
        self.pool.scope(|s| {
            for entry in &entries {
                let tx = tx.clone();
                let activity = &activity;
                s.spawn(move |_| {
                    let counts = self.probe_status(&entry.path);
                    let branch_activity = entry.branch.as_ref().and_then(|b| activity.get(b));
                    // Receiver outlives the scope
                    let _ = tx.send(WorktreeRecord::new(entry, branch_activity, counts));
                });
            }
        });
        drop(tx);

        let worktrees: Vec<_> = rx.into_iter().collect();
        log::debug!("Refreshed {} worktrees", worktrees.len());
        Ok(Snapshot::new(worktrees))
    }

    /// Status counters for one worktree, or zeros if the probe fails.
    pub fn probe_status(&self, path: &Path) -> StatusCounts {
        let _permit = self.permits.acquire();
        let output = self.runner.run(
            &["git", "status", "--porcelain=v2", "--branch"],
            Some(path),
            &RunOptions::default(),
        );
        parse_status_v2(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves a canned worktree listing and tracks probe concurrency.
    struct ScriptedRunner {
        listing: String,
        running: AtomicUsize,
        max_running: AtomicUsize,
        failing: Option<PathBuf>,
    }

    impl ScriptedRunner {
        fn with_worktrees(count: usize) -> Self {
            let listing = (0..count)
                .map(|i| format!("worktree /wt/{i}\nbranch refs/heads/b{i}\n"))
                .collect::<Vec<_>>()
                .join("\n");
            Self {
                listing,
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
                failing: None,
            }
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, argv: &[&str], cwd: Option<&Path>, _opts: &RunOptions) -> String {
            match argv.get(1).copied() {
                Some("worktree") => self.listing.clone(),
                Some("for-each-ref") => "b1|1 day ago|1700000000".to_string(),
                Some("status") => {
                    let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                    self.max_running.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(10));
                    self.running.fetch_sub(1, Ordering::SeqCst);
                    if cwd.is_some_and(|p| Some(p) == self.failing.as_deref()) {
                        String::new()
                    } else {
                        "# branch.ab +2 -1\n? new.txt\n".to_string()
                    }
                }
                _ => String::new(),
            }
        }

        fn run_checked(&self, _argv: &[&str], _cwd: Option<&Path>, _prefix: &str) -> bool {
            true
        }
    }

    #[test]
    fn test_default_pool_size_is_clamped() {
        let size = default_pool_size();
        assert!((MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&size));
    }

    #[test]
    fn test_refresh_bounds_concurrency() {
        let runner = Arc::new(ScriptedRunner::with_worktrees(12));
        let engine = RefreshEngine::with_pool_size("/wt/0", runner.clone(), 3).unwrap();

        let snapshot = engine.refresh();

        assert_eq!(snapshot.len(), 12);
        assert!(runner.max_running.load(Ordering::SeqCst) <= 3);
        assert_eq!(engine.pool_size(), 3);
    }

    #[test]
    fn test_refresh_marks_main_and_attaches_activity() {
        let runner = Arc::new(ScriptedRunner::with_worktrees(3));
        let engine = RefreshEngine::with_pool_size("/wt/0", runner, 4).unwrap();

        let snapshot = engine.refresh();

        let main = snapshot.main().unwrap();
        assert_eq!(main.path, PathBuf::from("/wt/0"));
        assert_eq!(snapshot.worktrees.iter().filter(|w| w.is_main).count(), 1);

        let b1 = snapshot.find(Path::new("/wt/1")).unwrap();
        assert_eq!(b1.last_active.as_deref(), Some("1 day ago"));
        assert_eq!(b1.last_active_timestamp, Some(1_700_000_000));
        assert_eq!((b1.ahead, b1.behind, b1.untracked), (2, 1, 1));
        assert!(b1.dirty);

        let b2 = snapshot.find(Path::new("/wt/2")).unwrap();
        assert_eq!(b2.last_active, None);
    }

    #[test]
    fn test_failed_probe_yields_zero_counts() {
        let mut runner = ScriptedRunner::with_worktrees(2);
        runner.failing = Some(PathBuf::from("/wt/1"));
        let engine = RefreshEngine::with_pool_size("/wt/0", Arc::new(runner), 2).unwrap();

        let snapshot = engine.refresh();

        assert_eq!(snapshot.len(), 2);
        let failed = snapshot.find(Path::new("/wt/1")).unwrap();
        assert_eq!(failed.counts(), StatusCounts::default());
        assert!(!failed.dirty);
    }

    #[test]
    fn test_malformed_listing() {
        let mut runner = ScriptedRunner::with_worktrees(0);
        runner.listing = "worktree\n".to_string();
        let engine = RefreshEngine::with_pool_size("/wt/0", Arc::new(runner), 2).unwrap();
        assert!(matches!(engine.try_refresh(), Err(GitError::ParseError(_))));
        assert!(engine.refresh().is_empty());
    }

    #[test]
    fn test_empty_listing_is_empty_snapshot() {
        let runner = Arc::new(ScriptedRunner::with_worktrees(0));
        let engine = RefreshEngine::with_pool_size("/nowhere", runner, 2).unwrap();
        assert!(engine.refresh().is_empty());
    }
}
