//! Git-facing side of treeline: process runner, output parsing, the
//! refresh engine, and diff assembly.
//!
//! Nothing here implements git; every query shells out to the installed `git`
//! binary (or the optional `gh`/`glab` CLIs) through [`CommandRunner`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

mod diff;
mod error;
mod parse;
mod refresh;
mod repository;
mod runner;


pub use diff::{DiffLimits, DiffPager, build_three_part_diff};
pub use error::GitError;
pub use parse::{
    BranchActivity, WorktreeEntry, parse_branch_activity, parse_log, parse_status_v2,
    parse_untracked_files, parse_worktree_list,
};
pub use refresh::{RefreshEngine, default_pool_size};
pub use repository::Repository;
pub use runner::{CommandRunner, ProcessRunner, Program, RunOptions};

/// Branch label for worktrees with a detached HEAD.
pub const DETACHED: &str = "(detached)";

/// Pull/merge request attached to a worktree's branch by an external fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrInfo {
    pub number: u32,
    pub state: String,
    pub title: String,
    pub url: String,
}

/// Counters parsed from `git status --porcelain=v2 --branch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub ahead: u32,
    pub behind: u32,
    pub staged: u32,
    pub modified: u32,
    pub untracked: u32,
}

impl StatusCounts {
    pub fn is_dirty(&self) -> bool {
        self.staged + self.modified + self.untracked > 0
    }
}

/// One git worktree as of the refresh that produced it.
///
/// `path` is the identity key; records are rebuilt on every refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeRecord {
    pub path: PathBuf,
    pub branch: String,
    pub is_main: bool,
    pub dirty: bool,
    pub ahead: u32,
    pub behind: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_timestamp: Option<i64>,
    pub staged: u32,
    pub modified: u32,
    pub untracked: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<PrInfo>,
}

impl WorktreeRecord {
    pub fn new(
        entry: &WorktreeEntry,
        activity: Option<&BranchActivity>,
        counts: StatusCounts,
    ) -> Self {
        let mut record = Self {
            path: entry.path.clone(),
            branch: entry
                .branch
                .clone()
                .unwrap_or_else(|| DETACHED.to_string()),
            is_main: entry.is_main,
            dirty: false,
            ahead: 0,
            behind: 0,
            last_active: activity.map(|a| a.relative.clone()),
            last_active_timestamp: activity.map(|a| a.timestamp),
            staged: 0,
            modified: 0,
            untracked: 0,
            pr: None,
        };
        record.apply_counts(counts);
        record
    }

    /// Overwrite the status counters, keeping `dirty` consistent with them.
    pub fn apply_counts(&mut self, counts: StatusCounts) {
        self.ahead = counts.ahead;
        self.behind = counts.behind;
        self.staged = counts.staged;
        self.modified = counts.modified;
        self.untracked = counts.untracked;
        self.dirty = counts.is_dirty();
    }

    pub fn counts(&self) -> StatusCounts {
        StatusCounts {
            ahead: self.ahead,
            behind: self.behind,
            staged: self.staged,
            modified: self.modified,
            untracked: self.untracked,
        }
    }

    /// Directory name of the worktree, used as logging context and display name.
    pub fn name(&self) -> &str {
        path_to_logging_context(&self.path)
    }
}

/// The full worktree list produced by one refresh.
///
/// Replaced wholesale; consumers never see a partially filled list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub worktrees: Vec<WorktreeRecord>,
    /// Unix seconds at which the refresh finished.
    #[serde(default)]
    pub produced_at: u64,
}

impl Snapshot {
    pub fn new(worktrees: Vec<WorktreeRecord>) -> Self {
        Self {
            worktrees,
            produced_at: crate::utils::get_now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.worktrees.is_empty()
    }

    pub fn len(&self) -> usize {
        self.worktrees.len()
    }

    pub fn main(&self) -> Option<&WorktreeRecord> {
        self.worktrees.iter().find(|wt| wt.is_main)
    }

    pub fn find(&self, path: &Path) -> Option<&WorktreeRecord> {
        self.worktrees.iter().find(|wt| wt.path == path)
    }
}

/// One line of `git log --pretty=format:%h%x09%s`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub sha: String,
    pub subject: String,
}

/// Get a short display name for a path, used in logging context.
pub fn path_to_logging_context(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or(".")
}
