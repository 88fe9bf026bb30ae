//! Parsers for git's machine-readable output.

use std::collections::HashMap;
use std::path::PathBuf;

use super::{GitError, LogEntry, StatusCounts};

/// `for-each-ref` format consumed by [`parse_branch_activity`].
pub(crate) const BRANCH_ACTIVITY_FORMAT: &str =
    "--format=%(refname:short)|%(committerdate:relative)|%(committerdate:unix)";

/// One block of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    /// Short branch name; `None` when HEAD is detached.
    pub branch: Option<String>,
    /// Git lists the main worktree first; nothing else marks it.
    pub is_main: bool,
}

/// Parse `git worktree list --porcelain`.
///
/// Unknown attributes (`HEAD`, `bare`, `locked`, ...) are skipped. The first
/// listed worktree is marked as main.
pub fn parse_worktree_list(output: &str) -> Result<Vec<WorktreeEntry>, GitError> {
    let mut worktrees = Vec::new();
    let mut current: Option<WorktreeEntry> = None;

    for line in output.lines() {
        if line.is_empty() {
            if let Some(wt) = current.take() {
                worktrees.push(wt);
            }
            continue;
        }

        let (key, value) = match line.split_once(' ') {
            Some((k, v)) => (k, Some(v)),
            None => (line, None),
        };

        match (key, current.as_mut()) {
            ("worktree", _) => {
                let path = value.filter(|v| !v.is_empty()).ok_or_else(|| {
                    GitError::ParseError("worktree line missing path".to_string())
                })?;
                if let Some(wt) = current.take() {
                    worktrees.push(wt);
                }
                current = Some(WorktreeEntry {
                    path: PathBuf::from(path),
                    branch: None,
                    is_main: false,
                });
            }
            ("branch", Some(wt)) => {
                let branch_ref = value.ok_or_else(|| {
                    GitError::ParseError("branch line missing ref".to_string())
                })?;
                let branch = branch_ref.strip_prefix("refs/heads/").unwrap_or(branch_ref);
                wt.branch = Some(branch.to_string());
            }
            _ => {}
        }
    }

    if let Some(wt) = current {
        worktrees.push(wt);
    }
    if let Some(first) = worktrees.first_mut() {
        first.is_main = true;
    }

    Ok(worktrees)
}

/// Last commit activity of a local branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchActivity {
    /// Human-readable, e.g. "3 days ago".
    pub relative: String,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Parse `git for-each-ref` output in [`BRANCH_ACTIVITY_FORMAT`].
///
/// Lines without all three fields are skipped; an unparseable timestamp
/// becomes 0.
pub fn parse_branch_activity(output: &str) -> HashMap<String, BranchActivity> {
    output
        .lines()
        .filter_map(|line| {
            // Split from the right: the timestamp and relative date never
            // contain '|', a ref name might.
            let mut parts = line.rsplitn(3, '|');
            let timestamp = parts.next()?;
            let relative = parts.next()?;
            let branch = parts.next()?;
            if branch.is_empty() {
                return None;
            }
            Some((
                branch.to_string(),
                BranchActivity {
                    relative: relative.to_string(),
                    timestamp: timestamp.trim().parse().unwrap_or(0),
                },
            ))
        })
        .collect()
}

/// Parse `git status --porcelain=v2 --branch` into counters.
///
/// - `# branch.ab +A -B` gives ahead/behind
/// - `1 XY ...` and `2 XY ...`: X other than `.` is staged, Y other than `.`
///   is modified (one entry can count as both)
/// - `? path` is untracked
///
/// Unmerged (`u`) and ignored (`!`) entries are not counted.
pub fn parse_status_v2(output: &str) -> StatusCounts {
    let mut counts = StatusCounts::default();

    for line in output.lines() {
        if let Some(ab) = line.strip_prefix("# branch.ab ") {
            let mut fields = ab.split_whitespace();
            if let (Some(ahead), Some(behind)) = (fields.next(), fields.next()) {
                counts.ahead = ahead.trim_start_matches('+').parse().unwrap_or(0);
                counts.behind = behind.trim_start_matches('-').parse().unwrap_or(0);
            }
        } else if line.starts_with('?') {
            counts.untracked += 1;
        } else if line.starts_with("1 ") || line.starts_with("2 ") {
            let Some(xy) = line.split_whitespace().nth(1) else {
                continue;
            };
            let mut flags = xy.chars();
            if let (Some(x), Some(y)) = (flags.next(), flags.next()) {
                if x != '.' {
                    counts.staged += 1;
                }
                if y != '.' {
                    counts.modified += 1;
                }
            }
        }
    }

    counts
}

/// Parse `git log --pretty=format:%h%x09%s`.
pub fn parse_log(output: &str) -> Vec<LogEntry> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (sha, subject) = line.split_once('\t').unwrap_or((line, ""));
            LogEntry {
                sha: sha.to_string(),
                subject: subject.to_string(),
            }
        })
        .collect()
}

/// Extract file names from `git ls-files --others --exclude-standard`.
pub fn parse_untracked_files(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
