//! Presentation state owned by the event loop.
//!
//! Only the loop thread mutates this. Background work reaches it through
//! messages, so every change below is applied whole: a snapshot replaces the
//! list in one assignment, and a detail result is either applied or dropped.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::automation::TrustDecisionRequired;
use crate::detail::DetailResult;
use crate::git::{Snapshot, StatusCounts, WorktreeRecord};

#[derive(Debug, Default)]
pub struct AppState {
    worktrees: Vec<WorktreeRecord>,
    selected: Option<usize>,
    details: HashMap<PathBuf, DetailResult>,
    sort_by_active: bool,
    refreshing: bool,
    from_cache: bool,
    produced_at: u64,
    last_error: Option<String>,
    pending_trust: Option<TrustDecisionRequired>,
}

/// Main worktree first, then most recently active (or by path).
pub fn sort_worktrees(worktrees: &mut [WorktreeRecord], sort_by_active: bool) {
    if sort_by_active {
        worktrees.sort_by_key(|wt| {
            (
                !wt.is_main,
                Reverse(wt.last_active_timestamp.unwrap_or(0)),
                wt.path.clone(),
            )
        });
    } else {
        worktrees.sort_by(|a, b| (!a.is_main, &a.path).cmp(&(!b.is_main, &b.path)));
    }
}

impl AppState {
    pub fn new(sort_by_active: bool) -> Self {
        Self {
            sort_by_active,
            ..Default::default()
        }
    }

    pub fn worktrees(&self) -> &[WorktreeRecord] {
        &self.worktrees
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected(&self) -> Option<&WorktreeRecord> {
        self.selected.and_then(|i| self.worktrees.get(i))
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    pub fn set_refreshing(&mut self, refreshing: bool) {
        self.refreshing = refreshing;
    }

    /// Unix time the current list was produced.
    pub fn produced_at(&self) -> u64 {
        self.produced_at
    }

    /// True while the list comes from the on-disk cache.
    pub fn is_from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn detail_for(&self, path: &Path) -> Option<&DetailResult> {
        self.details.get(path)
    }

    pub fn selected_detail(&self) -> Option<&DetailResult> {
        self.selected().and_then(|wt| self.details.get(&wt.path))
    }

    /// Replace the worktree list.
    ///
    /// The selection follows its path into the new list; if that worktree is
    /// gone the index is clamped. Details of vanished worktrees are dropped.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot, from_cache: bool) {
        let selected_path = self.selected().map(|wt| wt.path.clone());

        self.produced_at = snapshot.produced_at;
        let mut worktrees = snapshot.worktrees;
        sort_worktrees(&mut worktrees, self.sort_by_active);

        self.selected = match selected_path {
            _ if worktrees.is_empty() => None,
            Some(path) => Some(
                worktrees
                    .iter()
                    .position(|wt| wt.path == path)
                    .unwrap_or_else(|| self.selected.unwrap_or(0).min(worktrees.len() - 1)),
            ),
            None => Some(0),
        };
        self.details
            .retain(|path, _| worktrees.iter().any(|wt| &wt.path == path));
        self.worktrees = worktrees;
        self.from_cache = from_cache;
        if !from_cache {
            self.last_error = None;
        }
    }

    /// Keep the current list and remember why the refresh failed.
    pub fn record_refresh_error(&mut self, error: String) {
        self.last_error = Some(error);
    }

    /// Move the selection. Returns false for an out-of-range index.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.worktrees.len() {
            return false;
        }
        self.selected = Some(index);
        true
    }

    /// Store a detail result if it still belongs to the selection.
    pub fn apply_detail(&mut self, result: DetailResult) -> bool {
        let current = self
            .selected()
            .is_some_and(|wt| self.selected == Some(result.index) && wt.path == result.path);
        if !current {
            log::debug!("Dropping details for unselected row {}", result.index);
            return false;
        }
        self.details.insert(result.path.clone(), result);
        true
    }

    /// Forget cached details for `path`.
    pub fn invalidate_detail(&mut self, path: &Path) {
        self.details.remove(path);
    }

    /// Update the counters of the selected worktree in place. Other paths are
    /// left to the next full refresh.
    pub fn patch_status(&mut self, path: &Path, counts: StatusCounts) -> bool {
        let Some(index) = self.selected else {
            return false;
        };
        match self.worktrees.get_mut(index) {
            Some(wt) if wt.path == path => {
                wt.apply_counts(counts);
                true
            }
            _ => false,
        }
    }

    pub fn pending_trust(&self) -> Option<&TrustDecisionRequired> {
        self.pending_trust.as_ref()
    }

    pub fn set_pending_trust(&mut self, request: Option<TrustDecisionRequired>) {
        self.pending_trust = request;
    }
}
