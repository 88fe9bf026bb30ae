//! Last-known snapshot on disk, shown before the first refresh completes.
//!
//! Stored at `<worktree-dir>/<repo-key>/.worktree-cache.json`. Reads are
//! best-effort: a missing or unreadable cache is simply no cache.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::git::Snapshot;

pub const CACHE_FILENAME: &str = ".worktree-cache.json";

#[derive(Debug, Clone)]
pub struct SnapshotCache {
    path: PathBuf,
}

impl SnapshotCache {
    pub fn new(worktree_dir: &Path, repo_key: &str) -> Self {
        // Keys like "owner/name" nest one level, matching the worktree layout
        Self {
            path: worktree_dir.join(repo_key).join(CACHE_FILENAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<Snapshot> {
        let contents = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                log::debug!("Ignoring unreadable cache {}: {e}", self.path.display());
                None
            }
        }
    }

    /// Replace the cache file atomically.
    pub fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let dir = self
            .path
            .parent()
            .context("Cache path has no parent directory")?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;

        let json = serde_json::to_vec(snapshot).context("Failed to serialize snapshot")?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(&json)?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to write cache {}", self.path.display()))?;
        log::debug!(
            "Cached {} worktrees at {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }
}
