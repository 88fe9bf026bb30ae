//! Repository-level queries: toplevel discovery, the shared git directory,
//! the main worktree, the cache key, and the few mutating worktree commands.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::{CommandRunner, GitError, RunOptions, parse_worktree_list};

/// `owner/name` at the end of a remote URL, with or without `.git`.
static REMOTE_SLUG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[:/]([^/:]+/[^/]+?)(?:\.git)?/?$").expect("static regex is valid")
});

const UNKNOWN_REPO_KEY: &str = "unknown";

/// A git repository addressed through a [`CommandRunner`].
#[derive(Clone)]
pub struct Repository {
    root: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").field("root", &self.root).finish()
    }
}

impl Repository {
    pub fn new(root: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            root: root.into(),
            runner,
        }
    }

    /// Open the repository containing `path`, rooted at its worktree toplevel.
    pub fn discover(path: &Path, runner: Arc<dyn CommandRunner>) -> anyhow::Result<Self> {
        let toplevel = runner.run(
            &["git", "rev-parse", "--show-toplevel"],
            Some(path),
            &RunOptions::default(),
        );
        if toplevel.is_empty() {
            anyhow::bail!("Not a git repository: {}", path.display());
        }
        let root = dunce::canonicalize(&toplevel).unwrap_or_else(|_| PathBuf::from(toplevel));
        Ok(Self::new(root, runner))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    fn git(&self, args: &[&str], opts: &RunOptions) -> String {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("git");
        argv.extend_from_slice(args);
        self.runner.run(&argv, Some(&self.root), opts)
    }

    /// Absolute path of the directory shared by all worktrees.
    ///
    /// A relative answer from git is resolved against the worktree toplevel.
    pub fn git_common_dir(&self) -> anyhow::Result<PathBuf> {
        let common = self.git(&["rev-parse", "--git-common-dir"], &RunOptions::default());
        if common.is_empty() {
            return Err(GitError::CommonDirUnresolved {
                repo: self.root.clone(),
            }
            .into());
        }

        let common = PathBuf::from(common);
        let resolved = if common.is_absolute() {
            common
        } else {
            let toplevel = self.git(&["rev-parse", "--show-toplevel"], &RunOptions::default());
            if toplevel.is_empty() {
                self.root.join(common)
            } else {
                PathBuf::from(toplevel).join(common)
            }
        };
        Ok(dunce::canonicalize(&resolved).unwrap_or(resolved))
    }

    /// Path of the first worktree git lists, falling back to the root.
    pub fn main_worktree_path(&self) -> PathBuf {
        let listing = self.git(&["worktree", "list", "--porcelain"], &RunOptions::default());
        parse_worktree_list(&listing)
            .ok()
            .and_then(|wts| wts.into_iter().next())
            .map(|wt| wt.path)
            .unwrap_or_else(|| self.root.clone())
    }

    /// Identifier used to namespace the snapshot cache, e.g. `owner/name`.
    ///
    /// Tries the GitHub CLI, the GitLab CLI, the `origin` remote URL and the
    /// toplevel directory name, in that order. All probes are silent.
    pub fn repo_key(&self) -> String {
        let silent = RunOptions::default().silent();
        let cwd = Some(self.root.as_path());

        let gh = self.runner.run(
            &["gh", "repo", "view", "--json", "nameWithOwner", "-q", ".nameWithOwner"],
            cwd,
            &silent,
        );
        if !gh.is_empty() {
            return gh;
        }

        let glab = self
            .runner
            .run(&["glab", "repo", "view", "-F", "json"], cwd, &silent);
        if let Some(key) = glab_path_with_namespace(&glab) {
            return key;
        }

        let remote = self.git(&["remote", "get-url", "origin"], &silent);
        if let Some(slug) = remote_slug(&remote) {
            return slug;
        }

        let toplevel = self.git(&["rev-parse", "--show-toplevel"], &silent);
        Path::new(&toplevel)
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| UNKNOWN_REPO_KEY.to_string())
    }

    /// `git worktree add [-b <branch>] <path> [<base>]`.
    pub fn add_worktree(&self, path: &Path, branch: &str, base: Option<&str>) -> bool {
        let path_str = path.to_string_lossy();
        let mut argv = vec!["git", "worktree", "add", "-b", branch, path_str.as_ref()];
        if let Some(base) = base {
            argv.push(base);
        }
        self.runner.run_checked(
            &argv,
            Some(&self.root),
            &format!("Failed to create worktree {}", path.display()),
        )
    }

    /// Move a worktree directory, then rename its branch.
    ///
    /// Stops at the first failing step.
    pub fn rename_worktree(
        &self,
        old_path: &Path,
        new_path: &Path,
        old_branch: &str,
        new_branch: &str,
    ) -> bool {
        let old = old_path.to_string_lossy();
        let new = new_path.to_string_lossy();
        if !self.runner.run_checked(
            &["git", "worktree", "move", old.as_ref(), new.as_ref()],
            Some(&self.root),
            &format!("Failed to move worktree from {old} to {new}"),
        ) {
            return false;
        }
        self.runner.run_checked(
            &["git", "branch", "-m", old_branch, new_branch],
            Some(new_path),
            &format!("Failed to rename branch from {old_branch} to {new_branch}"),
        )
    }

    /// `git worktree remove [--force] <path>`.
    pub fn remove_worktree(&self, path: &Path, force: bool) -> bool {
        let path_str = path.to_string_lossy();
        let mut argv = vec!["git", "worktree", "remove"];
        if force {
            argv.push("--force");
        }
        argv.push(path_str.as_ref());
        self.runner.run_checked(
            &argv,
            Some(&self.root),
            &format!("Failed to remove worktree {}", path.display()),
        )
    }
}

fn glab_path_with_namespace(output: &str) -> Option<String> {
    if output.trim().is_empty() {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(output).ok()?;
    value
        .get("path_with_namespace")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn remote_slug(url: &str) -> Option<String> {
    REMOTE_SLUG
        .captures(url.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
