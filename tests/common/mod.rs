// Not every test module uses every helper.
#![allow(dead_code)]

//! # Test utilities for treeline
//!
//! ## TestRepo
//!
//! `TestRepo` creates an isolated git repository in a temporary directory,
//! on `main` with one initial commit. Worktrees are created next to it as
//! `repo.<branch>`, so the temp dir looks like:
//!
//! ```text
//! <tmp>/
//! ├── repo/             main worktree
//! ├── repo.feature/     linked worktree
//! ├── home/             HOME for CLI runs
//! ├── config.toml       TREELINE_CONFIG_PATH for CLI runs
//! └── gitconfig         GIT_CONFIG_GLOBAL
//! ```
//!
//! ## Environment isolation
//!
//! Git commands and CLI invocations get their environment through
//! `Command::env()`, never by mutating the test process environment:
//! - no global or system git config
//! - deterministic commit timestamps
//! - `C` locale
//! - a private HOME, so the trust ledger and caches stay in the temp dir
//!
//! Library calls made in-process use the ambient git, which only reads here.
//!
//! ## Path canonicalization
//!
//! Paths are canonicalized (macOS `/var` → `/private/var`) so they compare
//! equal to what git reports.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use tempfile::TempDir;
use treeline::git::{CommandRunner, ProcessRunner, Repository};
use treeline::notification::{ChannelNotifier, Notification};

/// The epoch used for deterministic timestamps (2025-01-01T00:00:00Z).
pub const TEST_EPOCH: u64 = 1735689600;

const NULL_DEVICE: &str = "/dev/null";

#[rstest::fixture]
pub fn repo() -> TestRepo {
    TestRepo::new()
}

/// Repo with a linked `feature` worktree.
#[rstest::fixture]
pub fn repo_with_feature_worktree(mut repo: TestRepo) -> TestRepo {
    repo.add_worktree("feature");
    repo
}

pub fn canonicalize(path: &Path) -> std::io::Result<PathBuf> {
    dunce::canonicalize(path)
}

pub fn check_git_status(output: &Output, cmd_desc: &str) {
    if !output.status.success() {
        panic!(
            "git {cmd_desc} failed:\nstdout: {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

pub fn configure_git_cmd(cmd: &mut Command, git_config_path: &Path) {
    for var in ["GIT_DIR", "GIT_WORK_TREE", "GIT_INDEX_FILE", "GIT_COMMON_DIR"] {
        cmd.env_remove(var);
    }
    cmd.env("GIT_CONFIG_GLOBAL", git_config_path);
    cmd.env("GIT_CONFIG_SYSTEM", NULL_DEVICE);
    cmd.env("GIT_CONFIG_NOSYSTEM", "1");
    cmd.env("GIT_AUTHOR_DATE", "2025-01-01T00:00:00Z");
    cmd.env("GIT_COMMITTER_DATE", "2025-01-01T00:00:00Z");
    cmd.env("LC_ALL", "C");
    cmd.env("LANG", "C");
    cmd.env("GIT_TERMINAL_PROMPT", "0");
}

pub struct TestRepo {
    temp_dir: TempDir, // Must keep to ensure cleanup on drop
    root: PathBuf,
    pub worktrees: HashMap<String, PathBuf>,
    git_config_path: PathBuf,
}

impl TestRepo {
    /// Create a repository on `main` with one commit containing `README.md`.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let base = canonicalize(temp_dir.path()).unwrap();
        let root = base.join("repo");
        std::fs::create_dir(&root).unwrap();
        std::fs::create_dir(base.join("home")).unwrap();

        let git_config_path = base.join("gitconfig");
        std::fs::write(
            &git_config_path,
            "[user]\n\tname = Test User\n\temail = test@example.com\n\
             [init]\n\tdefaultBranch = main\n\
             [advice]\n\tdetachedHead = false\n",
        )
        .unwrap();

        let repo = Self {
            temp_dir,
            root,
            worktrees: HashMap::new(),
            git_config_path,
        };
        repo.run_git(&["init", "-q", "-b", "main"]);
        repo.commit_file(&repo.root, "README.md", "# test\n", "Initial commit");
        repo
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Canonical temp dir holding the repo and its siblings.
    pub fn temp_path(&self) -> PathBuf {
        self.root.parent().unwrap().to_path_buf()
    }

    pub fn home_path(&self) -> PathBuf {
        self.temp_path().join("home")
    }

    pub fn config_path(&self) -> PathBuf {
        self.temp_path().join("config.toml")
    }

    /// Where the trust ledger ends up for CLI runs.
    pub fn trust_db_path(&self) -> PathBuf {
        self.home_path()
            .join(".local/share")
            .join("treeline")
            .join("trusted.json")
    }

    pub fn worktree_dir(&self) -> PathBuf {
        self.temp_path().join("worktrees")
    }

    pub fn configure_git_cmd(&self, cmd: &mut Command) {
        configure_git_cmd(cmd, &self.git_config_path);
    }

    #[must_use]
    pub fn git_command(&self) -> Command {
        let mut cmd = Command::new("git");
        self.configure_git_cmd(&mut cmd);
        cmd.current_dir(&self.root);
        cmd
    }

    pub fn run_git(&self, args: &[&str]) {
        let output = self.git_command().args(args).output().unwrap();
        check_git_status(&output, &args.join(" "));
    }

    pub fn run_git_in(&self, dir: &Path, args: &[&str]) {
        let output = self
            .git_command()
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        check_git_status(&output, &args.join(" "));
    }

    pub fn git_output(&self, args: &[&str]) -> String {
        let output = self.git_command().args(args).output().unwrap();
        check_git_status(&output, &args.join(" "));
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// Write `name` in `dir` and commit it.
    pub fn commit_file(&self, dir: &Path, name: &str, content: &str, message: &str) {
        std::fs::write(dir.join(name), content).unwrap();
        self.run_git_in(dir, &["add", name]);
        self.run_git_in(dir, &["commit", "-q", "-m", message]);
    }

    /// Add a worktree for a new branch at `<tmp>/repo.<branch>`.
    pub fn add_worktree(&mut self, branch: &str) -> PathBuf {
        let path = self.temp_path().join(format!("repo.{branch}"));
        self.run_git(&["worktree", "add", "-q", "-b", branch, path.to_str().unwrap()]);
        let path = canonicalize(&path).unwrap();
        self.worktrees.insert(branch.to_string(), path.clone());
        path
    }

    pub fn worktree(&self, branch: &str) -> &Path {
        &self.worktrees[branch]
    }

    /// Runner whose notifications land on the returned channel.
    pub fn runner(&self) -> (Arc<dyn CommandRunner>, Receiver<Notification>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let runner: Arc<dyn CommandRunner> =
            Arc::new(ProcessRunner::new(Arc::new(ChannelNotifier::new(tx))));
        (runner, rx)
    }

    pub fn repository(&self) -> Repository {
        Repository::new(&self.root, self.runner().0)
    }

    /// `treeline` binary with an isolated environment, run from the repo root.
    ///
    /// Host `TREELINE_*` variables are cleared; HOME and the XDG dirs point
    /// into the temp dir; the user config is [`config_path`](Self::config_path).
    #[must_use]
    pub fn treeline_command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_treeline"));
        for (key, _) in std::env::vars() {
            if key.starts_with("TREELINE_") || key.starts_with("XDG_") {
                cmd.env_remove(key);
            }
        }
        self.configure_git_cmd(&mut cmd);
        cmd.env("HOME", self.home_path());
        cmd.env("TREELINE_CONFIG_PATH", self.config_path());
        cmd.env("TREELINE_TEST_EPOCH", TEST_EPOCH.to_string());
        cmd.env("NO_COLOR", "1");
        cmd.env("RUST_LOG", "warn");
        cmd.current_dir(&self.root);
        cmd
    }

    /// Write the user config used by [`treeline_command`](Self::treeline_command).
    ///
    /// The worktree dir (and so the snapshot cache) always lives in the temp
    /// dir; `extra` is appended verbatim.
    pub fn write_user_config(&self, extra: &str) {
        std::fs::write(
            self.config_path(),
            format!(
                "worktree-dir = {:?}\ngit-pager = \"\"\n{extra}",
                self.worktree_dir().display().to_string()
            ),
        )
        .unwrap();
    }
}

pub fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Run `cmd` with `input` on stdin, then close it.
pub fn output_with_stdin(mut cmd: Command, input: &str) -> Output {
    use std::io::Write;
    use std::process::Stdio;

    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}
