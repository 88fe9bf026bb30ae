//! Typed git errors.
//!
//! Most process failures never surface as errors: the runner reports them as
//! deduplicated notifications and returns empty output, so a single failing
//! probe cannot abort a refresh. `GitError` covers the cases a caller has to
//! act on.
//!
//! ```ignore
//! if let Some(GitError::CommonDirUnresolved { .. }) = err.downcast_ref() {
//!     // disable auto-refresh for the session
//! }
//! ```

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitError {
    /// Program outside the `git`/`gh`/`glab` allow-list.
    UnsupportedCommand { command: String },
    /// `git rev-parse --git-common-dir` produced nothing usable.
    CommonDirUnresolved { repo: PathBuf },
    /// A mutating command exited unsuccessfully.
    CommandFailed { command: String, detail: String },
    ParseError(String),
}

impl std::fmt::Display for GitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitError::UnsupportedCommand { command } => {
                write!(f, "Unsupported command: {command}")
            }
            GitError::CommonDirUnresolved { repo } => write!(
                f,
                "Unable to resolve the git common directory for {}",
                repo.display()
            ),
            GitError::CommandFailed { command, detail } => {
                if detail.is_empty() {
                    write!(f, "Command failed: {command}")
                } else {
                    write!(f, "Command failed: {command}: {detail}")
                }
            }
            GitError::ParseError(message) => write!(f, "Failed to parse git output: {message}"),
        }
    }
}

impl std::error::Error for GitError {}
