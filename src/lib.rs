//! Keep every git worktree of a repository in view.
//!
//! The library is a state engine: it lists worktrees, probes their status in
//! parallel, fetches per-worktree details on demand, refreshes when the
//! repository changes, and runs per-repository automation behind a
//! trust-on-first-use gate. The `treeline` binary is a thin text front end
//! over [`app::App`].
//!
//! The library API is not stable.

pub mod app;
pub mod automation;
pub mod cache;
pub mod config;
pub mod detail;
pub mod git;
pub mod notification;
pub mod shell_exec;
pub mod styling;
pub mod sync;
pub mod trust;
pub mod utils;
pub mod watch;
