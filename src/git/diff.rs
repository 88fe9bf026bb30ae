//! Three-part diff assembly (staged, unstaged, untracked) with size limits,
//! and the optional pretty-printer pass.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::shell_exec::Cmd;
use crate::utils::truncate_at_char_boundary;

use super::{CommandRunner, RunOptions, parse_untracked_files};

const STAGED_HEADER: &str = "=== Staged Changes ===\n";
const UNSTAGED_HEADER: &str = "=== Unstaged Changes ===\n";
const SECTION_SEPARATOR: &str = "\n\n";

/// Upper bound on a single pretty-printer run.
const PAGER_TIMEOUT: Duration = Duration::from_secs(10);

/// Size limits for [`build_three_part_diff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffLimits {
    /// Character budget for the whole diff before hard truncation.
    pub max_total_chars: usize,
    /// How many untracked files get an individual diff. 0 disables the section.
    pub max_untracked_files: usize,
}

impl Default for DiffLimits {
    fn default() -> Self {
        Self {
            max_total_chars: 200_000,
            max_untracked_files: 10,
        }
    }
}

/// Assemble the staged, unstaged and untracked diffs of the worktree at `path`.
///
/// Sections are added while the running total is under budget. If more
/// untracked files exist than are shown, a `[...showing X of Y untracked
/// files]` notice is appended. A result over budget is cut at the budget
/// and ends with `[...truncated at N chars]`.
pub fn build_three_part_diff(
    runner: &dyn CommandRunner,
    path: &Path,
    limits: &DiffLimits,
) -> String {
    let cwd = Some(path);
    let raw = RunOptions::default().raw();
    let max = limits.max_total_chars;
    let mut parts: Vec<String> = Vec::new();
    let mut total = 0usize;

    let staged = runner.run(&["git", "diff", "--cached", "--patch", "--no-color"], cwd, &raw);
    if !staged.is_empty() {
        push_section(&mut parts, &mut total, STAGED_HEADER, staged);
    }

    if total < max {
        let unstaged = runner.run(&["git", "diff", "--patch", "--no-color"], cwd, &raw);
        if !unstaged.is_empty() {
            push_section(&mut parts, &mut total, UNSTAGED_HEADER, unstaged);
        }
    }

    if total < max && limits.max_untracked_files > 0 {
        let untracked = parse_untracked_files(&runner.run(
            &["git", "ls-files", "--others", "--exclude-standard"],
            cwd,
            &RunOptions::default(),
        ));
        let shown = untracked.len().min(limits.max_untracked_files);

        for file in untracked.iter().take(shown) {
            if total >= max {
                break;
            }
            // Exit code 1 means "differences found"
            let diff = runner.run(
                &["git", "diff", "--no-index", "/dev/null", file],
                cwd,
                &RunOptions::default().raw().ok_codes(&[0, 1]),
            );
            if !diff.is_empty() {
                push_section(&mut parts, &mut total, &format!("=== Untracked: {file} ===\n"), diff);
            }
        }

        if untracked.len() > shown {
            parts.push(format!(
                "\n[...showing {shown} of {} untracked files]",
                untracked.len()
            ));
        }
    }

    let joined = parts.join(SECTION_SEPARATOR);
    if joined.len() > max {
        format!(
            "{}\n\n[...truncated at {max} chars]",
            truncate_at_char_boundary(&joined, max)
        )
    } else {
        joined
    }
}

fn push_section(parts: &mut Vec<String>, total: &mut usize, header: &str, body: String) {
    *total += header.len() + body.len();
    parts.push(format!("{header}{body}"));
}

/// External diff pretty-printer (e.g. `delta`), fed the diff on stdin.
#[derive(Debug, Clone, Default)]
pub struct DiffPager {
    program: Option<PathBuf>,
    args: Vec<String>,
}

impl DiffPager {
    /// Look `program` up on `PATH`. An empty name or a missing binary leaves
    /// the pager disabled.
    pub fn detect(program: &str, args: Vec<String>) -> Self {
        let program = (!program.trim().is_empty())
            .then(|| which::which(program.trim()).ok())
            .flatten();
        match &program {
            Some(path) => log::debug!("Diff pager: {}", path.display()),
            None => log::debug!("No diff pager available"),
        }
        Self { program, args }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        self.program.is_some()
    }

    /// Pipe `diff` through the pager. Any failure returns `diff` unchanged.
    pub fn apply(&self, diff: &str) -> String {
        let Some(program) = &self.program else {
            return diff.to_string();
        };
        if diff.is_empty() {
            return String::new();
        }

        match Cmd::new(program)
            .args(&self.args)
            .stdin_bytes(diff)
            .timeout(PAGER_TIMEOUT)
            .run()
        {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).into_owned()
            }
            Ok(output) => {
                log::debug!("Diff pager exited with {}", output.status);
                diff.to_string()
            }
            Err(e) => {
                log::debug!("Diff pager failed: {e}");
                diff.to_string()
            }
        }
    }
}
