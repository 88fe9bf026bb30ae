//! Terminal styling for the text front end.
//!
//! Output goes through anstream, which strips escapes when the stream is not
//! a terminal or `NO_COLOR` is set. Messages use `cformat!` tags:
//!
//! - Errors: `<red>`
//! - Warnings: `<yellow>`
//! - Hints and secondary text: `<dim>`
//! - Success: `<green>`
//!
//! ## stdout vs stderr
//!
//! Data (tables, JSON, diffs) goes to stdout. Notifications and prompts go to
//! stderr so piping the data stays clean.

use anstyle::{AnsiColor, Color, Style};
use color_print::{cformat, cstr};

use crate::git::{StatusCounts, WorktreeRecord};
use crate::notification::{Notification, Severity};

pub use anstream::{eprint, eprintln, print, println, stderr, stdout};

pub const ADDITION: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green)));
pub const DELETION: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red)));
pub const MAIN_MARKER: Style = Style::new().bold();
pub const DIRTY: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow)));
pub const HINT: Style = Style::new().dimmed();

pub const SUCCESS_SYMBOL: &str = cstr!("<green>✓</>");
pub const INFO_SYMBOL: &str = cstr!("<dim>○</>");
pub const ERROR_SYMBOL: &str = cstr!("<red>✗</>");
pub const WARNING_SYMBOL: &str = cstr!("<yellow>▲</>");
pub const PROMPT_SYMBOL: &str = cstr!("<cyan>❯</>");

pub fn notification_message(notification: &Notification) -> String {
    let message = &notification.message;
    match notification.severity {
        Severity::Info => format!("{INFO_SYMBOL} {message}"),
        Severity::Warning => cformat!("{WARNING_SYMBOL} <yellow>{message}</>"),
        Severity::Error => cformat!("{ERROR_SYMBOL} <red>{message}</>"),
    }
}

pub fn success_message(message: impl AsRef<str>) -> String {
    cformat!("{SUCCESS_SYMBOL} <green>{}</>", message.as_ref())
}

pub fn hint_message(message: impl AsRef<str>) -> String {
    format!("{HINT}{}{HINT:#}", message.as_ref())
}

/// Compact counters, e.g. `↑2 ↓1 +1 ~3 ?2`. Zero counters are omitted.
pub fn format_counts(counts: &StatusCounts) -> String {
    let mut parts = Vec::new();
    if counts.ahead > 0 {
        parts.push(format!("{ADDITION}↑{}{ADDITION:#}", counts.ahead));
    }
    if counts.behind > 0 {
        parts.push(format!("{DELETION}↓{}{DELETION:#}", counts.behind));
    }
    if counts.staged > 0 {
        parts.push(format!("+{}", counts.staged));
    }
    if counts.modified > 0 {
        parts.push(format!("{DIRTY}~{}{DIRTY:#}", counts.modified));
    }
    if counts.untracked > 0 {
        parts.push(format!("?{}", counts.untracked));
    }
    parts.join(" ")
}

/// Branch column: bold for the main worktree, `*` suffix when dirty.
pub fn format_branch(record: &WorktreeRecord) -> String {
    let dirty = if record.dirty {
        format!("{DIRTY}*{DIRTY:#}")
    } else {
        String::new()
    };
    if record.is_main {
        format!("{MAIN_MARKER}{}{MAIN_MARKER:#}{dirty}", record.branch)
    } else {
        format!("{}{dirty}", record.branch)
    }
}

/// Colorize `+`/`-` lines of a plain unified diff.
pub fn colorize_diff(diff: &str) -> String {
    diff.lines()
        .map(|line| {
            if line.starts_with("+++") || line.starts_with("---") {
                format!("{MAIN_MARKER}{line}{MAIN_MARKER:#}")
            } else if line.starts_with('+') {
                format!("{ADDITION}{line}{ADDITION:#}")
            } else if line.starts_with('-') {
                format!("{DELETION}{line}{DELETION:#}")
            } else if line.starts_with("===") {
                format!("{HINT}{line}{HINT:#}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
