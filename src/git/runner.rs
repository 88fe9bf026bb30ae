//! Process Runner: the one gate through which git/gh/glab are spawned.
//!
//! Callers get plain strings back. Failures are reported through the
//! [`Notifier`] (deduplicated per command and directory) and yield an empty
//! string, so a caller parsing the output sees "nothing" rather than an error.

use std::io;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::notification::{Notification, Notifier};
use crate::shell_exec::Cmd;

use super::path_to_logging_context;

/// Programs the runner is willing to spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Program {
    Git,
    Gh,
    Glab,
}

/// Per-call options for [`CommandRunner::run`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Exit codes treated as success in addition to 0.
    pub ok_codes: Vec<i32>,
    /// Trim surrounding whitespace from stdout.
    pub trim: bool,
    /// Suppress failure notifications.
    pub silent: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            ok_codes: vec![0],
            trim: true,
            silent: false,
        }
    }
}

impl RunOptions {
    pub fn ok_codes(mut self, codes: &[i32]) -> Self {
        self.ok_codes = codes.to_vec();
        self
    }

    /// Keep stdout byte-for-byte (diff output).
    pub fn raw(mut self) -> Self {
        self.trim = false;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

/// Runs allow-listed programs.
///
/// Implemented by [`ProcessRunner`]; tests substitute scripted runners.
pub trait CommandRunner: Send + Sync {
    /// Run `argv` in `cwd` and return its stdout, or an empty string on any
    /// failure.
    fn run(&self, argv: &[&str], cwd: Option<&Path>, opts: &RunOptions) -> String;

    /// Run a mutating command. On failure, emits `"<error_prefix>: <detail>"`
    /// and returns false.
    fn run_checked(&self, argv: &[&str], cwd: Option<&Path>, error_prefix: &str) -> bool;
}

/// [`CommandRunner`] backed by real processes.
pub struct ProcessRunner {
    notifier: Arc<dyn Notifier>,
}

impl ProcessRunner {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    fn build(program: Program, rest: &[&str], cwd: Option<&Path>) -> Cmd {
        let mut cmd = Cmd::new(program.to_string()).args(rest);
        if let Some(cwd) = cwd {
            cmd = cmd
                .current_dir(cwd)
                .context(path_to_logging_context(cwd).to_string());
        }
        cmd
    }
}

/// Split `argv` into an allow-listed program and its arguments.
fn resolve<'a>(argv: &'a [&'a str]) -> Option<(Program, &'a [&'a str])> {
    let (first, rest) = argv.split_first()?;
    let program = Program::from_str(first).ok()?;
    Some((program, rest))
}

impl CommandRunner for ProcessRunner {
    fn run(&self, argv: &[&str], cwd: Option<&Path>, opts: &RunOptions) -> String {
        let command = argv.join(" ");
        let Some((program, rest)) = resolve(argv) else {
            self.notifier.notify_once(
                &format!("unsupported_cmd:{command}"),
                Notification::error(format!("Unsupported command: {command}")),
            );
            return String::new();
        };

        let output = match Self::build(program, rest, cwd).run() {
            Ok(output) => output,
            Err(e) => {
                if !opts.silent {
                    if e.kind() == io::ErrorKind::NotFound {
                        self.notifier.notify_once(
                            &format!("cmd_missing:{program}"),
                            Notification::error(format!("Command not found: {program}")),
                        );
                    } else {
                        self.notifier.notify_once(
                            &format!("git_fail:{}:{command}", cwd_key(cwd)),
                            Notification::error(format!("Command failed: {command}: {e}")),
                        );
                    }
                }
                return String::new();
            }
        };

        let code = output.status.code();
        let accepted =
            output.status.success() || code.is_some_and(|c| opts.ok_codes.contains(&c));
        if !accepted {
            if !opts.silent {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stderr = stderr.trim();
                let message = if !stderr.is_empty() {
                    format!("Command failed: {command}: {stderr}")
                } else if let Some(code) = code {
                    format!("Command failed: {command} (exit {code})")
                } else {
                    format!("Command failed: {command}")
                };
                log::debug!("{message}");
                self.notifier.notify_once(
                    &format!("git_fail:{}:{command}", cwd_key(cwd)),
                    Notification::error(message),
                );
            }
            return String::new();
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if opts.trim {
            stdout.trim().to_string()
        } else {
            stdout.into_owned()
        }
    }

    fn run_checked(&self, argv: &[&str], cwd: Option<&Path>, error_prefix: &str) -> bool {
        let Some((program, rest)) = resolve(argv) else {
            self.notifier.notify(Notification::error(format!(
                "{error_prefix}: unsupported command: {}",
                argv.join(" ")
            )));
            return false;
        };

        match Self::build(program, rest, cwd).run() {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                let detail = match combined.trim() {
                    "" => output
                        .status
                        .code()
                        .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit {c}")),
                    trimmed => trimmed.to_string(),
                };
                self.notifier
                    .notify(Notification::error(format!("{error_prefix}: {detail}")));
                false
            }
            Err(e) => {
                self.notifier
                    .notify(Notification::error(format!("{error_prefix}: {e}")));
                false
            }
        }
    }
}

fn cwd_key(cwd: Option<&Path>) -> String {
    cwd.map(|p| p.display().to_string()).unwrap_or_default()
}
