//! Process execution with tracing.
//!
//! Every external process treeline starts goes through [`Cmd`], so each spawn
//! is logged with its context and duration:
//!
//! ```text
//! $ git status --porcelain=v2 --branch [feature-x]
//! [trace] context=feature-x cmd="git status --porcelain=v2 --branch" dur=12.3ms ok=true
//! ```
//!
//! Repository automation is run through the platform shell described by
//! [`ShellConfig`]:
//! - Unix: `sh -c`
//! - Windows: Git Bash if available, PowerShell otherwise

use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

/// Cached shell configuration for the current platform
static SHELL_CONFIG: OnceLock<ShellConfig> = OnceLock::new();

/// Shell configuration for command execution
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Path to the shell executable
    pub executable: PathBuf,
    /// Arguments to pass before the command (e.g., ["-c"] for sh)
    pub args: Vec<String>,
    /// Human-readable name for error messages
    pub name: String,
}

impl ShellConfig {
    /// Get the shell configuration for the current platform
    pub fn get() -> &'static ShellConfig {
        SHELL_CONFIG.get_or_init(detect_shell)
    }

    /// Create a [`Cmd`] that hands `shell_command` to the shell for interpretation.
    pub fn command(&self, shell_command: &str) -> Cmd {
        Cmd::new(&self.executable)
            .args(self.args.iter().map(String::as_str))
            .arg(shell_command)
    }
}

fn detect_shell() -> ShellConfig {
    #[cfg(unix)]
    {
        ShellConfig {
            executable: PathBuf::from("sh"),
            args: vec!["-c".to_string()],
            name: "sh".to_string(),
        }
    }

    #[cfg(windows)]
    {
        // git.exe lives at Git/cmd/git.exe; bash.exe at Git/bin/bash.exe
        let git_bash = which::which("git").ok().and_then(|git| {
            let root = git.parent()?.parent()?.to_path_buf();
            [root.join("bin").join("bash.exe"), root.join("usr").join("bin").join("bash.exe")]
                .into_iter()
                .find(|p| p.exists())
        });
        match git_bash {
            Some(executable) => ShellConfig {
                executable,
                args: vec!["-c".to_string()],
                name: "Git Bash".to_string(),
            },
            None => ShellConfig {
                executable: PathBuf::from("powershell.exe"),
                args: vec!["-NoProfile".to_string(), "-Command".to_string()],
                name: "PowerShell".to_string(),
            },
        }
    }
}

/// Builder for a traced external command.
#[derive(Debug)]
#[must_use]
pub struct Cmd {
    command: Command,
    display: String,
    context: Option<String>,
    stdin: Option<Vec<u8>>,
    timeout: Option<Duration>,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        let program = program.as_ref();
        Self {
            command: Command::new(program),
            display: program.to_string_lossy().into_owned(),
            context: None,
            stdin: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        let arg = arg.as_ref();
        self.display.push(' ');
        self.display.push_str(&arg.to_string_lossy());
        self.command.arg(arg);
        self
    }

    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        args.into_iter().fold(self, |cmd, arg| cmd.arg(arg))
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.command.current_dir(dir);
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.command.env(key, value);
        self
    }

    /// Label used in trace lines, typically the worktree directory name.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Bytes written to the child's stdin.
    pub fn stdin_bytes(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Kill the child and fail with [`io::ErrorKind::TimedOut`] after `timeout`.
    ///
    /// On Unix the child leads its own process group and the whole group is
    /// killed, so background jobs started by a shell command die with it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            self.command.process_group(0);
        }
        self.timeout = Some(timeout);
        self
    }

    /// The command line as logged, e.g. `git status --short`.
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Run to completion and capture stdout/stderr.
    pub fn run(mut self) -> io::Result<Output> {
        match self.context.as_deref() {
            Some(ctx) => log::debug!("$ {} [{}]", self.display, ctx),
            None => log::debug!("$ {}", self.display),
        }

        let t0 = Instant::now();
        let result = if self.stdin.is_none() && self.timeout.is_none() {
            self.command.output()
        } else {
            self.run_piped()
        };
        let duration_ms = t0.elapsed().as_secs_f64() * 1000.0;

        let ctx = self
            .context
            .as_deref()
            .map(|c| format!("context={c} "))
            .unwrap_or_default();
        match &result {
            Ok(output) => log::debug!(
                "[trace] {}cmd=\"{}\" dur={:.1}ms ok={}",
                ctx,
                self.display,
                duration_ms,
                output.status.success()
            ),
            Err(e) => log::debug!(
                "[trace] {}cmd=\"{}\" dur={:.1}ms err=\"{}\"",
                ctx,
                self.display,
                duration_ms,
                e
            ),
        }

        result
    }

    fn run_piped(&mut self) -> io::Result<Output> {
        let stdin = if self.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        };
        let mut child = self
            .command
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Pipes are drained on their own threads so a chatty child can't
        // fill a pipe buffer and stall while we wait on it.
        let writer = match (child.stdin.take(), self.stdin.take()) {
            (Some(mut pipe), Some(input)) => Some(thread::spawn(move || {
                let _ = pipe.write_all(&input);
            })),
            _ => None,
        };
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match self.timeout {
            Some(timeout) => match child.wait_timeout(timeout)? {
                Some(status) => status,
                None => {
                    kill_group(&mut child);
                    // Every writer is dead, so the pipes are at EOF
                    let _ = stdout.join();
                    let _ = stderr.join();
                    if let Some(writer) = writer {
                        let _ = writer.join();
                    }
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("timed out after {timeout:?}"),
                    ));
                }
            },
            None => child.wait()?,
        };

        if let Some(writer) = writer {
            let _ = writer.join();
        }
        Ok(Output {
            status,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Kill `child` and everything in its process group, then reap it.
fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    if let Ok(pid) = i32::try_from(child.id()) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            log::debug!("killpg {pid} failed: {e}");
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}
