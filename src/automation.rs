//! Repository automation: running `.treeline.toml` commands under the trust
//! policy.
//!
//! The flow is plan, then (maybe) decide, then run:
//!
//! ```text
//! plan(phase) ── Nothing / Blocked ─────────────────────────▶ done
//!            ├── Run(commands) ────────────────────────────▶ run()
//!            └── NeedsTrust(request) ─▶ decide(Trust)  ─────▶ plan again ─▶ run()
//!                                      decide(Block)  ─────▶ Blocked
//!                                      decide(Cancel) ─────▶ Cancelled
//! ```
//!
//! A request carries the digest of the bytes its preview was parsed from.
//! Trusting records that digest, and only if the file still holds those
//! bytes; an edit made while the prompt was open yields a new request.
//!
//! Commands run one at a time through the platform shell, in the worktree,
//! with `WORKTREE_PATH`, `MAIN_WORKTREE_PATH`, `WORKTREE_BRANCH` and
//! `WORKTREE_NAME` set. The first failure stops the sequence.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::config::{ProjectConfig, TrustMode};
use crate::git::{WorktreeRecord, path_to_logging_context};
use crate::shell_exec::ShellConfig;
use crate::trust::{TrustStore, hash_bytes};

/// Ceiling for a single automation command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum HookPhase {
    /// After a worktree is created or entered.
    Init,
    /// Before a worktree is removed.
    Terminate,
}

impl HookPhase {
    fn commands(self, config: &ProjectConfig) -> Vec<String> {
        let commands = match self {
            HookPhase::Init => &config.init_commands,
            HookPhase::Terminate => &config.terminate_commands,
        };
        commands
            .iter()
            .filter(|c| !c.trim().is_empty())
            .cloned()
            .collect()
    }
}

/// The untrusted file and what it would run, for the user to approve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustDecisionRequired {
    pub file_path: PathBuf,
    pub phase: HookPhase,
    pub commands_preview: Vec<String>,
    /// SHA-256 of the file contents `commands_preview` was read from.
    pub digest: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    /// Record the file's digest, then run.
    Trust,
    /// Skip this time; ask again next time.
    Block,
    /// Abort the surrounding action.
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookPlan {
    /// No automation file, or no commands for this phase.
    Nothing,
    Run(Vec<String>),
    NeedsTrust(TrustDecisionRequired),
    Blocked,
    Cancelled,
}

/// Environment for one automation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookContext {
    pub worktree_path: PathBuf,
    pub main_worktree_path: PathBuf,
    pub branch: String,
    pub name: String,
}

impl HookContext {
    pub fn new(worktree_path: &Path, main_worktree_path: &Path, branch: &str) -> Self {
        Self {
            worktree_path: worktree_path.to_path_buf(),
            main_worktree_path: main_worktree_path.to_path_buf(),
            branch: branch.to_string(),
            name: path_to_logging_context(worktree_path).to_string(),
        }
    }

    pub fn for_record(record: &WorktreeRecord, main_worktree_path: &Path) -> Self {
        Self::new(&record.path, main_worktree_path, &record.branch)
    }
}

#[derive(Debug)]
pub enum HookError {
    TimedOut { command: String, timeout: Duration },
    Failed { command: String, output: String },
    Spawn { command: String, source: io::Error },
}

impl std::fmt::Display for HookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookError::TimedOut { command, timeout } => {
                write!(f, "Command timed out after {timeout:?}: {command}")
            }
            HookError::Failed { command, output } if output.is_empty() => {
                write!(f, "Command failed: {command}")
            }
            HookError::Failed { command, output } => {
                write!(f, "Command failed: {command}\n{output}")
            }
            HookError::Spawn { command, source } => {
                write!(f, "Failed to start {command}: {source}")
            }
        }
    }
}

impl std::error::Error for HookError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HookError::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Output of one successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub command: String,
    pub output: String,
}

/// Automation for one repository.
#[derive(Debug, Clone)]
pub struct Automation {
    main_worktree: PathBuf,
    mode: TrustMode,
    timeout: Duration,
}

impl Automation {
    pub fn new(main_worktree: impl Into<PathBuf>, mode: TrustMode) -> Self {
        Self {
            main_worktree: main_worktree.into(),
            mode,
            timeout: COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config_path(&self) -> PathBuf {
        ProjectConfig::path_in(&self.main_worktree)
    }

    /// Decide what to do for `phase` under the trust policy.
    ///
    /// The file is read once; the commands and the digest checked against
    /// the store come from the same bytes.
    pub fn plan(&self, phase: HookPhase, store: &TrustStore) -> anyhow::Result<HookPlan> {
        let file_path = self.config_path();
        let contents = match fs::read_to_string(&file_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HookPlan::Nothing),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", file_path.display()));
            }
        };
        let config = ProjectConfig::parse(&contents)?;
        let commands = phase.commands(&config);
        if commands.is_empty() {
            return Ok(HookPlan::Nothing);
        }

        let digest = hash_bytes(contents.as_bytes());
        let plan = match self.mode {
            TrustMode::Always => HookPlan::Run(commands),
            TrustMode::Never => HookPlan::Blocked,
            TrustMode::Tofu if store.is_trusted_digest(&file_path, &digest) => {
                HookPlan::Run(commands)
            }
            TrustMode::Tofu => HookPlan::NeedsTrust(TrustDecisionRequired {
                file_path,
                phase,
                commands_preview: commands,
                digest,
            }),
        };
        log::debug!("Automation plan for {phase}: {plan:?}");
        Ok(plan)
    }

    /// Apply the user's answer to a [`TrustDecisionRequired`].
    ///
    /// Trusting records the digest of the previewed bytes. If the file
    /// changed since the preview, nothing is recorded and the new contents
    /// come back as a fresh [`HookPlan::NeedsTrust`].
    pub fn decide(
        &self,
        decision: TrustDecision,
        request: &TrustDecisionRequired,
        store: &mut TrustStore,
    ) -> anyhow::Result<HookPlan> {
        match decision {
            TrustDecision::Trust => match self.plan(request.phase, store)? {
                HookPlan::NeedsTrust(current) if current.digest == request.digest => {
                    store.trust_digest(&request.file_path, &request.digest)?;
                    Ok(HookPlan::Run(current.commands_preview))
                }
                HookPlan::NeedsTrust(current) => {
                    log::debug!(
                        "{} changed while awaiting approval",
                        request.file_path.display()
                    );
                    Ok(HookPlan::NeedsTrust(current))
                }
                other => Ok(other),
            },
            TrustDecision::Block => Ok(HookPlan::Blocked),
            TrustDecision::Cancel => Ok(HookPlan::Cancelled),
        }
    }

    /// Run `commands` in order; stop at the first failure.
    pub fn run(
        &self,
        commands: &[String],
        ctx: &HookContext,
    ) -> Result<Vec<CommandOutput>, HookError> {
        let shell = ShellConfig::get();
        let mut outputs = Vec::with_capacity(commands.len());

        for command in commands.iter().filter(|c| !c.trim().is_empty()) {
            let result = shell
                .command(command)
                .current_dir(&ctx.worktree_path)
                .env("WORKTREE_PATH", &ctx.worktree_path)
                .env("MAIN_WORKTREE_PATH", &ctx.main_worktree_path)
                .env("WORKTREE_BRANCH", &ctx.branch)
                .env("WORKTREE_NAME", &ctx.name)
                .context(ctx.name.clone())
                .timeout(self.timeout)
                .run();

            let output = match result {
                Ok(output) => output,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    return Err(HookError::TimedOut {
                        command: command.clone(),
                        timeout: self.timeout,
                    });
                }
                Err(source) => {
                    return Err(HookError::Spawn {
                        command: command.clone(),
                        source,
                    });
                }
            };

            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            let combined = combined.trim().to_string();

            if !output.status.success() {
                return Err(HookError::Failed {
                    command: command.clone(),
                    output: combined,
                });
            }
            outputs.push(CommandOutput {
                command: command.clone(),
                output: combined,
            });
        }

        Ok(outputs)
    }
}
