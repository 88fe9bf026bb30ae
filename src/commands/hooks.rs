use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anstyle::Style;
use treeline::automation::{
    Automation, HookContext, HookPhase, HookPlan, TrustDecision, TrustDecisionRequired,
};
use treeline::config::AppConfig;
use treeline::git::{DETACHED, Repository, parse_worktree_list};
use treeline::styling::{
    WARNING_SYMBOL, eprint, eprintln, hint_message, println, success_message,
};
use treeline::trust::TrustStore;

use super::one_shot_runner;

pub(crate) fn handle_hooks_run(
    dir: &Path,
    config: &AppConfig,
    phase: HookPhase,
    worktree: Option<&Path>,
    yes: bool,
) -> anyhow::Result<()> {
    let runner = one_shot_runner();
    let repo = Repository::discover(worktree.unwrap_or(dir), Arc::clone(&runner))?;
    let ctx = hook_context(&repo)?;

    let automation = Automation::new(ctx.main_worktree_path.clone(), config.trust_mode);
    let mut store = TrustStore::open_default()?;
    let mut plan = automation.plan(phase, &store)?;

    // Trusting re-plans, and the file may have changed in between
    let plan = loop {
        let request = match plan {
            HookPlan::NeedsTrust(request) => request,
            other => break other,
        };
        let decision = if yes {
            TrustDecision::Trust
        } else {
            prompt_for_trust(&request, &mut io::stdin().lock())?
        };
        plan = automation.decide(decision, &request, &mut store)?;
    };

    match plan {
        HookPlan::Run(commands) => {
            for output in automation.run(&commands, &ctx)? {
                println!("{}", hint_message(format!("$ {}", output.command)));
                if !output.output.is_empty() {
                    println!("{}", output.output);
                }
            }
            println!(
                "{}",
                success_message(format!("Ran {} {phase} command(s)", commands.len()))
            );
        }
        HookPlan::Nothing => {
            eprintln!("{}", hint_message(format!("No {phase} commands configured")));
        }
        HookPlan::Blocked => {
            eprintln!(
                "{WARNING_SYMBOL} Skipped {phase} commands from untrusted {}",
                automation.config_path().display()
            );
        }
        HookPlan::Cancelled | HookPlan::NeedsTrust(_) => {
            anyhow::bail!("Cancelled {phase} commands")
        }
    }
    Ok(())
}

/// Context for the worktree `repo` was discovered in.
fn hook_context(repo: &Repository) -> anyhow::Result<HookContext> {
    let listing = repo.runner().run(
        &["git", "worktree", "list", "--porcelain"],
        Some(repo.root()),
        &Default::default(),
    );
    let entries = parse_worktree_list(&listing)?;
    let root = canonical(repo.root());

    let main = entries
        .iter()
        .find(|e| e.is_main)
        .map(|e| e.path.clone())
        .unwrap_or_else(|| repo.root().to_path_buf());
    let branch = entries
        .iter()
        .find(|e| canonical(&e.path) == root)
        .and_then(|e| e.branch.clone())
        .unwrap_or_else(|| DETACHED.to_string());

    Ok(HookContext::new(repo.root(), &main, &branch))
}

fn canonical(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Ask on stderr, read the answer from `input`.
///
/// `y` trusts, `n` blocks, anything else (including EOF) cancels.
fn prompt_for_trust(
    request: &TrustDecisionRequired,
    input: &mut impl BufRead,
) -> io::Result<TrustDecision> {
    let bold = Style::new().bold();
    let count = request.commands_preview.len();

    eprintln!();
    eprintln!(
        "{WARNING_SYMBOL} {bold}{}{bold:#} wants to run {count} {} command(s):",
        request.file_path.display(),
        request.phase
    );
    for command in &request.commands_preview {
        eprintln!("    {command}");
    }
    eprintln!();
    eprint!("Trust this file? {bold}[y]es / [n]o / [c]ancel{bold:#} ");
    io::stderr().flush()?;

    let mut response = String::new();
    input.read_line(&mut response)?;
    Ok(parse_decision(&response))
}

fn parse_decision(response: &str) -> TrustDecision {
    match response.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => TrustDecision::Trust,
        "n" | "no" => TrustDecision::Block,
        _ => TrustDecision::Cancel,
    }
}
