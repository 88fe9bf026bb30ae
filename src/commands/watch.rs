//! Headless event loop driven by line commands on stdin.

use std::io::BufRead;
use std::path::Path;

use crossbeam_channel::{self as chan, Sender};
use treeline::app::{App, AppState, Update, UserCommand, View};
use treeline::automation::{HookPhase, TrustDecision};
use treeline::config::AppConfig;
use treeline::styling::{
    PROMPT_SYMBOL, eprintln, hint_message, notification_message, print, println,
};
use treeline::trust::TrustStore;

use super::list::render_table;

pub(crate) fn handle_watch(dir: &Path, config: AppConfig) -> anyhow::Result<()> {
    let mut app = App::open(dir, config, TrustStore::open_default()?)?;

    let (tx, rx) = chan::unbounded();
    std::thread::Builder::new()
        .name("treeline-stdin".into())
        .spawn(move || read_commands(std::io::stdin().lock(), &tx))?;

    app.run(&rx, &mut TextView)
}

/// Forward parsed lines until EOF or `q`. Dropping `tx` ends the loop.
fn read_commands(input: impl BufRead, tx: &Sender<UserCommand>) {
    for line in input.lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_command(line) {
            Some(cmd) => {
                if tx.send(cmd).is_err() || cmd == UserCommand::Quit {
                    break;
                }
            }
            None => eprintln!("{}", hint_message(format!("Unknown command: {line}"))),
        }
    }
}

pub(crate) fn parse_command(line: &str) -> Option<UserCommand> {
    if let Ok(index) = line.parse::<usize>() {
        return Some(UserCommand::Select(index));
    }
    let cmd = match line {
        "r" => UserCommand::Refresh,
        "d" => UserCommand::RefreshDetails,
        "i" => UserCommand::RunHooks(HookPhase::Init),
        "t" => UserCommand::RunHooks(HookPhase::Terminate),
        "y" => UserCommand::Decide(TrustDecision::Trust),
        "n" => UserCommand::Decide(TrustDecision::Block),
        "c" => UserCommand::Decide(TrustDecision::Cancel),
        "q" => UserCommand::Quit,
        _ => return None,
    };
    Some(cmd)
}

struct TextView;

impl View for TextView {
    fn render(&mut self, state: &AppState, update: Update<'_>) -> anyhow::Result<()> {
        match update {
            Update::Snapshot | Update::Selection => {
                print!("{}", render_table(state.worktrees(), state.selected_index()));
                if let Some(error) = state.last_error() {
                    eprintln!("{}", hint_message(format!("Last refresh failed: {error}")));
                }
            }
            Update::Detail(detail) => {
                println!("{}", hint_message(format!("── {}", detail.path.display())));
                let status = detail.status_with_diff();
                if !status.is_empty() {
                    println!("{status}");
                }
                for entry in &detail.log {
                    println!("{} {}", hint_message(&entry.sha), entry.subject);
                }
            }
            Update::Notice(notification) => eprintln!("{}", notification_message(notification)),
            Update::TrustPrompt(request) => {
                eprintln!(
                    "{PROMPT_SYMBOL} {} wants to run {} command(s):",
                    request.file_path.display(),
                    request.phase
                );
                for command in &request.commands_preview {
                    eprintln!("    {command}");
                }
                eprintln!("{}", hint_message("[y] trust  [n] skip  [c] cancel"));
            }
        }
        Ok(())
    }
}
