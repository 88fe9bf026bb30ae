use std::io::Write;
use std::process;

use clap::Parser;
use treeline::config::AppConfig;
use treeline::notification::Notification;
use treeline::styling::{eprintln, notification_message};

mod cli;
mod commands;

use cli::{Cli, Commands, HooksCommand};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{}", notification_message(&Notification::error(format!("{e:#}"))));
        process::exit(1);
    }
}

/// `warn` by default, `debug` with `-v`; `RUST_LOG` overrides either.
fn init_logging(verbose: u8) {
    let default_level = if verbose > 0 { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}: {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let dir = match cli.directory {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let config = AppConfig::load(cli.config.as_deref())?;
    log::debug!("Loaded config: {config:?}");

    match cli.command {
        Commands::List { format, cached } => commands::handle_list(&dir, config, format, cached),
        Commands::Watch => commands::handle_watch(&dir, config),
        Commands::Diff { path } => commands::handle_diff(&dir, &config, path.as_deref()),
        Commands::Trust { action } => commands::handle_trust(action),
        Commands::Hooks {
            action: HooksCommand::Run {
                phase,
                worktree,
                yes,
            },
        } => commands::handle_hooks_run(&dir, &config, phase.into(), worktree.as_deref(), yes),
    }
}
