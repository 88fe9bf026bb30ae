use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Color, Styles};
use clap::{Parser, Subcommand, ValueEnum};

use treeline::automation::HookPhase;

/// Help output in the same palette as the rest of the output
fn help_styles() -> Styles {
    Styles::styled()
        .header(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .usage(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .literal(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Cyan))),
        )
        .placeholder(anstyle::Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan))))
        .error(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
}

#[derive(Parser)]
#[command(name = "treeline")]
#[command(about = "Keep every git worktree of a repository in view", long_about = None)]
#[command(version, styles = help_styles())]
pub(crate) struct Cli {
    /// Working directory for this command
    #[arg(
        short = 'C',
        global = true,
        value_name = "path",
        display_order = 100,
        help_heading = "Global Options"
    )]
    pub directory: Option<PathBuf>,

    /// User config file path
    #[arg(
        long,
        global = true,
        value_name = "path",
        display_order = 101,
        help_heading = "Global Options"
    )]
    pub config: Option<PathBuf>,

    /// Show debug logging
    #[arg(
        long,
        short = 'v',
        global = true,
        action = clap::ArgAction::Count,
        display_order = 102,
        help_heading = "Global Options"
    )]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// List worktrees with their status
    List {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Print the last cached snapshot instead of refreshing
        #[arg(long)]
        cached: bool,
    },

    /// Follow worktree changes until stdin closes
    ///
    /// Reads one command per line: a row number selects that worktree,
    /// `r` refreshes, `d` re-fetches details, `i`/`t` run init/terminate
    /// commands for the selection, `y`/`n`/`c` answer a trust prompt, and
    /// `q` quits.
    Watch,

    /// Show staged, unstaged and untracked changes of a worktree
    Diff {
        /// Worktree path (defaults to the current worktree)
        path: Option<PathBuf>,
    },

    /// Inspect or record trust for an automation file
    Trust {
        #[command(subcommand)]
        action: TrustCommand,
    },

    /// Run repository automation
    Hooks {
        #[command(subcommand)]
        action: HooksCommand,
    },
}

#[derive(Subcommand)]
pub(crate) enum TrustCommand {
    /// Print whether a file's current contents are trusted
    Check { file: PathBuf },
    /// Trust a file's current contents
    Add { file: PathBuf },
}

#[derive(Subcommand)]
pub(crate) enum HooksCommand {
    /// Run `init-commands` or `terminate-commands` from `.treeline.toml`
    Run {
        #[arg(value_enum)]
        phase: PhaseArg,

        /// Worktree to run in (defaults to the current worktree)
        #[arg(long, value_name = "path")]
        worktree: Option<PathBuf>,

        /// Trust the automation file without asking
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum PhaseArg {
    Init,
    Terminate,
}

impl From<PhaseArg> for HookPhase {
    fn from(phase: PhaseArg) -> Self {
        match phase {
            PhaseArg::Init => HookPhase::Init,
            PhaseArg::Terminate => HookPhase::Terminate,
        }
    }
}
