use std::path::Path;

use treeline::app::App;
use treeline::config::AppConfig;
use treeline::git::WorktreeRecord;
use treeline::styling::{HINT, eprintln, format_branch, format_counts, hint_message, print, println};
use treeline::trust::TrustStore;
use treeline::utils::format_timestamp_iso8601;

use crate::cli::OutputFormat;

pub(crate) fn handle_list(
    dir: &Path,
    config: AppConfig,
    format: OutputFormat,
    cached: bool,
) -> anyhow::Result<()> {
    let mut app = App::open(dir, config, TrustStore::open_default()?)?;
    if cached {
        if !app.load_cached() {
            anyhow::bail!("No cached snapshot at {}", app.cache().path().display());
        }
    } else {
        app.refresh_once()?;
    }

    let state = app.state();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(state.worktrees())?),
        OutputFormat::Table => {
            print!("{}", render_table(state.worktrees(), None));
            if state.is_from_cache() {
                eprintln!(
                    "{}",
                    hint_message(format!(
                        "Cached at {}",
                        format_timestamp_iso8601(state.produced_at())
                    ))
                );
            }
        }
    }
    Ok(())
}

/// One row per worktree; `selected` gets a `›` marker.
pub(crate) fn render_table(worktrees: &[WorktreeRecord], selected: Option<usize>) -> String {
    if worktrees.is_empty() {
        return format!("{}\n", hint_message("No worktrees"));
    }

    let rows: Vec<[String; 4]> = worktrees
        .iter()
        .enumerate()
        .map(|(i, wt)| {
            let mut branch = wt.branch.clone();
            if wt.dirty {
                branch.push('*');
            }
            [
                i.to_string(),
                branch,
                wt.last_active.clone().unwrap_or_else(|| "-".to_string()),
                wt.path.display().to_string(),
            ]
        })
        .collect();

    let header = ["#", "Branch", "Active", "Path"];
    let mut widths = header.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = format!(
        "  {HINT}{:<w0$}  {:<w1$}  {:<w2$}  {:<w3$}  Status{HINT:#}\n",
        header[0],
        header[1],
        header[2],
        header[3],
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
        w3 = widths[3],
    );
    for ((i, wt), row) in worktrees.iter().enumerate().zip(&rows) {
        let marker = if selected == Some(i) { '›' } else { ' ' };
        // Pad the plain text, then swap in the styled branch
        let pad = widths[1] - row[1].chars().count();
        let line = format!(
            "{marker} {:<w0$}  {}{}  {:<w2$}  {:<w3$}  {}",
            row[0],
            format_branch(wt),
            " ".repeat(pad),
            row[2],
            row[3],
            format_counts(&wt.counts()),
            w0 = widths[0],
            w2 = widths[2],
            w3 = widths[3],
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}
