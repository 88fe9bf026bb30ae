use std::path::Path;
use std::sync::Arc;

use treeline::config::AppConfig;
use treeline::git::{DiffPager, Repository, build_three_part_diff};
use treeline::styling::{colorize_diff, eprintln, hint_message, println};

use super::one_shot_runner;

pub(crate) fn handle_diff(dir: &Path, config: &AppConfig, path: Option<&Path>) -> anyhow::Result<()> {
    let runner = one_shot_runner();
    let start = path.unwrap_or(dir);
    let repo = Repository::discover(start, Arc::clone(&runner))?;

    let diff = build_three_part_diff(runner.as_ref(), repo.root(), &config.diff_limits());
    if diff.is_empty() {
        eprintln!(
            "{}",
            hint_message(format!("No changes in {}", repo.root().display()))
        );
        return Ok(());
    }

    let pager = DiffPager::detect(&config.git_pager, config.git_pager_args.clone());
    if pager.is_available() {
        println!("{}", pager.apply(&diff));
    } else {
        println!("{}", colorize_diff(&diff));
    }
    Ok(())
}
