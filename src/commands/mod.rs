mod diff;
mod hooks;
mod list;
mod trust;
mod watch;

use std::sync::Arc;

use treeline::git::{CommandRunner, ProcessRunner};
use treeline::notification::LogNotifier;

pub(crate) use diff::handle_diff;
pub(crate) use hooks::handle_hooks_run;
pub(crate) use list::handle_list;
pub(crate) use trust::handle_trust;
pub(crate) use watch::handle_watch;

/// Runner for commands without an event loop; failures go to the log.
fn one_shot_runner() -> Arc<dyn CommandRunner> {
    Arc::new(ProcessRunner::new(Arc::new(LogNotifier::default())))
}
