use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;
use treeline::git::{ProcessRunner, Repository};
use treeline::notification::ChannelNotifier;
use treeline::watch::{ChangeWatcher, WatcherState};

use crate::common::{TestRepo, repo};

#[rstest]
fn test_branch_creation_signals_refresh(repo: TestRepo) {
    let mut watcher = ChangeWatcher::with_min_spacing(Duration::from_millis(50));
    let signals = watcher.signals();

    assert!(watcher.start(&repo.repository(), true));
    assert_eq!(watcher.state(), WatcherState::Running);
    assert_eq!(watcher.common_dir(), Some(repo.root_path().join(".git").as_path()));
    assert!(
        watcher
            .watched_paths()
            .contains(&repo.root_path().join(".git").join("refs").join("heads"))
    );

    // Settle any events from repository setup
    std::thread::sleep(Duration::from_millis(100));
    while signals.try_recv().is_ok() {}

    repo.run_git(&["branch", "topic"]);

    assert!(signals.recv_timeout(Duration::from_secs(5)).is_ok());

    watcher.stop();
    assert_eq!(watcher.state(), WatcherState::Stopped);
    assert!(watcher.watched_paths().is_empty());
}

#[rstest]
fn test_disabled_watcher_does_not_start(repo: TestRepo) {
    let mut watcher = ChangeWatcher::new();

    assert!(!watcher.start(&repo.repository(), false));
    assert_eq!(watcher.state(), WatcherState::Stopped);
}

#[test]
fn test_start_outside_repository_stays_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, _rx) = crossbeam_channel::unbounded();
    let runner = Arc::new(ProcessRunner::new(Arc::new(ChannelNotifier::new(tx))));
    let repository = Repository::new(dir.path(), runner);
    let mut watcher = ChangeWatcher::new();

    assert!(!watcher.start(&repository, true));
    assert_eq!(watcher.state(), WatcherState::Stopped);
}
