use std::fs;
use std::sync::Arc;

use crossbeam_channel as chan;
use rstest::rstest;
use treeline::app::App;
use treeline::config::AppConfig;
use treeline::git::{ProcessRunner, RefreshEngine, Repository, StatusCounts};
use treeline::notification::ChannelNotifier;
use treeline::trust::TrustStore;

use crate::common::{TEST_EPOCH, TestRepo, repo};

/// main, a clean worktree, and a dirty one that is one commit ahead of main
/// with two modified files and one untracked file.
fn three_worktrees(mut repo: TestRepo) -> TestRepo {
    repo.commit_file(repo.root_path(), "a.txt", "a\n", "Add a");
    repo.commit_file(repo.root_path(), "b.txt", "b\n", "Add b");

    let dirty = repo.add_worktree("dirty");
    repo.add_worktree("clean");

    repo.run_git_in(&dirty, &["branch", "--set-upstream-to=main"]);
    repo.commit_file(&dirty, "c.txt", "c\n", "Add c");
    fs::write(dirty.join("a.txt"), "changed a\n").unwrap();
    fs::write(dirty.join("b.txt"), "changed b\n").unwrap();
    fs::write(dirty.join("new.txt"), "new\n").unwrap();
    repo
}

#[rstest]
fn test_refresh_reports_every_worktree(repo: TestRepo) {
    let repo = three_worktrees(repo);
    let (runner, notices) = repo.runner();
    let engine = RefreshEngine::new(repo.root_path(), runner).unwrap();

    let snapshot = engine.refresh();

    assert_eq!(snapshot.len(), 3);
    let main = snapshot.main().unwrap();
    assert_eq!(main.path, repo.root_path());
    assert_eq!(main.branch, "main");
    assert_eq!(snapshot.worktrees.iter().filter(|w| w.is_main).count(), 1);

    let dirty = snapshot.find(repo.worktree("dirty")).unwrap();
    assert!(dirty.dirty);
    assert_eq!(
        dirty.counts(),
        StatusCounts {
            ahead: 1,
            behind: 0,
            staged: 0,
            modified: 2,
            untracked: 1,
        }
    );
    assert_eq!(dirty.last_active_timestamp, Some(TEST_EPOCH as i64));
    assert!(dirty.last_active.is_some());

    let clean = snapshot.find(repo.worktree("clean")).unwrap();
    assert!(!clean.dirty);
    assert_eq!(clean.counts(), StatusCounts::default());

    assert!(notices.try_recv().is_err(), "no command should have failed");
}

#[rstest]
fn test_app_refresh_sorts_and_caches(repo: TestRepo) {
    let repo = three_worktrees(repo);
    let (runner, notices) = repo.runner();
    let config = AppConfig {
        worktree_dir: Some(repo.worktree_dir()),
        auto_refresh: false,
        git_pager: String::new(),
        ..Default::default()
    };
    let trust = TrustStore::load(repo.temp_path().join("trusted.json"));
    let mut app = App::with_repository(
        Repository::new(repo.root_path(), runner),
        config,
        trust,
        notices,
    )
    .unwrap();

    app.refresh_once().unwrap();

    let worktrees = app.state().worktrees();
    assert_eq!(worktrees.len(), 3);
    assert!(worktrees[0].is_main);
    assert_eq!(app.state().selected_index(), Some(0));

    // No remote: the key falls back to the toplevel directory name
    assert_eq!(
        app.cache().path(),
        repo.worktree_dir().join("repo").join(".worktree-cache.json")
    );
    assert_eq!(app.cache().load().unwrap().len(), 3);
}

#[test]
fn test_refresh_outside_repository_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, notices) = chan::unbounded();
    let runner = Arc::new(ProcessRunner::new(Arc::new(ChannelNotifier::new(tx))));
    let engine = RefreshEngine::new(dir.path(), runner).unwrap();

    assert!(engine.refresh().is_empty());
    let notice = notices.try_recv().unwrap();
    assert!(
        notice.message.starts_with("Command failed: git worktree list"),
        "{}",
        notice.message
    );
}
