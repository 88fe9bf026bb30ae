use std::sync::Arc;

use rstest::rstest;
use treeline::git::{ProcessRunner, Repository};
use treeline::notification::ChannelNotifier;

use crate::common::{TestRepo, canonicalize, repo, repo_with_feature_worktree};

#[rstest]
fn test_common_dir_from_linked_worktree(repo_with_feature_worktree: TestRepo) {
    let repo = repo_with_feature_worktree;
    let linked = Repository::new(repo.worktree("feature"), repo.runner().0);

    assert_eq!(
        linked.git_common_dir().unwrap(),
        repo.root_path().join(".git")
    );
    assert_eq!(linked.main_worktree_path(), repo.root_path());
}

#[rstest]
fn test_discover_from_subdirectory(repo: TestRepo) {
    let nested = repo.root_path().join("src").join("deep");
    std::fs::create_dir_all(&nested).unwrap();

    let discovered = Repository::discover(&nested, repo.runner().0).unwrap();

    assert_eq!(canonicalize(discovered.root()).unwrap(), repo.root_path());
}

#[test]
fn test_discover_outside_repository_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, _rx) = crossbeam_channel::unbounded();
    let runner = Arc::new(ProcessRunner::new(Arc::new(ChannelNotifier::new(tx))));

    assert!(Repository::discover(dir.path(), runner).is_err());
}

#[rstest]
fn test_repo_key_falls_back_to_directory_name(repo: TestRepo) {
    assert_eq!(repo.repository().repo_key(), "repo");
}

#[rstest]
fn test_repo_key_from_origin(repo: TestRepo) {
    repo.run_git(&[
        "remote",
        "add",
        "origin",
        "https://example.invalid/treeline-tests/widgets.git",
    ]);

    assert_eq!(repo.repository().repo_key(), "treeline-tests/widgets");
}

#[rstest]
fn test_add_rename_remove_worktree(repo: TestRepo) {
    let (runner, notices) = repo.runner();
    let repository = Repository::new(repo.root_path(), runner);
    let first = repo.temp_path().join("repo.first");
    let second = repo.temp_path().join("repo.second");

    assert!(repository.add_worktree(&first, "first", Some("main")));
    assert!(first.join("README.md").exists());

    assert!(repository.rename_worktree(&first, &second, "first", "second"));
    assert!(!first.exists());
    assert_eq!(repo.git_output(&["branch", "--list", "second"]), "second");

    assert!(repository.remove_worktree(&second, false));
    assert!(!second.exists());
    assert!(notices.try_recv().is_err());
}

#[rstest]
fn test_add_existing_branch_reports_failure(repo: TestRepo) {
    let (runner, notices) = repo.runner();
    let repository = Repository::new(repo.root_path(), runner);
    let path = repo.temp_path().join("repo.main");

    assert!(!repository.add_worktree(&path, "main", None));

    let notice = notices.try_recv().unwrap();
    assert!(
        notice.message.starts_with("Failed to create worktree"),
        "{}",
        notice.message
    );
}

#[rstest]
fn test_remove_dirty_worktree_needs_force(repo_with_feature_worktree: TestRepo) {
    let repo = repo_with_feature_worktree;
    let feature = repo.worktree("feature").to_path_buf();
    std::fs::write(feature.join("README.md"), "edited\n").unwrap();
    let (runner, notices) = repo.runner();
    let repository = Repository::new(repo.root_path(), runner);

    assert!(!repository.remove_worktree(&feature, false));
    assert!(notices.try_recv().is_ok());
    assert!(feature.exists());

    assert!(repository.remove_worktree(&feature, true));
    assert!(!feature.exists());
}
