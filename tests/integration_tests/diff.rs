use std::fs;

use rstest::rstest;
use treeline::git::{DiffLimits, build_three_part_diff};

use crate::common::{TestRepo, repo};

#[rstest]
fn test_clean_worktree_has_empty_diff(repo: TestRepo) {
    let (runner, _notices) = repo.runner();

    let diff = build_three_part_diff(runner.as_ref(), repo.root_path(), &DiffLimits::default());

    assert_eq!(diff, "");
}

#[rstest]
fn test_three_sections_with_untracked_limit(repo: TestRepo) {
    let root = repo.root_path();
    fs::write(root.join("staged.txt"), "staged\n").unwrap();
    repo.run_git(&["add", "staged.txt"]);
    fs::write(root.join("README.md"), "# changed\n").unwrap();
    fs::write(root.join("one.txt"), "one\n").unwrap();
    fs::write(root.join("two.txt"), "two\n").unwrap();
    let (runner, notices) = repo.runner();
    let limits = DiffLimits {
        max_total_chars: 100_000,
        max_untracked_files: 1,
    };

    let diff = build_three_part_diff(runner.as_ref(), root, &limits);

    let staged = diff.find("=== Staged Changes ===").unwrap();
    let unstaged = diff.find("=== Unstaged Changes ===").unwrap();
    let untracked = diff.find("=== Untracked: one.txt ===").unwrap();
    assert!(staged < unstaged && unstaged < untracked, "{diff}");
    assert!(diff.contains("+staged"));
    assert!(diff.contains("+# changed"));
    assert!(!diff.contains("=== Untracked: two.txt ==="));
    assert!(diff.ends_with("[...showing 1 of 2 untracked files]"), "{diff}");
    assert!(notices.try_recv().is_err());
}

#[rstest]
fn test_untracked_section_disabled(repo: TestRepo) {
    fs::write(repo.root_path().join("new.txt"), "new\n").unwrap();
    let (runner, _notices) = repo.runner();
    let limits = DiffLimits {
        max_total_chars: 100_000,
        max_untracked_files: 0,
    };

    assert_eq!(build_three_part_diff(runner.as_ref(), repo.root_path(), &limits), "");
}

#[rstest]
fn test_large_diff_is_truncated(repo: TestRepo) {
    fs::write(repo.root_path().join("README.md"), "x\n".repeat(500)).unwrap();
    let (runner, _notices) = repo.runner();
    let limits = DiffLimits {
        max_total_chars: 200,
        max_untracked_files: 10,
    };

    let diff = build_three_part_diff(runner.as_ref(), repo.root_path(), &limits);

    assert!(diff.starts_with("=== Unstaged Changes ==="));
    assert!(diff.ends_with("\n\n[...truncated at 200 chars]"), "{diff}");
    assert!(diff.len() <= 200 + "\n\n[...truncated at 200 chars]".len());
}
