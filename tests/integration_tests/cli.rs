use std::fs;

use rstest::rstest;
use treeline::config::PROJECT_CONFIG_FILENAME;

use crate::common::{
    TestRepo, output_with_stdin, repo, repo_with_feature_worktree, stderr_of, stdout_of,
};

const INIT_WRITES_MARKER: &str = "init-commands = ['echo \"$WORKTREE_BRANCH\" > hook-ran']\n";

#[rstest]
fn test_list_json(repo_with_feature_worktree: TestRepo) {
    let repo = repo_with_feature_worktree;
    repo.write_user_config("");

    let output = repo.treeline_command().args(["list", "--format", "json"]).output().unwrap();

    assert!(output.status.success(), "{}", stderr_of(&output));
    let worktrees: serde_json::Value = serde_json::from_str(&stdout_of(&output)).unwrap();
    let worktrees = worktrees.as_array().unwrap();
    assert_eq!(worktrees.len(), 2);
    assert_eq!(worktrees[0]["branch"], "main");
    assert_eq!(worktrees[0]["is_main"], true);
    assert_eq!(worktrees[1]["branch"], "feature");
    assert_eq!(worktrees[1]["dirty"], false);
}

#[rstest]
fn test_list_cached_after_refresh(repo_with_feature_worktree: TestRepo) {
    let repo = repo_with_feature_worktree;
    repo.write_user_config("");

    let first = repo.treeline_command().arg("list").output().unwrap();
    assert!(first.status.success(), "{}", stderr_of(&first));
    assert!(stdout_of(&first).contains("feature"));

    let cached = repo.treeline_command().args(["list", "--cached"]).output().unwrap();

    assert!(cached.status.success(), "{}", stderr_of(&cached));
    assert_eq!(stdout_of(&cached), stdout_of(&first));
    assert!(
        stderr_of(&cached).contains("Cached at 2025-01-01T00:00:00Z"),
        "{}",
        stderr_of(&cached)
    );
}

#[rstest]
fn test_list_cached_without_cache_fails(repo: TestRepo) {
    repo.write_user_config("");

    let output = repo.treeline_command().args(["list", "--cached"]).output().unwrap();

    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("No cached snapshot at"));
}

#[rstest]
fn test_list_outside_repository_fails(repo: TestRepo) {
    repo.write_user_config("");

    let output = repo
        .treeline_command()
        .arg("-C")
        .arg(repo.home_path())
        .arg("list")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("Not a git repository"));
}

#[rstest]
fn test_trust_check_and_add(repo: TestRepo) {
    repo.write_user_config("");
    let file = repo.root_path().join(PROJECT_CONFIG_FILENAME);
    fs::write(&file, INIT_WRITES_MARKER).unwrap();

    let check = |repo: &TestRepo| {
        let output = repo
            .treeline_command()
            .args(["trust", "check"])
            .arg(&file)
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", stderr_of(&output));
        stdout_of(&output).trim().to_string()
    };

    assert_eq!(check(&repo), "untrusted");

    let add = repo
        .treeline_command()
        .args(["trust", "add"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(add.status.success(), "{}", stderr_of(&add));
    assert!(stdout_of(&add).contains("Trusted"));
    assert!(repo.trust_db_path().exists());

    assert_eq!(check(&repo), "trusted");
}

#[rstest]
fn test_trust_check_missing_file(repo: TestRepo) {
    repo.write_user_config("");

    let output = repo
        .treeline_command()
        .args(["trust", "check", "does-not-exist.toml"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(stdout_of(&output).trim(), "not-found");
}

#[rstest]
fn test_hooks_run_with_yes(repo_with_feature_worktree: TestRepo) {
    let repo = repo_with_feature_worktree;
    repo.write_user_config("");
    fs::write(repo.root_path().join(PROJECT_CONFIG_FILENAME), INIT_WRITES_MARKER).unwrap();

    let output = repo
        .treeline_command()
        .args(["hooks", "run", "init", "--yes", "--worktree"])
        .arg(repo.worktree("feature"))
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", stderr_of(&output));
    assert!(stdout_of(&output).contains("Ran 1 init command(s)"));
    let marker = repo.worktree("feature").join("hook-ran");
    assert_eq!(fs::read_to_string(marker).unwrap().trim(), "feature");
    assert!(repo.trust_db_path().exists());
}

#[rstest]
fn test_hooks_run_declined(repo: TestRepo) {
    repo.write_user_config("");
    fs::write(repo.root_path().join(PROJECT_CONFIG_FILENAME), INIT_WRITES_MARKER).unwrap();

    let mut cmd = repo.treeline_command();
    cmd.args(["hooks", "run", "init"]);
    let output = output_with_stdin(cmd, "n\n");

    assert!(output.status.success(), "{}", stderr_of(&output));
    let stderr = stderr_of(&output);
    assert!(stderr.contains("wants to run 1 init command(s)"), "{stderr}");
    assert!(stderr.contains("Skipped init commands from untrusted"), "{stderr}");
    assert!(!repo.root_path().join("hook-ran").exists());
}

#[rstest]
fn test_hooks_run_cancelled_on_eof(repo: TestRepo) {
    repo.write_user_config("");
    fs::write(repo.root_path().join(PROJECT_CONFIG_FILENAME), INIT_WRITES_MARKER).unwrap();

    let mut cmd = repo.treeline_command();
    cmd.args(["hooks", "run", "init"]);
    let output = output_with_stdin(cmd, "");

    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("Cancelled init commands"));
    assert!(!repo.root_path().join("hook-ran").exists());
}

#[rstest]
fn test_hooks_blocked_by_trust_mode_env(repo: TestRepo) {
    repo.write_user_config("");
    fs::write(repo.root_path().join(PROJECT_CONFIG_FILENAME), INIT_WRITES_MARKER).unwrap();

    let output = repo
        .treeline_command()
        .env("TREELINE_TRUST_MODE", "never")
        .args(["hooks", "run", "init", "--yes"])
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", stderr_of(&output));
    assert!(stderr_of(&output).contains("Skipped init commands"));
    assert!(!repo.root_path().join("hook-ran").exists());
}

#[rstest]
fn test_hooks_without_project_config(repo: TestRepo) {
    repo.write_user_config("");

    let output = repo
        .treeline_command()
        .args(["hooks", "run", "terminate"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(stderr_of(&output).contains("No terminate commands configured"));
}

#[rstest]
fn test_diff_shows_unstaged_changes(repo: TestRepo) {
    repo.write_user_config("");
    fs::write(repo.root_path().join("README.md"), "# edited\n").unwrap();

    let output = repo.treeline_command().arg("diff").output().unwrap();

    assert!(output.status.success(), "{}", stderr_of(&output));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("=== Unstaged Changes ==="), "{stdout}");
    assert!(stdout.contains("+# edited"));
}

#[rstest]
fn test_diff_clean_worktree(repo: TestRepo) {
    repo.write_user_config("");

    let output = repo.treeline_command().arg("diff").output().unwrap();

    assert!(output.status.success());
    assert_eq!(stdout_of(&output), "");
    assert!(stderr_of(&output).contains("No changes in"));
}

#[rstest]
fn test_invalid_config_is_reported(repo: TestRepo) {
    repo.write_user_config("max-diff-chars = 0\n");

    let output = repo.treeline_command().arg("list").output().unwrap();

    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("max-diff-chars must be positive"));
}

#[rstest]
fn test_watch_quits_on_q(repo_with_feature_worktree: TestRepo) {
    let repo = repo_with_feature_worktree;
    repo.write_user_config("auto-refresh = false\n");

    let mut cmd = repo.treeline_command();
    cmd.arg("watch");
    let output = output_with_stdin(cmd, "q\n");

    assert!(output.status.success(), "{}", stderr_of(&output));
}
