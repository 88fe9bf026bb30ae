use std::fs;

use rstest::rstest;
use treeline::automation::{Automation, HookContext, HookPhase, HookPlan, TrustDecision};
use treeline::config::{PROJECT_CONFIG_FILENAME, TrustMode};
use treeline::trust::{TrustStatus, TrustStore};

use crate::common::{TestRepo, repo_with_feature_worktree};

const PROJECT_CONFIG: &str = r#"
init-commands = ['echo "$WORKTREE_NAME:$WORKTREE_BRANCH"']
terminate-commands = ["true"]
"#;

#[rstest]
fn test_first_use_asks_then_runs_in_worktree(repo_with_feature_worktree: TestRepo) {
    let repo = repo_with_feature_worktree;
    let config_file = repo.root_path().join(PROJECT_CONFIG_FILENAME);
    fs::write(&config_file, PROJECT_CONFIG).unwrap();

    let mut store = TrustStore::load(repo.temp_path().join("trusted.json"));
    let automation = Automation::new(repo.root_path(), TrustMode::Tofu);

    let HookPlan::NeedsTrust(request) = automation.plan(HookPhase::Init, &store).unwrap() else {
        panic!("an unseen file should need a trust decision");
    };
    assert_eq!(request.file_path, config_file);
    assert_eq!(
        request.commands_preview,
        vec![r#"echo "$WORKTREE_NAME:$WORKTREE_BRANCH""#.to_string()]
    );

    let plan = automation
        .decide(TrustDecision::Trust, &request, &mut store)
        .unwrap();
    let HookPlan::Run(commands) = plan else {
        panic!("trusting should produce a runnable plan, got {plan:?}");
    };

    let ctx = HookContext::new(repo.worktree("feature"), repo.root_path(), "feature");
    let outputs = automation.run(&commands, &ctx).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].output, "repo.feature:feature");

    // The ledger persisted; a fresh store agrees
    let reloaded = TrustStore::load(repo.temp_path().join("trusted.json"));
    assert_eq!(reloaded.check_trust(&config_file), TrustStatus::Trusted);
}

#[rstest]
fn test_edited_file_needs_trust_again(repo_with_feature_worktree: TestRepo) {
    let repo = repo_with_feature_worktree;
    let config_file = repo.root_path().join(PROJECT_CONFIG_FILENAME);
    fs::write(&config_file, PROJECT_CONFIG).unwrap();
    let mut store = TrustStore::load(repo.temp_path().join("trusted.json"));
    store.trust_file(&config_file).unwrap();

    let automation = Automation::new(repo.root_path(), TrustMode::Tofu);
    assert!(matches!(
        automation.plan(HookPhase::Terminate, &store).unwrap(),
        HookPlan::Run(_)
    ));

    fs::write(&config_file, "terminate-commands = ['rm -rf build']\n").unwrap();

    assert_eq!(store.check_trust(&config_file), TrustStatus::Untrusted);
    assert!(matches!(
        automation.plan(HookPhase::Terminate, &store).unwrap(),
        HookPlan::NeedsTrust(_)
    ));
}

#[rstest]
fn test_failing_command_stops_the_run(repo_with_feature_worktree: TestRepo) {
    let repo = repo_with_feature_worktree;
    let automation = Automation::new(repo.root_path(), TrustMode::Always);
    let ctx = HookContext::new(repo.worktree("feature"), repo.root_path(), "feature");
    let marker = repo.worktree("feature").join("marker");

    let commands = vec![
        "exit 3".to_string(),
        format!("touch {}", marker.display()),
    ];
    let err = automation.run(&commands, &ctx).unwrap_err();

    assert!(err.to_string().contains("exit 3"), "{err}");
    assert!(!marker.exists());
}
