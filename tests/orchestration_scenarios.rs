//! End-to-end orchestration runs against throwaway repositories.
//!
//! Git runs for real; build commands and content generation are scripted.

mod fixtures;

use std::sync::Arc;

use fixtures::repository::RepositoryFixture;
use patchwright::branching::BranchStatus;
use patchwright::external::ScriptedExecutor;
use patchwright::generator::ScriptedGenerator;
use patchwright::index::{IndexRegistry, MemoryIndex};
use patchwright::orchestrator::{OrchestrationOptions, OrchestrationPhase, Orchestrator};
use patchwright::{PatchwrightConfig, RiskLevel};

fn orchestrator(
    repo: &RepositoryFixture,
    config: PatchwrightConfig,
    executor: Arc<ScriptedExecutor>,
    generator: Arc<ScriptedGenerator>,
) -> Orchestrator {
    let indexes = IndexRegistry::new().with(Arc::new(MemoryIndex::new("primary")));
    Orchestrator::new(repo.path(), "demo", config, executor, indexes, generator)
}

#[tokio::test]
async fn test_dry_run_plans_without_executing() {
    let repo = RepositoryFixture::with_files(&[
        ("src/auth/login.ts", "export function login() {}\n"),
        ("README.md", "# demo\n"),
    ]);
    let executor = Arc::new(ScriptedExecutor::new().passthrough("git"));
    let generator = Arc::new(ScriptedGenerator::new());
    let orchestrator = orchestrator(&repo, PatchwrightConfig::default(), executor, generator.clone());

    let result = orchestrator
        .orchestrate(
            "add input validation to the login handler",
            &OrchestrationOptions {
                dry_run: true,
                explicit_files: vec!["src/auth/login.ts".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(result.success, "{}", result.message);
    assert!(result.completed_tasks.is_empty());
    assert!(result.failed_tasks.is_empty());
    assert!(result.branch_name.is_some());
    assert_eq!(result.snapshots.len(), 1);
    assert_eq!(result.snapshots[0].description, "pre-execution");

    let impact = result.impact.expect("impact summary");
    assert_eq!(impact.primary, 1);
    assert_eq!(impact.deployment, 0);
    if impact.total_files <= 5 {
        assert_eq!(impact.risk_level, RiskLevel::Low);
    }

    assert!(generator.requests().is_empty());
    assert_eq!(repo.current_branch(), "main");
    assert_eq!(repo.read("src/auth/login.ts").as_deref(), Some("export function login() {}\n"));
}

#[tokio::test]
async fn test_destructive_script_aborts_before_any_change() {
    let repo = RepositoryFixture::with_files(&[
        ("scripts/reset.sh", "#!/bin/sh\nrm -rf /\n"),
        ("src/app.ts", "export const app = 1;\n"),
    ]);
    let executor = Arc::new(ScriptedExecutor::new().passthrough("git"));
    let generator = Arc::new(ScriptedGenerator::new());
    let orchestrator = orchestrator(&repo, PatchwrightConfig::default(), executor, generator.clone());

    let result = orchestrator
        .orchestrate(
            "update the reset script",
            &OrchestrationOptions {
                explicit_files: vec!["scripts/reset.sh".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.phase, OrchestrationPhase::PreValidation);
    assert_eq!(result.branch_status, Some(BranchStatus::Failed));
    assert!(result.blocking_error_count() >= 1);
    assert!(result.snapshots.is_empty());
    assert!(!result.next_steps.is_empty());
    assert!(generator.requests().is_empty());
    assert_eq!(repo.current_branch(), "main");
}

#[tokio::test]
async fn test_missing_import_is_fixed_during_integration() {
    let repo = RepositoryFixture::with_files(&[
        ("src/a.ts", "export const a = 1;\n"),
        ("src/util.ts", "export const z = 41;\n"),
    ]);
    let executor = Arc::new(
        ScriptedExecutor::new()
            .passthrough("git")
            .fail("tsc", "src/a.ts(1,18): error TS2304: Cannot find name 'z'.\n", "")
            .succeed("tsc", ""),
    );
    let generator = Arc::new(ScriptedGenerator::new().with_content("src/a.ts", "export const a = z + 1;\n"));
    let mut config = PatchwrightConfig::default();
    config.commands.build = Some(vec!["tsc".to_string(), "--noEmit".to_string()]);
    let orchestrator = orchestrator(&repo, config, executor.clone(), generator);

    let result = orchestrator
        .orchestrate(
            "update a to use z from util",
            &OrchestrationOptions {
                skip_gates: true,
                explicit_files: vec!["src/a.ts".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(result.success, "{}", result.message);
    assert_eq!(result.phase, OrchestrationPhase::Completed);
    assert_eq!(result.completed_tasks, vec!["src/a.ts".to_string()]);
    assert_eq!(result.branch_status, Some(BranchStatus::Merged));

    let integration = result.integration_result.expect("integration result");
    assert!(integration.compilation_fixed);
    assert!(integration.branch_merged);
    assert!(integration.next_snapshot_ready);
    assert_eq!(integration.fixes_applied.len(), 1);
    assert!(integration.fixes_applied[0].contains("'z'"));
    assert_eq!(executor.invocations(), vec!["tsc --noEmit", "tsc --noEmit"]);

    assert_eq!(repo.current_branch(), "main");
    let merged = repo.read("src/a.ts").unwrap();
    assert!(merged.contains("import { z } from './util';"), "{merged}");
    assert!(merged.contains("export const a = z + 1;"));
    assert_eq!(repo.git(&["status", "--porcelain"]), "");
    assert!(repo.git(&["log", "-1", "--format=%B"]).contains("Auto-fixes applied:"));
}

#[tokio::test]
async fn test_failed_task_keeps_branch_unmerged() {
    let repo = RepositoryFixture::with_files(&[
        ("src/a.ts", "export const a = 1;\n"),
        ("src/b.ts", "export const b = 1;\n"),
    ]);
    let executor = Arc::new(ScriptedExecutor::new().passthrough("git"));
    let generator = Arc::new(
        ScriptedGenerator::new()
            .with_content("src/a.ts", "export const a = 2;\n")
            .fail_for("src/b.ts"),
    );
    let orchestrator = orchestrator(&repo, PatchwrightConfig::default(), executor, generator);

    let result = orchestrator
        .orchestrate(
            "update a and b",
            &OrchestrationOptions {
                skip_gates: true,
                explicit_files: vec!["src/a.ts".to_string(), "src/b.ts".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.completed_tasks, vec!["src/a.ts".to_string()]);
    assert_eq!(result.failed_tasks.len(), 1);
    assert_eq!(result.failed_tasks[0].path, "src/b.ts");
    assert_eq!(result.branch_status, Some(BranchStatus::Completed));

    let integration = result.integration_result.expect("integration result");
    assert!(integration.changes_committed);
    assert!(!integration.branch_merged);
    let branch = result.branch_name.unwrap();
    assert!(result.next_steps.iter().any(|step| step.contains(&format!("Manually merge {branch}"))));
    assert!(result.next_steps.iter().any(|step| step.contains("src/b.ts")));

    // The parent never saw the change
    repo.git(&["checkout", "--quiet", "main"]);
    assert_eq!(repo.read("src/a.ts").as_deref(), Some("export const a = 1;\n"));
}

#[tokio::test]
async fn test_cancelled_run_is_abandoned() {
    let repo = RepositoryFixture::with_files(&[("src/a.ts", "export const a = 1;\n")]);
    let executor = Arc::new(ScriptedExecutor::new().passthrough("git"));
    let generator = Arc::new(ScriptedGenerator::new());
    let cancel = patchwright::CancellationToken::new();
    let orchestrator =
        orchestrator(&repo, PatchwrightConfig::default(), executor, generator.clone()).with_cancellation(cancel.clone());
    cancel.cancel();

    let result = orchestrator
        .orchestrate(
            "update a",
            &OrchestrationOptions {
                explicit_files: vec!["src/a.ts".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.branch_name.is_none());
    assert!(generator.requests().is_empty());
    assert_eq!(repo.current_branch(), "main");
}

#[tokio::test]
async fn test_force_continues_past_failed_pre_validation() {
    let repo = RepositoryFixture::with_files(&[
        ("scripts/reset.sh", "#!/bin/sh\nrm -rf /\n"),
        ("src/app.ts", "export const app = 1;\n"),
    ]);
    let executor = Arc::new(ScriptedExecutor::new().passthrough("git"));
    let generator =
        Arc::new(ScriptedGenerator::new().with_content("scripts/reset.sh", "#!/bin/sh\nrm -rf ./build\n"));
    let orchestrator = orchestrator(&repo, PatchwrightConfig::default(), executor, generator.clone());

    let result = orchestrator
        .orchestrate(
            "update the reset script",
            &OrchestrationOptions {
                force: true,
                explicit_files: vec!["scripts/reset.sh".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(result.success, "{}", result.message);
    assert_eq!(result.validation_results.len(), 2);
    assert!(!result.validation_results[0].passed());
    assert!(result.validation_results[1].passed());
    assert!(!result.snapshots[0].validation_passed);
    assert_eq!(generator.requests().len(), 1);
    assert_eq!(result.branch_status, Some(BranchStatus::Merged));
    assert_eq!(repo.read("scripts/reset.sh").as_deref(), Some("#!/bin/sh\nrm -rf ./build\n"));
}

#[tokio::test]
async fn test_auto_rollback_after_failed_post_validation() {
    let repo = RepositoryFixture::with_files(&[("src/app.ts", "export const app = 1;\n")]);
    let executor = Arc::new(ScriptedExecutor::new().passthrough("git"));
    let generator = Arc::new(
        ScriptedGenerator::new().with_content("src/app.ts", "export const wipe = 'rm -rf /';\n"),
    );
    let orchestrator = orchestrator(&repo, PatchwrightConfig::default(), executor, generator);

    let result = orchestrator
        .orchestrate(
            "update app cleanup",
            &OrchestrationOptions {
                auto_rollback: true,
                explicit_files: vec!["src/app.ts".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.rollback_performed);
    assert_eq!(result.phase, OrchestrationPhase::Rollback);
    assert_eq!(result.branch_status, Some(BranchStatus::Failed));
    assert!(result.integration_result.is_none());
    let rollback = result.rollback.expect("rollback result");
    assert_eq!(rollback.strategy, "complete");
    let backup = rollback.backup_branch.expect("backup branch");
    assert_eq!(
        repo.git(&["show", &format!("{backup}:src/app.ts")]),
        "export const wipe = 'rm -rf /';"
    );

    let branch = result.branch_name.unwrap();
    assert_eq!(repo.git(&["show", &format!("{branch}:src/app.ts")]), "export const app = 1;");
    assert_eq!(repo.current_branch(), "main");
    assert_eq!(repo.read("src/app.ts").as_deref(), Some("export const app = 1;\n"));
}

#[tokio::test]
async fn test_persisted_index_stays_out_of_history() {
    let repo = RepositoryFixture::with_files(&[("src/a.ts", "export const a = 1;\n")]);
    let config = PatchwrightConfig::default();
    let indexes = IndexRegistry::from_config(repo.path(), &config.index);
    let executor = Arc::new(ScriptedExecutor::new().passthrough("git"));
    let orchestrator = Orchestrator::new(
        repo.path(),
        "demo",
        config,
        executor,
        indexes,
        Arc::new(ScriptedGenerator::new()),
    );
    let options = OrchestrationOptions {
        skip_gates: true,
        explicit_files: vec!["src/a.ts".to_string()],
        ..Default::default()
    };

    let first = orchestrator.orchestrate("fix a", &options).await.unwrap();
    assert!(first.success, "{}", first.message);
    assert!(first.integration_result.as_ref().unwrap().indexes_refreshed >= 1);
    assert!(repo.path().join(".patchwright/index/code.json").is_file());

    assert_eq!(repo.current_branch(), "main");
    assert!(!repo.git(&["ls-files"]).contains(".patchwright"));
    assert_eq!(repo.git(&["status", "--porcelain"]), "");

    // A clean tree lets the next run branch again
    let second = orchestrator.orchestrate("fix a again", &options).await.unwrap();
    assert!(second.success, "{}", second.message);
    assert!(!repo.git(&["ls-files"]).contains(".patchwright"));
}
