//! Snapshot and rollback behavior against real git repositories

mod fixtures;

use fixtures::repository::RepositoryFixture;
use patchwright::branching::{BranchError, BranchStatus, RollbackOptions, RollbackStrategy};

fn base_repo() -> RepositoryFixture {
    RepositoryFixture::with_files(&[
        ("src/a.ts", "export const a = 1;\n"),
        ("src/b.ts", "export const b = 1;\n"),
        ("README.md", "# demo\n"),
    ])
}

#[tokio::test]
async fn test_complete_rollback_restores_the_base_tree() {
    let repo = base_repo();
    let baseline = repo.tree_state();
    let manager = repo.branch_manager();

    let mut branch = manager.create_feature_branch("update a and b").await.unwrap();
    assert_eq!(repo.current_branch(), branch.name);
    manager.create_snapshot(&mut branch, "pre-execution", true, &[]).await.unwrap();

    repo.write("src/a.ts", "export const a = 2;\n");
    repo.write("src/new.ts", "export const n = 0;\n");
    manager.create_snapshot(&mut branch, "after src/a.ts", false, &[]).await.unwrap();
    assert_eq!(branch.snapshots.len(), 2);

    let result = manager
        .perform_rollback(
            &mut branch,
            &RollbackOptions {
                strategy: RollbackStrategy::Complete,
                create_backup_branch: true,
            },
        )
        .await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.snapshots_discarded, 2);
    assert!(branch.snapshots.is_empty());
    assert_eq!(repo.tree_state(), baseline);

    let backup = result.backup_branch.expect("backup branch");
    let backup_content = repo.git(&["show", &format!("{backup}:src/a.ts")]);
    assert_eq!(backup_content, "export const a = 2;");
}

#[tokio::test]
async fn test_selective_rollback_keeps_only_listed_files() {
    let repo = base_repo();
    let manager = repo.branch_manager();
    let mut branch = manager.create_feature_branch("touch both files").await.unwrap();

    repo.write("src/a.ts", "export const a = 2;\n");
    repo.write("src/b.ts", "export const b = 2;\n");
    manager.create_snapshot(&mut branch, "after edits", true, &[]).await.unwrap();

    let result = manager
        .perform_rollback(
            &mut branch,
            &RollbackOptions {
                strategy: RollbackStrategy::Selective {
                    files_to_keep: vec!["src/a.ts".to_string()],
                },
                create_backup_branch: false,
            },
        )
        .await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.files_kept, vec!["src/a.ts".to_string()]);
    assert!(result.backup_branch.is_none());
    assert_eq!(repo.read("src/a.ts").as_deref(), Some("export const a = 2;\n"));
    assert_eq!(repo.read("src/b.ts").as_deref(), Some("export const b = 1;\n"));
    assert_eq!(repo.git(&["status", "--porcelain"]), "");
}

#[tokio::test]
async fn test_selective_rollback_keeps_a_deletion() {
    let repo = base_repo();
    let manager = repo.branch_manager();
    let mut branch = manager.create_feature_branch("remove b").await.unwrap();

    std::fs::remove_file(repo.path().join("src/b.ts")).unwrap();
    repo.write("src/a.ts", "export const a = 3;\n");
    manager.create_snapshot(&mut branch, "after removal", true, &[]).await.unwrap();

    let result = manager
        .perform_rollback(
            &mut branch,
            &RollbackOptions {
                strategy: RollbackStrategy::Selective {
                    files_to_keep: vec!["src/b.ts".to_string()],
                },
                create_backup_branch: false,
            },
        )
        .await;

    assert!(result.success, "{}", result.message);
    assert!(repo.read("src/b.ts").is_none());
    assert_eq!(repo.read("src/a.ts").as_deref(), Some("export const a = 1;\n"));
}

#[tokio::test]
async fn test_partial_rollback_to_named_snapshot() {
    let repo = base_repo();
    let manager = repo.branch_manager();
    let mut branch = manager.create_feature_branch("three steps").await.unwrap();

    repo.write("src/a.ts", "export const a = 2;\n");
    let first = manager.create_snapshot(&mut branch, "step one", true, &[]).await.unwrap();
    assert_eq!(first.files, vec!["src/a.ts".to_string()]);
    repo.write("src/b.ts", "export const b = 2;\n");
    manager.create_snapshot(&mut branch, "step two", true, &[]).await.unwrap();
    repo.write("src/a.ts", "export const a = 3;\n");
    manager.create_snapshot(&mut branch, "step three", true, &[]).await.unwrap();

    let result = manager
        .perform_rollback(
            &mut branch,
            &RollbackOptions {
                strategy: RollbackStrategy::Partial {
                    target_snapshot: "step one".to_string(),
                },
                create_backup_branch: false,
            },
        )
        .await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.restored_commit.as_deref(), Some(first.commit_id.as_str()));
    assert_eq!(result.snapshots_discarded, 2);
    assert_eq!(branch.snapshots.len(), 1);
    assert_eq!(repo.read("src/a.ts").as_deref(), Some("export const a = 2;\n"));
    assert_eq!(repo.read("src/b.ts").as_deref(), Some("export const b = 1;\n"));
}

#[tokio::test]
async fn test_partial_rollback_to_unknown_snapshot_changes_nothing() {
    let repo = base_repo();
    let manager = repo.branch_manager();
    let mut branch = manager.create_feature_branch("one step").await.unwrap();
    repo.write("src/a.ts", "export const a = 2;\n");
    manager.create_snapshot(&mut branch, "step one", true, &[]).await.unwrap();
    let before = repo.tree_state();

    let result = manager
        .perform_rollback(
            &mut branch,
            &RollbackOptions {
                strategy: RollbackStrategy::Partial {
                    target_snapshot: "no such snapshot".to_string(),
                },
                create_backup_branch: true,
            },
        )
        .await;

    assert!(!result.success);
    assert!(result.backup_branch.is_none());
    assert_eq!(branch.snapshots.len(), 1);
    assert_eq!(repo.tree_state(), before);
}

#[tokio::test]
async fn test_snapshots_are_recovered_from_refs() {
    let repo = base_repo();
    let manager = repo.branch_manager();
    let mut branch = manager.create_feature_branch("recoverable work").await.unwrap();

    manager.create_snapshot(&mut branch, "pre-execution", true, &[]).await.unwrap();
    repo.write("src/a.ts", "export const a = 2;\n");
    manager
        .create_snapshot(&mut branch, "after src/a.ts", false, &["src/a.ts".to_string()])
        .await
        .unwrap();

    let loaded = manager.load_snapshots(&branch.name).await.unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].description, "pre-execution");
    assert!(loaded[0].validation_passed);
    assert_eq!(loaded[1].description, "after src/a.ts");
    assert!(!loaded[1].validation_passed);
    assert_eq!(loaded[1].files, vec!["src/a.ts".to_string()]);
    assert_eq!(loaded[1].commit_id, branch.snapshots[1].commit_id);
    assert!(loaded[0].timestamp < loaded[1].timestamp);
}

#[tokio::test]
async fn test_dirty_tree_blocks_branch_creation() {
    let repo = base_repo();
    repo.write("src/a.ts", "uncommitted\n");
    let manager = repo.branch_manager();

    let err = manager.create_feature_branch("anything").await.unwrap_err();
    assert!(err.to_string().contains("src/a.ts"));
    assert_eq!(repo.current_branch(), "main");
}

#[tokio::test]
async fn test_squash_merge_lands_one_commit_on_parent() {
    let repo = base_repo();
    let manager = repo.branch_manager();
    let commits_before = repo.git(&["rev-list", "--count", "main"]);
    let mut branch = manager.create_feature_branch("add c").await.unwrap();

    repo.write("src/c.ts", "export const c = 1;\n");
    manager.create_snapshot(&mut branch, "step one", true, &[]).await.unwrap();
    repo.write("src/c.ts", "export const c = 2;\n");
    manager.create_snapshot(&mut branch, "step two", true, &[]).await.unwrap();

    let outcome = manager
        .merge_feature_branch(&mut branch, true, Some("feat: add c"))
        .await;

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(branch.status(), BranchStatus::Merged);
    assert_eq!(repo.current_branch(), "main");
    let commits_after: u32 = repo.git(&["rev-list", "--count", "main"]).parse().unwrap();
    assert_eq!(commits_after, commits_before.parse::<u32>().unwrap() + 1);
    assert_eq!(repo.git(&["log", "-1", "--format=%s"]), "feat: add c");
    assert_eq!(repo.read("src/c.ts").as_deref(), Some("export const c = 2;\n"));
}

#[tokio::test]
async fn test_conflicting_squash_merge_leaves_parent_clean() {
    let repo = base_repo();
    let manager = repo.branch_manager();
    let mut branch = manager.create_feature_branch("change a").await.unwrap();
    repo.write("src/a.ts", "export const a = 2;\n");
    manager.create_snapshot(&mut branch, "after src/a.ts", true, &[]).await.unwrap();

    repo.git(&["checkout", "--quiet", "main"]);
    repo.write("src/a.ts", "export const a = 3;\n");
    repo.commit_all("concurrent change");
    repo.git(&["checkout", "--quiet", &branch.name]);

    let outcome = manager.merge_feature_branch(&mut branch, true, None).await;

    assert!(!outcome.success);
    assert_eq!(branch.status(), BranchStatus::Active);
    assert_eq!(repo.current_branch(), branch.name);
    assert_eq!(repo.git(&["status", "--porcelain"]), "");
    assert_eq!(repo.git(&["show", "main:src/a.ts"]), "export const a = 3;");
}

#[tokio::test]
async fn test_cherry_pick_skips_conflicting_commits() {
    let repo = base_repo();
    let manager = repo.branch_manager();

    repo.git(&["checkout", "--quiet", "-b", "feature"]);
    repo.write("src/a.ts", "export const a = 2;\n");
    repo.commit_all("change a");
    let conflicting = repo.git(&["rev-parse", "HEAD"]);
    repo.write("src/c.ts", "export const c = 1;\n");
    repo.commit_all("add c");
    let clean = repo.git(&["rev-parse", "HEAD"]);

    repo.git(&["checkout", "--quiet", "main"]);
    repo.write("src/a.ts", "export const a = 3;\n");
    repo.commit_all("diverge a");
    repo.git(&["checkout", "--quiet", "feature"]);

    let report = manager
        .cherry_pick_changes("feature", "main", &[conflicting.clone(), clean.clone()])
        .await
        .unwrap();

    assert_eq!(report.conflicted, vec![conflicting]);
    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].0, clean);
    assert_eq!(repo.git(&["rev-parse", "main"]), report.applied[0].1);

    assert_eq!(repo.current_branch(), "feature");
    assert_eq!(repo.git(&["status", "--porcelain"]), "");
    assert_eq!(repo.git(&["show", "main:src/c.ts"]), "export const c = 1;");
    assert_eq!(repo.git(&["show", "main:src/a.ts"]), "export const a = 3;");
}

#[tokio::test]
async fn test_cleanup_respects_age_and_merged_branches() {
    let repo = base_repo();
    let manager = repo.branch_manager();

    repo.git(&["branch", "patchwright/merged-work"]);
    repo.git(&["checkout", "--quiet", "-b", "patchwright/open-work"]);
    repo.write("src/d.ts", "export const d = 1;\n");
    repo.commit_all("open work");
    repo.git(&["checkout", "--quiet", "main"]);
    repo.git(&["branch", "unrelated"]);

    let recent = manager.cleanup_branches(7, false).await.unwrap();
    assert!(recent.deleted.is_empty());
    assert_eq!(recent.kept.len(), 2);

    let report = manager.cleanup_branches(0, true).await.unwrap();
    assert_eq!(report.deleted, vec!["patchwright/open-work".to_string()]);
    assert_eq!(report.kept, vec!["patchwright/merged-work".to_string()]);
    assert!(report.errors.is_empty());

    let remaining = repo.git(&["branch", "--format=%(refname:short)"]);
    assert!(remaining.contains("patchwright/merged-work"));
    assert!(remaining.contains("unrelated"));
    assert!(!remaining.contains("patchwright/open-work"));

    assert!(matches!(
        manager.cleanup_branches(-1, false).await,
        Err(BranchError::InvalidAge { days: -1 })
    ));
}
