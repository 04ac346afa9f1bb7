//! Reconciliation against a persisted JSON index

use std::path::Path;
use std::sync::Arc;

use patchwright::config::ReconciliationConfig;
use patchwright::index::{IndexCollaborator, IndexRegistry, JsonFileIndex};
use patchwright::reconcile::{DetailAction, ReconcileRequest, ReconcileScope, Reconciler};

const PROJECT_ID: &str = "demo";

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    std::fs::write(full, content).unwrap();
}

fn request(project: &Path, dry_run: bool) -> ReconcileRequest {
    ReconcileRequest {
        project_path: project.to_path_buf(),
        project_id: PROJECT_ID.to_string(),
        scope: ReconcileScope::Full,
        target_indexes: Vec::new(),
        since: None,
        dry_run,
    }
}

struct Setup {
    project: tempfile::TempDir,
    _store: tempfile::TempDir,
    index: Arc<JsonFileIndex>,
    reconciler: Reconciler,
}

/// Three live files; the index knows a stale `a.ts` and a deleted `gone.ts`
async fn setup() -> Setup {
    let project = tempfile::tempdir().unwrap();
    write(project.path(), "src/a.ts", "export const a = 2;\n");
    write(project.path(), "src/b.ts", "import { a } from './a';\n");
    write(project.path(), "docs/guide.md", "# Guide\n");

    let store = tempfile::tempdir().unwrap();
    let index = Arc::new(JsonFileIndex::new("code", store.path().join("code.json")));
    index.upsert_record(PROJECT_ID, "src/a.ts", "export const a = 1;\n").await.unwrap();
    index.upsert_record(PROJECT_ID, "src/gone.ts", "export {};\n").await.unwrap();

    let registry = IndexRegistry::new().with(index.clone());
    let reconciler = Reconciler::new(registry, ReconciliationConfig::default());
    Setup {
        project,
        _store: store,
        index,
        reconciler,
    }
}

#[tokio::test]
async fn test_second_run_finds_nothing_to_do() {
    let setup = setup().await;

    let first = setup.reconciler.reconcile(&request(setup.project.path(), false)).await.unwrap();
    assert_eq!(first.indexes_processed, 1);
    assert_eq!(first.files_scanned, 3);
    assert_eq!(first.discrepancies, 4);
    assert_eq!(first.updates_applied, 4);
    assert_eq!(first.errors_encountered, 0);
    let deleted: Vec<&str> = first
        .details
        .iter()
        .filter(|detail| detail.action == DetailAction::Deleted)
        .map(|detail| detail.target.as_str())
        .collect();
    assert_eq!(deleted, vec!["src/gone.ts"]);

    let mut paths: Vec<String> = setup
        .index
        .list_records(PROJECT_ID)
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.file_path)
        .collect();
    paths.sort();
    assert_eq!(paths, vec!["docs/guide.md", "src/a.ts", "src/b.ts"]);

    let second = setup.reconciler.reconcile(&request(setup.project.path(), false)).await.unwrap();
    assert_eq!(second.discrepancies, 0);
    assert_eq!(second.updates_applied, 0);
    assert!(second.details.is_empty());
}

#[tokio::test]
async fn test_dry_run_leaves_the_store_untouched() {
    let setup = setup().await;
    let before = std::fs::read_to_string(setup.index.path()).unwrap();

    let result = setup.reconciler.reconcile(&request(setup.project.path(), true)).await.unwrap();
    assert!(result.dry_run);
    assert_eq!(result.discrepancies, 4);
    assert_eq!(result.updates_applied, 0);
    assert!(result
        .details
        .iter()
        .all(|detail| detail.action == DetailAction::Skipped && detail.reason.starts_with("would ")));
    assert_eq!(std::fs::read_to_string(setup.index.path()).unwrap(), before);
}

#[tokio::test]
async fn test_incremental_scope_ignores_stale_content() {
    let setup = setup().await;
    let mut incremental = request(setup.project.path(), false);
    incremental.scope = ReconcileScope::Incremental;

    let result = setup.reconciler.reconcile(&incremental).await.unwrap();
    // Missing b.ts and guide.md, orphaned gone.ts; a.ts's stale hash is not checked
    assert_eq!(result.discrepancies, 3);
    let a = setup
        .index
        .list_records(PROJECT_ID)
        .await
        .unwrap()
        .into_iter()
        .find(|record| record.file_path == "src/a.ts")
        .unwrap();
    assert_eq!(a.content, "export const a = 1;\n");
}
