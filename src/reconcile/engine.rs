use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use super::detect::{detect_discrepancies, live_watermark, plan_actions};
use super::scanner::{scan_tree, TreeState};
use super::types::{
    ActionKind, DetailAction, PlannedAction, ReconcileError, ReconcileRequest, ReconcileScope,
    ReconciliationResult,
};
use crate::config::ReconciliationConfig;
use crate::index::{IndexCollaborator, IndexRegistry};
use crate::observability::{pipeline_metrics, OperationTimer};
use crate::telemetry::{create_reconciliation_span, generate_correlation_id};

/// Brings registered indexes back in line with the live tree
pub struct Reconciler {
    indexes: IndexRegistry,
    config: ReconciliationConfig,
}

impl Reconciler {
    pub fn new(indexes: IndexRegistry, config: ReconciliationConfig) -> Self {
        Self { indexes, config }
    }

    pub async fn reconcile(&self, request: &ReconcileRequest) -> Result<ReconciliationResult, ReconcileError> {
        let span = create_reconciliation_span(
            &generate_correlation_id(),
            &request.project_id,
            &request.scope.to_string(),
        );
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: &ReconcileRequest) -> Result<ReconciliationResult, ReconcileError> {
        if !request.project_path.is_dir() {
            return Err(ReconcileError::ProjectNotFound {
                path: request.project_path.display().to_string(),
            });
        }
        if request.scope == ReconcileScope::Selective && request.target_indexes.is_empty() {
            return Err(ReconcileError::SelectiveWithoutTargets);
        }
        let targets = self.indexes.select(&request.target_indexes);
        if targets.is_empty() {
            return Err(ReconcileError::NoIndexes);
        }

        let timer = OperationTimer::new("reconciliation");
        let ignored = crate::fs::build_globset(&self.config.ignore_patterns);
        let tree = scan_tree(&request.project_path, &ignored, self.config.max_file_bytes);
        let cutoff = match request.since {
            Some(since) => since,
            None => {
                let hours = self.config.default_window_hours;
                (hours >= 0)
                    .then(|| ChronoDuration::try_hours(hours))
                    .flatten()
                    .and_then(|window| Utc::now().checked_sub_signed(window))
                    .ok_or(ReconcileError::InvalidWindow { hours })?
            }
        };

        let mut result = ReconciliationResult {
            files_scanned: tree.scanned(),
            dry_run: request.dry_run,
            ..Default::default()
        };
        info!(
            files = result.files_scanned,
            indexes = targets.len(),
            scope = %request.scope,
            dry_run = request.dry_run,
            "Reconciliation started"
        );

        for index in &targets {
            let name = index.name().to_string();
            let records = match index.list_records(&request.project_id).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(index = %name, error = %e, "Could not read index state");
                    result.push(&name, DetailAction::Error, &name, format!("could not read index: {e}"));
                    continue;
                }
            };
            let last_updated = live_watermark(&tree, &records);
            result.indexes_processed += 1;

            let discrepancies = detect_discrepancies(&name, &tree, &records, last_updated, request.scope, cutoff);
            result.discrepancies += discrepancies.len();
            let actions = plan_actions(&name, &discrepancies, &tree, &records);
            debug!(index = %name, discrepancies = discrepancies.len(), actions = actions.len(), "Index compared");

            for action in &actions {
                if request.dry_run {
                    result.push(&name, DetailAction::Skipped, target_of(action), format!("would {}", action.kind.describe()));
                } else {
                    apply(index, &request.project_id, &tree, request, action, &mut result).await;
                }
            }
        }

        pipeline_metrics().record_reconciliation_updates(result.updates_applied);
        info!(
            discrepancies = result.discrepancies,
            updates = result.updates_applied,
            errors = result.errors_encountered,
            duration_ms = timer.finish(),
            "Reconciliation finished"
        );
        Ok(result)
    }
}

fn target_of(action: &PlannedAction) -> String {
    match &action.kind {
        ActionKind::Reanalyze { file_path, .. } | ActionKind::Delete { file_path } => file_path.clone(),
        ActionKind::BulkReanalyze { .. } => action.index.clone(),
    }
}

/// Apply one action; failures become error details
async fn apply(
    index: &Arc<dyn IndexCollaborator>,
    project_id: &str,
    tree: &TreeState,
    request: &ReconcileRequest,
    action: &PlannedAction,
    result: &mut ReconciliationResult,
) {
    let name = index.name();
    match &action.kind {
        ActionKind::Reanalyze { file_path, existing } => {
            let done = if *existing { DetailAction::Updated } else { DetailAction::Created };
            reanalyze(index, project_id, request, file_path, done, &action.reason, result).await;
        }
        ActionKind::Delete { file_path } => match index.delete_record(project_id, file_path).await {
            Ok(()) => result.push(name, DetailAction::Deleted, file_path.as_str(), action.reason.as_str()),
            Err(e) => {
                warn!(index = %name, file = %file_path, error = %e, "Delete failed");
                result.push(name, DetailAction::Error, file_path.as_str(), e.to_string());
            }
        },
        ActionKind::BulkReanalyze { files } => {
            for file_path in files.iter().filter(|path| tree.files.contains_key(*path)) {
                reanalyze(index, project_id, request, file_path, DetailAction::Updated, &action.reason, result).await;
            }
        }
    }
}

async fn reanalyze(
    index: &Arc<dyn IndexCollaborator>,
    project_id: &str,
    request: &ReconcileRequest,
    file_path: &str,
    done: DetailAction,
    reason: &str,
    result: &mut ReconciliationResult,
) {
    let name = index.name();
    let content = match tokio::fs::read_to_string(request.project_path.join(file_path)).await {
        Ok(content) => content,
        Err(e) => {
            result.push(name, DetailAction::Error, file_path, format!("could not read file: {e}"));
            return;
        }
    };
    match index.upsert_record(project_id, file_path, &content).await {
        Ok(_) => result.push(name, done, file_path, reason),
        Err(e) => {
            warn!(index = %name, file = %file_path, error = %e, "Upsert failed");
            result.push(name, DetailAction::Error, file_path, e.to_string());
        }
    }
}
