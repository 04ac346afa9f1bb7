use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

use super::scanner::TreeState;
use super::types::{ActionKind, Discrepancy, DiscrepancyKind, PlannedAction, ReconcileScope};
use crate::index::IndexRecord;

/// Compare one index's records with the live tree
pub fn detect_discrepancies(
    index: &str,
    tree: &TreeState,
    records: &[IndexRecord],
    last_updated: Option<DateTime<Utc>>,
    scope: ReconcileScope,
    cutoff: DateTime<Utc>,
) -> Vec<Discrepancy> {
    let by_path: HashMap<&str, &IndexRecord> = records
        .iter()
        .map(|record| (record.file_path.as_str(), record))
        .collect();
    let mut found = Vec::new();

    for (path, checksum) in &tree.files {
        match by_path.get(path.as_str()) {
            None => found.push(Discrepancy {
                index: index.to_string(),
                kind: DiscrepancyKind::Missing,
                file_path: Some(path.clone()),
                reason: "file has no index record".to_string(),
            }),
            Some(record) if scope.checks_staleness() && record.content_hash != checksum.hash => {
                found.push(Discrepancy {
                    index: index.to_string(),
                    kind: DiscrepancyKind::Outdated,
                    file_path: Some(path.clone()),
                    reason: "file content changed since it was indexed".to_string(),
                })
            }
            Some(_) => {}
        }
    }

    for record in records {
        if !tree.exists(&record.file_path) {
            found.push(Discrepancy {
                index: index.to_string(),
                kind: DiscrepancyKind::Orphaned,
                file_path: Some(record.file_path.clone()),
                reason: "indexed file no longer exists".to_string(),
            });
        }
    }

    if scope.checks_staleness() {
        if let Some(last_updated) = last_updated.filter(|at| *at < cutoff) {
            found.push(Discrepancy {
                index: index.to_string(),
                kind: DiscrepancyKind::Outdated,
                file_path: None,
                reason: format!(
                    "last updated {} which is before the cutoff {}",
                    last_updated.to_rfc3339(),
                    cutoff.to_rfc3339()
                ),
            });
        }
    }
    found
}

/// Newest update among records whose files can still be indexed
pub fn live_watermark(tree: &TreeState, records: &[IndexRecord]) -> Option<DateTime<Utc>> {
    records
        .iter()
        .filter(|record| tree.files.contains_key(&record.file_path))
        .map(|record| record.updated_at)
        .max()
}

/// Corrective actions for the discrepancies of one index
pub fn plan_actions(index: &str, discrepancies: &[Discrepancy], tree: &TreeState, records: &[IndexRecord]) -> Vec<PlannedAction> {
    let mut actions = Vec::new();
    let mut covered: BTreeSet<&str> = BTreeSet::new();
    let mut bulk_reason = None;

    for discrepancy in discrepancies {
        let kind = match (&discrepancy.kind, &discrepancy.file_path) {
            (DiscrepancyKind::Missing, Some(file)) => ActionKind::Reanalyze {
                file_path: file.clone(),
                existing: false,
            },
            (DiscrepancyKind::Outdated, Some(file)) => ActionKind::Reanalyze {
                file_path: file.clone(),
                existing: true,
            },
            (DiscrepancyKind::Orphaned, Some(file)) => ActionKind::Delete {
                file_path: file.clone(),
            },
            (DiscrepancyKind::Outdated, None) => {
                bulk_reanalyze_reason(&mut bulk_reason, &discrepancy.reason);
                continue;
            }
            (_, None) => continue,
        };
        if let Some(file) = &discrepancy.file_path {
            covered.insert(file.as_str());
        }
        actions.push(PlannedAction {
            index: index.to_string(),
            kind,
            reason: discrepancy.reason.clone(),
        });
    }

    if let Some(reason) = bulk_reason {
        let files: Vec<String> = records
            .iter()
            .map(|record| record.file_path.as_str())
            .filter(|path| tree.files.contains_key(*path) && !covered.contains(path))
            .map(str::to_string)
            .collect();
        if !files.is_empty() {
            actions.push(PlannedAction {
                index: index.to_string(),
                kind: ActionKind::BulkReanalyze { files },
                reason,
            });
        }
    }
    actions
}

fn bulk_reanalyze_reason(slot: &mut Option<String>, reason: &str) {
    if slot.is_none() {
        *slot = Some(format!("index outdated: {reason}"));
    }
}
