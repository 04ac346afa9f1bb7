use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Unknown reconciliation scope '{0}' (expected full, incremental or selective)")]
    InvalidScope(String),
    #[error("Selective reconciliation needs at least one target index")]
    SelectiveWithoutTargets,
    #[error("No indexes are registered")]
    NoIndexes,
    #[error("Project path {path} is not a directory")]
    ProjectNotFound { path: String },
    #[error("Staleness window of {hours} hours is out of range")]
    InvalidWindow { hours: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileScope {
    /// Every discrepancy class, including outdated indexes and stale records
    Full,
    /// Missing and orphaned records only
    Incremental,
    /// Missing and orphaned records, restricted to the named indexes
    Selective,
}

impl ReconcileScope {
    pub fn checks_staleness(self) -> bool {
        self == ReconcileScope::Full
    }
}

impl fmt::Display for ReconcileScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReconcileScope::Full => "full",
            ReconcileScope::Incremental => "incremental",
            ReconcileScope::Selective => "selective",
        };
        write!(f, "{label}")
    }
}

impl FromStr for ReconcileScope {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(ReconcileScope::Full),
            "incremental" => Ok(ReconcileScope::Incremental),
            "selective" => Ok(ReconcileScope::Selective),
            other => Err(ReconcileError::InvalidScope(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub project_path: PathBuf,
    pub project_id: String,
    pub scope: ReconcileScope,
    /// Index names to reconcile; empty means every registered index
    pub target_indexes: Vec<String>,
    /// Outdated cutoff; defaults to the configured window before now
    pub since: Option<DateTime<Utc>>,
    pub dry_run: bool,
}

/// Content hash and stat metadata of one live file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChecksum {
    pub path: String,
    pub hash: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscrepancyKind {
    Missing,
    Orphaned,
    Outdated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub index: String,
    pub kind: DiscrepancyKind,
    /// The file concerned, or `None` when the whole index is outdated
    pub file_path: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Analyze a live file and write its record
    Reanalyze { file_path: String, existing: bool },
    /// Remove the record of a file that no longer exists
    Delete { file_path: String },
    /// Reanalyze every live file of an outdated index
    BulkReanalyze { files: Vec<String> },
}

impl ActionKind {
    pub fn describe(&self) -> String {
        match self {
            ActionKind::Reanalyze { file_path, .. } => format!("reanalyze {file_path}"),
            ActionKind::Delete { file_path } => format!("delete {file_path}"),
            ActionKind::BulkReanalyze { files } => format!("bulk reanalyze {} file(s)", files.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub index: String,
    pub kind: ActionKind,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailAction {
    Created,
    Updated,
    Deleted,
    Skipped,
    Error,
}

/// One audit-trail entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationDetail {
    pub index: String,
    pub action: DetailAction,
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub files_scanned: usize,
    pub indexes_processed: usize,
    pub discrepancies: usize,
    pub updates_applied: usize,
    pub errors_encountered: usize,
    pub details: Vec<ReconciliationDetail>,
    pub dry_run: bool,
}

impl ReconciliationResult {
    pub(crate) fn push(&mut self, index: &str, action: DetailAction, target: impl Into<String>, reason: impl Into<String>) {
        match action {
            DetailAction::Created | DetailAction::Updated | DetailAction::Deleted => self.updates_applied += 1,
            DetailAction::Error => self.errors_encountered += 1,
            DetailAction::Skipped => {}
        }
        self.details.push(ReconciliationDetail {
            index: index.to_string(),
            action,
            target: target.into(),
            reason: reason.into(),
        });
    }
}
