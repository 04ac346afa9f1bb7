use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::lifecycle::{BranchEvent, BranchStatus, LifecycleMachine};
use crate::external::GitError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BranchError {
    #[error("Working tree has uncommitted changes: {}", files.join(", "))]
    DirtyWorkingTree { files: Vec<String> },
    #[error("Git operation failed: {0}")]
    Git(#[from] GitError),
    #[error("Snapshot '{target}' not found on branch {branch}")]
    SnapshotNotFound { branch: String, target: String },
    #[error("Snapshot commit {commit} is not present in repository history")]
    SnapshotVerification { commit: String },
    #[error("Repository inspection failed: {message}")]
    Inspect { message: String },
    #[error("Branch age of {days} days is out of range")]
    InvalidAge { days: i64 },
}

/// A checkpoint on a feature branch, addressable through its ref
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSnapshot {
    pub branch_name: String,
    pub commit_id: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub validation_passed: bool,
    pub files: Vec<String>,
    pub snapshot_ref: String,
}

/// The isolated unit of work for one request
#[derive(Debug)]
pub struct FeatureBranch {
    pub name: String,
    pub request_text: String,
    pub created_at: DateTime<Utc>,
    pub parent_branch: String,
    /// Tip of the parent branch when this branch was created
    pub base_commit: String,
    pub snapshots: Vec<BranchSnapshot>,
    lifecycle: LifecycleMachine,
}

impl FeatureBranch {
    pub fn new(
        name: String,
        request_text: String,
        parent_branch: String,
        base_commit: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        let lifecycle = LifecycleMachine::new(name.clone());
        Self {
            name,
            request_text,
            created_at,
            parent_branch,
            base_commit,
            snapshots: Vec::new(),
            lifecycle,
        }
    }

    pub fn status(&self) -> BranchStatus {
        self.lifecycle.status()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.lifecycle.failure_reason()
    }

    pub fn transition(&mut self, event: BranchEvent) -> BranchStatus {
        self.lifecycle.handle(event)
    }

    pub fn last_snapshot(&self) -> Option<&BranchSnapshot> {
        self.snapshots.last()
    }

    /// Commit of the latest snapshot, or the base commit when none exist
    pub fn latest_commit(&self) -> &str {
        self.last_snapshot()
            .map(|snapshot| snapshot.commit_id.as_str())
            .unwrap_or(&self.base_commit)
    }

    pub fn find_snapshot(&self, target: &str) -> Option<usize> {
        self.snapshots.iter().rposition(|snapshot| {
            snapshot.commit_id == target
                || snapshot.snapshot_ref == target
                || snapshot.description == target
                || (target.len() >= 7 && snapshot.commit_id.starts_with(target))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RollbackStrategy {
    /// Reset to the parent's tip at branch creation
    Complete,
    /// Reset to a named snapshot
    Partial { target_snapshot: String },
    /// Reset to the parent's tip, then restore only these paths from the final state
    Selective { files_to_keep: Vec<String> },
}

impl RollbackStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            RollbackStrategy::Complete => "complete",
            RollbackStrategy::Partial { .. } => "partial",
            RollbackStrategy::Selective { .. } => "selective",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackOptions {
    pub strategy: RollbackStrategy,
    pub create_backup_branch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackResult {
    pub success: bool,
    pub strategy: String,
    pub restored_commit: Option<String>,
    pub backup_branch: Option<String>,
    pub files_kept: Vec<String>,
    pub snapshots_discarded: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub success: bool,
    pub message: String,
    pub merge_commit: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CherryPickReport {
    /// (original commit, new commit on target)
    pub applied: Vec<(String, String)>,
    pub conflicted: Vec<String>,
}

impl CherryPickReport {
    pub fn success(&self) -> bool {
        self.conflicted.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    pub kept: Vec<String>,
    pub errors: Vec<String>,
}
