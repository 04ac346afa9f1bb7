use serde::{Deserialize, Serialize};
use std::fmt;

/// Integration phases in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationPhase {
    Compilation,
    Testing,
    Commit,
    Documentation,
    Merge,
    Cleanup,
}

impl fmt::Display for IntegrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IntegrationPhase::Compilation => "compilation",
            IntegrationPhase::Testing => "testing",
            IntegrationPhase::Commit => "commit",
            IntegrationPhase::Documentation => "documentation",
            IntegrationPhase::Merge => "merge",
            IntegrationPhase::Cleanup => "cleanup",
        };
        write!(f, "{label}")
    }
}

/// What integration achieved. `phase` is the last phase attempted, so a
/// partially integrated run can be told apart from a complete one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationResult {
    pub success: bool,
    pub phase: IntegrationPhase,
    pub compilation_fixed: bool,
    pub tests_fixed: bool,
    pub tests_passing: bool,
    pub changes_committed: bool,
    pub commit_id: Option<String>,
    pub branch_merged: bool,
    pub documentation_updated: bool,
    pub config_updated: bool,
    pub deployment_updated: bool,
    pub indexes_refreshed: usize,
    pub next_snapshot_ready: bool,
    pub fixes_applied: Vec<String>,
    pub errors: Vec<String>,
}

impl Default for IntegrationResult {
    fn default() -> Self {
        Self {
            success: false,
            phase: IntegrationPhase::Compilation,
            compilation_fixed: false,
            tests_fixed: false,
            tests_passing: true,
            changes_committed: false,
            commit_id: None,
            branch_merged: false,
            documentation_updated: false,
            config_updated: false,
            deployment_updated: false,
            indexes_refreshed: 0,
            next_snapshot_ready: false,
            fixes_applied: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Per-run inputs to integration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationRequest {
    pub request_text: String,
    /// Merge into the parent when everything else succeeded
    pub allow_merge: bool,
    /// Outcome of the post-execution gate, shown in the commit badges
    pub validation_passed: bool,
}
