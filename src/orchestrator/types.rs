use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::branching::{BranchError, BranchSnapshot, BranchStatus, RollbackResult};
use crate::impact::RiskLevel;
use crate::integration::IntegrationResult;
use crate::validation::GateReport;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("Task dependencies form a cycle between: {}", files.join(", "))]
    CyclicDependencies { files: Vec<String> },
    #[error("Branch operation failed: {0}")]
    Branch(#[from] BranchError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationOptions {
    /// Skip both validation gates
    pub skip_gates: bool,
    /// Continue past a failed pre-validation
    pub force: bool,
    /// Stop after the pre-execution snapshot
    pub dry_run: bool,
    /// Roll back automatically when post-execution checks fail
    pub auto_rollback: bool,
    /// Files the caller names as the primary targets
    pub explicit_files: Vec<String>,
}

/// Last phase the run entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationPhase {
    ImpactAnalysis,
    BranchCreation,
    TaskConversion,
    PreValidation,
    PreSnapshot,
    TaskExecution,
    PostSnapshot,
    PostValidation,
    Rollback,
    Integration,
    Completed,
}

impl fmt::Display for OrchestrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OrchestrationPhase::ImpactAnalysis => "impact_analysis",
            OrchestrationPhase::BranchCreation => "branch_creation",
            OrchestrationPhase::TaskConversion => "task_conversion",
            OrchestrationPhase::PreValidation => "pre_validation",
            OrchestrationPhase::PreSnapshot => "pre_snapshot",
            OrchestrationPhase::TaskExecution => "task_execution",
            OrchestrationPhase::PostSnapshot => "post_snapshot",
            OrchestrationPhase::PostValidation => "post_validation",
            OrchestrationPhase::Rollback => "rollback",
            OrchestrationPhase::Integration => "integration",
            OrchestrationPhase::Completed => "completed",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactSummary {
    pub total_files: usize,
    pub primary: usize,
    pub cascading: usize,
    pub config: usize,
    pub documentation: usize,
    pub test: usize,
    pub deployment: usize,
    pub risk_level: RiskLevel,
    pub estimated_time: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub success: bool,
    pub correlation_id: String,
    pub branch_name: Option<String>,
    pub branch_status: Option<BranchStatus>,
    pub phase: OrchestrationPhase,
    pub impact: Option<ImpactSummary>,
    pub completed_tasks: Vec<String>,
    pub failed_tasks: Vec<TaskFailure>,
    pub validation_results: Vec<GateReport>,
    pub snapshots: Vec<BranchSnapshot>,
    pub rollback_performed: bool,
    pub rollback: Option<RollbackResult>,
    pub integration_result: Option<IntegrationResult>,
    pub message: String,
    pub estimated_time_actual: String,
    pub duration_ms: u64,
    pub next_steps: Vec<String>,
}

impl OrchestrationResult {
    pub(crate) fn new(correlation_id: String) -> Self {
        Self {
            success: false,
            correlation_id,
            branch_name: None,
            branch_status: None,
            phase: OrchestrationPhase::ImpactAnalysis,
            impact: None,
            completed_tasks: Vec::new(),
            failed_tasks: Vec::new(),
            validation_results: Vec::new(),
            snapshots: Vec::new(),
            rollback_performed: false,
            rollback: None,
            integration_result: None,
            message: String::new(),
            estimated_time_actual: String::new(),
            duration_ms: 0,
            next_steps: Vec::new(),
        }
    }

    pub fn blocking_error_count(&self) -> usize {
        self.validation_results
            .iter()
            .map(|report| report.blocking_errors().len())
            .sum()
    }
}

/// Human-friendly elapsed time
pub fn format_elapsed(duration_ms: u64) -> String {
    let seconds = duration_ms as f64 / 1000.0;
    if seconds < 60.0 {
        format!("{seconds:.1} seconds")
    } else if seconds < 3600.0 {
        format!("{:.1} minutes", seconds / 60.0)
    } else {
        format!("{:.1} hours", seconds / 3600.0)
    }
}
