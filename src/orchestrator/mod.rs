//! Task orchestration
//!
//! Converts an impact result into ordered file tasks and runs them through
//! the phase pipeline on an isolated feature branch.

pub mod ordering;
pub mod pipeline;
pub mod tasks;
pub mod types;

pub use ordering::order_tasks;
pub use pipeline::Orchestrator;
pub use tasks::{convert_tasks, FileTask};
pub use types::{
    format_elapsed, ImpactSummary, OrchestrationError, OrchestrationOptions, OrchestrationPhase,
    OrchestrationResult, TaskFailure,
};
