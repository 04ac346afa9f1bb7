// Patchwright Library - change-request orchestration core
// This exposes the pipeline components for the binary and for testing

pub mod branching;
pub mod cache;
pub mod config;
pub mod external;
pub mod fs;
pub mod generator;
pub mod git;
pub mod impact;
pub mod index;
pub mod integration;
pub mod observability;
pub mod orchestrator;
pub mod priority;
pub mod reconcile;
pub mod shutdown;
pub mod telemetry;
pub mod validation;

// Re-export key types for easy access
pub use branching::{BranchManager, BranchStatus, FeatureBranch, RollbackOptions, RollbackStrategy};
pub use config::PatchwrightConfig;
pub use impact::{ImpactAnalyzer, ImpactResult, RiskLevel};
pub use index::{IndexCollaborator, IndexRegistry};
pub use integration::{IntegrationPipeline, IntegrationResult};
pub use observability::{pipeline_metrics, OperationTimer};
pub use orchestrator::{OrchestrationOptions, OrchestrationResult, Orchestrator};
pub use priority::Priority;
pub use reconcile::{ReconcileRequest, ReconcileScope, Reconciler, ReconciliationResult};
pub use shutdown::CancellationToken;
pub use telemetry::{generate_correlation_id, init_telemetry};
pub use validation::ValidationGate;
