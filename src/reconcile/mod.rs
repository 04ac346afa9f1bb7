//! Reconciliation
//!
//! Detects drift between the live tree and each persisted index (missing,
//! orphaned and outdated records), plans corrective actions and applies
//! them independently, or reports them under dry-run.

pub mod detect;
pub mod engine;
pub mod scanner;
pub mod types;

pub use engine::Reconciler;
pub use scanner::{scan_tree, TreeState};
pub use types::{
    ActionKind, DetailAction, Discrepancy, DiscrepancyKind, FileChecksum, PlannedAction,
    ReconcileError, ReconcileRequest, ReconcileScope, ReconciliationDetail, ReconciliationResult,
};
