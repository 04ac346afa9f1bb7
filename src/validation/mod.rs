//! Validation gate
//!
//! The core safety cycle blocks the pipeline on compilation failures and
//! destructive operations. The quality cycle only advises.

pub mod checks;
pub mod compiler;
pub mod cycles;
pub mod gate;
pub mod safety;
pub mod security;
pub mod structure;
pub mod types;

pub use gate::ValidationGate;
pub use types::{
    CheckKind, CompilerDiagnostic, CycleResult, GateReport, GateStage, Severity, ValidationError,
    ValidationIssue, ValidationWarning,
};
