//! Impact analysis
//!
//! Turns a change request (and optionally an explicit file list) into the
//! categorized set of files it will touch: primary, cascading through the
//! dependency graph, and pattern-table driven config, documentation, test
//! and deployment files.

pub mod analyzer;
pub mod intent;
pub mod patterns;
pub mod types;

pub use analyzer::ImpactAnalyzer;
pub use intent::RequestIntent;
pub use types::{
    assess_risk, AffectedFile, ChangeKind, FileKind, ImpactCategory, ImpactResult, RiskLevel,
};
