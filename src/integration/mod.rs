//! Post-execution integration
//!
//! Builds and tests the branch with bounded auto-repair, commits with a
//! structured message, runs best-effort ancillary updates, merges into the
//! parent and records the baseline for the next request.

pub mod ancillary;
pub mod autofix;
pub mod commit_message;
pub mod pipeline;
pub mod types;

pub use autofix::{AutoFixer, TestFix};
pub use pipeline::IntegrationPipeline;
pub use types::{IntegrationPhase, IntegrationRequest, IntegrationResult};
