//! Branch & snapshot management
//!
//! Every request runs on its own feature branch. Snapshots are commits on
//! that branch with a ref under the configured namespace so they can be
//! listed and restored after a restart.

pub mod lifecycle;
pub mod manager;
pub mod naming;
pub mod types;

pub use lifecycle::{BranchEvent, BranchStatus};
pub use manager::BranchManager;
pub use types::{
    BranchError, BranchSnapshot, CherryPickReport, CleanupReport, FeatureBranch, MergeOutcome,
    RollbackOptions, RollbackResult, RollbackStrategy,
};
