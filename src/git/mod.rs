//! Git inspection module
//!
//! Read-only libgit2 access used to verify what the command-surface client
//! in `external::git` wrote.

pub mod inspect;

pub use inspect::{CommitDetails, Git2Inspector, InspectError, RepositoryInspector};
