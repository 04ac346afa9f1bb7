//! External tool abstractions
//!
//! This module provides trait-based abstractions for external processes
//! (build, test, lint commands and the `git` command surface), enabling
//! testable code through dependency injection and scripted implementations.

pub mod command;
pub mod git;
pub mod mocks;

pub use command::{CommandError, CommandExecutor, CommandOutput, ProcessCommandExecutor};
pub use git::{BranchInfo, BranchName, CommitHash, GitClient, GitError, GitRepository, GitStatus};
pub use mocks::ScriptedExecutor;
