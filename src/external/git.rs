//! Git command abstractions
//!
//! Provides trait-based abstractions for Git operations, enabling testable
//! Git integrations through dependency injection. All commands run through
//! the standard `git` command surface with the project path as working
//! directory.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::command::{CommandError, CommandExecutor};

pub type BranchName = String;
pub type CommitHash = String;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GitError {
    #[error("Repository not found or not a git repository")]
    RepositoryNotFound,
    #[error("Branch not found: {branch}")]
    BranchNotFound { branch: BranchName },
    #[error("Merge conflict detected: {details}")]
    MergeConflict { details: String },
    #[error("Working directory not clean")]
    WorkingDirectoryNotClean,
    #[error("Command execution error: {source}")]
    CommandError {
        #[from]
        source: CommandError,
    },
    #[error("Git command `git {command}` failed: {message}")]
    GitCommandFailed { command: String, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitStatus {
    pub is_clean: bool,
    pub staged_files: Vec<String>,
    pub unstaged_files: Vec<String>,
    pub untracked_files: Vec<String>,
}

impl GitStatus {
    /// Every path that differs from HEAD in any way
    pub fn all_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .staged_files
            .iter()
            .chain(self.unstaged_files.iter())
            .chain(self.untracked_files.iter())
            .cloned()
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub name: BranchName,
    pub commit_hash: CommitHash,
    pub is_current: bool,
    pub last_commit_at: DateTime<Utc>,
}

/// Trait for Git repository operations
///
/// This abstraction enables testing Git operations without actual repository
/// manipulation, while preserving the exact interface used by the branch
/// manager.
#[async_trait]
pub trait GitRepository: Send + Sync {
    /// Path of the working tree this repository operates on
    fn path(&self) -> &Path;

    /// Get the current branch name
    async fn current_branch(&self) -> Result<BranchName, GitError>;

    /// Resolve a revision to a full commit hash
    async fn rev_parse(&self, rev: &str) -> Result<CommitHash, GitError>;

    /// Get repository status
    async fn status(&self) -> Result<GitStatus, GitError>;

    /// Create a branch from HEAD and check it out
    async fn create_and_checkout(&self, branch: &BranchName) -> Result<(), GitError>;

    /// Create a branch pointing at `start` without checking it out
    async fn create_branch_at(&self, branch: &BranchName, start: &str) -> Result<(), GitError>;

    /// Checkout a branch
    async fn checkout(&self, branch: &BranchName) -> Result<(), GitError>;

    /// Stage every change in the working tree, including deletions
    async fn stage_all(&self) -> Result<(), GitError>;

    /// Commit staged changes and return the new commit hash
    async fn commit(&self, message: &str, allow_empty: bool) -> Result<CommitHash, GitError>;

    /// Hard-reset the current branch and working tree to `target`
    async fn reset_hard(&self, target: &str) -> Result<(), GitError>;

    /// Restore `paths` in the working tree and index from `commit`
    async fn checkout_paths(&self, commit: &str, paths: &[String]) -> Result<(), GitError>;

    /// Remove `paths` from the working tree and index
    async fn remove_paths(&self, paths: &[String]) -> Result<(), GitError>;

    /// Whether `path` exists in the tree of `commit`
    async fn path_exists_at(&self, commit: &str, path: &str) -> Result<bool, GitError>;

    /// Point ref `name` at `commit`
    async fn update_ref(&self, name: &str, commit: &str) -> Result<(), GitError>;

    /// Delete ref `name`
    async fn delete_ref(&self, name: &str) -> Result<(), GitError>;

    /// List refs under `prefix` as (refname, commit) pairs
    async fn list_refs(&self, prefix: &str) -> Result<Vec<(String, CommitHash)>, GitError>;

    /// Fast-forward the current branch to `branch`
    async fn merge_fast_forward(&self, branch: &BranchName) -> Result<(), GitError>;

    /// Squash `branch` into the index of the current branch (no commit)
    async fn merge_squash(&self, branch: &BranchName) -> Result<(), GitError>;

    /// Apply a single commit on top of the current branch
    async fn cherry_pick(&self, commit: &str) -> Result<CommitHash, GitError>;

    /// Abort an in-progress cherry-pick
    async fn cherry_pick_abort(&self) -> Result<(), GitError>;

    /// List local branches whose name matches `pattern` (a `refs/heads/` glob)
    async fn list_branches(&self, pattern: &str) -> Result<Vec<BranchInfo>, GitError>;

    /// Local branches fully merged into `into`
    async fn merged_branches(&self, into: &BranchName) -> Result<Vec<BranchName>, GitError>;

    /// Delete a local branch
    async fn delete_branch(&self, branch: &BranchName, force: bool) -> Result<(), GitError>;

    /// Paths that differ between `base` and the working tree, untracked files included
    async fn changed_files_since(&self, base: &str) -> Result<Vec<String>, GitError>;

    /// Paths touched by the commit range `from..to`
    async fn changed_files_between(&self, from: &str, to: &str) -> Result<Vec<String>, GitError>;
}

/// Real Git implementation driving the `git` binary
pub struct GitClient {
    executor: Arc<dyn CommandExecutor>,
    repo_path: PathBuf,
    timeout: Duration,
}

impl GitClient {
    pub fn new(executor: Arc<dyn CommandExecutor>, repo_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executor,
            repo_path: repo_path.into(),
            timeout,
        }
    }

    async fn execute_git_command(&self, args: &[&str]) -> Result<String, GitError> {
        let owned: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let output = self
            .executor
            .execute(&self.repo_path, "git", &owned, self.timeout)
            .await?;

        if !output.success() {
            return Err(self.classify_git_error(&output.combined(), args));
        }

        Ok(output.stdout.trim_end().to_string())
    }

    fn classify_git_error(&self, stderr: &str, args: &[&str]) -> GitError {
        if stderr.contains("not a git repository") {
            GitError::RepositoryNotFound
        } else if (stderr.contains("did not match any") || stderr.contains("not found"))
            && args.first() == Some(&"checkout")
        {
            GitError::BranchNotFound {
                branch: args.last().unwrap_or(&"unknown").to_string(),
            }
        } else if stderr.contains("CONFLICT") || stderr.contains("conflict") {
            GitError::MergeConflict {
                details: stderr.trim().to_string(),
            }
        } else if stderr.contains("Your local changes") || stderr.contains("would be overwritten") {
            GitError::WorkingDirectoryNotClean
        } else {
            GitError::GitCommandFailed {
                command: args.join(" "),
                message: stderr.trim().to_string(),
            }
        }
    }

    fn parse_status_output(&self, output: &str) -> GitStatus {
        let mut staged_files = Vec::new();
        let mut unstaged_files = Vec::new();
        let mut untracked_files = Vec::new();

        for line in output.lines() {
            if line.len() < 4 {
                continue;
            }

            let mut status_chars = line.chars();
            let index_status = status_chars.next().unwrap_or(' ');
            let worktree_status = status_chars.next().unwrap_or(' ');
            let raw_path = &line[3..];
            // Renames are reported as "old -> new"
            let filename = raw_path
                .rsplit(" -> ")
                .next()
                .unwrap_or(raw_path)
                .trim_matches('"')
                .to_string();

            match (index_status, worktree_status) {
                ('?', '?') => untracked_files.push(filename),
                (index, worktree) => {
                    if matches!(index, 'A' | 'M' | 'D' | 'R' | 'C') {
                        staged_files.push(filename.clone());
                    }
                    if matches!(worktree, 'M' | 'D') {
                        unstaged_files.push(filename);
                    }
                }
            }
        }

        let is_clean = staged_files.is_empty() && unstaged_files.is_empty() && untracked_files.is_empty();

        GitStatus {
            is_clean,
            staged_files,
            unstaged_files,
            untracked_files,
        }
    }

    fn lines(output: &str) -> Vec<String> {
        output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl GitRepository for GitClient {
    fn path(&self) -> &Path {
        &self.repo_path
    }

    async fn current_branch(&self) -> Result<BranchName, GitError> {
        // Try the newer command first
        if let Ok(branch) = self.execute_git_command(&["branch", "--show-current"]).await {
            if !branch.is_empty() {
                return Ok(branch);
            }
        }

        // Fallback to the older method
        let output = self.execute_git_command(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;

        if output == "HEAD" {
            return Err(GitError::GitCommandFailed {
                command: "rev-parse --abbrev-ref HEAD".to_string(),
                message: "HEAD is detached".to_string(),
            });
        }

        Ok(output)
    }

    async fn rev_parse(&self, rev: &str) -> Result<CommitHash, GitError> {
        let spec = format!("{rev}^{{commit}}");
        self.execute_git_command(&["rev-parse", "--verify", &spec]).await
    }

    async fn status(&self) -> Result<GitStatus, GitError> {
        let output = self
            .execute_git_command(&["status", "--porcelain", "--untracked-files=all"])
            .await?;
        Ok(self.parse_status_output(&output))
    }

    async fn create_and_checkout(&self, branch: &BranchName) -> Result<(), GitError> {
        self.execute_git_command(&["checkout", "-b", branch]).await?;
        Ok(())
    }

    async fn create_branch_at(&self, branch: &BranchName, start: &str) -> Result<(), GitError> {
        self.execute_git_command(&["branch", branch, start]).await?;
        Ok(())
    }

    async fn checkout(&self, branch: &BranchName) -> Result<(), GitError> {
        self.execute_git_command(&["checkout", branch]).await?;
        Ok(())
    }

    async fn stage_all(&self) -> Result<(), GitError> {
        self.execute_git_command(&["add", "--all"]).await?;
        Ok(())
    }

    async fn commit(&self, message: &str, allow_empty: bool) -> Result<CommitHash, GitError> {
        let mut args = vec!["commit", "--no-verify", "-m", message];
        if allow_empty {
            args.push("--allow-empty");
        }
        self.execute_git_command(&args).await?;
        self.rev_parse("HEAD").await
    }

    async fn reset_hard(&self, target: &str) -> Result<(), GitError> {
        self.execute_git_command(&["reset", "--hard", target]).await?;
        // Untracked files produced by tasks are part of the state being discarded
        self.execute_git_command(&["clean", "-fd"]).await?;
        Ok(())
    }

    async fn checkout_paths(&self, commit: &str, paths: &[String]) -> Result<(), GitError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["checkout", commit, "--"];
        args.extend(paths.iter().map(String::as_str));
        self.execute_git_command(&args).await?;
        Ok(())
    }

    async fn remove_paths(&self, paths: &[String]) -> Result<(), GitError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["rm", "-q", "-r", "--ignore-unmatch", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.execute_git_command(&args).await?;
        Ok(())
    }

    async fn path_exists_at(&self, commit: &str, path: &str) -> Result<bool, GitError> {
        let object = format!("{commit}:{path}");
        match self.execute_git_command(&["cat-file", "-e", &object]).await {
            Ok(_) => Ok(true),
            Err(GitError::GitCommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn update_ref(&self, name: &str, commit: &str) -> Result<(), GitError> {
        self.execute_git_command(&["update-ref", name, commit]).await?;
        Ok(())
    }

    async fn delete_ref(&self, name: &str) -> Result<(), GitError> {
        self.execute_git_command(&["update-ref", "-d", name]).await?;
        Ok(())
    }

    async fn list_refs(&self, prefix: &str) -> Result<Vec<(String, CommitHash)>, GitError> {
        let output = self
            .execute_git_command(&["for-each-ref", "--format=%(refname) %(objectname)", prefix])
            .await?;
        Ok(Self::lines(&output)
            .into_iter()
            .filter_map(|line| {
                let (name, hash) = line.split_once(' ')?;
                Some((name.to_string(), hash.to_string()))
            })
            .collect())
    }

    async fn merge_fast_forward(&self, branch: &BranchName) -> Result<(), GitError> {
        self.execute_git_command(&["merge", "--ff-only", branch]).await?;
        Ok(())
    }

    async fn merge_squash(&self, branch: &BranchName) -> Result<(), GitError> {
        self.execute_git_command(&["merge", "--squash", branch]).await?;
        Ok(())
    }

    async fn cherry_pick(&self, commit: &str) -> Result<CommitHash, GitError> {
        self.execute_git_command(&["cherry-pick", "--allow-empty", commit]).await?;
        self.rev_parse("HEAD").await
    }

    async fn cherry_pick_abort(&self) -> Result<(), GitError> {
        self.execute_git_command(&["cherry-pick", "--abort"]).await?;
        Ok(())
    }

    async fn list_branches(&self, pattern: &str) -> Result<Vec<BranchInfo>, GitError> {
        let output = self
            .execute_git_command(&[
                "for-each-ref",
                "--format=%(refname:short)|%(objectname)|%(HEAD)|%(committerdate:unix)",
                pattern,
            ])
            .await?;

        Ok(Self::lines(&output)
            .into_iter()
            .filter_map(|line| {
                let mut parts = line.split('|');
                let name = parts.next()?.to_string();
                let commit_hash = parts.next()?.to_string();
                let is_current = parts.next()? == "*";
                let seconds: i64 = parts.next()?.parse().ok()?;
                let last_commit_at = Utc.timestamp_opt(seconds, 0).single()?;
                Some(BranchInfo {
                    name,
                    commit_hash,
                    is_current,
                    last_commit_at,
                })
            })
            .collect())
    }

    async fn merged_branches(&self, into: &BranchName) -> Result<Vec<BranchName>, GitError> {
        let output = self
            .execute_git_command(&["branch", "--format=%(refname:short)", "--merged", into])
            .await?;
        Ok(Self::lines(&output))
    }

    async fn delete_branch(&self, branch: &BranchName, force: bool) -> Result<(), GitError> {
        let flag = if force { "-D" } else { "-d" };
        self.execute_git_command(&["branch", flag, branch]).await?;
        Ok(())
    }

    async fn changed_files_since(&self, base: &str) -> Result<Vec<String>, GitError> {
        let tracked = self.execute_git_command(&["diff", "--name-only", base]).await?;
        let untracked = self
            .execute_git_command(&["ls-files", "--others", "--exclude-standard"])
            .await?;
        let mut files = Self::lines(&tracked);
        files.extend(Self::lines(&untracked));
        files.sort();
        files.dedup();
        Ok(files)
    }

    async fn changed_files_between(&self, from: &str, to: &str) -> Result<Vec<String>, GitError> {
        let range = format!("{from}..{to}");
        let output = self.execute_git_command(&["diff", "--name-only", &range]).await?;
        Ok(Self::lines(&output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::command::{CommandOutput, MockCommandExecutor};

    fn client_with(mock: MockCommandExecutor) -> GitClient {
        GitClient::new(Arc::new(mock), "/tmp/repo", Duration::from_secs(5))
    }

    fn ok(stdout: &str) -> Result<CommandOutput, CommandError> {
        Ok(CommandOutput {
            status_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration_ms: 1,
        })
    }

    #[test]
    fn test_parse_status_output() {
        let client = client_with(MockCommandExecutor::new());
        let status = client.parse_status_output(
            "M  src/staged.ts\n M src/unstaged.ts\n?? src/new.ts\nR  old.ts -> renamed.ts\n D gone.ts\n",
        );

        assert!(!status.is_clean);
        assert_eq!(status.staged_files, vec!["src/staged.ts", "renamed.ts"]);
        assert_eq!(status.unstaged_files, vec!["src/unstaged.ts", "gone.ts"]);
        assert_eq!(status.untracked_files, vec!["src/new.ts"]);
        assert_eq!(status.all_paths().len(), 5);
    }

    #[test]
    fn test_parse_clean_status() {
        let client = client_with(MockCommandExecutor::new());
        let status = client.parse_status_output("");
        assert!(status.is_clean);
    }

    #[test]
    fn test_classify_conflict() {
        let client = client_with(MockCommandExecutor::new());
        let error = client.classify_git_error(
            "CONFLICT (content): Merge conflict in src/a.ts",
            &["merge", "--squash", "feature"],
        );
        assert!(matches!(error, GitError::MergeConflict { .. }));
    }

    #[test]
    fn test_classify_missing_branch() {
        let client = client_with(MockCommandExecutor::new());
        let error = client.classify_git_error(
            "error: pathspec 'nope' did not match any file(s) known to git",
            &["checkout", "nope"],
        );
        assert_eq!(
            error,
            GitError::BranchNotFound {
                branch: "nope".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_list_refs_parses_pairs() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute().returning(|_, _, _, _| {
            ok("refs/patchwright/snapshots/a/0001 abc123\nrefs/patchwright/snapshots/a/0002 def456\n")
        });
        let client = client_with(mock);

        let refs = client.list_refs("refs/patchwright/snapshots/a").await.unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[1], ("refs/patchwright/snapshots/a/0002".to_string(), "def456".to_string()));
    }

    #[tokio::test]
    async fn test_list_branches_parses_format() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_, _, _, _| ok("patchwright/add-login-20240101|abc|*|1704067200\n"));
        let client = client_with(mock);

        let branches = client.list_branches("refs/heads/patchwright/").await.unwrap();
        assert_eq!(branches.len(), 1);
        assert!(branches[0].is_current);
        assert_eq!(branches[0].last_commit_at.timestamp(), 1_704_067_200);
    }

    #[tokio::test]
    async fn test_failed_command_maps_to_git_error() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute().returning(|_, _, _, _| {
            Ok(CommandOutput {
                status_code: 128,
                stdout: String::new(),
                stderr: "fatal: not a git repository (or any of the parent directories): .git".to_string(),
                duration_ms: 1,
            })
        });
        let client = client_with(mock);

        assert_eq!(client.current_branch().await, Err(GitError::RepositoryNotFound));
    }
}
