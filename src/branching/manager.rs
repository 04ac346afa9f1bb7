use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::lifecycle::BranchEvent;
use super::naming;
use super::types::{
    BranchError, BranchSnapshot, CherryPickReport, CleanupReport, FeatureBranch, MergeOutcome,
    RollbackOptions, RollbackResult, RollbackStrategy,
};
use crate::config::BranchingConfig;
use crate::external::{CommandExecutor, GitClient, GitRepository};
use crate::git::{Git2Inspector, RepositoryInspector};

const SNAPSHOT_SUBJECT: &str = "patchwright snapshot: ";
const VALIDATION_TRAILER: &str = "Patchwright-Validation: ";
const FILES_TRAILER: &str = "Patchwright-Files: ";

/// Owns every mutation of the project's repository: branches, snapshot
/// commits and refs, rollbacks, merges and housekeeping.
pub struct BranchManager {
    git: Arc<dyn GitRepository>,
    inspector: Arc<dyn RepositoryInspector>,
    config: BranchingConfig,
}

impl BranchManager {
    pub fn new(
        git: Arc<dyn GitRepository>,
        inspector: Arc<dyn RepositoryInspector>,
        config: BranchingConfig,
    ) -> Self {
        Self {
            git,
            inspector,
            config,
        }
    }

    /// Manager driving the real `git` binary in `project`
    pub fn for_project(
        project: &Path,
        executor: Arc<dyn CommandExecutor>,
        config: BranchingConfig,
        git_timeout: Duration,
    ) -> Self {
        Self::new(
            Arc::new(GitClient::new(executor, project, git_timeout)),
            Arc::new(Git2Inspector::new(project)),
            config,
        )
    }

    pub fn config(&self) -> &BranchingConfig {
        &self.config
    }

    pub fn inspector(&self) -> &Arc<dyn RepositoryInspector> {
        &self.inspector
    }

    pub async fn current_branch(&self) -> Result<String, BranchError> {
        Ok(self.git.current_branch().await?)
    }

    /// Create and check out a branch for `request_text` off the current branch
    pub async fn create_feature_branch(&self, request_text: &str) -> Result<FeatureBranch, BranchError> {
        let status = self.git.status().await?;
        if !status.is_clean {
            return Err(BranchError::DirtyWorkingTree {
                files: status.all_paths(),
            });
        }

        let parent_branch = self.git.current_branch().await?;
        let base_commit = self.git.rev_parse("HEAD").await?;
        let created_at = Utc::now();

        let mut name = naming::branch_name(&self.config.prefix, request_text, created_at);
        let existing: HashSet<String> = self
            .git
            .list_branches(&format!("refs/heads/{}/", self.config.prefix))
            .await?
            .into_iter()
            .map(|branch| branch.name)
            .collect();
        if existing.contains(&name) {
            let stem = name.clone();
            let mut suffix = 2;
            while existing.contains(&name) {
                name = format!("{stem}-{suffix}");
                suffix += 1;
            }
        }

        self.git.create_and_checkout(&name).await?;
        info!(
            branch = %name,
            parent = %parent_branch,
            base_commit = %base_commit,
            "Created feature branch"
        );

        Ok(FeatureBranch::new(
            name,
            request_text.to_string(),
            parent_branch,
            base_commit,
            created_at,
        ))
    }

    async fn ensure_on(&self, branch: &str) -> Result<(), BranchError> {
        if self.git.current_branch().await.ok().as_deref() != Some(branch) {
            self.git.checkout(&branch.to_string()).await?;
        }
        Ok(())
    }

    /// Commit the working tree as-is and record it as a checkpoint.
    ///
    /// When `files` is empty the snapshot lists the paths changed since the
    /// previous checkpoint.
    pub async fn create_snapshot(
        &self,
        branch: &mut FeatureBranch,
        description: &str,
        validation_passed: bool,
        files: &[String],
    ) -> Result<BranchSnapshot, BranchError> {
        self.ensure_on(&branch.name).await?;

        let previous = branch.latest_commit().to_string();
        let message = snapshot_message(description, validation_passed, files);
        self.git.stage_all().await?;
        let commit_id = self.git.commit(&message, true).await?;

        if !self.inspector.commit_exists(&commit_id) {
            return Err(BranchError::SnapshotVerification { commit: commit_id });
        }

        let files = if files.is_empty() {
            self.git.changed_files_between(&previous, &commit_id).await?
        } else {
            files.to_vec()
        };

        let sequence = branch.snapshots.len() + 1;
        let snapshot_ref = naming::snapshot_ref(&self.config.snapshot_namespace, &branch.name, sequence);
        self.git.update_ref(&snapshot_ref, &commit_id).await?;

        let mut timestamp = Utc::now();
        if let Some(last) = branch.last_snapshot() {
            if timestamp <= last.timestamp {
                timestamp = last.timestamp + ChronoDuration::milliseconds(1);
            }
        }

        let snapshot = BranchSnapshot {
            branch_name: branch.name.clone(),
            commit_id,
            timestamp,
            description: description.to_string(),
            validation_passed,
            files,
            snapshot_ref,
        };
        info!(
            branch = %branch.name,
            snapshot = %snapshot.snapshot_ref,
            commit = %snapshot.commit_id,
            files = snapshot.files.len(),
            validation_passed = validation_passed,
            "Snapshot created"
        );
        branch.snapshots.push(snapshot.clone());
        Ok(snapshot)
    }

    /// Rebuild a branch's snapshot list from its refs
    pub async fn load_snapshots(&self, branch_name: &str) -> Result<Vec<BranchSnapshot>, BranchError> {
        let prefix = naming::snapshot_prefix(&self.config.snapshot_namespace, branch_name);
        let mut refs = self.git.list_refs(prefix.trim_end_matches('/')).await?;
        refs.retain(|(name, _)| name.starts_with(&prefix));
        refs.sort();

        let mut snapshots: Vec<BranchSnapshot> = Vec::with_capacity(refs.len());
        for (snapshot_ref, commit_id) in refs {
            let details = self
                .inspector
                .commit_details(&commit_id)
                .map_err(|e| BranchError::Inspect { message: e.to_string() })?;
            let (description, validation_passed, files) = parse_snapshot_message(&details.message);

            let mut timestamp = details.committed_at;
            if let Some(last) = snapshots.last() {
                if timestamp <= last.timestamp {
                    timestamp = last.timestamp + ChronoDuration::milliseconds(1);
                }
            }
            snapshots.push(BranchSnapshot {
                branch_name: branch_name.to_string(),
                commit_id,
                timestamp,
                description,
                validation_passed,
                files,
                snapshot_ref,
            });
        }
        Ok(snapshots)
    }

    /// Roll the branch back. Failures are reported in the result, never retried.
    pub async fn perform_rollback(&self, branch: &mut FeatureBranch, options: &RollbackOptions) -> RollbackResult {
        let strategy = options.strategy.label().to_string();
        match self.rollback_inner(branch, options).await {
            Ok(result) => {
                info!(
                    branch = %branch.name,
                    strategy = %strategy,
                    restored = ?result.restored_commit,
                    backup = ?result.backup_branch,
                    "Rollback completed"
                );
                result
            }
            Err(e) => {
                warn!(branch = %branch.name, strategy = %strategy, error = %e, "Rollback failed");
                RollbackResult {
                    success: false,
                    strategy,
                    restored_commit: None,
                    backup_branch: None,
                    files_kept: Vec::new(),
                    snapshots_discarded: 0,
                    message: format!("Rollback failed: {e}"),
                }
            }
        }
    }

    async fn rollback_inner(
        &self,
        branch: &mut FeatureBranch,
        options: &RollbackOptions,
    ) -> Result<RollbackResult, BranchError> {
        self.ensure_on(&branch.name).await?;

        // Resolve the target before touching anything
        let keep_from = match &options.strategy {
            RollbackStrategy::Partial { target_snapshot } => {
                let index = branch
                    .find_snapshot(target_snapshot)
                    .ok_or_else(|| BranchError::SnapshotNotFound {
                        branch: branch.name.clone(),
                        target: target_snapshot.clone(),
                    })?;
                Some(index)
            }
            _ => None,
        };

        let backup_branch = if options.create_backup_branch {
            let status = self.git.status().await?;
            if !status.is_clean {
                self.git.stage_all().await?;
                self.git.commit("patchwright: pre-rollback state", false).await?;
            }
            let backup = naming::backup_branch_name(&branch.name, Utc::now());
            self.git.create_branch_at(&backup, "HEAD").await?;
            debug!(branch = %branch.name, backup = %backup, "Backup branch created");
            Some(backup)
        } else {
            None
        };

        let strategy = options.strategy.label().to_string();
        match &options.strategy {
            RollbackStrategy::Complete => {
                self.git.reset_hard(&branch.base_commit).await?;
                let discarded = self.discard_snapshots_from(branch, 0).await;
                Ok(RollbackResult {
                    success: true,
                    strategy,
                    restored_commit: Some(branch.base_commit.clone()),
                    backup_branch,
                    files_kept: Vec::new(),
                    snapshots_discarded: discarded,
                    message: format!("Branch reset to its base commit {}", short(&branch.base_commit)),
                })
            }
            RollbackStrategy::Partial { .. } => {
                let index = keep_from.unwrap_or(0);
                let target = branch.snapshots[index].clone();
                self.git.reset_hard(&target.commit_id).await?;
                let discarded = self.discard_snapshots_from(branch, index + 1).await;
                Ok(RollbackResult {
                    success: true,
                    strategy,
                    restored_commit: Some(target.commit_id.clone()),
                    backup_branch,
                    files_kept: Vec::new(),
                    snapshots_discarded: discarded,
                    message: format!("Branch reset to snapshot '{}'", target.description),
                })
            }
            RollbackStrategy::Selective { files_to_keep } => {
                let final_state = match branch.last_snapshot() {
                    Some(snapshot) => snapshot.commit_id.clone(),
                    None => {
                        let status = self.git.status().await?;
                        if !status.is_clean {
                            self.git.stage_all().await?;
                            self.git.commit("patchwright: final state before selective rollback", false).await?;
                        }
                        self.git.rev_parse("HEAD").await?
                    }
                };

                self.git.reset_hard(&branch.base_commit).await?;

                let mut restore = Vec::new();
                let mut remove = Vec::new();
                for path in files_to_keep {
                    if self.git.path_exists_at(&final_state, path).await? {
                        restore.push(path.clone());
                    } else {
                        // Deleted in the final state: keeping it means keeping the deletion
                        remove.push(path.clone());
                    }
                }
                self.git.checkout_paths(&final_state, &restore).await?;
                self.git.remove_paths(&remove).await?;

                let discarded = self.discard_snapshots_from(branch, 0).await;
                self.git.stage_all().await?;
                let commit = self
                    .git
                    .commit(
                        &format!("patchwright: selective rollback keeping {} file(s)", files_to_keep.len()),
                        true,
                    )
                    .await?;

                Ok(RollbackResult {
                    success: true,
                    strategy,
                    restored_commit: Some(commit),
                    backup_branch,
                    files_kept: files_to_keep.clone(),
                    snapshots_discarded: discarded,
                    message: format!(
                        "Branch reset to its base with {} kept file(s) restored from {}",
                        files_to_keep.len(),
                        short(&final_state)
                    ),
                })
            }
        }
    }

    /// Drop snapshots at `from..` and their refs; returns how many were dropped
    async fn discard_snapshots_from(&self, branch: &mut FeatureBranch, from: usize) -> usize {
        if from >= branch.snapshots.len() {
            return 0;
        }
        let discarded: Vec<BranchSnapshot> = branch.snapshots.drain(from..).collect();
        for snapshot in &discarded {
            if let Err(e) = self.git.delete_ref(&snapshot.snapshot_ref).await {
                warn!(snapshot = %snapshot.snapshot_ref, error = %e, "Failed to delete snapshot ref");
            }
        }
        discarded.len()
    }

    /// Stage everything and commit on the current branch
    pub async fn commit_all(&self, message: &str) -> Result<String, BranchError> {
        self.git.stage_all().await?;
        Ok(self.git.commit(message, true).await?)
    }

    /// Paths changed on the branch since its base, uncommitted work included
    pub async fn changed_files(&self, branch: &FeatureBranch) -> Result<Vec<String>, BranchError> {
        Ok(self.git.changed_files_since(&branch.base_commit).await?)
    }

    /// Merge into the parent branch. A failed merge is reported, the parent is
    /// left untouched and the feature branch is checked out again.
    pub async fn merge_feature_branch(
        &self,
        branch: &mut FeatureBranch,
        squash: bool,
        message: Option<&str>,
    ) -> MergeOutcome {
        let result = self.merge_inner(branch, squash, message).await;
        match result {
            Ok(commit) => {
                branch.transition(BranchEvent::Merge);
                info!(branch = %branch.name, into = %branch.parent_branch, squash = squash, "Branch merged");
                MergeOutcome {
                    success: true,
                    message: format!("Merged {} into {}", branch.name, branch.parent_branch),
                    merge_commit: Some(commit),
                }
            }
            Err(e) => {
                warn!(branch = %branch.name, into = %branch.parent_branch, error = %e, "Merge failed");
                if squash {
                    if let Err(reset_error) = self.git.reset_hard("HEAD").await {
                        warn!(branch = %branch.parent_branch, error = %reset_error, "Failed to discard squash merge state");
                    }
                }
                if let Err(checkout_error) = self.git.checkout(&branch.name).await {
                    warn!(branch = %branch.name, error = %checkout_error, "Failed to return to feature branch");
                }
                MergeOutcome {
                    success: false,
                    message: format!(
                        "Merge of {} into {} failed: {}. Changes remain committed on {}",
                        branch.name, branch.parent_branch, e, branch.name
                    ),
                    merge_commit: None,
                }
            }
        }
    }

    async fn merge_inner(
        &self,
        branch: &FeatureBranch,
        squash: bool,
        message: Option<&str>,
    ) -> Result<String, BranchError> {
        self.git.checkout(&branch.parent_branch).await?;
        if squash {
            self.git.merge_squash(&branch.name).await?;
            let message = message
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} (squashed from {})", branch.request_text, branch.name));
            Ok(self.git.commit(&message, true).await?)
        } else {
            self.git.merge_fast_forward(&branch.name).await?;
            Ok(self.git.rev_parse("HEAD").await?)
        }
    }

    /// Apply `commit_ids` from `source` onto `target`, skipping conflicting ones.
    ///
    /// The previously checked-out branch is restored afterwards.
    pub async fn cherry_pick_changes(
        &self,
        source: &str,
        target: &str,
        commit_ids: &[String],
    ) -> Result<CherryPickReport, BranchError> {
        let original = self.git.current_branch().await?;
        self.git.checkout(&target.to_string()).await?;

        let mut report = CherryPickReport::default();
        for commit in commit_ids {
            match self.git.cherry_pick(commit).await {
                Ok(new_commit) => {
                    debug!(source = %source, target = %target, commit = %commit, "Cherry-picked commit");
                    report.applied.push((commit.clone(), new_commit));
                }
                Err(e) => {
                    warn!(source = %source, target = %target, commit = %commit, error = %e, "Cherry-pick failed, skipping");
                    if let Err(abort_error) = self.git.cherry_pick_abort().await {
                        debug!(error = %abort_error, "No cherry-pick to abort");
                    }
                    report.conflicted.push(commit.clone());
                }
            }
        }

        self.git.checkout(&original).await?;
        info!(
            source = %source,
            target = %target,
            applied = report.applied.len(),
            conflicted = report.conflicted.len(),
            "Cherry-pick finished"
        );
        Ok(report)
    }

    /// Record the current HEAD as the baseline for the next request
    pub async fn create_baseline_snapshot(&self, description: &str) -> Result<BranchSnapshot, BranchError> {
        let current = self.git.current_branch().await?;
        let commit_id = self.git.rev_parse("HEAD").await?;
        if !self.inspector.commit_exists(&commit_id) {
            return Err(BranchError::SnapshotVerification { commit: commit_id });
        }
        let baseline_ref = naming::baseline_ref(&self.config.snapshot_namespace, &current);
        self.git.update_ref(&baseline_ref, &commit_id).await?;
        info!(branch = %current, commit = %commit_id, "Baseline snapshot recorded");

        Ok(BranchSnapshot {
            branch_name: current,
            commit_id,
            timestamp: Utc::now(),
            description: description.to_string(),
            validation_passed: true,
            files: Vec::new(),
            snapshot_ref: baseline_ref,
        })
    }

    /// Check out the branch's parent, leaving the feature branch in place
    pub async fn return_to_parent(&self, branch: &FeatureBranch) -> Result<(), BranchError> {
        let status = self.git.status().await?;
        if !status.is_clean {
            // Work that never reached a snapshot is discarded
            self.git.reset_hard("HEAD").await?;
        }
        self.ensure_on(&branch.parent_branch).await
    }

    /// Delete generated branches older than `max_age_days`
    pub async fn cleanup_branches(&self, max_age_days: i64, keep_merged: bool) -> Result<CleanupReport, BranchError> {
        let cutoff = (max_age_days >= 0)
            .then(|| ChronoDuration::try_days(max_age_days))
            .flatten()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .ok_or(BranchError::InvalidAge { days: max_age_days })?;
        let current = self.git.current_branch().await?;
        let branches = self
            .git
            .list_branches(&format!("refs/heads/{}/", self.config.prefix))
            .await?;
        let merged: HashSet<String> = if keep_merged {
            self.git.merged_branches(&current).await?.into_iter().collect()
        } else {
            HashSet::new()
        };

        let mut report = CleanupReport::default();
        for branch in branches {
            if branch.is_current || branch.name == current || branch.last_commit_at > cutoff {
                report.kept.push(branch.name);
                continue;
            }
            if keep_merged && merged.contains(&branch.name) {
                report.kept.push(branch.name);
                continue;
            }

            match self.git.delete_branch(&branch.name, true).await {
                Ok(()) => {
                    let prefix = naming::snapshot_prefix(&self.config.snapshot_namespace, &branch.name);
                    if let Ok(refs) = self.git.list_refs(prefix.trim_end_matches('/')).await {
                        for (name, _) in refs.into_iter().filter(|(name, _)| name.starts_with(&prefix)) {
                            if let Err(e) = self.git.delete_ref(&name).await {
                                report.errors.push(format!("{name}: {e}"));
                            }
                        }
                    }
                    report.deleted.push(branch.name);
                }
                Err(e) => report.errors.push(format!("{}: {}", branch.name, e)),
            }
        }

        info!(
            deleted = report.deleted.len(),
            kept = report.kept.len(),
            errors = report.errors.len(),
            "Branch cleanup finished"
        );
        Ok(report)
    }
}

fn short(commit: &str) -> &str {
    &commit[..commit.len().min(8)]
}

fn snapshot_message(description: &str, validation_passed: bool, files: &[String]) -> String {
    let mut message = format!(
        "{}{}\n\n{}{}",
        SNAPSHOT_SUBJECT,
        description,
        VALIDATION_TRAILER,
        if validation_passed { "passed" } else { "failed" }
    );
    if !files.is_empty() {
        message.push('\n');
        message.push_str(FILES_TRAILER);
        message.push_str(&files.join(","));
    }
    message
}

fn parse_snapshot_message(message: &str) -> (String, bool, Vec<String>) {
    let mut lines = message.lines();
    let subject = lines.next().unwrap_or_default();
    let description = subject.strip_prefix(SNAPSHOT_SUBJECT).unwrap_or(subject).to_string();

    let mut validation_passed = false;
    let mut files = Vec::new();
    for line in lines {
        if let Some(value) = line.strip_prefix(VALIDATION_TRAILER) {
            validation_passed = value.trim() == "passed";
        } else if let Some(value) = line.strip_prefix(FILES_TRAILER) {
            files = value
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect();
        }
    }
    (description, validation_passed, files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_message_round_trip() {
        let message = snapshot_message(
            "pre-execution",
            true,
            &["src/a.ts".to_string(), "src/b.ts".to_string()],
        );
        let (description, passed, files) = parse_snapshot_message(&message);
        assert_eq!(description, "pre-execution");
        assert!(passed);
        assert_eq!(files, vec!["src/a.ts", "src/b.ts"]);
    }

    #[test]
    fn test_parse_foreign_message() {
        let (description, passed, files) = parse_snapshot_message("manual commit\n\nbody");
        assert_eq!(description, "manual commit");
        assert!(!passed);
        assert!(files.is_empty());
    }

    #[test]
    fn test_short_commit() {
        assert_eq!(short("0123456789abcdef"), "01234567");
        assert_eq!(short("abc"), "abc");
    }
}
