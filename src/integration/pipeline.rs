use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::ancillary::AncillaryUpdater;
use super::autofix::{AutoFixer, TestFix};
use super::commit_message::{build_commit_message, CommitSummary};
use super::types::{IntegrationPhase, IntegrationRequest, IntegrationResult};
use crate::branching::{BranchManager, FeatureBranch};
use crate::config::PatchwrightConfig;
use crate::external::command::{render_command, split_argv};
use crate::external::{CommandError, CommandExecutor, CommandOutput};
use crate::index::IndexRegistry;
use crate::observability::{pipeline_metrics, OperationTimer};
use crate::validation::compiler::{output_tail, parse_compiler_output};

/// Outcome of one build or test invocation
enum RunOutcome {
    NotConfigured,
    Passed,
    Failed(String),
}

/// Takes a branch whose tasks have run through build, test, commit,
/// ancillary updates, merge and the next baseline.
pub struct IntegrationPipeline {
    executor: Arc<dyn CommandExecutor>,
    branches: Arc<BranchManager>,
    indexes: IndexRegistry,
    project_id: String,
    config: PatchwrightConfig,
}

impl IntegrationPipeline {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        branches: Arc<BranchManager>,
        indexes: IndexRegistry,
        project_id: impl Into<String>,
        config: PatchwrightConfig,
    ) -> Self {
        Self {
            executor,
            branches,
            indexes,
            project_id: project_id.into(),
            config,
        }
    }

    async fn run(&self, project: &Path, argv: Option<&Vec<String>>, extra: &[String], timeout: Duration) -> RunOutcome {
        let Some((program, args)) = argv.and_then(|argv| split_argv(argv)) else {
            return RunOutcome::NotConfigured;
        };
        let mut args = args.to_vec();
        args.extend_from_slice(extra);
        let command = render_command(program, &args);

        match self.executor.execute(project, program, &args, timeout).await {
            Ok(output) if output.success() => RunOutcome::Passed,
            Ok(output) => {
                debug!(command = %command, status = output.status_code, "Command failed");
                RunOutcome::Failed(combined_or_status(&output))
            }
            Err(CommandError::Timeout { command, timeout_ms }) => {
                RunOutcome::Failed(format!("`{command}` timed out after {timeout_ms}ms"))
            }
            Err(e) => RunOutcome::Failed(e.to_string()),
        }
    }

    pub async fn integrate(
        &self,
        branch: &mut FeatureBranch,
        project: &Path,
        request: &IntegrationRequest,
    ) -> IntegrationResult {
        let timer = OperationTimer::new("integration");
        let mut result = IntegrationResult::default();
        let fixer = AutoFixer::new(project);

        // Compilation: the only fatal phase besides commit
        result.phase = IntegrationPhase::Compilation;
        if !self.compile(project, &fixer, &mut result).await {
            pipeline_metrics().record_auto_fixes(result.fixes_applied.len());
            timer.finish();
            return result;
        }

        result.phase = IntegrationPhase::Testing;
        self.test(project, &fixer, &mut result).await;

        result.phase = IntegrationPhase::Commit;
        let changed = match self.branches.changed_files(branch).await {
            Ok(changed) => changed,
            Err(e) => {
                error!(branch = %branch.name, error = %e, "Could not list changed files");
                result.errors.push(format!("commit: {e}"));
                timer.finish();
                return result;
            }
        };
        let message = build_commit_message(&CommitSummary {
            request_text: &request.request_text,
            files: &changed,
            fixes_applied: &result.fixes_applied,
            build_passing: true,
            tests_passing: result.tests_passing,
            validation_passed: request.validation_passed,
        });
        match self.branches.commit_all(&message).await {
            Ok(commit) => {
                info!(branch = %branch.name, commit = %commit, files = changed.len(), "Integration commit created");
                result.changes_committed = true;
                result.commit_id = Some(commit);
            }
            Err(e) => {
                error!(branch = %branch.name, error = %e, "Integration commit failed");
                result.errors.push(format!("commit: {e}"));
                pipeline_metrics().record_auto_fixes(result.fixes_applied.len());
                timer.finish();
                return result;
            }
        }

        if self.config.integration.refresh_indexes {
            result.indexes_refreshed = self.refresh_indexes(project, &changed, &mut result.errors).await;
        }

        result.phase = IntegrationPhase::Documentation;
        let updater = AncillaryUpdater::new(
            self.executor.clone(),
            project,
            self.config.commands.clone(),
            &self.config.timeouts,
            self.config.integration.update_documentation,
        );
        let ancillary = updater.run(&changed, &request.request_text).await;
        result.documentation_updated = ancillary.documentation_updated;
        result.config_updated = ancillary.config_updated;
        result.deployment_updated = ancillary.deployment_updated;
        result.errors.extend(ancillary.errors.iter().cloned());
        if ancillary.changed_anything() {
            let message = format!("chore: follow-up updates for {}\n\n{}", branch.name, ancillary.notes.join("\n"));
            if let Err(e) = self.branches.commit_all(&message).await {
                warn!(branch = %branch.name, error = %e, "Could not commit ancillary updates");
                result.errors.push(format!("documentation: {e}"));
            }
        }

        result.phase = IntegrationPhase::Merge;
        if request.allow_merge && self.config.integration.auto_merge {
            let merge = self
                .branches
                .merge_feature_branch(branch, self.config.branching.squash_merge, Some(message.as_str()))
                .await;
            result.branch_merged = merge.success;
            if !merge.success {
                result.errors.push(format!("merge: {}", merge.message));
            }
        } else {
            debug!(branch = %branch.name, "Merge skipped, changes stay on the feature branch");
        }

        result.phase = IntegrationPhase::Cleanup;
        match self
            .branches
            .create_baseline_snapshot(&format!("baseline after {}", branch.name))
            .await
        {
            Ok(snapshot) => {
                result.next_snapshot_ready = true;
                debug!(branch = %snapshot.branch_name, commit = %snapshot.commit_id, "Next baseline ready");
            }
            Err(e) => {
                warn!(error = %e, "Baseline snapshot failed");
                result.errors.push(format!("cleanup: {e}"));
            }
        }

        result.success = true;
        pipeline_metrics().record_auto_fixes(result.fixes_applied.len());
        info!(
            branch = %branch.name,
            merged = result.branch_merged,
            tests_passing = result.tests_passing,
            fixes = result.fixes_applied.len(),
            duration_ms = timer.elapsed_ms(),
            "Integration finished"
        );
        timer.finish();
        result
    }

    /// Build, auto-fix and rebuild. Returns whether the build passes.
    async fn compile(&self, project: &Path, fixer: &AutoFixer, result: &mut IntegrationResult) -> bool {
        let build = self.config.commands.build.as_ref();
        let timeout = self.config.timeouts.build();

        let mut output = match self.run(project, build, &[], timeout).await {
            RunOutcome::NotConfigured => {
                debug!("No build command configured, skipping compilation");
                return true;
            }
            RunOutcome::Passed => return true,
            RunOutcome::Failed(output) => output,
        };

        for attempt in 1..=self.config.integration.max_fix_attempts {
            let diagnostics = parse_compiler_output(&output);
            let count = diagnostics.len();
            let fixes = off_runtime(fixer, move |fixer| fixer.fix_compilation(&diagnostics))
                .await
                .unwrap_or_default();
            if fixes.is_empty() {
                debug!(attempt, diagnostics = count, "No applicable compilation fixes");
                break;
            }
            result.fixes_applied.extend(fixes);

            match self.run(project, build, &[], timeout).await {
                RunOutcome::Passed | RunOutcome::NotConfigured => {
                    info!(attempt, "Compilation fixed automatically");
                    result.compilation_fixed = true;
                    return true;
                }
                RunOutcome::Failed(next) => output = next,
            }
        }

        error!("Compilation still failing, aborting integration");
        result.errors.push(format!("compilation: {}", output_tail(&output, 20)));
        false
    }

    /// Test, attempt repairs and retest. Never aborts integration.
    async fn test(&self, project: &Path, fixer: &AutoFixer, result: &mut IntegrationResult) {
        let test = self.config.commands.test.as_ref();
        let timeout = self.config.timeouts.test();

        let mut output = match self.run(project, test, &[], timeout).await {
            RunOutcome::NotConfigured | RunOutcome::Passed => return,
            RunOutcome::Failed(output) => output,
        };
        result.tests_passing = false;

        for attempt in 1..=self.config.integration.max_fix_attempts {
            let mut applied = Vec::new();
            let mut update_snapshots = false;
            for fix in fixer.detect_test_fixes(&output) {
                match fix {
                    TestFix::MissingDependency { module } => {
                        let sync = self.config.commands.dependency_sync.as_ref();
                        let extra = [module.clone()];
                        if let RunOutcome::Passed = self.run(project, sync, &extra, self.config.timeouts.ancillary()).await {
                            applied.push(format!("Installed missing test dependency '{module}'"));
                        }
                    }
                    TestFix::StaleExpectation {
                        file,
                        line,
                        expected,
                        received,
                    } => {
                        let edit = off_runtime(fixer, move |fixer| {
                            fixer.apply_stale_expectation(&file, line, &expected, &received)
                        });
                        if let Some(description) = edit.await.flatten() {
                            applied.push(description);
                        }
                    }
                    TestFix::StaleSnapshots => update_snapshots = supports_snapshot_update(test),
                }
            }

            let extra: Vec<String> = if update_snapshots {
                applied.push("Updated stale test snapshots".to_string());
                vec!["--updateSnapshot".to_string()]
            } else {
                Vec::new()
            };
            if applied.is_empty() {
                debug!(attempt, "No applicable test fixes");
                break;
            }
            result.fixes_applied.extend(applied);

            match self.run(project, test, &extra, timeout).await {
                RunOutcome::Passed | RunOutcome::NotConfigured => {
                    info!(attempt, "Tests fixed automatically");
                    result.tests_fixed = true;
                    result.tests_passing = true;
                    return;
                }
                RunOutcome::Failed(next) => output = next,
            }
        }

        warn!("Tests still failing, continuing integration");
        result.errors.push(format!("testing: {}", output_tail(&output, 20)));
    }

    /// Upsert changed files into every registered index, deleting removed ones
    async fn refresh_indexes(&self, project: &Path, changed: &[String], errors: &mut Vec<String>) -> usize {
        let mut refreshed = 0;
        for index in self.indexes.all() {
            for file in changed {
                let path: PathBuf = project.join(file);
                let outcome = match tokio::fs::read_to_string(&path).await {
                    Ok(content) => index
                        .upsert_record(&self.project_id, file, &content)
                        .await
                        .map(|_| ()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        index.delete_record(&self.project_id, file).await
                    }
                    Err(e) => {
                        debug!(file = %file, error = %e, "Skipping unreadable file during index refresh");
                        continue;
                    }
                };
                match outcome {
                    Ok(()) => refreshed += 1,
                    Err(e) => {
                        warn!(index = %index.name(), file = %file, error = %e, "Index refresh failed");
                        errors.push(format!("index {}: {}: {}", index.name(), file, e));
                    }
                }
            }
        }
        refreshed
    }
}

/// Run a file-editing fixer on the blocking pool
async fn off_runtime<T, F>(fixer: &AutoFixer, fix: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce(&AutoFixer) -> T + Send + 'static,
{
    let fixer = fixer.clone();
    match tokio::task::spawn_blocking(move || fix(&fixer)).await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "Auto-fix task did not complete");
            None
        }
    }
}

fn combined_or_status(output: &CommandOutput) -> String {
    let combined = output.combined();
    if combined.trim().is_empty() {
        format!("exited with status {}", output.status_code)
    } else {
        combined
    }
}

fn supports_snapshot_update(test: Option<&Vec<String>>) -> bool {
    test.is_some_and(|argv| argv.iter().any(|arg| arg.contains("jest") || arg.contains("vitest")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_update_only_for_known_runners() {
        let jest = vec!["npx".to_string(), "jest".to_string()];
        let pytest = vec!["pytest".to_string()];
        assert!(supports_snapshot_update(Some(&jest)));
        assert!(!supports_snapshot_update(Some(&pytest)));
        assert!(!supports_snapshot_update(None));
    }

    #[test]
    fn test_empty_failure_output_reports_status() {
        let output = CommandOutput {
            status_code: 2,
            stdout: String::new(),
            stderr: " ".to_string(),
            duration_ms: 1,
        };
        assert_eq!(combined_or_status(&output), "exited with status 2");
    }
}
