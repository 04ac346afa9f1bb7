use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

use super::ordering::order_tasks;
use super::tasks::{convert_tasks, FileTask};
use super::types::{
    format_elapsed, ImpactSummary, OrchestrationError, OrchestrationOptions, OrchestrationPhase,
    OrchestrationResult, TaskFailure,
};
use crate::branching::{
    BranchEvent, BranchManager, FeatureBranch, RollbackOptions, RollbackStrategy,
};
use crate::cache::ScopedCache;
use crate::config::PatchwrightConfig;
use crate::external::CommandExecutor;
use crate::generator::{ContentGenerator, GenerationRequest};
use crate::impact::{ImpactAnalyzer, ImpactCategory, ImpactResult};
use crate::index::IndexRegistry;
use crate::integration::{IntegrationPipeline, IntegrationRequest};
use crate::observability::{pipeline_metrics, OperationTimer};
use crate::shutdown::CancellationToken;
use crate::telemetry::{create_orchestration_span, generate_correlation_id};
use crate::validation::{GateStage, ValidationGate};

/// Drives one change request through every phase: impact analysis, branch
/// creation, task conversion, gates, snapshots, generation, integration.
pub struct Orchestrator {
    project: PathBuf,
    project_id: String,
    config: PatchwrightConfig,
    indexes: IndexRegistry,
    generator: Arc<dyn ContentGenerator>,
    branches: Arc<BranchManager>,
    gate: ValidationGate,
    integration: IntegrationPipeline,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        project: &Path,
        project_id: impl Into<String>,
        config: PatchwrightConfig,
        executor: Arc<dyn CommandExecutor>,
        indexes: IndexRegistry,
        generator: Arc<dyn ContentGenerator>,
    ) -> Self {
        let project_id = project_id.into();
        let branches = Arc::new(BranchManager::for_project(
            project,
            executor.clone(),
            config.branching.clone(),
            config.timeouts.git(),
        ));
        let gate = ValidationGate::new(executor.clone(), indexes.primary(), project_id.clone(), &config);
        let integration = IntegrationPipeline::new(
            executor,
            branches.clone(),
            indexes.clone(),
            project_id.clone(),
            config.clone(),
        );
        Self {
            project: project.to_path_buf(),
            project_id,
            config,
            indexes,
            generator,
            branches,
            gate,
            integration,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn branches(&self) -> &Arc<BranchManager> {
        &self.branches
    }

    pub async fn orchestrate(
        &self,
        request: &str,
        options: &OrchestrationOptions,
    ) -> Result<OrchestrationResult, OrchestrationError> {
        let correlation_id = generate_correlation_id();
        let span = create_orchestration_span(&correlation_id, &self.project.display().to_string(), request);
        self.run(correlation_id, request, options).instrument(span).await
    }

    async fn run(
        &self,
        correlation_id: String,
        request: &str,
        options: &OrchestrationOptions,
    ) -> Result<OrchestrationResult, OrchestrationError> {
        let timer = OperationTimer::new("orchestration");
        pipeline_metrics().record_run();
        let mut result = OrchestrationResult::new(correlation_id.clone());
        info!(
            skip_gates = options.skip_gates,
            force = options.force,
            dry_run = options.dry_run,
            auto_rollback = options.auto_rollback,
            "Orchestration started"
        );

        // Impact analysis
        result.phase = OrchestrationPhase::ImpactAnalysis;
        let analyzer = ImpactAnalyzer::new(self.indexes.primary(), self.project_id.clone())
            .with_cache(ScopedCache::new(format!("impact:{correlation_id}"), &self.config.cache))
            .with_excluded(crate::fs::build_globset(&self.config.reconciliation.ignore_patterns));
        let impact = analyzer.analyze(&self.project, request, &options.explicit_files).await;
        result.impact = Some(summarize(&impact));
        if impact.total_files == 0 {
            result.message = "No affected files were identified for this request".to_string();
            result.next_steps.push("Name the files to change explicitly".to_string());
            return Ok(finish(result, None, timer));
        }
        if self.cancel.is_cancelled() {
            result.message = "Cancelled before branch creation".to_string();
            return Ok(finish(result, None, timer));
        }

        // Branch creation
        result.phase = OrchestrationPhase::BranchCreation;
        let mut branch = self.branches.create_feature_branch(request).await?;
        result.branch_name = Some(branch.name.clone());

        // Task conversion
        result.phase = OrchestrationPhase::TaskConversion;
        let tasks = match order_tasks(convert_tasks(&impact, request)) {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "Task dependencies cannot be ordered");
                branch.transition(BranchEvent::Abandon);
                if let Err(return_error) = self.branches.return_to_parent(&branch).await {
                    warn!(error = %return_error, "Failed to return to parent branch");
                }
                return Err(e);
            }
        };
        debug!(tasks = tasks.len(), "Tasks ordered");
        if self.cancel.is_cancelled() {
            return Ok(self.abandon(result, branch, timer).await);
        }

        // Pre-execution gate
        let mut pre_passed = true;
        if !options.skip_gates {
            result.phase = OrchestrationPhase::PreValidation;
            let existing: Vec<String> = tasks
                .iter()
                .map(|task| task.path.clone())
                .filter(|path| self.project.join(path).is_file())
                .collect();
            let report = self.gate.validate(&self.project, &existing, GateStage::Pre).await;
            pre_passed = report.passed();
            let blocking = report.blocking_errors().len();
            result.validation_results.push(report);

            if !pre_passed && !options.force {
                warn!(blocking_errors = blocking, "Pre-execution validation failed, aborting");
                branch.transition(BranchEvent::Fail {
                    reason: format!("pre-execution validation found {blocking} blocking errors"),
                });
                if let Err(e) = self.branches.return_to_parent(&branch).await {
                    warn!(error = %e, "Failed to return to parent branch");
                }
                result.message = format!(
                    "Pre-execution validation failed with {blocking} blocking error(s); no changes were made"
                );
                result
                    .next_steps
                    .push("Resolve the blocking errors or re-run with --force".to_string());
                return Ok(finish(result, Some(&branch), timer));
            }
            if !pre_passed {
                warn!(blocking_errors = blocking, "Pre-execution validation failed, continuing because of --force");
            }
        }

        // Pre-execution snapshot
        result.phase = OrchestrationPhase::PreSnapshot;
        if let Err(e) = self
            .branches
            .create_snapshot(&mut branch, "pre-execution", pre_passed, &[])
            .await
        {
            error!(error = %e, "Pre-execution snapshot failed");
            branch.transition(BranchEvent::Fail {
                reason: format!("pre-execution snapshot failed: {e}"),
            });
            if let Err(return_error) = self.branches.return_to_parent(&branch).await {
                warn!(error = %return_error, "Failed to return to parent branch");
            }
            result.message = format!("Could not record the pre-execution snapshot: {e}");
            return Ok(finish(result, Some(&branch), timer));
        }

        if options.dry_run {
            if let Err(e) = self.branches.return_to_parent(&branch).await {
                warn!(error = %e, "Failed to return to parent branch");
            }
            result.success = true;
            result.message = format!(
                "Dry run: {} task(s) planned on {}, nothing was executed",
                tasks.len(),
                branch.name
            );
            result.next_steps.push(format!(
                "Re-run without --dry-run to apply {} task(s) (estimated {})",
                tasks.len(),
                impact.estimated_time
            ));
            append_impact_warnings(&mut result, &impact);
            return Ok(finish(result, Some(&branch), timer));
        }

        // Task execution
        result.phase = OrchestrationPhase::TaskExecution;
        if !self.execute_tasks(&tasks, &mut branch, &mut result).await {
            return Ok(self.abandon(result, branch, timer).await);
        }

        if result.completed_tasks.is_empty() {
            error!(failed = result.failed_tasks.len(), "Every task failed");
            branch.transition(BranchEvent::Fail {
                reason: "every task failed".to_string(),
            });
            self.rollback_or_return(&mut branch, &mut result, options.auto_rollback).await;
            result.message = format!("All {} task(s) failed; nothing to integrate", result.failed_tasks.len());
            result.next_steps.push("Review failed tasks and the generator configuration".to_string());
            return Ok(finish(result, Some(&branch), timer));
        }

        // Post-execution snapshot
        result.phase = OrchestrationPhase::PostSnapshot;
        let tasks_clean = result.failed_tasks.is_empty();
        if let Err(e) = self
            .branches
            .create_snapshot(&mut branch, "post-execution", tasks_clean, &[])
            .await
        {
            warn!(error = %e, "Post-execution snapshot failed");
        }
        if self.cancel.is_cancelled() {
            return Ok(self.abandon(result, branch, timer).await);
        }

        // Post-execution gate
        let mut post_passed = true;
        if !options.skip_gates {
            result.phase = OrchestrationPhase::PostValidation;
            let changed = match self.branches.changed_files(&branch).await {
                Ok(changed) => changed,
                Err(e) => {
                    warn!(error = %e, "Could not list changed files, validating completed tasks");
                    result.completed_tasks.clone()
                }
            };
            let report = self.gate.validate(&self.project, &changed, GateStage::Post).await;
            post_passed = report.passed();
            let blocking = report.blocking_errors().len();
            result.validation_results.push(report);

            if !post_passed {
                warn!(blocking_errors = blocking, "Post-execution validation failed");
                branch.transition(BranchEvent::Fail {
                    reason: format!("post-execution validation found {blocking} blocking errors"),
                });
                if options.auto_rollback {
                    self.rollback_or_return(&mut branch, &mut result, true).await;
                    result.message = format!(
                        "Post-execution validation failed with {blocking} blocking error(s); changes were rolled back"
                    );
                } else {
                    result.message = format!(
                        "Post-execution validation failed with {blocking} blocking error(s); changes left on {}",
                        branch.name
                    );
                    result.next_steps.push(format!(
                        "Inspect {} and roll back, or fix the blocking errors and re-validate",
                        branch.name
                    ));
                }
                append_task_steps(&mut result);
                return Ok(finish(result, Some(&branch), timer));
            }
        }
        if self.cancel.is_cancelled() {
            return Ok(self.abandon(result, branch, timer).await);
        }

        // Integration
        result.phase = OrchestrationPhase::Integration;
        let integration = self
            .integration
            .integrate(
                &mut branch,
                &self.project,
                &IntegrationRequest {
                    request_text: request.to_string(),
                    allow_merge: result.failed_tasks.is_empty(),
                    validation_passed: post_passed,
                },
            )
            .await;

        if !integration.success {
            error!(phase = %integration.phase, errors = ?integration.errors, "Integration failed");
            branch.transition(BranchEvent::Fail {
                reason: format!("integration failed during {}", integration.phase),
            });
            if options.auto_rollback {
                self.rollback_or_return(&mut branch, &mut result, true).await;
            } else {
                result.next_steps.push(format!(
                    "Integration stopped at the {} phase; fix the errors on {} and commit manually",
                    integration.phase, branch.name
                ));
            }
            result.message = format!(
                "Integration failed during {}: {}",
                integration.phase,
                integration.errors.first().map(String::as_str).unwrap_or("unknown error")
            );
            result.integration_result = Some(integration);
            append_task_steps(&mut result);
            return Ok(finish(result, Some(&branch), timer));
        }

        if !integration.branch_merged {
            branch.transition(BranchEvent::Complete);
            result.next_steps.push(format!(
                "Manually merge {} into {}",
                branch.name, branch.parent_branch
            ));
        }
        if !integration.tests_passing {
            result.next_steps.push("Fix the failing tests".to_string());
        }
        append_task_steps(&mut result);
        append_impact_warnings(&mut result, &impact);

        result.phase = OrchestrationPhase::Completed;
        result.success = result.failed_tasks.is_empty();
        result.message = if result.success {
            format!(
                "Completed {} task(s){}",
                result.completed_tasks.len(),
                if integration.branch_merged {
                    format!(" and merged into {}", branch.parent_branch)
                } else {
                    format!(" on {}", branch.name)
                }
            )
        } else {
            format!(
                "Completed {} of {} task(s); {} failed",
                result.completed_tasks.len(),
                result.completed_tasks.len() + result.failed_tasks.len(),
                result.failed_tasks.len()
            )
        };
        result.integration_result = Some(integration);
        Ok(finish(result, Some(&branch), timer))
    }

    /// Run tasks in order. Returns `false` when cancelled part-way.
    async fn execute_tasks(
        &self,
        tasks: &[FileTask],
        branch: &mut FeatureBranch,
        result: &mut OrchestrationResult,
    ) -> bool {
        let mut failed: HashSet<String> = HashSet::new();
        for task in tasks {
            if self.cancel.is_cancelled() {
                info!(remaining = tasks.len() - result.completed_tasks.len() - result.failed_tasks.len(), "Cancelled between tasks");
                return false;
            }

            if let Some(dependency) = task.dependencies.iter().find(|d| failed.contains(*d)) {
                debug!(file = %task.path, dependency = %dependency, "Skipping task with failed dependency");
                failed.insert(task.path.clone());
                result.failed_tasks.push(TaskFailure {
                    path: task.path.clone(),
                    reason: "dependency failed".to_string(),
                });
                pipeline_metrics().record_task(false);
                continue;
            }

            let generation = GenerationRequest {
                file_path: task.path.clone(),
                task_description: task.task.clone(),
                dependencies: task.dependencies.clone(),
                validation_criteria: task.validation_criteria.clone(),
                directive: task.instructions.clone(),
                change_kind: task.change_kind,
                project_path: self.project.clone(),
            };
            let reason = match self.generator.generate(&generation).await {
                Ok(outcome) if outcome.success => None,
                Ok(outcome) => Some(outcome.message),
                Err(e) => Some(e.to_string()),
            };

            match reason {
                None => {
                    info!(file = %task.path, priority = ?task.priority, "Task completed");
                    pipeline_metrics().record_task(true);
                    result.completed_tasks.push(task.path.clone());
                    if task.priority.warrants_snapshot() {
                        let description = format!("after {}", task.path);
                        if let Err(e) = self
                            .branches
                            .create_snapshot(branch, &description, true, std::slice::from_ref(&task.path))
                            .await
                        {
                            warn!(file = %task.path, error = %e, "Task snapshot failed");
                        }
                    }
                }
                Some(reason) => {
                    warn!(file = %task.path, reason = %reason, "Task failed");
                    pipeline_metrics().record_task(false);
                    failed.insert(task.path.clone());
                    result.failed_tasks.push(TaskFailure {
                        path: task.path.clone(),
                        reason,
                    });
                }
            }
        }
        true
    }

    /// Complete rollback when asked to, otherwise just leave the branch
    async fn rollback_or_return(&self, branch: &mut FeatureBranch, result: &mut OrchestrationResult, rollback: bool) {
        if !rollback {
            if let Err(e) = self.branches.return_to_parent(branch).await {
                warn!(error = %e, "Failed to return to parent branch");
            }
            return;
        }

        result.phase = OrchestrationPhase::Rollback;
        let outcome = self
            .branches
            .perform_rollback(
                branch,
                &RollbackOptions {
                    strategy: RollbackStrategy::Complete,
                    create_backup_branch: self.config.branching.backup_before_rollback,
                },
            )
            .await;
        pipeline_metrics().record_rollback();
        result.rollback_performed = outcome.success;
        if !outcome.success {
            error!(message = %outcome.message, "Rollback failed");
            result.next_steps.push(format!("Rollback failed ({}); restore {} manually", outcome.message, branch.name));
        }
        if let Err(e) = self.branches.return_to_parent(branch).await {
            warn!(error = %e, "Failed to return to parent branch");
        }
        result.rollback = Some(outcome);
    }

    async fn abandon(&self, mut result: OrchestrationResult, mut branch: FeatureBranch, timer: OperationTimer) -> OrchestrationResult {
        warn!(branch = %branch.name, phase = %result.phase, "Orchestration cancelled");
        branch.transition(BranchEvent::Abandon);
        if let Err(e) = self.branches.return_to_parent(&branch).await {
            warn!(error = %e, "Failed to return to parent branch");
        }
        result.message = format!("Cancelled during {}", result.phase);
        result
            .next_steps
            .push(format!("Snapshots recorded so far remain on {}", branch.name));
        finish(result, Some(&branch), timer)
    }
}

fn summarize(impact: &ImpactResult) -> ImpactSummary {
    ImpactSummary {
        total_files: impact.total_files,
        primary: impact.category(ImpactCategory::Primary).len(),
        cascading: impact.category(ImpactCategory::Cascading).len(),
        config: impact.category(ImpactCategory::Config).len(),
        documentation: impact.category(ImpactCategory::Documentation).len(),
        test: impact.category(ImpactCategory::Test).len(),
        deployment: impact.category(ImpactCategory::Deployment).len(),
        risk_level: impact.risk_level,
        estimated_time: impact.estimated_time.clone(),
        warnings: impact.analysis_warnings.clone(),
    }
}

fn append_task_steps(result: &mut OrchestrationResult) {
    if !result.failed_tasks.is_empty() {
        let files: Vec<&str> = result.failed_tasks.iter().map(|f| f.path.as_str()).collect();
        result.next_steps.push(format!("Review failed tasks: {}", files.join(", ")));
    }
}

fn append_impact_warnings(result: &mut OrchestrationResult, impact: &ImpactResult) {
    if impact.is_partial() {
        result.next_steps.push(format!(
            "Impact analysis was partial ({} lookup(s) failed); check dependents manually",
            impact.analysis_warnings.len()
        ));
    }
}

fn finish(mut result: OrchestrationResult, branch: Option<&FeatureBranch>, timer: OperationTimer) -> OrchestrationResult {
    if let Some(branch) = branch {
        result.branch_name = Some(branch.name.clone());
        result.branch_status = Some(branch.status());
        result.snapshots = branch.snapshots.clone();
    }
    result.duration_ms = timer.finish();
    result.estimated_time_actual = format_elapsed(result.duration_ms);
    info!(
        success = result.success,
        phase = %result.phase,
        completed = result.completed_tasks.len(),
        failed = result.failed_tasks.len(),
        blocking_errors = result.blocking_error_count(),
        "Orchestration finished"
    );
    result
}
