use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::checks::{CheckContext, CoreCheck, QualityCheck};
use super::types::{
    CheckKind, CycleResult, GateReport, GateStage, Severity, ValidationIssue, ValidationWarning,
};
use crate::config::{CommandsConfig, PatchwrightConfig, TimeoutConfig, ValidationConfig};
use crate::external::CommandExecutor;
use crate::index::IndexCollaborator;
use crate::observability::pipeline_metrics;

/// Files larger than this are not scanned
const MAX_SCAN_BYTES: u64 = 1024 * 1024;

/// Runs the blocking core safety cycle and the advisory quality cycle
pub struct ValidationGate {
    pub(crate) executor: Arc<dyn CommandExecutor>,
    pub(crate) index: Arc<dyn IndexCollaborator>,
    pub(crate) project_id: String,
    pub(crate) commands: CommandsConfig,
    pub(crate) timeouts: TimeoutConfig,
    pub(crate) config: ValidationConfig,
}

impl ValidationGate {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        index: Arc<dyn IndexCollaborator>,
        project_id: impl Into<String>,
        config: &PatchwrightConfig,
    ) -> Self {
        Self {
            executor,
            index,
            project_id: project_id.into(),
            commands: config.commands.clone(),
            timeouts: config.timeouts.clone(),
            config: config.validation.clone(),
        }
    }

    /// Compilation, tests (advisory) and the destructive-operation guard.
    ///
    /// Succeeds when no blocking error was recorded.
    pub async fn run_core_cycle(&self, project: &Path, changed_files: &[String]) -> CycleResult {
        let started = Instant::now();
        let contents = load_contents(project, changed_files).await;
        let ctx = CheckContext {
            project_path: project,
            changed_files,
            contents: &contents,
        };

        let mut result = CycleResult::default();
        for check in CoreCheck::ALL {
            match check.run(self, &ctx).await {
                Ok(findings) => findings.merge_into(&mut result),
                Err(e) => {
                    warn!(check = %check.kind(), error = %e, "Core check could not run");
                    result.warnings.push(could_not_run(check.kind(), &e.to_string()));
                }
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        if result.duration_ms > self.config.core_max_duration_ms {
            result.warnings.push(ValidationWarning::new(
                CheckKind::Budget,
                Severity::Info,
                format!(
                    "Core cycle took {}ms (target {}ms)",
                    result.duration_ms, self.config.core_max_duration_ms
                ),
            ));
        }
        result.success = !result.has_blocking_errors();
        debug!(
            success = result.success,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            duration_ms = result.duration_ms,
            "Core cycle finished"
        );
        result
    }

    /// Structure, lint, dependency cycles, duplication and security.
    ///
    /// Never blocks; a check that cannot run leaves an informational warning
    /// and the remaining checks still run.
    pub async fn run_quality_cycle(&self, project: &Path, changed_files: &[String]) -> CycleResult {
        let started = Instant::now();
        let contents = load_contents(project, changed_files).await;
        let ctx = CheckContext {
            project_path: project,
            changed_files,
            contents: &contents,
        };

        let mut result = CycleResult::default();
        for check in QualityCheck::ALL {
            match check.run(self, &ctx).await {
                Ok(findings) => findings.merge_into(&mut result),
                Err(e) => {
                    warn!(check = %check.kind(), error = %e, "Quality check could not run");
                    result.warnings.push(could_not_run(check.kind(), &e.to_string()));
                }
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        result.success = true;
        debug!(
            warnings = result.warnings.len(),
            duration_ms = result.duration_ms,
            "Quality cycle finished"
        );
        result
    }

    /// Both cycles. A dependency cycle found by the quality cycle is promoted
    /// to a blocking error when `block_on_dependency_cycle` is set.
    pub async fn validate(&self, project: &Path, changed_files: &[String], stage: GateStage) -> GateReport {
        let core = self.run_core_cycle(project, changed_files).await;
        let quality = self.run_quality_cycle(project, changed_files).await;

        let promoted: Vec<ValidationIssue> = if self.config.block_on_dependency_cycle {
            quality
                .warnings
                .iter()
                .filter(|w| w.check == CheckKind::DependencyCycle && w.severity == Severity::Error)
                .map(|w| ValidationIssue {
                    check: CheckKind::DependencyCycle,
                    message: w.message.clone(),
                    file: w.file.clone(),
                    line: w.line,
                    blocking: true,
                })
                .collect()
        } else {
            Vec::new()
        };

        let report = GateReport {
            stage,
            core,
            quality: Some(quality),
            promoted,
        };
        let blocking = report.blocking_errors().len();
        pipeline_metrics().record_gate(blocking);
        info!(
            stage = ?stage,
            passed = report.passed(),
            blocking_errors = blocking,
            warnings = report.warning_count(),
            files = changed_files.len(),
            "Validation gate finished"
        );
        report
    }
}

fn could_not_run(check: CheckKind, reason: &str) -> ValidationWarning {
    ValidationWarning::new(check, Severity::Info, format!("{check} check could not run: {reason}"))
}

/// Contents of the changed files that exist, are small enough and are text
async fn load_contents(project: &Path, changed_files: &[String]) -> BTreeMap<String, String> {
    let mut contents = BTreeMap::new();
    for file in changed_files {
        let path = project.join(file);
        let Ok(metadata) = tokio::fs::metadata(&path).await else {
            continue;
        };
        if !metadata.is_file() || metadata.len() > MAX_SCAN_BYTES {
            continue;
        }
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                if let Ok(text) = String::from_utf8(bytes) {
                    contents.insert(file.clone(), text);
                }
            }
            Err(e) => debug!(file = %file, error = %e, "Skipping unreadable file"),
        }
    }
    contents
}
