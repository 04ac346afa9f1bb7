//! The fixed set of gate checks.
//!
//! Each check is a variant; the gate walks `ALL` in order and dispatches
//! through `run`. A check returns `Err` only when it could not run at all.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use super::compiler::{output_tail, parse_compiler_output, parse_test_failures};
use super::cycles::{build_import_graph, find_cycle};
use super::gate::ValidationGate;
use super::safety::scan_destructive;
use super::security::{scan_security, security_warnings};
use super::structure::{check_structure, StructureLimits};
use super::types::{CheckFindings, CheckKind, Severity, ValidationError, ValidationIssue, ValidationWarning};
use crate::external::command::split_argv;
use crate::external::CommandError;
use crate::impact::FileKind;

const MAX_LINT_WARNINGS: usize = 20;
const SIMILAR_LIMIT: usize = 5;

/// Inputs shared by every check in a cycle
pub struct CheckContext<'a> {
    pub project_path: &'a Path,
    pub changed_files: &'a [String],
    /// Readable contents of the changed files that still exist
    pub contents: &'a BTreeMap<String, String>,
}

impl CheckContext<'_> {
    fn code_files(&self) -> impl Iterator<Item = (&String, &String)> {
        self.contents
            .iter()
            .filter(|(path, _)| matches!(FileKind::classify(path), FileKind::Code | FileKind::Test))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreCheck {
    Compilation,
    Test,
    DestructiveGuard,
}

impl CoreCheck {
    pub const ALL: [CoreCheck; 3] = [CoreCheck::Compilation, CoreCheck::Test, CoreCheck::DestructiveGuard];

    pub fn kind(self) -> CheckKind {
        match self {
            CoreCheck::Compilation => CheckKind::Compilation,
            CoreCheck::Test => CheckKind::Test,
            CoreCheck::DestructiveGuard => CheckKind::Safety,
        }
    }

    pub async fn run(self, gate: &ValidationGate, ctx: &CheckContext<'_>) -> Result<CheckFindings, ValidationError> {
        match self {
            CoreCheck::Compilation => compilation(gate, ctx).await,
            CoreCheck::Test => tests(gate, ctx).await,
            CoreCheck::DestructiveGuard => Ok(destructive_guard(ctx)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityCheck {
    Structure,
    Lint,
    DependencyCycle,
    Duplication,
    Security,
}

impl QualityCheck {
    pub const ALL: [QualityCheck; 5] = [
        QualityCheck::Structure,
        QualityCheck::Lint,
        QualityCheck::DependencyCycle,
        QualityCheck::Duplication,
        QualityCheck::Security,
    ];

    pub fn kind(self) -> CheckKind {
        match self {
            QualityCheck::Structure => CheckKind::Structure,
            QualityCheck::Lint => CheckKind::Lint,
            QualityCheck::DependencyCycle => CheckKind::DependencyCycle,
            QualityCheck::Duplication => CheckKind::Duplication,
            QualityCheck::Security => CheckKind::Security,
        }
    }

    pub async fn run(self, gate: &ValidationGate, ctx: &CheckContext<'_>) -> Result<CheckFindings, ValidationError> {
        match self {
            QualityCheck::Structure => Ok(structure(gate, ctx)),
            QualityCheck::Lint => lint(gate, ctx).await,
            QualityCheck::DependencyCycle => Ok(dependency_cycle(ctx)),
            QualityCheck::Duplication => duplication(gate, ctx).await,
            QualityCheck::Security => Ok(security(ctx)),
        }
    }
}

fn not_configured(check: CheckKind, what: &str) -> CheckFindings {
    CheckFindings {
        warnings: vec![ValidationWarning::new(
            check,
            Severity::Info,
            format!("No {what} command configured; {check} check skipped"),
        )],
        ..CheckFindings::default()
    }
}

async fn compilation(gate: &ValidationGate, ctx: &CheckContext<'_>) -> Result<CheckFindings, ValidationError> {
    let Some((program, args)) = gate.commands.build.as_deref().and_then(split_argv) else {
        return Ok(not_configured(CheckKind::Compilation, "build"));
    };

    let mut findings = CheckFindings::default();
    let output = match gate
        .executor
        .execute(ctx.project_path, program, args, gate.timeouts.build())
        .await
    {
        Ok(output) => output,
        Err(CommandError::Timeout { command, timeout_ms }) => {
            findings.errors.push(ValidationIssue::blocking(
                CheckKind::Compilation,
                format!("Build `{command}` timed out after {timeout_ms}ms"),
            ));
            return Ok(findings);
        }
        Err(e) => return Err(e.into()),
    };

    if output.success() {
        debug!(duration_ms = output.duration_ms, "Build succeeded");
        return Ok(findings);
    }

    let combined = output.combined();
    let diagnostics = parse_compiler_output(&combined);
    if diagnostics.is_empty() {
        findings.errors.push(ValidationIssue::blocking(
            CheckKind::Compilation,
            format!("Build failed: {}", output_tail(&combined, 5)),
        ));
    } else {
        for diagnostic in diagnostics {
            findings.errors.push(
                ValidationIssue::blocking(CheckKind::Compilation, diagnostic.message)
                    .at(diagnostic.file, Some(diagnostic.line)),
            );
        }
    }
    findings
        .recommendations
        .push("Fix compilation errors before continuing".to_string());
    Ok(findings)
}

async fn tests(gate: &ValidationGate, ctx: &CheckContext<'_>) -> Result<CheckFindings, ValidationError> {
    let Some((program, args)) = gate.commands.test.as_deref().and_then(split_argv) else {
        return Ok(not_configured(CheckKind::Test, "test"));
    };

    let mut findings = CheckFindings::default();
    let output = match gate
        .executor
        .execute(ctx.project_path, program, args, gate.timeouts.test())
        .await
    {
        Ok(output) => output,
        Err(CommandError::Timeout { command, timeout_ms }) => {
            findings.warnings.push(ValidationWarning::new(
                CheckKind::Test,
                Severity::Warning,
                format!("Tests `{command}` timed out after {timeout_ms}ms"),
            ));
            return Ok(findings);
        }
        Err(e) => return Err(e.into()),
    };

    if !output.success() {
        let combined = output.combined();
        let failures = parse_test_failures(&combined);
        if failures.is_empty() {
            findings.warnings.push(ValidationWarning::new(
                CheckKind::Test,
                Severity::Warning,
                format!("Tests failed: {}", output_tail(&combined, 3)),
            ));
        } else {
            for failure in failures {
                findings.warnings.push(ValidationWarning::new(
                    CheckKind::Test,
                    Severity::Warning,
                    format!("Failing test: {failure}"),
                ));
            }
        }
        findings.recommendations.push("Review failing tests".to_string());
    }
    Ok(findings)
}

fn destructive_guard(ctx: &CheckContext<'_>) -> CheckFindings {
    let errors: Vec<ValidationIssue> = ctx
        .contents
        .iter()
        .flat_map(|(path, content)| scan_destructive(path, content))
        .collect();
    let recommendations = if errors.is_empty() {
        Vec::new()
    } else {
        vec!["Remove or explicitly guard destructive operations".to_string()]
    };
    CheckFindings {
        errors,
        recommendations,
        ..CheckFindings::default()
    }
}

fn structure(gate: &ValidationGate, ctx: &CheckContext<'_>) -> CheckFindings {
    let limits = StructureLimits {
        max_file_lines: gate.config.max_file_lines,
        max_declarations: gate.config.max_declarations,
    };
    let warnings: Vec<ValidationWarning> = ctx
        .code_files()
        .flat_map(|(path, content)| check_structure(path, content, limits))
        .collect();
    let recommendations = if warnings.iter().any(|w| w.severity >= Severity::Warning) {
        vec!["Split oversized files along their responsibilities".to_string()]
    } else {
        Vec::new()
    };
    CheckFindings {
        warnings,
        recommendations,
        ..CheckFindings::default()
    }
}

async fn lint(gate: &ValidationGate, ctx: &CheckContext<'_>) -> Result<CheckFindings, ValidationError> {
    let has_lint_config = gate
        .config
        .lint_config_files
        .iter()
        .any(|name| ctx.project_path.join(name).exists());
    if !has_lint_config {
        return Ok(CheckFindings {
            warnings: vec![ValidationWarning::new(
                CheckKind::Lint,
                Severity::Info,
                "No lint configuration found; lint check skipped",
            )],
            ..CheckFindings::default()
        });
    }
    let Some((program, args)) = gate.commands.lint.as_deref().and_then(split_argv) else {
        return Ok(not_configured(CheckKind::Lint, "lint"));
    };

    let output = gate
        .executor
        .execute(ctx.project_path, program, args, gate.timeouts.lint())
        .await?;
    let mut findings = CheckFindings::default();
    if output.success() {
        return Ok(findings);
    }

    let combined = output.combined();
    let diagnostics = parse_compiler_output(&combined);
    if diagnostics.is_empty() {
        findings.warnings.push(ValidationWarning::new(
            CheckKind::Lint,
            Severity::Warning,
            format!("Lint reported problems: {}", output_tail(&combined, 3)),
        ));
    } else {
        for diagnostic in diagnostics.into_iter().take(MAX_LINT_WARNINGS) {
            findings.warnings.push(
                ValidationWarning::new(CheckKind::Lint, Severity::Warning, diagnostic.message)
                    .at(diagnostic.file, Some(diagnostic.line)),
            );
        }
    }
    Ok(findings)
}

fn dependency_cycle(ctx: &CheckContext<'_>) -> CheckFindings {
    let code: BTreeMap<String, String> = ctx
        .code_files()
        .map(|(path, content)| (path.clone(), content.clone()))
        .collect();
    let graph = build_import_graph(&code);

    match find_cycle(&graph) {
        Some(cycle) => CheckFindings {
            warnings: vec![ValidationWarning::new(
                CheckKind::DependencyCycle,
                Severity::Error,
                format!("Dependency cycle: {}", cycle.join(" -> ")),
            )
            .at(cycle[0].clone(), None)],
            errors: Vec::new(),
            recommendations: vec!["Break the import cycle by extracting shared code".to_string()],
        },
        None => CheckFindings::default(),
    }
}

/// >0.8 error-level, 0.6..=0.8 warning, anything lower informational
pub fn similarity_band(similarity: f64) -> Severity {
    if similarity > 0.8 {
        Severity::Error
    } else if similarity >= 0.6 {
        Severity::Warning
    } else {
        Severity::Info
    }
}

async fn duplication(gate: &ValidationGate, ctx: &CheckContext<'_>) -> Result<CheckFindings, ValidationError> {
    let mut findings = CheckFindings::default();
    for (path, content) in ctx.code_files() {
        if content.trim().is_empty() {
            continue;
        }
        let matches = gate
            .index
            .find_similar(&gate.project_id, content, SIMILAR_LIMIT)
            .await?;
        for similar in matches.into_iter().filter(|m| &m.file_path != path) {
            let severity = similarity_band(similar.similarity);
            findings.warnings.push(
                ValidationWarning::new(
                    CheckKind::Duplication,
                    severity,
                    format!(
                        "Similar to {}:{}-{} ({:.0}% similar)",
                        similar.file_path,
                        similar.start_line,
                        similar.end_line,
                        similar.similarity * 100.0
                    ),
                )
                .at(path.clone(), None),
            );
            if severity == Severity::Error {
                let recommendation = format!("Reuse the existing implementation in {}", similar.file_path);
                if !findings.recommendations.contains(&recommendation) {
                    findings.recommendations.push(recommendation);
                }
            }
        }
    }
    Ok(findings)
}

fn security(ctx: &CheckContext<'_>) -> CheckFindings {
    let findings: Vec<_> = ctx
        .contents
        .iter()
        .flat_map(|(path, content)| scan_security(path, content))
        .collect();
    let warnings = security_warnings(&findings);
    let recommendations = if warnings.iter().any(|w| w.severity == Severity::Error) {
        vec!["Address high-severity security findings before merging".to_string()]
    } else {
        Vec::new()
    };
    CheckFindings {
        warnings,
        recommendations,
        ..CheckFindings::default()
    }
}
