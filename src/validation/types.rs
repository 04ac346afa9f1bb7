use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::external::CommandError;
use crate::index::IndexError;

/// Which check produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Compilation,
    Test,
    Safety,
    Structure,
    Lint,
    DependencyCycle,
    Duplication,
    Security,
    Budget,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckKind::Compilation => "compilation",
            CheckKind::Test => "test",
            CheckKind::Safety => "safety",
            CheckKind::Structure => "structure",
            CheckKind::Lint => "lint",
            CheckKind::DependencyCycle => "dependency_cycle",
            CheckKind::Duplication => "duplication",
            CheckKind::Security => "security",
            CheckKind::Budget => "budget",
        };
        write!(f, "{label}")
    }
}

/// Level of an advisory finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Advisory finding; never blocks on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub check: CheckKind,
    pub severity: Severity,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl ValidationWarning {
    pub fn new(check: CheckKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            check,
            severity,
            message: message.into(),
            file: None,
            line: None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: Option<u32>) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub check: CheckKind,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub blocking: bool,
}

impl ValidationIssue {
    pub fn blocking(check: CheckKind, message: impl Into<String>) -> Self {
        Self {
            check,
            message: message.into(),
            file: None,
            line: None,
            blocking: true,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: Option<u32>) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self
    }
}

/// Outcome of one gate cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleResult {
    pub success: bool,
    pub duration_ms: u64,
    pub warnings: Vec<ValidationWarning>,
    pub errors: Vec<ValidationIssue>,
    pub recommendations: Vec<String>,
}

impl CycleResult {
    pub fn blocking_errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().filter(|error| error.blocking)
    }

    pub fn has_blocking_errors(&self) -> bool {
        self.errors.iter().any(|error| error.blocking)
    }
}

/// Findings contributed by one check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckFindings {
    pub warnings: Vec<ValidationWarning>,
    pub errors: Vec<ValidationIssue>,
    pub recommendations: Vec<String>,
}

impl CheckFindings {
    pub fn merge_into(self, result: &mut CycleResult) {
        result.warnings.extend(self.warnings);
        result.errors.extend(self.errors);
        for recommendation in self.recommendations {
            if !result.recommendations.contains(&recommendation) {
                result.recommendations.push(recommendation);
            }
        }
    }
}

/// A compiler or type-checker error pointing at a source location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerDiagnostic {
    pub file: String,
    pub line: u32,
    pub column: Option<u32>,
    pub message: String,
}

/// Where in the pipeline the gate runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStage {
    Pre,
    Post,
}

/// Both cycles of one gate run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateReport {
    pub stage: GateStage,
    pub core: CycleResult,
    pub quality: Option<CycleResult>,
    /// Quality findings treated as blocking by configuration
    pub promoted: Vec<ValidationIssue>,
}

impl GateReport {
    pub fn skipped(stage: GateStage) -> Self {
        Self {
            stage,
            core: CycleResult {
                success: true,
                ..CycleResult::default()
            },
            quality: None,
            promoted: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.core.success && self.promoted.is_empty()
    }

    pub fn blocking_errors(&self) -> Vec<&ValidationIssue> {
        self.core.blocking_errors().chain(self.promoted.iter()).collect()
    }

    pub fn warning_count(&self) -> usize {
        self.core.warnings.len() + self.quality.as_ref().map_or(0, |quality| quality.warnings.len())
    }
}

/// Why a check could not run; the gate turns these into informational warnings
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Command failed to run: {0}")]
    Command(#[from] CommandError),
    #[error("Index lookup failed: {0}")]
    Index(#[from] IndexError),
    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },
}
