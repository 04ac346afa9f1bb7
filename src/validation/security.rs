// Context-aware security scan

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use super::types::{CheckKind, Severity, ValidationWarning};
use crate::impact::FileKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecuritySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SecuritySeverity {
    fn downgrade(self) -> SecuritySeverity {
        match self {
            SecuritySeverity::Critical => SecuritySeverity::High,
            SecuritySeverity::High => SecuritySeverity::Medium,
            _ => SecuritySeverity::Low,
        }
    }

    pub fn warning_level(self) -> Severity {
        match self {
            SecuritySeverity::Critical | SecuritySeverity::High => Severity::Error,
            SecuritySeverity::Medium => Severity::Warning,
            SecuritySeverity::Low => Severity::Info,
        }
    }
}

impl fmt::Display for SecuritySeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SecuritySeverity::Low => "low",
            SecuritySeverity::Medium => "medium",
            SecuritySeverity::High => "high",
            SecuritySeverity::Critical => "critical",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityFinding {
    pub rule: &'static str,
    pub severity: SecuritySeverity,
    pub file: String,
    pub line: u32,
    pub message: &'static str,
}

struct SecurityRule {
    name: &'static str,
    severity: SecuritySeverity,
    message: &'static str,
    regex: Regex,
}

const RULES: &[(&str, SecuritySeverity, &str, &str)] = &[
    (
        "hardcoded-secret",
        SecuritySeverity::Critical,
        "credential literal committed to source",
        r#"(?i)\b(?:api[_-]?key|secret(?:[_-]?key)?|password|passwd|access[_-]?token|private[_-]?key)\b\s*[:=]\s*['"][^'"\s]{8,}['"]"#,
    ),
    (
        "private-key-block",
        SecuritySeverity::Critical,
        "private key material in source",
        r"-----BEGIN (?:RSA |EC |OPENSSH )?PRIVATE KEY-----",
    ),
    (
        "sql-concatenation",
        SecuritySeverity::High,
        "SQL built by string concatenation; use parameters",
        r#"(?i)['"`]\s*(?:SELECT|INSERT|UPDATE|DELETE)\b[^'"`]*['"`]\s*\+\s*\w+"#,
    ),
    (
        "sql-interpolation",
        SecuritySeverity::High,
        "SQL built by interpolation; use parameters",
        r"(?i)(?:`|f['\x22])\s*(?:SELECT|INSERT|UPDATE|DELETE)\b[^`'\x22]*(?:\$\{|\{)\w+",
    ),
    (
        "eval",
        SecuritySeverity::High,
        "dynamic code evaluation",
        r"\beval\s*\(|\bnew\s+Function\s*\(",
    ),
    (
        "shell-injection",
        SecuritySeverity::High,
        "shell command built from dynamic input",
        r"(?:child_process\.)?\bexec(?:Sync)?\s*\(\s*`[^`]*\$\{|subprocess\.\w+\([^)]*shell\s*=\s*True|os\.system\(\s*f['\x22]",
    ),
    (
        "raw-html",
        SecuritySeverity::Medium,
        "raw HTML injection point",
        r"\.innerHTML\s*=|dangerouslySetInnerHTML|\bdocument\.write\(",
    ),
    (
        "plain-http",
        SecuritySeverity::Low,
        "plain HTTP endpoint",
        r#"['"]http://(?:[a-zA-Z0-9-]+\.)+[a-zA-Z]{2,}"#,
    ),
];

static SECURITY_RULES: LazyLock<Vec<SecurityRule>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|&(name, severity, message, pattern)| SecurityRule {
            name,
            severity,
            message,
            regex: Regex::new(pattern).expect("valid security pattern"),
        })
        .collect()
});

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//") || trimmed.starts_with('#') || trimmed.starts_with("/*") || trimmed.starts_with('*')
}

/// Scan one file. Comment lines are skipped and findings in test files
/// drop one severity level.
pub fn scan_security(file: &str, content: &str) -> Vec<SecurityFinding> {
    let in_test = FileKind::classify(file) == FileKind::Test;
    let mut findings = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        if is_comment(line) {
            continue;
        }
        for rule in SECURITY_RULES.iter() {
            if rule.regex.is_match(line) {
                let severity = if in_test { rule.severity.downgrade() } else { rule.severity };
                findings.push(SecurityFinding {
                    rule: rule.name,
                    severity,
                    file: file.to_string(),
                    line: idx as u32 + 1,
                    message: rule.message,
                });
            }
        }
    }
    findings
}

/// Map findings to warnings plus an overall risk warning when high or critical
pub fn security_warnings(findings: &[SecurityFinding]) -> Vec<ValidationWarning> {
    let mut warnings: Vec<ValidationWarning> = findings
        .iter()
        .map(|finding| {
            ValidationWarning::new(
                CheckKind::Security,
                finding.severity.warning_level(),
                format!("[{}] {} ({})", finding.severity, finding.message, finding.rule),
            )
            .at(finding.file.clone(), Some(finding.line))
        })
        .collect();

    if let Some(overall) = findings.iter().map(|finding| finding.severity).max() {
        if overall >= SecuritySeverity::High {
            warnings.push(ValidationWarning::new(
                CheckKind::Security,
                Severity::Error,
                format!("Overall security risk: {overall} ({} finding(s))", findings.len()),
            ));
        }
    }
    warnings
}
