// Structural (single-responsibility style) checks on changed code files

use regex::Regex;
use std::sync::LazyLock;

use super::types::{CheckKind, Severity, ValidationWarning};

/// Function, class and method declarations in the languages we scan
static DECLARATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Rust
        r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+\w+",
        // JavaScript/TypeScript
        r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*\w+",
        r"^\s*(?:export\s+)?(?:const|let|var)\s+\w+\s*=\s*(?:async\s+)?(?:\([^)]*\)|\w+)\s*=>",
        r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+\w+",
        // Python
        r"^\s*(?:async\s+)?def\s+\w+",
        r"^\s*class\s+\w+",
        // Go
        r"^\s*func\s+(?:\(\w+\s+\*?\w+\)\s+)?\w+",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid declaration pattern"))
    .collect()
});

/// A parameter list with six or more entries
static LONG_PARAMETER_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:fn|function|def|func)\s+\w+\s*(?:<[^>]*>)?\(([^()]*,){5,}[^()]*\)")
        .expect("valid parameter list pattern")
});

#[derive(Debug, Clone, Copy)]
pub struct StructureLimits {
    pub max_file_lines: usize,
    pub max_declarations: usize,
}

pub fn count_declarations(content: &str) -> usize {
    content
        .lines()
        .filter(|line| DECLARATION_PATTERNS.iter().any(|pattern| pattern.is_match(line)))
        .count()
}

pub fn check_structure(file: &str, content: &str, limits: StructureLimits) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let lines = content.lines().count();
    if lines > limits.max_file_lines {
        warnings.push(
            ValidationWarning::new(
                CheckKind::Structure,
                Severity::Warning,
                format!(
                    "File has {lines} lines (limit {}); consider splitting responsibilities",
                    limits.max_file_lines
                ),
            )
            .at(file, None),
        );
    }

    let declarations = count_declarations(content);
    if declarations > limits.max_declarations {
        warnings.push(
            ValidationWarning::new(
                CheckKind::Structure,
                Severity::Warning,
                format!(
                    "File declares {declarations} functions or classes (limit {}); it may have more than one responsibility",
                    limits.max_declarations
                ),
            )
            .at(file, None),
        );
    }

    for (idx, line) in content.lines().enumerate() {
        if LONG_PARAMETER_LIST.is_match(line) {
            warnings.push(
                ValidationWarning::new(
                    CheckKind::Structure,
                    Severity::Info,
                    "Function takes six or more parameters; consider a parameter object",
                )
                .at(file, Some(idx as u32 + 1)),
            );
        }
    }

    warnings
}
