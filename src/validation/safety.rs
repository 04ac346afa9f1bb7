// Destructive-operation guard

use regex::Regex;
use std::sync::LazyLock;

use super::types::{CheckKind, ValidationIssue};

struct DestructivePattern {
    name: &'static str,
    description: &'static str,
    regex: Regex,
}

const PATTERNS: &[(&str, &str, &str)] = &[
    (
        "sql-delete-without-where",
        "DELETE without a WHERE clause removes every row",
        r"(?i)\bDELETE\s+FROM\s+[\w.`\x22\[\]]+\s*(?:;|['\x22`]|$)",
    ),
    (
        "sql-drop",
        "DROP of a table, database or schema",
        r"(?i)\bDROP\s+(?:TABLE|DATABASE|SCHEMA)\b",
    ),
    (
        "sql-truncate",
        "TRUNCATE removes every row",
        r"(?i)\bTRUNCATE\s+(?:TABLE\s+)?\w+",
    ),
    (
        "recursive-rm",
        "recursive forced removal of the root, home or a wildcard",
        r"\brm\s+-(?:[a-zA-Z]*[rR][a-zA-Z]*f|[a-zA-Z]*f[a-zA-Z]*[rR])[a-zA-Z]*\s+(?:/|~|\*)",
    ),
    (
        "recursive-remove-api",
        "recursive removal API pointed at the root or home directory",
        r#"(?:shutil\.rmtree|rimraf(?:\.sync)?|fs\.rm(?:Sync)?|remove_dir_all)\(\s*['"](?:/|~)['"/]?"#,
    ),
    (
        "delete-all-documents",
        "unconditional bulk delete",
        r"\.(?:deleteMany|remove|destroy)\(\s*\{\s*\}\s*\)",
    ),
    (
        "force-push",
        "force push rewrites shared history",
        r"\bgit\s+push\s+(?:[^\n]*\s)?(?:-f|--force)\b",
    ),
];

static DESTRUCTIVE_PATTERNS: LazyLock<Vec<DestructivePattern>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .map(|&(name, description, pattern)| DestructivePattern {
            name,
            description,
            regex: Regex::new(pattern).expect("valid destructive pattern"),
        })
        .collect()
});

/// One blocking error per matching line
pub fn scan_destructive(file: &str, content: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if let Some(pattern) = DESTRUCTIVE_PATTERNS.iter().find(|p| p.regex.is_match(line)) {
            issues.push(
                ValidationIssue::blocking(
                    CheckKind::Safety,
                    format!("Destructive operation ({}): {}", pattern.name, pattern.description),
                )
                .at(file, Some(idx as u32 + 1)),
            );
        }
    }
    issues
}
