use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// What the request is asking for, as far as keywords can tell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestIntent {
    Create,
    Fix,
    Refactor,
    Debug,
    Test,
    Document,
    Update,
}

/// Checked in order; the first matching row wins
static INTENT_PATTERNS: LazyLock<Vec<(RequestIntent, Regex)>> = LazyLock::new(|| {
    [
        (
            RequestIntent::Refactor,
            r"(?i)\b(refactor\w*|restructur\w*|reorganiz\w*|clean\s+up|extract|simplif\w*|decouple)\b",
        ),
        (RequestIntent::Debug, r"(?i)\b(debug\w*|investigat\w*|diagnos\w*|trace|why\s+does)\b"),
        (
            RequestIntent::Fix,
            r"(?i)\b(fix\w*|bug\w*|repair\w*|resolv\w*|broken|crash\w*|error|errors|failing)\b",
        ),
        (RequestIntent::Test, r"(?i)\b(tests?|testing|specs?|coverage|unit\s+tests?)\b"),
        (RequestIntent::Document, r"(?i)\b(document\w*|docs|readme|jsdoc|docstrings?)\b"),
        (
            RequestIntent::Create,
            r"(?i)\b(add|adds|adding|create\w*|implement\w*|new|introduc\w*|build|generate\w*|support)\b",
        ),
    ]
    .into_iter()
    .filter_map(|(intent, pattern)| Regex::new(pattern).ok().map(|regex| (intent, regex)))
    .collect()
});

static TESTING_MENTION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(tests?|testing|specs?|coverage|tdd)\b").ok());

impl RequestIntent {
    pub fn detect(request: &str) -> RequestIntent {
        INTENT_PATTERNS
            .iter()
            .find(|(_, regex)| regex.is_match(request))
            .map(|(intent, _)| *intent)
            .unwrap_or(RequestIntent::Update)
    }

    /// How far cascading analysis walks the dependency graph
    pub fn traversal_depth(self) -> u32 {
        match self {
            RequestIntent::Refactor => 3,
            RequestIntent::Debug | RequestIntent::Test | RequestIntent::Fix | RequestIntent::Update => 2,
            RequestIntent::Create | RequestIntent::Document => 1,
        }
    }

    /// Leading verb for generated task wording
    pub fn verb(self) -> &'static str {
        match self {
            RequestIntent::Create => "Implement",
            RequestIntent::Fix => "Fix",
            RequestIntent::Refactor => "Refactor",
            RequestIntent::Debug => "Investigate and fix",
            RequestIntent::Test => "Add test coverage for",
            RequestIntent::Document => "Document",
            RequestIntent::Update => "Update",
        }
    }

    /// Whether the request likely adds behaviour that deserves new tests
    pub fn implies_new_functionality(self) -> bool {
        matches!(self, RequestIntent::Create | RequestIntent::Test)
    }

    pub fn primary_task(self, path: &str, request: &str) -> String {
        format!("{} the change in {}: {}", self.verb(), path, request)
    }

    pub fn cascading_task(self, path: &str, source: &str, request: &str) -> String {
        match self {
            RequestIntent::Refactor => format!(
                "Update {path} to follow the refactored interface of {source} ({request})"
            ),
            RequestIntent::Fix | RequestIntent::Debug => format!(
                "Verify {path} still behaves correctly after the fix in {source} ({request})"
            ),
            _ => format!("Adapt {path} to the changes in {source} ({request})"),
        }
    }
}

pub fn mentions_testing(request: &str) -> bool {
    TESTING_MENTION
        .as_ref()
        .map(|regex| regex.is_match(request))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_intent() {
        assert_eq!(
            RequestIntent::detect("add input validation to the login handler"),
            RequestIntent::Create
        );
        assert_eq!(RequestIntent::detect("Refactor the session store"), RequestIntent::Refactor);
        assert_eq!(RequestIntent::detect("fix crash when token expires"), RequestIntent::Fix);
        assert_eq!(RequestIntent::detect("debug the slow checkout"), RequestIntent::Debug);
        assert_eq!(RequestIntent::detect("write tests for the parser"), RequestIntent::Test);
        assert_eq!(RequestIntent::detect("document the public API"), RequestIntent::Document);
        assert_eq!(RequestIntent::detect("make the header blue"), RequestIntent::Update);
    }

    #[test]
    fn test_depth_follows_intent() {
        assert_eq!(RequestIntent::Refactor.traversal_depth(), 3);
        assert_eq!(RequestIntent::Debug.traversal_depth(), 2);
        assert_eq!(RequestIntent::Test.traversal_depth(), 2);
        assert_eq!(RequestIntent::Create.traversal_depth(), 1);
    }

    #[test]
    fn test_wording_changes_with_intent() {
        let create = RequestIntent::Create.primary_task("src/a.ts", "add x");
        let fix = RequestIntent::Fix.primary_task("src/a.ts", "fix x");
        assert!(create.starts_with("Implement"));
        assert!(fix.starts_with("Fix"));
    }

    #[test]
    fn test_only_new_work_implies_new_tests() {
        assert!(RequestIntent::Create.implies_new_functionality());
        assert!(RequestIntent::Test.implies_new_functionality());
        assert!(!RequestIntent::Update.implies_new_functionality());
        assert!(!RequestIntent::Fix.implies_new_functionality());
    }

    #[test]
    fn test_mentions_testing() {
        assert!(mentions_testing("improve coverage of auth"));
        assert!(!mentions_testing("rename the contest page"));
    }
}
