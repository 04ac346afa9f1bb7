use crate::impact::RequestIntent;

const SUBJECT_LIMIT: usize = 72;
const FILE_LIST_LIMIT: usize = 10;

/// Inputs to a structured integration commit message
#[derive(Debug, Clone, Default)]
pub struct CommitSummary<'a> {
    pub request_text: &'a str,
    pub files: &'a [String],
    pub fixes_applied: &'a [String],
    pub build_passing: bool,
    pub tests_passing: bool,
    pub validation_passed: bool,
}

fn conventional_type(intent: RequestIntent) -> &'static str {
    match intent {
        RequestIntent::Create => "feat",
        RequestIntent::Fix | RequestIntent::Debug => "fix",
        RequestIntent::Refactor => "refactor",
        RequestIntent::Test => "test",
        RequestIntent::Document => "docs",
        RequestIntent::Update => "chore",
    }
}

fn subject(request_text: &str) -> String {
    let first_line = request_text.lines().next().unwrap_or("").trim();
    let prefix = format!("{}: ", conventional_type(RequestIntent::detect(request_text)));
    let budget = SUBJECT_LIMIT - prefix.len();
    let summary = if first_line.chars().count() > budget {
        let truncated: String = first_line.chars().take(budget - 3).collect();
        format!("{}...", truncated.trim_end())
    } else {
        first_line.to_string()
    };
    format!("{prefix}{summary}")
}

fn badge(label: &str, ok: bool, good: &str, bad: &str) -> String {
    format!("[{label}: {}]", if ok { good } else { bad })
}

/// Subject, request body, file list, auto-fixes and status badges
pub fn build_commit_message(summary: &CommitSummary<'_>) -> String {
    let mut message = subject(summary.request_text);
    message.push_str("\n\n");
    message.push_str(summary.request_text.trim());

    if !summary.files.is_empty() {
        message.push_str(&format!("\n\nFiles changed ({}):", summary.files.len()));
        for file in summary.files.iter().take(FILE_LIST_LIMIT) {
            message.push_str("\n- ");
            message.push_str(file);
        }
        if summary.files.len() > FILE_LIST_LIMIT {
            message.push_str(&format!("\n- +{} more", summary.files.len() - FILE_LIST_LIMIT));
        }
    }

    if !summary.fixes_applied.is_empty() {
        message.push_str("\n\nAuto-fixes applied:");
        for fix in summary.fixes_applied {
            message.push_str("\n- ");
            message.push_str(fix);
        }
    }

    message.push_str("\n\n");
    message.push_str(
        &[
            badge("build", summary.build_passing, "passing", "failing"),
            badge("tests", summary.tests_passing, "passing", "failing"),
            format!("[{}]", if summary.validation_passed { "validated" } else { "unvalidated" }),
            "[patchwright]".to_string(),
        ]
        .join(" "),
    );
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("src/file{i}.ts")).collect()
    }

    #[test]
    fn test_subject_uses_conventional_prefix() {
        assert_eq!(subject("add input validation"), "feat: add input validation");
        assert_eq!(subject("fix the crash on logout"), "fix: fix the crash on logout");
        assert!(subject(&"refactor ".repeat(20)).len() <= SUBJECT_LIMIT);
        assert!(subject(&"refactor ".repeat(20)).ends_with("..."));
    }

    #[test]
    fn test_file_list_is_capped() {
        let files = files(13);
        let message = build_commit_message(&CommitSummary {
            request_text: "add login",
            files: &files,
            build_passing: true,
            tests_passing: false,
            validation_passed: true,
            ..Default::default()
        });
        assert!(message.contains("Files changed (13):"));
        assert!(message.contains("- src/file9.ts"));
        assert!(!message.contains("- src/file10.ts"));
        assert!(message.contains("- +3 more"));
        assert!(message.ends_with("[build: passing] [tests: failing] [validated] [patchwright]"));
    }

    #[test]
    fn test_auto_fixes_are_listed() {
        let fixes = vec!["Added missing import of 'z' from './util' to src/a.ts".to_string()];
        let message = build_commit_message(&CommitSummary {
            request_text: "update a",
            fixes_applied: &fixes,
            ..Default::default()
        });
        assert!(message.contains("Auto-fixes applied:\n- Added missing import of 'z'"));
        assert!(message.starts_with("chore: update a\n\nupdate a"));
    }
}
