// Build and test output parsing

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use super::types::CompilerDiagnostic;

/// `src/foo.ts(12,34): error TS2304: Cannot find name 'X'.`
static TSC_PAREN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<path>[^\s:(][^():]*)\((?P<line>\d+),(?P<col>\d+)\):\s*error\s*(?:TS\d+:)?\s*(?P<msg>.+)$")
        .expect("valid tsc regex")
});

/// `src/foo.ts:12:34 - error TS2304: ...` and `main.go:3:9: error: ...`
static COLON_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:\./)?(?P<path>[^\s:]+?\.[A-Za-z0-9]+):(?P<line>\d+):(?:(?P<col>\d+):?)?\s*(?:-\s*)?(?:error|fatal error)\b[^:]*:\s*(?P<msg>.+)$",
    )
    .expect("valid colon regex")
});

/// Go and similar tools print `file.go:3:9: message` without an error keyword
static COLON_BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\./)?(?P<path>[^\s:]+?\.(?:go|c|cc|cpp|h|hpp|swift)):(?P<line>\d+):(?P<col>\d+):\s*(?P<msg>.+)$")
        .expect("valid bare colon regex")
});

/// rustc: `error[E0425]: message` followed by ` --> src/main.rs:3:5`
static RUST_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^error(?:\[E\d+\])?:\s*(?P<msg>.+)$").expect("valid rustc header regex"));
static RUST_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*-->\s*(?P<path>[^\s:]+):(?P<line>\d+):(?P<col>\d+)").expect("valid rustc location regex")
});

/// Python tracebacks: `  File "app/main.py", line 4` with the error on a later line
static PYTHON_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*File "(?P<path>[^"]+)", line (?P<line>\d+)"#).expect("valid python regex")
});
static PYTHON_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<msg>\w*(?:Error|Exception)\b.*)$").expect("valid python error regex")
});

static TEST_FAILURE_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // jest / vitest
        r"^\s*FAIL\s+(?P<name>\S+)",
        r"^\s*[✕×]\s+(?P<name>.+?)(?:\s+\(\d+\s*m?s\))?$",
        // pytest
        r"^FAILED\s+(?P<name>\S+)",
        // cargo test
        r"^test\s+(?P<name>\S+)\s+\.\.\.\s+FAILED",
        // tap
        r"^not ok\s+\d+\s+(?:-\s+)?(?P<name>.+)$",
        // go test
        r"^---\s+FAIL:\s+(?P<name>\S+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid test marker regex"))
    .collect()
});

static ANSI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid ansi regex"));

pub fn strip_ansi(text: &str) -> String {
    ANSI.replace_all(text, "").into_owned()
}

fn normalize_path(raw: &str) -> String {
    raw.trim()
        .trim_matches('"')
        .trim_start_matches("./")
        .replace('\\', "/")
}

fn diagnostic(path: &str, line: &str, col: Option<&str>, message: &str) -> Option<CompilerDiagnostic> {
    Some(CompilerDiagnostic {
        file: normalize_path(path),
        line: line.parse().ok()?,
        column: col.and_then(|c| c.parse().ok()),
        message: message.trim().to_string(),
    })
}

/// Extract `{file, line, message}` tuples from compiler output.
///
/// Duplicate diagnostics (same location and message) are reported once.
pub fn parse_compiler_output(output: &str) -> Vec<CompilerDiagnostic> {
    let text = strip_ansi(output);
    let lines: Vec<&str> = text.lines().collect();
    let mut diagnostics = Vec::new();
    let mut seen = HashSet::new();

    let mut push = |diag: Option<CompilerDiagnostic>, diagnostics: &mut Vec<CompilerDiagnostic>| {
        if let Some(diag) = diag {
            if seen.insert((diag.file.clone(), diag.line, diag.message.clone())) {
                diagnostics.push(diag);
            }
        }
    };

    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.trim_end();

        if let Some(caps) = TSC_PAREN.captures(line) {
            push(
                diagnostic(&caps["path"], &caps["line"], caps.name("col").map(|m| m.as_str()), &caps["msg"]),
                &mut diagnostics,
            );
            continue;
        }

        if let Some(caps) = COLON_ERROR.captures(line) {
            push(
                diagnostic(&caps["path"], &caps["line"], caps.name("col").map(|m| m.as_str()), &caps["msg"]),
                &mut diagnostics,
            );
            continue;
        }

        if let Some(caps) = RUST_HEADER.captures(line) {
            let location = lines[idx + 1..]
                .iter()
                .take(4)
                .find_map(|next| RUST_LOCATION.captures(next));
            if let Some(location) = location {
                push(
                    diagnostic(&location["path"], &location["line"], Some(&location["col"]), &caps["msg"]),
                    &mut diagnostics,
                );
            }
            continue;
        }

        if let Some(caps) = PYTHON_LOCATION.captures(line) {
            let message = lines[idx + 1..]
                .iter()
                .take(4)
                .find_map(|next| PYTHON_ERROR.captures(next.trim()).map(|m| m["msg"].to_string()));
            if let Some(message) = message {
                push(diagnostic(&caps["path"], &caps["line"], None, &message), &mut diagnostics);
            }
            continue;
        }

        if let Some(caps) = COLON_BARE.captures(line) {
            push(
                diagnostic(&caps["path"], &caps["line"], Some(&caps["col"]), &caps["msg"]),
                &mut diagnostics,
            );
        }
    }

    diagnostics
}

/// Names of failing tests reported by common runners
pub fn parse_test_failures(output: &str) -> Vec<String> {
    let text = strip_ansi(output);
    let mut failures = Vec::new();
    for line in text.lines() {
        for marker in TEST_FAILURE_MARKERS.iter() {
            if let Some(caps) = marker.captures(line) {
                let name = caps["name"].trim().to_string();
                if !failures.contains(&name) {
                    failures.push(name);
                }
                break;
            }
        }
    }
    failures
}

/// Last `max_lines` non-empty lines, for error messages
pub fn output_tail(output: &str, max_lines: usize) -> String {
    let text = strip_ansi(output);
    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_tsc_paren_format() {
        let output = "src/auth/login.ts(12,5): error TS2304: Cannot find name 'z'.\n";
        let diagnostics = parse_compiler_output(output);
        assert_eq!(
            diagnostics,
            vec![CompilerDiagnostic {
                file: "src/auth/login.ts".to_string(),
                line: 12,
                column: Some(5),
                message: "Cannot find name 'z'.".to_string(),
            }]
        );
    }

    #[test]
    fn test_parses_tsc_pretty_and_gcc_formats() {
        let output = "\x1b[96msrc/a.ts\x1b[0m:3:7 - error TS2322: Type 'string' is not assignable to type 'number'.\n\
                      lib/util.c:10:2: error: expected ';' before '}' token\n";
        let diagnostics = parse_compiler_output(output);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].file, "src/a.ts");
        assert_eq!(diagnostics[0].line, 3);
        assert!(diagnostics[0].message.starts_with("Type 'string'"));
        assert_eq!(diagnostics[1].file, "lib/util.c");
    }

    #[test]
    fn test_parses_rustc_and_python() {
        let output = "error[E0425]: cannot find value `z` in this scope\n --> src/main.rs:3:5\n  |\n\
                      Traceback (most recent call last):\n  File \"app/main.py\", line 4, in <module>\n    import missing\nModuleNotFoundError: No module named 'missing'\n";
        let diagnostics = parse_compiler_output(output);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].file, "src/main.rs");
        assert_eq!(diagnostics[0].message, "cannot find value `z` in this scope");
        assert_eq!(diagnostics[1].file, "app/main.py");
        assert_eq!(diagnostics[1].line, 4);
        assert!(diagnostics[1].message.starts_with("ModuleNotFoundError"));
    }

    #[test]
    fn test_duplicates_are_collapsed() {
        let output = "a.ts(1,1): error TS1005: ';' expected.\na.ts(1,1): error TS1005: ';' expected.\n";
        assert_eq!(parse_compiler_output(output).len(), 1);
    }

    #[test]
    fn test_test_failure_markers() {
        let output = "FAIL src/auth/login.test.ts\n  ✕ rejects empty password (4 ms)\n\
                      test parser::tests::roundtrip ... FAILED\nFAILED tests/test_api.py::test_get\n--- FAIL: TestHandler\n";
        let failures = parse_test_failures(output);
        assert_eq!(
            failures,
            vec![
                "src/auth/login.test.ts",
                "rejects empty password",
                "parser::tests::roundtrip",
                "tests/test_api.py::test_get",
                "TestHandler",
            ]
        );
    }

    #[test]
    fn test_output_tail() {
        assert_eq!(output_tail("a\n\nb\nc\n", 2), "b\nc");
    }
}
