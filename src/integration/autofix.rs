//! Pattern-matched repairs for common compiler and test failures.
//!
//! Each fixer keys off the shape of one error message and edits files in
//! place. Fixers only act when the edit is unambiguous; anything else is
//! left for a human.

use globset::GlobSet;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::validation::CompilerDiagnostic;

static MISSING_NAME: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"Cannot find name '(?P<name>[A-Za-z_$][\w$]*)'",
        r"NameError: name '(?P<name>[A-Za-z_]\w*)' is not defined",
        r"'?(?P<name>[A-Za-z_$][\w$]*)'? is not defined",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid missing-name pattern"))
    .collect()
});

static TYPE_MISMATCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Type '(?P<from>string|number|boolean)' is not assignable to type '(?P<to>string|number|boolean)'")
        .expect("valid type mismatch pattern")
});

static ASSIGNMENT_RHS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<head>.*?(?:[^=!<>]=|\breturn)\s*)(?P<expr>[^;=>][^;]*?)(?P<tail>;?\s*)$")
        .expect("valid assignment pattern")
});

static MISSING_PROPERTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Property '(?P<prop>\w+)' does not exist on type '(?P<ty>\w+)'")
        .expect("valid missing property pattern")
});

static MISSING_MODULE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"Cannot find module '(?P<module>[^'.][^']*)'",
        r"ModuleNotFoundError: No module named '(?P<module>[^']+)'",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid missing module pattern"))
    .collect()
});

static EXPECTED_RECEIVED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*Expected:\s*(?P<expected>.+?)\s*$\s*^\s*Received:\s*(?P<received>.+?)\s*$")
        .expect("valid expectation pattern")
});

static TEST_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\((?:\./)?(?P<path>[^():\s]+\.(?:test|spec)\.[cm]?[jt]sx?):(?P<line>\d+):\d+\)")
        .expect("valid test location pattern")
});

static STALE_SNAPSHOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+\s+snapshots?\s+failed\b|\bsnapshot\b.*\bmismatched\b|\bobsolete snapshots?\b")
        .expect("valid snapshot pattern")
});

const JS_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Repair the test phase can attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestFix {
    /// A test imports a package that is not installed
    MissingDependency { module: String },
    /// An assertion's expected literal no longer matches
    StaleExpectation {
        file: String,
        line: u32,
        expected: String,
        received: String,
    },
    /// Snapshot files need regenerating
    StaleSnapshots,
}

fn extension(path: &str) -> &str {
    path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
}

fn is_js(path: &str) -> bool {
    JS_EXTENSIONS.contains(&extension(path))
}

fn is_python(path: &str) -> bool {
    extension(path) == "py"
}

/// `from` importing `to`, as a relative JS specifier without extension
fn relative_specifier(from: &str, to: &str) -> String {
    let from_dir: Vec<&str> = from.split('/').collect::<Vec<_>>().split_last().map(|(_, d)| d.to_vec()).unwrap_or_default();
    let mut target: Vec<&str> = to.split('/').collect();

    let common = from_dir
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let ups = from_dir.len() - common;
    target.drain(..common);

    let mut joined = target.join("/");
    if let Some((stem, ext)) = joined.rsplit_once('.') {
        if JS_EXTENSIONS.contains(&ext) {
            joined = stem.to_string();
        }
    }
    if let Some(dir) = joined.strip_suffix("/index") {
        joined = dir.to_string();
    }

    if ups == 0 {
        format!("./{joined}")
    } else {
        format!("{}{}", "../".repeat(ups), joined)
    }
}

fn python_module(path: &str) -> String {
    path.trim_end_matches(".py")
        .trim_end_matches("/__init__")
        .replace('/', ".")
}

/// Index of the line after the file's leading import block
fn import_insertion_line(lines: &[&str]) -> usize {
    let mut insert_at = 0;
    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("import ")
            || trimmed.starts_with("from ")
            || (trimmed.starts_with("const ") && trimmed.contains("require("))
        {
            insert_at = idx + 1;
        } else if !(trimmed.is_empty()
            || trimmed.starts_with("//")
            || trimmed.starts_with('#')
            || trimmed.starts_with("\"use ")
            || trimmed.starts_with("'use "))
        {
            break;
        }
    }
    insert_at
}

/// Edits are blocking filesystem work; async callers run them on the
/// blocking pool.
#[derive(Debug, Clone)]
pub struct AutoFixer {
    project: PathBuf,
}

impl AutoFixer {
    pub fn new(project: &Path) -> Self {
        Self {
            project: project.to_path_buf(),
        }
    }

    /// Absolute location of `file`, or `None` when it would leave the project
    fn resolve(&self, file: &str) -> Option<PathBuf> {
        let path = Path::new(file);
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.project).ok()?
        } else {
            path
        };
        if relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
        {
            Some(self.project.join(relative))
        } else {
            debug!(file = %file, "Refusing auto-fix outside the project root");
            None
        }
    }

    fn read(&self, file: &str) -> Option<String> {
        std::fs::read_to_string(self.resolve(file)?).ok()
    }

    fn write(&self, file: &str, content: &str) -> bool {
        let Some(path) = self.resolve(file) else {
            return false;
        };
        match std::fs::write(path, content) {
            Ok(()) => true,
            Err(e) => {
                debug!(file = %file, error = %e, "Auto-fix could not write file");
                false
            }
        }
    }

    /// Try every compiler fixer on every diagnostic; returns what was changed
    pub fn fix_compilation(&self, diagnostics: &[CompilerDiagnostic]) -> Vec<String> {
        let mut applied = Vec::new();
        for diagnostic in diagnostics {
            let fix = self
                .fix_missing_import(diagnostic)
                .or_else(|| self.fix_type_mismatch(diagnostic))
                .or_else(|| self.fix_missing_property(diagnostic));
            if let Some(description) = fix {
                info!(file = %diagnostic.file, fix = %description, "Applied auto-fix");
                if !applied.contains(&description) {
                    applied.push(description);
                }
            }
        }
        applied
    }

    fn fix_missing_import(&self, diagnostic: &CompilerDiagnostic) -> Option<String> {
        let name = MISSING_NAME
            .iter()
            .find_map(|regex| regex.captures(&diagnostic.message))
            .map(|caps| caps["name"].to_string())?;
        let file = diagnostic.file.as_str();
        let content = self.read(file)?;

        let (exporter, statement) = if is_js(file) {
            let exporter = self.find_exporter(file, &name, is_js, &js_export_pattern(&name)?)?;
            let specifier = relative_specifier(file, &exporter);
            (specifier.clone(), format!("import {{ {name} }} from '{specifier}';"))
        } else if is_python(file) {
            let exporter = self.find_exporter(file, &name, is_python, &python_export_pattern(&name)?)?;
            let module = python_module(&exporter);
            (module.clone(), format!("from {module} import {name}"))
        } else {
            return None;
        };

        if content.lines().any(|line| line.trim() == statement) {
            return None;
        }

        let mut lines: Vec<&str> = content.lines().collect();
        let at = import_insertion_line(&lines);
        lines.insert(at, &statement);
        let mut updated = lines.join("\n");
        if content.ends_with('\n') {
            updated.push('\n');
        }
        self.write(file, &updated)
            .then(|| format!("Added missing import of '{name}' from '{exporter}' to {file}"))
    }

    /// Project file declaring `name`, nearest to `file` first
    fn find_exporter(&self, file: &str, name: &str, same_language: fn(&str) -> bool, pattern: &Regex) -> Option<String> {
        let mut candidates: Vec<String> = crate::fs::list_project_files(&self.project, &GlobSet::empty())
            .into_iter()
            .filter(|candidate| candidate != file && same_language(candidate))
            .filter(|candidate| self.read(candidate).map(|c| pattern.is_match(&c)).unwrap_or(false))
            .collect();
        candidates.sort_by_key(|candidate| (relative_specifier(file, candidate).matches("../").count(), candidate.clone()));
        debug!(name = %name, candidates = candidates.len(), "Looked up declaration for missing name");
        candidates.into_iter().next()
    }

    fn fix_type_mismatch(&self, diagnostic: &CompilerDiagnostic) -> Option<String> {
        let caps = TYPE_MISMATCH.captures(&diagnostic.message)?;
        let convert = match &caps["to"] {
            "number" => "Number",
            "string" => "String",
            _ => "Boolean",
        };
        let content = self.read(&diagnostic.file)?;
        let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
        let idx = (diagnostic.line as usize).checked_sub(1)?;
        let line = lines.get(idx)?;
        let rhs = ASSIGNMENT_RHS.captures(line)?;
        let expr = rhs["expr"].trim();
        if expr.starts_with(&format!("{convert}(")) {
            return None;
        }
        let rewritten = format!("{}{}({}){}", &rhs["head"], convert, expr, &rhs["tail"]);
        lines[idx] = rewritten;

        let mut updated = lines.join("\n");
        if content.ends_with('\n') {
            updated.push('\n');
        }
        self.write(&diagnostic.file, &updated).then(|| {
            format!(
                "Converted {} to {} at {}:{}",
                &caps["from"], &caps["to"], diagnostic.file, diagnostic.line
            )
        })
    }

    fn fix_missing_property(&self, diagnostic: &CompilerDiagnostic) -> Option<String> {
        let caps = MISSING_PROPERTY.captures(&diagnostic.message)?;
        let prop = &caps["prop"];
        let ty = &caps["ty"];
        let declaration = Regex::new(&format!(
            r"^\s*(?:export\s+)?(?:interface\s+{ty}\b[^{{]*\{{|type\s+{ty}\s*=\s*\{{)\s*$",
            ty = regex::escape(ty)
        ))
        .ok()?;

        let mut files = vec![diagnostic.file.clone()];
        files.extend(
            crate::fs::list_project_files(&self.project, &GlobSet::empty())
                .into_iter()
                .filter(|f| is_js(f) && f != &diagnostic.file),
        );

        for file in files {
            let Some(content) = self.read(&file) else {
                continue;
            };
            let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
            let Some(at) = lines.iter().position(|line| declaration.is_match(line)) else {
                continue;
            };
            lines.insert(at + 1, format!("  {prop}?: unknown;"));
            let mut updated = lines.join("\n");
            if content.ends_with('\n') {
                updated.push('\n');
            }
            if self.write(&file, &updated) {
                return Some(format!("Declared optional property '{prop}' on '{ty}' in {file}"));
            }
        }
        None
    }

    /// Repairs suggested by test output, in the order they should be tried
    pub fn detect_test_fixes(&self, output: &str) -> Vec<TestFix> {
        let mut fixes = Vec::new();
        for regex in MISSING_MODULE.iter() {
            for caps in regex.captures_iter(output) {
                let module = caps["module"].to_string();
                let fix = TestFix::MissingDependency { module };
                if !fixes.contains(&fix) {
                    fixes.push(fix);
                }
            }
        }

        let location = TEST_LOCATION.captures(output);
        if let (Some(caps), Some(location)) = (EXPECTED_RECEIVED.captures(output), location) {
            if let Ok(line) = location["line"].parse() {
                fixes.push(TestFix::StaleExpectation {
                    file: location["path"].to_string(),
                    line,
                    expected: caps["expected"].to_string(),
                    received: caps["received"].to_string(),
                });
            }
        }

        if STALE_SNAPSHOT.is_match(output) {
            fixes.push(TestFix::StaleSnapshots);
        }
        fixes
    }

    /// Replace the stale expected literal inside the assertion on `line`
    pub fn apply_stale_expectation(&self, file: &str, line: u32, expected: &str, received: &str) -> Option<String> {
        let content = self.read(file)?;
        let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
        let idx = (line as usize).checked_sub(1)?;
        let target = lines.get(idx)?;
        if !target.contains("expect") || !target.contains(expected) {
            return None;
        }
        // Only the last occurrence: the matcher argument follows `expect(...)`
        let at = target.rfind(expected)?;
        let mut rewritten = target.clone();
        rewritten.replace_range(at..at + expected.len(), received);
        lines[idx] = rewritten;

        let mut updated = lines.join("\n");
        if content.ends_with('\n') {
            updated.push('\n');
        }
        self.write(file, &updated)
            .then(|| format!("Updated stale expectation at {file}:{line} ({expected} -> {received})"))
    }
}

fn js_export_pattern(name: &str) -> Option<Regex> {
    let name = regex::escape(name);
    Regex::new(&format!(
        r"(?m)^\s*export\s+(?:default\s+)?(?:declare\s+)?(?:async\s+)?(?:const|let|var|function\*?|class|interface|type|enum)\s+{name}\b|^\s*export\s*\{{[^}}]*\b{name}\b[^}}]*\}}"
    ))
    .ok()
}

fn python_export_pattern(name: &str) -> Option<Regex> {
    let name = regex::escape(name);
    Regex::new(&format!(r"(?m)^(?:async\s+)?(?:def|class)\s+{name}\b|^{name}\s*(?::[^=]+)?=")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, path: &str, content: &str) {
        let full = dir.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }

    fn diag(file: &str, line: u32, message: &str) -> CompilerDiagnostic {
        CompilerDiagnostic {
            file: file.to_string(),
            line,
            column: None,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_relative_specifier() {
        assert_eq!(relative_specifier("src/a.ts", "src/util.ts"), "./util");
        assert_eq!(relative_specifier("src/auth/login.ts", "src/lib/z.ts"), "../lib/z");
        assert_eq!(relative_specifier("src/a.ts", "src/lib/index.ts"), "./lib");
        assert_eq!(relative_specifier("a.ts", "b.js"), "./b");
    }

    #[test]
    fn test_missing_import_is_added_after_existing_imports() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a.ts", "import { x } from './x';\n\nexport const a = z + x;\n");
        write(dir.path(), "src/util.ts", "export const z = 1;\n");
        write(dir.path(), "src/x.ts", "export const x = 2;\n");
        let fixer = AutoFixer::new(dir.path());

        let applied = fixer.fix_compilation(&[diag("src/a.ts", 3, "Cannot find name 'z'.")]);
        assert_eq!(applied, vec!["Added missing import of 'z' from './util' to src/a.ts"]);
        let content = std::fs::read_to_string(dir.path().join("src/a.ts")).unwrap();
        assert_eq!(
            content,
            "import { x } from './x';\nimport { z } from './util';\n\nexport const a = z + x;\n"
        );

        // Already imported: nothing more to do
        assert!(fixer.fix_compilation(&[diag("src/a.ts", 4, "Cannot find name 'z'.")]).is_empty());
    }

    #[test]
    fn test_python_missing_import() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app/main.py", "print(helper())\n");
        write(dir.path(), "app/utils.py", "def helper():\n    return 1\n");
        let fixer = AutoFixer::new(dir.path());
        let applied = fixer.fix_compilation(&[diag("app/main.py", 1, "NameError: name 'helper' is not defined")]);
        assert_eq!(applied.len(), 1);
        let content = std::fs::read_to_string(dir.path().join("app/main.py")).unwrap();
        assert!(content.starts_with("from app.utils import helper\n"));
    }

    #[test]
    fn test_unknown_name_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a.ts", "export const a = nowhere;\n");
        let fixer = AutoFixer::new(dir.path());
        assert!(fixer.fix_compilation(&[diag("src/a.ts", 1, "Cannot find name 'nowhere'.")]).is_empty());
    }

    #[test]
    fn test_type_mismatch_wraps_expression() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a.ts", "const input = read();\nconst count: number = input;\n");
        let fixer = AutoFixer::new(dir.path());
        let applied = fixer.fix_compilation(&[diag(
            "src/a.ts",
            2,
            "Type 'string' is not assignable to type 'number'.",
        )]);
        assert_eq!(applied.len(), 1);
        let content = std::fs::read_to_string(dir.path().join("src/a.ts")).unwrap();
        assert!(content.contains("const count: number = Number(input);"));
    }

    #[test]
    fn test_missing_property_is_declared() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/types.ts", "export interface User {\n  id: string;\n}\n");
        write(dir.path(), "src/a.ts", "import { User } from './types';\nconst e = (u: User) => u.email;\n");
        let fixer = AutoFixer::new(dir.path());
        let applied = fixer.fix_compilation(&[diag(
            "src/a.ts",
            2,
            "Property 'email' does not exist on type 'User'.",
        )]);
        assert_eq!(applied, vec!["Declared optional property 'email' on 'User' in src/types.ts"]);
        let content = std::fs::read_to_string(dir.path().join("src/types.ts")).unwrap();
        assert!(content.contains("export interface User {\n  email?: unknown;\n  id: string;"));
    }

    #[test]
    fn test_detect_and_apply_test_fixes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/sum.test.ts", "import { sum } from './sum';\n\ntest('sum', () => {\n  expect(sum(1, 2)).toBe(3);\n});\n");
        let fixer = AutoFixer::new(dir.path());
        let output = "FAIL src/sum.test.ts\n  ● sum\n\n    expect(received).toBe(expected)\n\n    Expected: 3\n    Received: 4\n\n      at Object.<anonymous> (src/sum.test.ts:4:21)\n\
                      Cannot find module 'supertest' from 'src/api.test.ts'\n";

        let fixes = fixer.detect_test_fixes(output);
        assert_eq!(
            fixes,
            vec![
                TestFix::MissingDependency {
                    module: "supertest".to_string()
                },
                TestFix::StaleExpectation {
                    file: "src/sum.test.ts".to_string(),
                    line: 4,
                    expected: "3".to_string(),
                    received: "4".to_string(),
                },
            ]
        );

        let applied = fixer.apply_stale_expectation("src/sum.test.ts", 4, "3", "4").unwrap();
        assert!(applied.contains("3 -> 4"));
        let content = std::fs::read_to_string(dir.path().join("src/sum.test.ts")).unwrap();
        assert!(content.contains("expect(sum(1, 2)).toBe(4);"));
    }

    #[test]
    fn test_edits_stay_inside_the_project() {
        let root = tempfile::tempdir().unwrap();
        let assertion = "test('x', () => {\n  expect(x()).toBe(3);\n});\n";
        write(root.path(), "outside.test.ts", assertion);
        write(root.path(), "project/src/x.test.ts", assertion);
        let project = root.path().join("project");
        let fixer = AutoFixer::new(&project);

        assert_eq!(fixer.apply_stale_expectation("../outside.test.ts", 2, "3", "4"), None);
        let outside = root.path().join("outside.test.ts");
        assert_eq!(fixer.apply_stale_expectation(outside.to_str().unwrap(), 2, "3", "4"), None);
        assert_eq!(std::fs::read_to_string(&outside).unwrap(), assertion);

        let inside = project.join("src/x.test.ts");
        assert!(fixer.apply_stale_expectation(inside.to_str().unwrap(), 2, "3", "4").is_some());
        assert!(std::fs::read_to_string(&inside).unwrap().contains("toBe(4)"));
    }

    #[test]
    fn test_snapshot_failures_are_detected() {
        let fixer = AutoFixer::new(Path::new("/tmp"));
        assert_eq!(
            fixer.detect_test_fixes("Snapshot Summary\n › 2 snapshots failed from 1 test suite."),
            vec![TestFix::StaleSnapshots]
        );
    }
}
