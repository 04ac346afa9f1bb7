//! Import/require reference extraction and resolution.
//!
//! Shared by the index graph (reverse-import traversal) and the validation
//! gate's dependency-cycle check.

use regex::Regex;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

static JS_IMPORT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // import x from '...'; export { y } from '...'
        r#"(?m)^\s*(?:import|export)\b[^'"\n;]*?\bfrom\s*['"]([^'"]+)['"]"#,
        // import '...'
        r#"(?m)^\s*import\s*['"]([^'"]+)['"]"#,
        // require('...') and dynamic import('...')
        r#"\b(?:require|import)\s*\(\s*['"]([^'"]+)['"]\s*\)"#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static PY_FROM_IMPORT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*from\s+(\.*[\w.]*)\s+import\b").ok());

static PY_IMPORT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*import\s+([\w.]+)\s*$").ok());

const RESOLVE_SUFFIXES: &[&str] = &[
    "",
    ".ts",
    ".tsx",
    ".js",
    ".jsx",
    ".mjs",
    ".cjs",
    ".py",
    "/index.ts",
    "/index.tsx",
    "/index.js",
    "/__init__.py",
];

fn is_python(path: &str) -> bool {
    path.ends_with(".py")
}

/// Extract raw import specifiers from `content`, in source order, deduplicated.
pub fn extract_imports(path: &str, content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut specifiers = Vec::new();
    let mut push = |spec: String| {
        if !spec.is_empty() && seen.insert(spec.clone()) {
            specifiers.push(spec);
        }
    };

    if is_python(path) {
        for regex in [PY_FROM_IMPORT.as_ref(), PY_IMPORT.as_ref()].into_iter().flatten() {
            for caps in regex.captures_iter(content) {
                if let Some(m) = caps.get(1) {
                    push(python_module_to_specifier(m.as_str()));
                }
            }
        }
    } else {
        let mut found: Vec<(usize, String)> = Vec::new();
        for regex in JS_IMPORT_PATTERNS.iter() {
            for caps in regex.captures_iter(content) {
                if let Some(m) = caps.get(1) {
                    found.push((m.start(), m.as_str().to_string()));
                }
            }
        }
        found.sort_by_key(|(offset, _)| *offset);
        for (_, spec) in found {
            push(spec);
        }
    }

    specifiers
}

/// `..pkg.mod` → `../pkg/mod`, `.mod` → `./mod`, `pkg.mod` → `pkg/mod`
fn python_module_to_specifier(module: &str) -> String {
    let dots = module.chars().take_while(|c| *c == '.').count();
    let rest = module[dots..].replace('.', "/");
    match dots {
        0 => rest,
        1 => format!("./{rest}"),
        n => format!("{}{}", "../".repeat(n - 1), rest),
    }
}

/// Normalize a relative path, resolving `.` and `..` without touching the
/// filesystem. Returns `None` if the path escapes the root.
pub fn normalize(path: &Path) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.join("/"))
}

/// Resolve `specifier` imported from `from_file` against the set of known
/// project-relative paths.
///
/// Relative specifiers resolve against the importing file's directory;
/// bare Python module paths resolve against the project root. Package
/// imports (`react`, `lodash/fp`) resolve to `None`.
pub fn resolve_import(from_file: &str, specifier: &str, known: &HashSet<String>) -> Option<String> {
    let base: PathBuf = if specifier.starts_with('.') {
        Path::new(from_file).parent().unwrap_or(Path::new("")).join(specifier)
    } else if is_python(from_file) {
        PathBuf::from(specifier)
    } else {
        return None;
    };

    let base = normalize(&base)?;
    RESOLVE_SUFFIXES
        .iter()
        .map(|suffix| format!("{base}{suffix}"))
        .find(|candidate| known.contains(candidate))
}

/// Extract and resolve in one step
pub fn resolved_imports(path: &str, content: &str, known: &HashSet<String>) -> Vec<String> {
    extract_imports(path, content)
        .iter()
        .filter_map(|spec| resolve_import(path, spec, known))
        .collect()
}
