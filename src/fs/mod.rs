//! Project tree walking shared by impact analysis, the validation gate and
//! reconciliation.
//!
//! Paths are reported relative to the project root with `/` separators.
//! `.gitignore` rules are honoured; tool and build directories are always
//! skipped.

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::Path;
use tracing::warn;

/// Directories never considered part of the project's source
pub const ALWAYS_SKIPPED: &[&str] = &[".git", "node_modules", "target", ".patchwright"];

/// Build a glob set from patterns, logging and skipping invalid ones
pub fn build_globset(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!(pattern = %pattern, error = %e, "Ignoring invalid glob pattern"),
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

/// `path` relative to `root`, `/`-separated
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn is_always_skipped(relative: &str) -> bool {
    relative
        .split('/')
        .any(|segment| ALWAYS_SKIPPED.contains(&segment))
}

/// Every regular file under `root`, sorted, minus `excluded` matches
pub fn list_project_files(root: &Path, excluded: &GlobSet) -> Vec<String> {
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| !ALWAYS_SKIPPED.contains(&name))
                .unwrap_or(true)
        })
        .build();

    let mut files: Vec<String> = walker
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path during project walk");
                None
            }
        })
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| relative_path(root, entry.path()))
        .filter(|relative| !is_always_skipped(relative) && !excluded.is_match(relative))
        .collect();

    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_lists_files_and_skips_tool_dirs() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/app.ts");
        touch(dir.path(), ".github/workflows/ci.yml");
        touch(dir.path(), "node_modules/lib/index.js");
        touch(dir.path(), ".patchwright/index/code.json");
        touch(dir.path(), "dist/bundle.js");
        fs::write(dir.path().join(".gitignore"), "dist/\n").unwrap();

        let files = list_project_files(dir.path(), &GlobSet::empty());
        assert_eq!(files, vec![".github/workflows/ci.yml", ".gitignore", "src/app.ts"]);
    }

    #[test]
    fn test_excluded_globs() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/app.ts");
        touch(dir.path(), "yarn.lock");

        let excluded = build_globset(&["**/*.lock".to_string(), "[invalid".to_string()]);
        assert_eq!(list_project_files(dir.path(), &excluded), vec!["src/app.ts"]);
    }
}
