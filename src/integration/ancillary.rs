//! Best-effort follow-up updates after the change is committed.
//!
//! Documentation, dependency/config and deployment updates are independent:
//! each one logs and records its own failure without affecting the others.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{CommandsConfig, TimeoutConfig};
use crate::external::command::{render_command, split_argv};
use crate::external::CommandExecutor;
use crate::impact::FileKind;

const CHANGELOG: &str = "CHANGELOG.md";
const UNRELEASED_HEADING: &str = "## Unreleased";

const DEPENDENCY_MANIFESTS: &[&str] = &[
    "package.json",
    "requirements.txt",
    "pyproject.toml",
    "pipfile",
    "cargo.toml",
    "go.mod",
    "gemfile",
    "composer.json",
];

const SOURCE_ROOTS: &[&str] = &["src/", "lib/", "app/", "api/", "routes/", "server/"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AncillaryOutcome {
    pub documentation_updated: bool,
    pub config_updated: bool,
    pub deployment_updated: bool,
    pub notes: Vec<String>,
    pub errors: Vec<String>,
}

impl AncillaryOutcome {
    pub fn changed_anything(&self) -> bool {
        self.documentation_updated || self.config_updated || self.deployment_updated
    }
}

fn file_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_lowercase()
}

fn touches_source(changed: &[String]) -> bool {
    changed.iter().any(|path| {
        FileKind::classify(path) == FileKind::Code
            && (SOURCE_ROOTS.iter().any(|root| path.starts_with(root)) || !path.contains('/'))
    })
}

fn touches_manifest(changed: &[String]) -> bool {
    changed
        .iter()
        .any(|path| DEPENDENCY_MANIFESTS.contains(&file_name(path).as_str()))
}

fn touches_tsconfig(changed: &[String]) -> bool {
    changed.iter().any(|path| {
        let name = file_name(path);
        name.starts_with("tsconfig") && name.ends_with(".json")
    })
}

fn touches_deployment(changed: &[String]) -> bool {
    changed
        .iter()
        .any(|path| FileKind::classify(path) == FileKind::Deployment)
}

/// Insert a dated entry under the changelog's "Unreleased" heading,
/// creating either when missing
pub fn changelog_with_entry(existing: Option<&str>, request_text: &str, changed: &[String]) -> String {
    let summary = request_text.lines().next().unwrap_or("").trim();
    let mut entry = format!("- {} ({})", summary, Utc::now().format("%Y-%m-%d"));
    let sources: Vec<&String> = changed
        .iter()
        .filter(|path| FileKind::classify(path) == FileKind::Code)
        .take(5)
        .collect();
    if !sources.is_empty() {
        entry.push_str(&format!(
            "\n  Touches: {}",
            sources.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        ));
    }

    let Some(existing) = existing else {
        return format!("# Changelog\n\n{UNRELEASED_HEADING}\n\n{entry}\n");
    };

    let mut lines: Vec<String> = existing.lines().map(str::to_string).collect();
    match lines.iter().position(|line| line.trim() == UNRELEASED_HEADING) {
        Some(at) => {
            let insert_at = if lines.get(at + 1).is_some_and(|line| line.trim().is_empty()) {
                at + 2
            } else {
                at + 1
            };
            lines.insert(insert_at, entry);
        }
        None => {
            // After the title when there is one, otherwise at the top
            let at = if lines.first().is_some_and(|line| line.starts_with("# ")) { 1 } else { 0 };
            lines.insert(at, String::new());
            lines.insert(at + 1, UNRELEASED_HEADING.to_string());
            lines.insert(at + 2, String::new());
            lines.insert(at + 3, entry);
        }
    }
    let mut updated = lines.join("\n");
    updated.push('\n');
    updated
}

pub struct AncillaryUpdater {
    executor: Arc<dyn CommandExecutor>,
    project: PathBuf,
    commands: CommandsConfig,
    timeout: Duration,
    build_timeout: Duration,
    update_documentation: bool,
}

impl AncillaryUpdater {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        project: &Path,
        commands: CommandsConfig,
        timeouts: &TimeoutConfig,
        update_documentation: bool,
    ) -> Self {
        Self {
            executor,
            project: project.to_path_buf(),
            commands,
            timeout: timeouts.ancillary(),
            build_timeout: timeouts.build(),
            update_documentation,
        }
    }

    pub async fn run(&self, changed: &[String], request_text: &str) -> AncillaryOutcome {
        let mut outcome = AncillaryOutcome::default();

        if self.update_documentation && touches_source(changed) && !changed.iter().any(|p| p == CHANGELOG) {
            match self.update_changelog(request_text, changed).await {
                Ok(()) => {
                    outcome.documentation_updated = true;
                    outcome.notes.push(format!("Added changelog entry to {CHANGELOG}"));
                }
                Err(e) => {
                    warn!(error = %e, "Changelog update failed");
                    outcome.errors.push(format!("documentation: {e}"));
                }
            }
        }

        if touches_manifest(changed) {
            if let Some(argv) = &self.commands.dependency_sync {
                match self.run_command(argv, self.timeout).await {
                    Ok(()) => {
                        outcome.config_updated = true;
                        outcome.notes.push("Synchronized dependencies".to_string());
                    }
                    Err(e) => outcome.errors.push(format!("config: {e}")),
                }
            } else {
                debug!("Dependency manifest changed but no dependency_sync command is configured");
            }
        }

        if touches_tsconfig(changed) {
            if let Some(argv) = &self.commands.build {
                match self.run_command(argv, self.build_timeout).await {
                    Ok(()) => {
                        outcome.config_updated = true;
                        outcome.notes.push("Rebuilt after TypeScript config change".to_string());
                    }
                    Err(e) => outcome.errors.push(format!("config: {e}")),
                }
            }
        }

        if touches_deployment(changed) {
            if let Some(argv) = &self.commands.deployment_check {
                match self.run_command(argv, self.timeout).await {
                    Ok(()) => {
                        outcome.deployment_updated = true;
                        outcome.notes.push("Deployment configuration checked".to_string());
                    }
                    Err(e) => outcome.errors.push(format!("deployment: {e}")),
                }
            } else {
                debug!("Deployment files changed but no deployment_check command is configured");
            }
        }

        info!(
            documentation = outcome.documentation_updated,
            config = outcome.config_updated,
            deployment = outcome.deployment_updated,
            errors = outcome.errors.len(),
            "Ancillary updates finished"
        );
        outcome
    }

    async fn update_changelog(&self, request_text: &str, changed: &[String]) -> Result<(), std::io::Error> {
        let path = self.project.join(CHANGELOG);
        let existing = match tokio::fs::read_to_string(&path).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };
        tokio::fs::write(&path, changelog_with_entry(existing.as_deref(), request_text, changed)).await
    }

    async fn run_command(&self, argv: &[String], timeout: Duration) -> Result<(), String> {
        let Some((program, args)) = split_argv(argv) else {
            return Err("empty command".to_string());
        };
        let command = render_command(program, args);
        match self.executor.execute(&self.project, program, args, timeout).await {
            Ok(output) if output.success() => {
                debug!(command = %command, "Ancillary command succeeded");
                Ok(())
            }
            Ok(output) => {
                warn!(command = %command, status = output.status_code, "Ancillary command failed");
                Err(format!("`{command}` exited with status {}", output.status_code))
            }
            Err(e) => {
                warn!(command = %command, error = %e, "Ancillary command could not run");
                Err(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::ScriptedExecutor;

    fn paths(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_changelog_entry_goes_under_unreleased() {
        let existing = "# Changelog\n\n## Unreleased\n\n- older entry\n\n## 1.0.0\n";
        let updated = changelog_with_entry(Some(existing), "add login", &paths(&["src/login.ts"]));
        let unreleased = updated.find("## Unreleased").unwrap();
        let entry = updated.find("- add login").unwrap();
        let older = updated.find("- older entry").unwrap();
        assert!(unreleased < entry && entry < older);
        assert!(updated.contains("Touches: src/login.ts"));
    }

    #[test]
    fn test_changelog_is_created() {
        let created = changelog_with_entry(None, "add login", &[]);
        assert!(created.starts_with("# Changelog\n\n## Unreleased\n\n- add login"));
    }

    #[test]
    fn test_triggers() {
        assert!(touches_source(&paths(&["src/a.ts"])));
        assert!(!touches_source(&paths(&["docs/a.md"])));
        assert!(touches_manifest(&paths(&["web/package.json"])));
        assert!(touches_tsconfig(&paths(&["tsconfig.build.json"])));
        assert!(touches_deployment(&paths(&["Dockerfile"])));
    }

    #[tokio::test]
    async fn test_failures_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(
            ScriptedExecutor::new()
                .fail("npm", "", "registry unreachable")
                .succeed("docker", "ok"),
        );
        let commands = CommandsConfig {
            dependency_sync: Some(paths(&["npm", "install"])),
            deployment_check: Some(paths(&["docker", "build", "."])),
            ..Default::default()
        };
        let updater = AncillaryUpdater::new(executor, dir.path(), commands, &TimeoutConfig::default(), true);

        let outcome = updater
            .run(&paths(&["src/a.ts", "package.json", "Dockerfile"]), "add a")
            .await;
        assert!(outcome.documentation_updated);
        assert!(!outcome.config_updated);
        assert!(outcome.deployment_updated);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("config:"));
        assert!(dir.path().join(CHANGELOG).exists());
    }
}
