//! Pattern tables for configuration, documentation and deployment impact.
//!
//! A rule fires when its trigger keywords appear in the request; every
//! project file matching its glob then becomes an affected file.

use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use super::types::{AffectedFile, FileKind};
use crate::priority::Priority;

pub struct PatternRule {
    pub glob: &'static str,
    pub keywords: &'static [&'static str],
    pub task: &'static str,
    pub priority: Priority,
}

pub const CONFIG_RULES: &[PatternRule] = &[
    PatternRule {
        glob: "package.json",
        keywords: &["dependency", "dependencies", "package", "install", "library", "npm", "upgrade", "version", "script"],
        task: "Update package manifest (dependencies, scripts) for the change",
        priority: Priority::High,
    },
    PatternRule {
        glob: "**/tsconfig*.json",
        keywords: &["typescript", "tsconfig", "compiler", "strict mode", "path alias", "module resolution"],
        task: "Adjust TypeScript compiler configuration",
        priority: Priority::Medium,
    },
    PatternRule {
        glob: "Cargo.toml",
        keywords: &["crate", "dependency", "dependencies", "cargo", "feature flag"],
        task: "Update crate manifest for the change",
        priority: Priority::High,
    },
    PatternRule {
        glob: "{pyproject.toml,requirements*.txt}",
        keywords: &["dependency", "dependencies", "package", "install", "pip", "library"],
        task: "Update Python dependency manifest",
        priority: Priority::High,
    },
    PatternRule {
        glob: "**/.env.example",
        keywords: &["env", "environment", "secret", "api key", "credential", "variable"],
        task: "Document new or changed environment variables",
        priority: Priority::Medium,
    },
    PatternRule {
        glob: "config/**",
        keywords: &["config", "configuration", "setting", "settings", "option", "options"],
        task: "Update application configuration",
        priority: Priority::Medium,
    },
];

pub const DOCUMENTATION_RULES: &[PatternRule] = &[
    PatternRule {
        glob: "README.md",
        keywords: &["readme", "document", "documentation", "docs", "usage", "getting started"],
        task: "Update README to describe the change",
        priority: Priority::Medium,
    },
    PatternRule {
        glob: "docs/**/*.md",
        keywords: &["document", "documentation", "docs", "guide", "tutorial"],
        task: "Update project documentation",
        priority: Priority::Medium,
    },
    PatternRule {
        glob: "CHANGELOG.md",
        keywords: &["release", "changelog", "version", "breaking"],
        task: "Record the change in the changelog",
        priority: Priority::Medium,
    },
    PatternRule {
        glob: "**/{openapi,swagger}*.{yaml,yml,json}",
        keywords: &["api", "endpoint", "endpoints", "route", "routes", "openapi", "swagger"],
        task: "Update API specification",
        priority: Priority::High,
    },
];

pub const DEPLOYMENT_RULES: &[PatternRule] = &[
    PatternRule {
        glob: "**/Dockerfile*",
        keywords: &["docker", "dockerfile", "container", "image", "deploy", "deployment"],
        task: "Update container build for the change",
        priority: Priority::High,
    },
    PatternRule {
        glob: "**/docker-compose*.{yml,yaml}",
        keywords: &["docker", "compose", "container", "service", "services"],
        task: "Update compose service definitions",
        priority: Priority::High,
    },
    PatternRule {
        glob: ".github/workflows/*.{yml,yaml}",
        keywords: &["ci", "pipeline", "workflow", "github actions", "deploy", "deployment"],
        task: "Update CI workflow",
        priority: Priority::High,
    },
    PatternRule {
        glob: "{k8s,helm}/**",
        keywords: &["kubernetes", "k8s", "helm", "deploy", "deployment", "cluster"],
        task: "Update deployment manifests",
        priority: Priority::High,
    },
];

struct CompiledRule {
    matcher: GlobMatcher,
    keywords: Regex,
    rule: &'static PatternRule,
}

fn compile(rules: &'static [PatternRule]) -> Vec<CompiledRule> {
    rules
        .iter()
        .filter_map(|rule| {
            let matcher = GlobBuilder::new(rule.glob)
                .literal_separator(true)
                .build()
                .ok()?
                .compile_matcher();
            let alternatives: Vec<String> = rule.keywords.iter().map(|k| regex::escape(k)).collect();
            let keywords = Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).ok()?;
            Some(CompiledRule {
                matcher,
                keywords,
                rule,
            })
        })
        .collect()
}

static COMPILED_CONFIG: LazyLock<Vec<CompiledRule>> = LazyLock::new(|| compile(CONFIG_RULES));
static COMPILED_DOCUMENTATION: LazyLock<Vec<CompiledRule>> =
    LazyLock::new(|| compile(DOCUMENTATION_RULES));
static COMPILED_DEPLOYMENT: LazyLock<Vec<CompiledRule>> = LazyLock::new(|| compile(DEPLOYMENT_RULES));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternTable {
    Config,
    Documentation,
    Deployment,
}

impl PatternTable {
    fn compiled(self) -> &'static [CompiledRule] {
        match self {
            PatternTable::Config => &COMPILED_CONFIG,
            PatternTable::Documentation => &COMPILED_DOCUMENTATION,
            PatternTable::Deployment => &COMPILED_DEPLOYMENT,
        }
    }

    fn kind(self) -> FileKind {
        match self {
            PatternTable::Config => FileKind::Config,
            PatternTable::Documentation => FileKind::Documentation,
            PatternTable::Deployment => FileKind::Deployment,
        }
    }

    fn complexity(self) -> u8 {
        match self {
            PatternTable::Config | PatternTable::Documentation => 2,
            PatternTable::Deployment => 4,
        }
    }

    /// Affected files for `request`, excluding paths in `exclude`.
    ///
    /// The first rule matching a path decides its task and priority.
    pub fn match_files(self, files: &[String], request: &str, exclude: &HashSet<String>) -> Vec<AffectedFile> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut affected = Vec::new();

        for compiled in self.compiled() {
            if !compiled.keywords.is_match(request) {
                continue;
            }
            for file in files {
                if exclude.contains(file) || seen.contains(file.as_str()) || !compiled.matcher.is_match(file) {
                    continue;
                }
                seen.insert(file.as_str());
                affected.push(
                    AffectedFile::new(
                        file.clone(),
                        self.kind(),
                        format!("{}: {}", compiled.rule.task, request),
                        compiled.rule.priority,
                    )
                    .with_complexity(self.complexity()),
                );
            }
        }

        affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_all_rules_compile() {
        assert_eq!(COMPILED_CONFIG.len(), CONFIG_RULES.len());
        assert_eq!(COMPILED_DOCUMENTATION.len(), DOCUMENTATION_RULES.len());
        assert_eq!(COMPILED_DEPLOYMENT.len(), DEPLOYMENT_RULES.len());
    }

    #[test]
    fn test_keywords_gate_rules() {
        let project = files(&["package.json", "src/app.ts", "Dockerfile"]);
        let none = HashSet::new();

        let quiet = PatternTable::Config.match_files(&project, "add input validation to the login handler", &none);
        assert!(quiet.is_empty());

        let config = PatternTable::Config.match_files(&project, "Install zod as a new Dependency", &none);
        assert_eq!(config.len(), 1);
        assert_eq!(config[0].path, "package.json");
        assert_eq!(config[0].priority, Priority::High);
        assert_eq!(config[0].kind, FileKind::Config);
    }

    #[test]
    fn test_globs_respect_directories() {
        let project = files(&["README.md", "packages/web/README.md", "services/api/Dockerfile.prod"]);
        let none = HashSet::new();

        let docs = PatternTable::Documentation.match_files(&project, "update the readme", &none);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].path, "README.md");

        let deploy = PatternTable::Deployment.match_files(&project, "change the docker image", &none);
        assert_eq!(deploy.len(), 1);
        assert_eq!(deploy[0].estimated_complexity, 4);
    }

    #[test]
    fn test_excluded_paths_are_skipped() {
        let project = files(&["README.md"]);
        let exclude: HashSet<String> = ["README.md".to_string()].into_iter().collect();
        assert!(PatternTable::Documentation
            .match_files(&project, "document it", &exclude)
            .is_empty());
    }
}
