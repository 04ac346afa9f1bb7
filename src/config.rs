use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for Patchwright
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PatchwrightConfig {
    /// External build/test/lint commands
    pub commands: CommandsConfig,
    /// Per-collaborator timeouts
    pub timeouts: TimeoutConfig,
    /// Branch naming and rollback behaviour
    pub branching: BranchingConfig,
    /// Validation gate settings
    pub validation: ValidationConfig,
    /// Post-execution integration settings
    pub integration: IntegrationConfig,
    /// Content generator invocation
    pub generator: GeneratorConfig,
    /// Persisted index settings
    pub index: IndexConfig,
    /// Reconciliation settings
    pub reconciliation: ReconciliationConfig,
    /// Scoped cache settings
    pub cache: CacheConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

/// Commands are argv arrays; an absent command is "not configured"
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CommandsConfig {
    pub build: Option<Vec<String>>,
    pub test: Option<Vec<String>>,
    pub lint: Option<Vec<String>>,
    pub dependency_sync: Option<Vec<String>>,
    pub deployment_check: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub build_seconds: u64,
    pub test_seconds: u64,
    pub generator_seconds: u64,
    pub git_seconds: u64,
    pub lint_seconds: u64,
    pub ancillary_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            build_seconds: 300,
            test_seconds: 600,
            generator_seconds: 900,
            git_seconds: 60,
            lint_seconds: 120,
            ancillary_seconds: 300,
        }
    }
}

impl TimeoutConfig {
    pub fn build(&self) -> Duration {
        Duration::from_secs(self.build_seconds)
    }

    pub fn test(&self) -> Duration {
        Duration::from_secs(self.test_seconds)
    }

    pub fn generator(&self) -> Duration {
        Duration::from_secs(self.generator_seconds)
    }

    pub fn git(&self) -> Duration {
        Duration::from_secs(self.git_seconds)
    }

    pub fn lint(&self) -> Duration {
        Duration::from_secs(self.lint_seconds)
    }

    pub fn ancillary(&self) -> Duration {
        Duration::from_secs(self.ancillary_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BranchingConfig {
    /// Prefix for feature branch names
    pub prefix: String,
    /// Ref namespace holding snapshot and baseline refs
    pub snapshot_namespace: String,
    /// Squash feature branches when merging
    pub squash_merge: bool,
    /// Create a backup branch before any rollback
    pub backup_before_rollback: bool,
}

impl Default for BranchingConfig {
    fn default() -> Self {
        Self {
            prefix: "patchwright".to_string(),
            snapshot_namespace: "refs/patchwright".to_string(),
            squash_merge: true,
            backup_before_rollback: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Time budget for the core safety cycle
    pub core_max_duration_ms: u64,
    /// Promote a dependency cycle among changed files to a blocking error
    pub block_on_dependency_cycle: bool,
    /// Structural check: files longer than this are flagged
    pub max_file_lines: usize,
    /// Structural check: files declaring more than this many items are flagged
    pub max_declarations: usize,
    /// Presence of any of these enables the lint check
    pub lint_config_files: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            core_max_duration_ms: 2000,
            block_on_dependency_cycle: true,
            max_file_lines: 500,
            max_declarations: 25,
            lint_config_files: [
                ".eslintrc",
                ".eslintrc.js",
                ".eslintrc.json",
                ".eslintrc.cjs",
                "eslint.config.js",
                "eslint.config.mjs",
                "ruff.toml",
                ".ruff.toml",
                "clippy.toml",
                ".clippy.toml",
                ".golangci.yml",
                ".golangci.yaml",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Rebuild/retest attempts after auto-fixes
    pub max_fix_attempts: u32,
    pub auto_merge: bool,
    pub update_documentation: bool,
    /// Upsert changed files into registered indexes after commit
    pub refresh_indexes: bool,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            max_fix_attempts: 1,
            auto_merge: true,
            update_documentation: true,
            refresh_indexes: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Generator argv; the directive is appended as the last argument
    pub command: Option<Vec<String>>,
    /// Write the generator's stdout to the task's file
    pub write_stdout_to_file: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory (relative to the project) holding JSON index stores
    pub store_dir: String,
    /// Names of the indexes to register
    pub names: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            store_dir: ".patchwright/index".to_string(),
            names: vec!["code".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Outdated cutoff when no explicit timestamp is supplied
    pub default_window_hours: i64,
    /// Extra glob patterns excluded from the tree scan
    pub ignore_patterns: Vec<String>,
    /// Files larger than this are not indexed
    pub max_file_bytes: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            default_window_hours: 24,
            ignore_patterns: vec![
                "**/*.lock".to_string(),
                "**/*.min.js".to_string(),
                "dist/**".to_string(),
                "build/**".to_string(),
            ],
            max_file_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            max_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON log lines instead of compact text
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl PatchwrightConfig {
    /// Load configuration for `project` from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (patchwright.toml, .patchwright/config.toml)
    /// 3. Environment variables (prefixed with PATCHWRIGHT__)
    pub fn load(project: &Path) -> Result<Self> {
        let defaults = toml::to_string(&PatchwrightConfig::default())?;
        let mut builder =
            Config::builder().add_source(File::from_str(&defaults, config::FileFormat::Toml));

        let project_file = project.join("patchwright.toml");
        if project_file.exists() {
            builder = builder.add_source(File::from(project_file));
        }

        let local_file = project.join(".patchwright").join("config.toml");
        if local_file.exists() {
            builder = builder.add_source(File::from(local_file));
        }

        // Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix("PATCHWRIGHT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file from `project` if it exists
    pub fn load_env_file(project: &Path) -> Result<()> {
        let env_file = project.join(".env");
        if env_file.exists() {
            dotenvy::from_path(&env_file)?;
            tracing::info!(path = %env_file.display(), "Loaded environment variables from .env file");
        }
        Ok(())
    }
}
