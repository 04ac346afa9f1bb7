use serde::{Deserialize, Serialize};
use std::fmt;

use crate::priority::Priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Code,
    Config,
    Documentation,
    Test,
    Deployment,
    Static,
}

impl FileKind {
    /// Classify a project-relative path by naming convention
    pub fn classify(path: &str) -> FileKind {
        let lower = path.to_lowercase();
        let file_name = lower.rsplit('/').next().unwrap_or(&lower);
        let extension = file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");

        if file_name.starts_with("dockerfile")
            || file_name.starts_with("docker-compose")
            || lower.starts_with(".github/workflows/")
            || lower.starts_with("k8s/")
            || lower.starts_with("helm/")
            || file_name == ".gitlab-ci.yml"
        {
            return FileKind::Deployment;
        }

        if file_name.contains(".test.")
            || file_name.contains(".spec.")
            || file_name.starts_with("test_")
            || file_name.ends_with("_test.go")
            || file_name.ends_with("_test.py")
            || lower.contains("__tests__/")
            || lower.starts_with("tests/")
            || lower.starts_with("test/")
            || lower.contains("/tests/")
            || lower.contains("/test/")
        {
            return FileKind::Test;
        }

        match extension {
            "md" | "mdx" | "rst" | "adoc" => FileKind::Documentation,
            "txt" if lower.starts_with("docs/") => FileKind::Documentation,
            "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" | "py" | "rs" | "go" | "java" | "kt" | "rb"
            | "php" | "cs" | "c" | "cc" | "cpp" | "h" | "hpp" | "swift" | "scala" | "vue"
            | "svelte" | "sql" | "sh" => FileKind::Code,
            "json" | "toml" | "yaml" | "yml" | "ini" | "cfg" | "conf" | "lock" => FileKind::Config,
            _ if file_name.starts_with(".env") || (file_name.starts_with('.') && file_name.ends_with("rc")) => {
                FileKind::Config
            }
            _ => FileKind::Static,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Update,
    Create,
    Delete,
    Rename,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactCategory {
    Primary,
    Cascading,
    Config,
    Documentation,
    Test,
    Deployment,
}

impl ImpactCategory {
    pub const ALL: [ImpactCategory; 6] = [
        ImpactCategory::Primary,
        ImpactCategory::Cascading,
        ImpactCategory::Config,
        ImpactCategory::Documentation,
        ImpactCategory::Test,
        ImpactCategory::Deployment,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        write!(f, "{label}")
    }
}

/// One file the request will touch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedFile {
    pub path: String,
    pub kind: FileKind,
    pub change_kind: ChangeKind,
    pub task: String,
    pub priority: Priority,
    pub dependencies: Vec<String>,
    /// 1..=10
    pub estimated_complexity: u8,
}

impl AffectedFile {
    pub fn new(path: impl Into<String>, kind: FileKind, task: impl Into<String>, priority: Priority) -> Self {
        Self {
            path: path.into(),
            kind,
            change_kind: ChangeKind::Update,
            task: task.into(),
            priority,
            dependencies: Vec::new(),
            estimated_complexity: 3,
        }
    }

    pub fn with_change(mut self, change_kind: ChangeKind) -> Self {
        self.change_kind = change_kind;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_complexity(mut self, complexity: u8) -> Self {
        self.estimated_complexity = complexity.clamp(1, 10);
        self
    }
}

/// Primary files at or above this complexity raise risk to high
const COMPLEX_PRIMARY_THRESHOLD: u8 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactResult {
    pub primary: Vec<AffectedFile>,
    pub cascading: Vec<AffectedFile>,
    pub config: Vec<AffectedFile>,
    pub documentation: Vec<AffectedFile>,
    pub test: Vec<AffectedFile>,
    pub deployment: Vec<AffectedFile>,
    pub total_files: usize,
    pub estimated_minutes: u32,
    pub estimated_time: String,
    pub risk_level: RiskLevel,
    /// Lookups that failed while analysing; results may be incomplete
    pub analysis_warnings: Vec<String>,
}

impl ImpactResult {
    /// Assemble a result and derive its aggregates
    pub fn from_categories(
        primary: Vec<AffectedFile>,
        cascading: Vec<AffectedFile>,
        config: Vec<AffectedFile>,
        documentation: Vec<AffectedFile>,
        test: Vec<AffectedFile>,
        deployment: Vec<AffectedFile>,
        analysis_warnings: Vec<String>,
    ) -> Self {
        let mut result = Self {
            primary,
            cascading,
            config,
            documentation,
            test,
            deployment,
            total_files: 0,
            estimated_minutes: 0,
            estimated_time: String::new(),
            risk_level: RiskLevel::Low,
            analysis_warnings,
        };
        result.recompute();
        result
    }

    /// Refresh `total_files`, time estimate and risk after category edits
    pub fn recompute(&mut self) {
        self.total_files = ImpactCategory::ALL
            .iter()
            .map(|category| self.category(*category).len())
            .sum();
        self.estimated_minutes = estimate_minutes(self.files().map(|(_, file)| file));
        self.estimated_time = format_duration(self.estimated_minutes);
        self.risk_level = assess_risk(self);
    }

    pub fn category(&self, category: ImpactCategory) -> &[AffectedFile] {
        match category {
            ImpactCategory::Primary => &self.primary,
            ImpactCategory::Cascading => &self.cascading,
            ImpactCategory::Config => &self.config,
            ImpactCategory::Documentation => &self.documentation,
            ImpactCategory::Test => &self.test,
            ImpactCategory::Deployment => &self.deployment,
        }
    }

    /// Every affected file with its category, in category order
    pub fn files(&self) -> impl Iterator<Item = (ImpactCategory, &AffectedFile)> {
        ImpactCategory::ALL
            .into_iter()
            .flat_map(move |category| self.category(category).iter().map(move |file| (category, file)))
    }

    pub fn is_partial(&self) -> bool {
        !self.analysis_warnings.is_empty()
    }
}

/// 5 minutes per complexity point
pub fn estimate_minutes<'a>(files: impl Iterator<Item = &'a AffectedFile>) -> u32 {
    files.map(|file| 5 * u32::from(file.estimated_complexity)).sum()
}

pub fn format_duration(minutes: u32) -> String {
    if minutes < 60 {
        format!("{minutes} minutes")
    } else if minutes < 24 * 60 {
        format!("{:.1} hours", f64::from(minutes) / 60.0)
    } else {
        format!("{:.1} days", f64::from(minutes) / (24.0 * 60.0))
    }
}

/// Risk escalates with file count and with deployment/config exposure
pub fn assess_risk(result: &ImpactResult) -> RiskLevel {
    let touches_deployment = !result.deployment.is_empty();
    let touches_config = !result.config.is_empty();
    let complex_critical_primary = result.primary.iter().any(|file| {
        file.priority == Priority::Critical && file.estimated_complexity >= COMPLEX_PRIMARY_THRESHOLD
    });

    if result.total_files > 20 || (touches_deployment && touches_config) {
        RiskLevel::Critical
    } else if result.total_files > 10 || touches_deployment || complex_critical_primary {
        RiskLevel::High
    } else if result.total_files > 5 || touches_config {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
