use globset::GlobSet;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::intent::{mentions_testing, RequestIntent};
use super::patterns::PatternTable;
use super::types::{AffectedFile, ChangeKind, FileKind, ImpactResult};
use crate::cache::ScopedCache;
use crate::index::{IndexCollaborator, RelatedNode};
use crate::priority::Priority;

/// Maximum number of primary files inferred from request text
const MAX_INFERRED_FILES: usize = 5;

const PRIMARY_COMPLEXITY: u8 = 5;
/// Restructuring a primary file reaches the complex-primary risk threshold
const REFACTOR_PRIMARY_COMPLEXITY: u8 = 8;
const CASCADING_COMPLEXITY: u8 = 3;
const TEST_COMPLEXITY: u8 = 3;

const STOPWORDS: &[&str] = &[
    "the", "and", "with", "from", "into", "that", "this", "when", "then", "than", "should", "make", "sure",
    "have", "your", "code", "file", "files", "function", "add", "adds", "create", "update", "change", "fix",
    "refactor", "implement", "support", "new", "for", "some", "more", "less", "also", "only", "all",
    "test", "tests", "debug", "document", "handler", "module", "component",
];

/// Determines every file a change request will touch
pub struct ImpactAnalyzer {
    index: Arc<dyn IndexCollaborator>,
    project_id: String,
    cache: Option<ScopedCache<Vec<RelatedNode>>>,
    excluded: GlobSet,
}

impl ImpactAnalyzer {
    pub fn new(index: Arc<dyn IndexCollaborator>, project_id: impl Into<String>) -> Self {
        Self {
            index,
            project_id: project_id.into(),
            cache: None,
            excluded: GlobSet::empty(),
        }
    }

    /// Memoize graph lookups for the lifetime of one run
    pub fn with_cache(mut self, cache: ScopedCache<Vec<RelatedNode>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_excluded(mut self, excluded: GlobSet) -> Self {
        self.excluded = excluded;
        self
    }

    pub async fn analyze(&self, project_path: &Path, request: &str, explicit_files: &[String]) -> ImpactResult {
        let intent = RequestIntent::detect(request);
        let project_files = crate::fs::list_project_files(project_path, &self.excluded);
        info!(
            intent = ?intent,
            explicit = explicit_files.len(),
            project_files = project_files.len(),
            "Analyzing impact"
        );

        let primary = if explicit_files.is_empty() {
            self.infer_primary(&project_files, request, intent)
        } else {
            self.explicit_primary(explicit_files, request, intent)
        };

        let mut warnings = Vec::new();
        let cascading = self.cascading(&primary, request, intent, &mut warnings).await;

        let mut taken: HashSet<String> = primary
            .iter()
            .chain(cascading.iter())
            .map(|file| file.path.clone())
            .collect();

        let config = PatternTable::Config.match_files(&project_files, request, &taken);
        taken.extend(config.iter().map(|file| file.path.clone()));

        let primary_code: Vec<String> = primary
            .iter()
            .filter(|file| file.kind == FileKind::Code)
            .map(|file| file.path.clone())
            .collect();
        let documentation: Vec<AffectedFile> = PatternTable::Documentation
            .match_files(&project_files, request, &taken)
            .into_iter()
            .map(|file| file.with_dependencies(primary_code.clone()))
            .collect();
        taken.extend(documentation.iter().map(|file| file.path.clone()));

        let config_paths: Vec<String> = config.iter().map(|file| file.path.clone()).collect();
        let deployment: Vec<AffectedFile> = PatternTable::Deployment
            .match_files(&project_files, request, &taken)
            .into_iter()
            .map(|file| file.with_dependencies(config_paths.clone()))
            .collect();
        taken.extend(deployment.iter().map(|file| file.path.clone()));

        let test = self.test_impact(&primary, &project_files, request, intent, &taken);

        let result = ImpactResult::from_categories(
            primary,
            cascading,
            config,
            documentation,
            test,
            deployment,
            warnings,
        );
        info!(
            total_files = result.total_files,
            risk = %result.risk_level,
            estimated_time = %result.estimated_time,
            partial = result.is_partial(),
            "Impact analysis complete"
        );
        result
    }

    fn explicit_primary(&self, explicit_files: &[String], request: &str, intent: RequestIntent) -> Vec<AffectedFile> {
        let mut seen = HashSet::new();
        explicit_files
            .iter()
            .map(|path| normalize_explicit(path))
            .filter(|path| !path.is_empty() && seen.insert(path.clone()))
            .map(|path| primary_file(path, request, intent, Priority::Critical))
            .collect()
    }

    fn infer_primary(&self, project_files: &[String], request: &str, intent: RequestIntent) -> Vec<AffectedFile> {
        let tokens = request_tokens(request);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, &String)> = project_files
            .iter()
            .filter(|path| FileKind::classify(path) == FileKind::Code)
            .filter_map(|path| {
                let parts = stem_parts(path);
                let score = tokens
                    .iter()
                    .filter(|token| parts.iter().any(|part| part == *token || (part.len() >= 4 && token.contains(part.as_str()))))
                    .count();
                (score > 0).then_some((score, path))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

        let inferred: Vec<AffectedFile> = scored
            .into_iter()
            .take(MAX_INFERRED_FILES)
            .map(|(_, path)| primary_file(path.clone(), request, intent, Priority::High))
            .collect();
        debug!(count = inferred.len(), "Inferred primary files from request text");
        inferred
    }

    async fn related(&self, path: &str, depth: u32) -> Result<Vec<RelatedNode>, crate::index::IndexError> {
        let key = format!("related:{path}:{depth}");
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key).await {
                return Ok(hit);
            }
        }
        let nodes = self.index.find_related(&self.project_id, path, depth).await?;
        if let Some(cache) = &self.cache {
            cache.insert(&key, nodes.clone()).await;
        }
        Ok(nodes)
    }

    async fn cascading(
        &self,
        primary: &[AffectedFile],
        request: &str,
        intent: RequestIntent,
        warnings: &mut Vec<String>,
    ) -> Vec<AffectedFile> {
        let primary_paths: HashSet<&str> = primary.iter().map(|file| file.path.as_str()).collect();
        let depth = intent.traversal_depth();
        let mut by_path: BTreeMap<String, AffectedFile> = BTreeMap::new();

        for source in primary.iter().filter(|file| file.kind == FileKind::Code) {
            let nodes = match self.related(&source.path, depth).await {
                Ok(nodes) => nodes,
                Err(e) => {
                    warn!(file = %source.path, error = %e, "Cascading analysis failed for file, continuing");
                    warnings.push(format!("cascading analysis skipped for {}: {}", source.path, e));
                    continue;
                }
            };

            for node in nodes {
                if primary_paths.contains(node.file_path.as_str()) {
                    continue;
                }
                let candidate = AffectedFile::new(
                    node.file_path.clone(),
                    FileKind::classify(&node.file_path),
                    intent.cascading_task(&node.file_path, &source.path, request),
                    Priority::for_cascade(node.relationship, node.depth),
                )
                .with_dependencies(vec![source.path.clone()])
                .with_complexity(CASCADING_COMPLEXITY);

                match by_path.get(&node.file_path) {
                    Some(existing) if existing.priority <= candidate.priority => {}
                    _ => {
                        by_path.insert(node.file_path.clone(), candidate);
                    }
                }
            }
        }

        by_path.into_values().collect()
    }

    fn test_impact(
        &self,
        primary: &[AffectedFile],
        project_files: &[String],
        request: &str,
        intent: RequestIntent,
        taken: &HashSet<String>,
    ) -> Vec<AffectedFile> {
        let wants_new_tests = intent.implies_new_functionality() || mentions_testing(request);
        let mut seen: HashSet<String> = HashSet::new();
        let mut tests = Vec::new();

        for source in primary.iter().filter(|file| file.kind == FileKind::Code) {
            let existing = find_existing_tests(&source.path, project_files);
            if !existing.is_empty() {
                for test_path in existing {
                    if taken.contains(&test_path) || !seen.insert(test_path.clone()) {
                        continue;
                    }
                    tests.push(
                        AffectedFile::new(
                            test_path.clone(),
                            FileKind::Test,
                            format!("Update tests in {} to cover: {}", test_path, request),
                            Priority::High,
                        )
                        .with_dependencies(vec![source.path.clone()])
                        .with_complexity(TEST_COMPLEXITY),
                    );
                }
            } else if wants_new_tests {
                let test_path = synthesized_test_path(&source.path);
                if taken.contains(&test_path) || !seen.insert(test_path.clone()) {
                    continue;
                }
                tests.push(
                    AffectedFile::new(
                        test_path,
                        FileKind::Test,
                        format!("Create tests for {} covering: {}", source.path, request),
                        Priority::Medium,
                    )
                    .with_change(ChangeKind::Create)
                    .with_dependencies(vec![source.path.clone()])
                    .with_complexity(TEST_COMPLEXITY),
                );
            }
        }

        tests
    }
}

fn primary_file(path: String, request: &str, intent: RequestIntent, priority: Priority) -> AffectedFile {
    let complexity = if intent == RequestIntent::Refactor {
        REFACTOR_PRIMARY_COMPLEXITY
    } else {
        PRIMARY_COMPLEXITY
    };
    let task = intent.primary_task(&path, request);
    AffectedFile::new(path.clone(), FileKind::classify(&path), task, priority).with_complexity(complexity)
}

fn normalize_explicit(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    unified.trim_start_matches("./").to_string()
}

fn request_tokens(request: &str) -> Vec<String> {
    let mut tokens: Vec<String> = request
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|word| word.len() >= 4 && !STOPWORDS.contains(&word.as_str()))
        .collect();
    tokens.dedup();
    tokens
}

fn split_name(path: &str) -> (&str, &str, &str) {
    let (dir, file_name) = path.rsplit_once('/').unwrap_or(("", path));
    let (base, ext) = file_name.rsplit_once('.').unwrap_or((file_name, ""));
    (dir, base, ext)
}

fn stem_parts(path: &str) -> Vec<String> {
    let (_, base, _) = split_name(path);
    base.split(|c: char| c == '-' || c == '_' || c == '.')
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// `<base>.test.*`, `<base>.spec.*`, `<base>_test.*`, `test_<base>.*`, or any
/// file under a test directory whose name mentions `<base>`
fn find_existing_tests(source: &str, project_files: &[String]) -> Vec<String> {
    let (_, base, _) = split_name(source);
    if base.is_empty() {
        return Vec::new();
    }
    let prefixes = [
        format!("{base}.test."),
        format!("{base}.spec."),
        format!("{base}_test."),
        format!("test_{base}."),
    ];

    project_files
        .iter()
        .filter(|path| path.as_str() != source)
        .filter(|path| {
            let file_name = path.rsplit('/').next().unwrap_or(path);
            let by_name = prefixes.iter().any(|prefix| file_name.starts_with(prefix.as_str()));
            let in_test_dir = path
                .split('/')
                .any(|segment| matches!(segment, "test" | "tests" | "__tests__"))
                && file_name.contains(base);
            by_name || in_test_dir
        })
        .cloned()
        .collect()
}

fn synthesized_test_path(source: &str) -> String {
    let (dir, base, ext) = split_name(source);
    let file_name = if ext.is_empty() {
        format!("{base}.test")
    } else {
        format!("{base}.test.{ext}")
    };
    if dir.is_empty() {
        file_name
    } else {
        format!("{dir}/{file_name}")
    }
}
