use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::LazyLock;

use super::imports::resolve_import;
use super::{IndexRecord, Relationship, RelatedNode, SimilarMatch};

const WINDOW_LINES: usize = 20;
const WINDOW_STEP: usize = 10;
const MIN_SIMILARITY: f64 = 0.3;

static TOKEN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]{2,}").ok());

fn tokens(text: &str) -> HashSet<String> {
    match TOKEN.as_ref() {
        Some(regex) => regex
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect(),
        None => HashSet::new(),
    }
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Records per project, plus the similarity and graph queries every store
/// implementation shares.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexState {
    projects: BTreeMap<String, BTreeMap<String, IndexRecord>>,
}

impl IndexState {
    pub fn records(&self, project_id: &str) -> Vec<IndexRecord> {
        self.projects
            .get(project_id)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn upsert(&mut self, project_id: &str, file_path: &str, content: &str) -> IndexRecord {
        let record = IndexRecord::build(file_path, content);
        self.insert_record(project_id, record.clone());
        record
    }

    pub fn insert_record(&mut self, project_id: &str, record: IndexRecord) {
        self.projects
            .entry(project_id.to_string())
            .or_default()
            .insert(record.file_path.clone(), record);
    }

    pub fn record_mut(&mut self, project_id: &str, file_path: &str) -> Option<&mut IndexRecord> {
        self.projects.get_mut(project_id)?.get_mut(file_path)
    }

    /// Returns whether a record was removed
    pub fn delete(&mut self, project_id: &str, file_path: &str) -> bool {
        self.projects
            .get_mut(project_id)
            .map(|records| records.remove(file_path).is_some())
            .unwrap_or(false)
    }

    /// Best-matching 20-line window per file, ranked by token Jaccard similarity
    pub fn similar(&self, project_id: &str, text: &str, limit: usize) -> Vec<SimilarMatch> {
        let query = tokens(text);
        if query.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<SimilarMatch> = self
            .records(project_id)
            .iter()
            .filter_map(|record| best_window(record, &query))
            .filter(|m| m.similarity >= MIN_SIMILARITY)
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        matches.truncate(limit);
        matches
    }

    /// Breadth-first walk over reverse imports: depth 1 are direct importers,
    /// deeper hops are transitive dependents.
    pub fn related(&self, project_id: &str, file_path: &str, max_depth: u32) -> Vec<RelatedNode> {
        let records = self.records(project_id);
        let known: HashSet<String> = records.iter().map(|r| r.file_path.clone()).collect();

        let mut importers: HashMap<String, Vec<String>> = HashMap::new();
        for record in &records {
            for spec in &record.imports {
                if let Some(target) = resolve_import(&record.file_path, spec, &known) {
                    importers.entry(target).or_default().push(record.file_path.clone());
                }
            }
        }

        let mut visited: HashSet<String> = HashSet::from([file_path.to_string()]);
        let mut queue: VecDeque<(String, u32)> = VecDeque::from([(file_path.to_string(), 0)]);
        let mut related = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let Some(dependents) = importers.get(&current) else {
                continue;
            };
            for dependent in dependents {
                if !visited.insert(dependent.clone()) {
                    continue;
                }
                let next_depth = depth + 1;
                related.push(RelatedNode {
                    file_path: dependent.clone(),
                    relationship: if next_depth == 1 {
                        Relationship::Imports
                    } else {
                        Relationship::DependsOn
                    },
                    depth: next_depth,
                });
                queue.push_back((dependent.clone(), next_depth));
            }
        }

        related.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.file_path.cmp(&b.file_path)));
        related
    }
}

fn best_window(record: &IndexRecord, query: &HashSet<String>) -> Option<SimilarMatch> {
    let lines: Vec<&str> = record.content.lines().collect();
    if lines.is_empty() {
        return None;
    }

    let mut best: Option<SimilarMatch> = None;
    let mut start = 0;
    loop {
        let end = (start + WINDOW_LINES).min(lines.len());
        let window = lines[start..end].join("\n");
        let similarity = jaccard(query, &tokens(&window));

        if best.as_ref().map_or(true, |b| similarity > b.similarity) {
            best = Some(SimilarMatch {
                file_path: record.file_path.clone(),
                start_line: start + 1,
                end_line: end,
                similarity,
                snippet: lines[start..end.min(start + 3)].join("\n"),
            });
        }

        if end == lines.len() {
            break;
        }
        start += WINDOW_STEP;
    }
    best
}
