// In-memory index - deterministic fake for tests and previews

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::state::IndexState;
use super::{IndexCollaborator, IndexError, IndexRecord, RelatedNode, SimilarMatch};

#[derive(Debug, Default)]
struct Faults {
    similar: bool,
    related_for: HashSet<String>,
    upsert_for: HashSet<String>,
    delete_for: HashSet<String>,
}

/// Index held in memory, with explicit failure injection per operation
#[derive(Debug)]
pub struct MemoryIndex {
    name: String,
    state: Mutex<IndexState>,
    related_overrides: Mutex<HashMap<String, Vec<RelatedNode>>>,
    faults: Mutex<Faults>,
}

impl MemoryIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(IndexState::default()),
            related_overrides: Mutex::new(HashMap::new()),
            faults: Mutex::new(Faults::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn unavailable(&self, message: String) -> IndexError {
        IndexError::Unavailable {
            name: self.name.clone(),
            message,
        }
    }

    /// Seed a record directly
    pub fn seed(&self, project_id: &str, file_path: &str, content: &str) -> IndexRecord {
        self.state().upsert(project_id, file_path, content)
    }

    /// Backdate a record's update timestamp
    pub fn set_updated_at(&self, project_id: &str, file_path: &str, at: DateTime<Utc>) {
        if let Some(record) = self.state().record_mut(project_id, file_path) {
            record.updated_at = at;
        }
    }

    /// Answer `find_related` for `file_path` with fixed nodes instead of the import graph
    pub fn set_related(&self, file_path: &str, nodes: Vec<RelatedNode>) {
        self.related_overrides
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(file_path.to_string(), nodes);
    }

    pub fn fail_similar(&self) {
        self.faults().similar = true;
    }

    pub fn fail_related_for(&self, file_path: &str) {
        self.faults().related_for.insert(file_path.to_string());
    }

    pub fn fail_upsert_for(&self, file_path: &str) {
        self.faults().upsert_for.insert(file_path.to_string());
    }

    pub fn fail_delete_for(&self, file_path: &str) {
        self.faults().delete_for.insert(file_path.to_string());
    }

    pub fn record(&self, project_id: &str, file_path: &str) -> Option<IndexRecord> {
        self.state()
            .records(project_id)
            .into_iter()
            .find(|record| record.file_path == file_path)
    }
}

#[async_trait]
impl IndexCollaborator for MemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_similar(
        &self,
        project_id: &str,
        text: &str,
        limit: usize,
    ) -> Result<Vec<SimilarMatch>, IndexError> {
        if self.faults().similar {
            return Err(self.unavailable("similarity search offline".to_string()));
        }
        Ok(self.state().similar(project_id, text, limit))
    }

    async fn find_related(
        &self,
        project_id: &str,
        file_path: &str,
        max_depth: u32,
    ) -> Result<Vec<RelatedNode>, IndexError> {
        if self.faults().related_for.contains(file_path) {
            return Err(self.unavailable(format!("graph lookup failed for {file_path}")));
        }
        let overrides = self
            .related_overrides
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(nodes) = overrides.get(file_path) {
            return Ok(nodes
                .iter()
                .filter(|node| node.depth <= max_depth)
                .cloned()
                .collect());
        }
        drop(overrides);
        Ok(self.state().related(project_id, file_path, max_depth))
    }

    async fn list_records(&self, project_id: &str) -> Result<Vec<IndexRecord>, IndexError> {
        Ok(self.state().records(project_id))
    }

    async fn upsert_record(
        &self,
        project_id: &str,
        file_path: &str,
        content: &str,
    ) -> Result<IndexRecord, IndexError> {
        if self.faults().upsert_for.contains(file_path) {
            return Err(self.unavailable(format!("upsert rejected for {file_path}")));
        }
        Ok(self.state().upsert(project_id, file_path, content))
    }

    async fn delete_record(&self, project_id: &str, file_path: &str) -> Result<(), IndexError> {
        if self.faults().delete_for.contains(file_path) {
            return Err(self.unavailable(format!("delete rejected for {file_path}")));
        }
        self.state().delete(project_id, file_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Relationship;

    #[tokio::test]
    async fn test_fault_injection_is_per_path() {
        let index = MemoryIndex::new("code");
        index.seed("p", "a.ts", "export const a = 1;");
        index.fail_upsert_for("b.ts");

        assert!(index.upsert_record("p", "b.ts", "x").await.is_err());
        assert!(index.upsert_record("p", "c.ts", "x").await.is_ok());
        assert_eq!(index.list_records("p").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_related_overrides_respect_depth() {
        let index = MemoryIndex::new("graph");
        index.set_related(
            "src/a.ts",
            vec![
                RelatedNode {
                    file_path: "src/b.ts".to_string(),
                    relationship: Relationship::Calls,
                    depth: 1,
                },
                RelatedNode {
                    file_path: "src/c.ts".to_string(),
                    relationship: Relationship::References,
                    depth: 3,
                },
            ],
        );

        assert_eq!(index.find_related("p", "src/a.ts", 2).await.unwrap().len(), 1);
        assert_eq!(index.find_related("p", "src/a.ts", 3).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_backdated_record_changes_last_updated() {
        let index = MemoryIndex::new("code");
        index.seed("p", "a.ts", "x");
        let old = Utc::now() - chrono::Duration::hours(48);
        index.set_updated_at("p", "a.ts", old);
        assert_eq!(index.last_updated("p").await.unwrap(), Some(old));
    }
}
