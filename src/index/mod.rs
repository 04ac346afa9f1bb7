//! Search/graph index collaborator
//!
//! The index answers "what looks like this text" and "what depends on this
//! file" for impact analysis and the validation gate, and accepts record
//! upserts/deletes from reconciliation and the post-integration refresh hook.
//! Implementations are registered once at startup in an [`IndexRegistry`].

pub mod imports;
pub mod json_store;
pub mod memory;
pub mod state;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::config::IndexConfig;

pub use json_store::JsonFileIndex;
pub use memory::MemoryIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Imports,
    DependsOn,
    References,
    Calls,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarMatch {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub similarity: f64,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedNode {
    pub file_path: String,
    pub relationship: Relationship,
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub file_path: String,
    pub content_hash: String,
    pub updated_at: DateTime<Utc>,
    /// Raw import specifiers, resolved at query time
    pub imports: Vec<String>,
    pub content: String,
}

impl IndexRecord {
    pub fn build(file_path: &str, content: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            content_hash: content_hash(content.as_bytes()),
            updated_at: Utc::now(),
            imports: imports::extract_imports(file_path, content),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("Index '{name}' is not configured")]
    Unconfigured { name: String },
    #[error("Index store I/O error at {path}: {message}")]
    Io { path: String, message: String },
    #[error("Index store at {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },
    #[error("Index '{name}' unavailable: {message}")]
    Unavailable { name: String, message: String },
}

/// SHA-256 of `bytes` as lowercase hex
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Contract every search/graph index implementation honours
#[async_trait]
pub trait IndexCollaborator: Send + Sync {
    fn name(&self) -> &str;

    /// Ranked matches for `text`, most similar first
    async fn find_similar(
        &self,
        project_id: &str,
        text: &str,
        limit: usize,
    ) -> Result<Vec<SimilarMatch>, IndexError>;

    /// Files within `max_depth` hops of `file_path`
    async fn find_related(
        &self,
        project_id: &str,
        file_path: &str,
        max_depth: u32,
    ) -> Result<Vec<RelatedNode>, IndexError>;

    async fn list_records(&self, project_id: &str) -> Result<Vec<IndexRecord>, IndexError>;

    async fn upsert_record(
        &self,
        project_id: &str,
        file_path: &str,
        content: &str,
    ) -> Result<IndexRecord, IndexError>;

    async fn delete_record(&self, project_id: &str, file_path: &str) -> Result<(), IndexError>;

    /// Most recent update across the project's records
    async fn last_updated(&self, project_id: &str) -> Result<Option<DateTime<Utc>>, IndexError> {
        Ok(self
            .list_records(project_id)
            .await?
            .iter()
            .map(|record| record.updated_at)
            .max())
    }
}

/// Production stand-in when no index is set up: every call fails loudly
#[derive(Debug, Clone)]
pub struct UnconfiguredIndex {
    name: String,
}

impl UnconfiguredIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn error(&self) -> IndexError {
        IndexError::Unconfigured {
            name: self.name.clone(),
        }
    }
}

#[async_trait]
impl IndexCollaborator for UnconfiguredIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_similar(&self, _: &str, _: &str, _: usize) -> Result<Vec<SimilarMatch>, IndexError> {
        Err(self.error())
    }

    async fn find_related(&self, _: &str, _: &str, _: u32) -> Result<Vec<RelatedNode>, IndexError> {
        Err(self.error())
    }

    async fn list_records(&self, _: &str) -> Result<Vec<IndexRecord>, IndexError> {
        Err(self.error())
    }

    async fn upsert_record(&self, _: &str, _: &str, _: &str) -> Result<IndexRecord, IndexError> {
        Err(self.error())
    }

    async fn delete_record(&self, _: &str, _: &str) -> Result<(), IndexError> {
        Err(self.error())
    }
}

/// Indexes registered at process start, looked up by name
#[derive(Clone, Default)]
pub struct IndexRegistry {
    indexes: Vec<Arc<dyn IndexCollaborator>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One JSON-file store per configured name under `<project>/<store_dir>`.
    /// A dedicated store directory stays out of git.
    pub fn from_config(project: &Path, config: &IndexConfig) -> Self {
        let store_dir: PathBuf = project.join(&config.store_dir);
        let dedicated = store_dir != project && !matches!(config.store_dir.trim(), "" | "." | "./");
        let mut registry = Self::new();
        for name in &config.names {
            let store = JsonFileIndex::new(name.clone(), store_dir.join(format!("{name}.json")));
            let store = if dedicated { store.ignored_by_git() } else { store };
            registry.register(Arc::new(store));
        }
        registry
    }

    /// Register an index, replacing any previous one with the same name
    pub fn register(&mut self, index: Arc<dyn IndexCollaborator>) {
        self.indexes.retain(|existing| existing.name() != index.name());
        self.indexes.push(index);
    }

    pub fn with(mut self, index: Arc<dyn IndexCollaborator>) -> Self {
        self.register(index);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn IndexCollaborator>> {
        self.indexes.iter().find(|index| index.name() == name).cloned()
    }

    /// The index used for similarity and graph queries
    pub fn primary(&self) -> Arc<dyn IndexCollaborator> {
        self.indexes
            .first()
            .cloned()
            .unwrap_or_else(|| Arc::new(UnconfiguredIndex::new("primary")))
    }

    pub fn all(&self) -> &[Arc<dyn IndexCollaborator>] {
        &self.indexes
    }

    /// Selected indexes, or all when `names` is empty. Unknown names come back
    /// as unconfigured indexes so callers report them instead of skipping.
    pub fn select(&self, names: &[String]) -> Vec<Arc<dyn IndexCollaborator>> {
        if names.is_empty() {
            return self.indexes.clone();
        }
        names
            .iter()
            .map(|name| {
                self.get(name)
                    .unwrap_or_else(|| Arc::new(UnconfiguredIndex::new(name.clone())))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}
