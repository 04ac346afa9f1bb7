use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::state::IndexState;
use super::{IndexCollaborator, IndexError, IndexRecord, RelatedNode, SimilarMatch};

/// Index persisted as one JSON document on disk.
///
/// Reads and writes are serialized through an async lock; writes go to a
/// temporary file first and are renamed into place.
pub struct JsonFileIndex {
    name: String,
    path: PathBuf,
    lock: Mutex<()>,
    ignored_by_git: bool,
}

impl JsonFileIndex {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            lock: Mutex::new(()),
            ignored_by_git: false,
        }
    }

    /// Keep the store directory out of git by dropping a catch-all
    /// `.gitignore` next to the store file
    pub fn ignored_by_git(mut self) -> Self {
        self.ignored_by_git = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, e: std::io::Error) -> IndexError {
        IndexError::Io {
            path: self.path.display().to_string(),
            message: e.to_string(),
        }
    }

    async fn load(&self) -> Result<IndexState, IndexError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| IndexError::Corrupt {
                path: self.path.display().to_string(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(IndexState::default()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn save(&self, state: &IndexState) -> Result<(), IndexError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
            if self.ignored_by_git {
                let ignore = parent.join(".gitignore");
                if !tokio::fs::try_exists(&ignore).await.unwrap_or(false) {
                    tokio::fs::write(&ignore, "*\n").await.map_err(|e| self.io_error(e))?;
                }
            }
        }
        let raw = serde_json::to_string_pretty(state).map_err(|e| IndexError::Corrupt {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw).await.map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        debug!(index = %self.name, path = %self.path.display(), "Index store saved");
        Ok(())
    }
}

#[async_trait]
impl IndexCollaborator for JsonFileIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_similar(
        &self,
        project_id: &str,
        text: &str,
        limit: usize,
    ) -> Result<Vec<SimilarMatch>, IndexError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.similar(project_id, text, limit))
    }

    async fn find_related(
        &self,
        project_id: &str,
        file_path: &str,
        max_depth: u32,
    ) -> Result<Vec<RelatedNode>, IndexError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.related(project_id, file_path, max_depth))
    }

    async fn list_records(&self, project_id: &str) -> Result<Vec<IndexRecord>, IndexError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.records(project_id))
    }

    async fn upsert_record(
        &self,
        project_id: &str,
        file_path: &str,
        content: &str,
    ) -> Result<IndexRecord, IndexError> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;
        let record = state.upsert(project_id, file_path, content);
        self.save(&state).await?;
        Ok(record)
    }

    async fn delete_record(&self, project_id: &str, file_path: &str) -> Result<(), IndexError> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;
        if state.delete(project_id, file_path) {
            self.save(&state).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_records_persist_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index").join("code.json");

        let index = JsonFileIndex::new("code", &path);
        index.upsert_record("p", "src/a.ts", "export const a = 1;").await.unwrap();
        index
            .upsert_record("p", "src/b.ts", "import { a } from './a';")
            .await
            .unwrap();

        let reopened = JsonFileIndex::new("code", &path);
        let records = reopened.list_records("p").await.unwrap();
        assert_eq!(records.len(), 2);

        let related = reopened.find_related("p", "src/a.ts", 1).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].file_path, "src/b.ts");

        reopened.delete_record("p", "src/a.ts").await.unwrap();
        assert_eq!(index.list_records("p").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_git_ignored_store_writes_catch_all_ignore() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join(".patchwright").join("index");

        let index = JsonFileIndex::new("code", store.join("code.json")).ignored_by_git();
        index.upsert_record("p", "src/a.ts", "export const a = 1;").await.unwrap();
        assert_eq!(std::fs::read_to_string(store.join(".gitignore")).unwrap(), "*\n");

        let plain = JsonFileIndex::new("code", dir.path().join("plain").join("code.json"));
        plain.upsert_record("p", "src/a.ts", "").await.unwrap();
        assert!(!dir.path().join("plain").join(".gitignore").exists());
    }

    #[tokio::test]
    async fn test_missing_store_is_empty() {
        let dir = TempDir::new().unwrap();
        let index = JsonFileIndex::new("code", dir.path().join("absent.json"));
        assert!(index.list_records("p").await.unwrap().is_empty());
        assert_eq!(index.last_updated("p").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_store_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("code.json");
        std::fs::write(&path, "{ not json").unwrap();

        let index = JsonFileIndex::new("code", &path);
        assert!(matches!(
            index.list_records("p").await,
            Err(IndexError::Corrupt { .. })
        ));
    }
}
