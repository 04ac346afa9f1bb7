// Scripted content generator - writes canned contents for scenario tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{ContentGenerator, GenerationOutcome, GenerationRequest, GeneratorError};
use crate::impact::ChangeKind;

/// Writes a fixed content per path (or a marker line by default) and
/// deletes files for delete tasks. Paths registered with `fail_for`
/// report failure without touching the tree.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    contents: HashMap<String, String>,
    failures: HashSet<String>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(mut self, path: &str, content: &str) -> Self {
        self.contents.insert(path.to_string(), content.to_string());
        self
    }

    pub fn fail_for(mut self, path: &str) -> Self {
        self.failures.insert(path.to_string());
        self
    }

    /// Requests seen so far, in invocation order
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .expect("scripted generator lock poisoned")
            .clone()
    }

    fn content_for(&self, request: &GenerationRequest) -> String {
        self.contents
            .get(&request.file_path)
            .cloned()
            .unwrap_or_else(|| format!("// {}\n", request.task_description))
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome, GeneratorError> {
        self.requests
            .lock()
            .expect("scripted generator lock poisoned")
            .push(request.clone());

        if self.failures.contains(&request.file_path) {
            return Ok(GenerationOutcome::failed(format!(
                "scripted failure for {}",
                request.file_path
            )));
        }

        let target = request.project_path.join(&request.file_path);
        let io_error = |e: std::io::Error| GeneratorError::Io {
            path: request.file_path.clone(),
            message: e.to_string(),
        };

        if request.change_kind == ChangeKind::Delete {
            if target.exists() {
                tokio::fs::remove_file(&target).await.map_err(io_error)?;
            }
            return Ok(GenerationOutcome::succeeded(None, format!("deleted {}", request.file_path)));
        }

        let content = self.content_for(request);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(&target, &content).await.map_err(io_error)?;
        Ok(GenerationOutcome::succeeded(Some(content), format!("wrote {}", request.file_path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(project: &std::path::Path, path: &str, change_kind: ChangeKind) -> GenerationRequest {
        GenerationRequest {
            file_path: path.to_string(),
            task_description: "task".to_string(),
            dependencies: Vec::new(),
            validation_criteria: Vec::new(),
            directive: "directive".to_string(),
            change_kind,
            project_path: project.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_writes_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ScriptedGenerator::new().with_content("a.ts", "const a = 1;\n");

        let outcome = generator.generate(&request(dir.path(), "a.ts", ChangeKind::Create)).await.unwrap();
        assert!(outcome.success);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.ts")).unwrap(), "const a = 1;\n");

        generator.generate(&request(dir.path(), "a.ts", ChangeKind::Delete)).await.unwrap();
        assert!(!dir.path().join("a.ts").exists());
        assert_eq!(generator.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_failure_leaves_tree_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ScriptedGenerator::new().fail_for("b.ts");
        let outcome = generator.generate(&request(dir.path(), "b.ts", ChangeKind::Update)).await.unwrap();
        assert!(!outcome.success);
        assert!(!dir.path().join("b.ts").exists());
    }
}
