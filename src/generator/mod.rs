//! Content-generation collaborator
//!
//! The orchestrator hands each task to a [`ContentGenerator`] as an opaque
//! unit of work. The production implementation runs a configured command;
//! the scripted one writes canned contents for scenario tests.

pub mod process;
pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::PatchwrightConfig;
use crate::external::{CommandError, CommandExecutor};
use crate::impact::ChangeKind;

pub use process::ProcessGenerator;
pub use scripted::ScriptedGenerator;

/// Everything the generator needs to produce one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub file_path: String,
    pub task_description: String,
    pub dependencies: Vec<String>,
    pub validation_criteria: Vec<String>,
    /// Free-text instructions for the generator
    pub directive: String,
    pub change_kind: ChangeKind,
    pub project_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub success: bool,
    pub content: Option<String>,
    pub message: String,
}

impl GenerationOutcome {
    pub fn succeeded(content: Option<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            content,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("No content generator is configured (set generator.command)")]
    Unconfigured,
    #[error("Generator command failed: {0}")]
    Command(#[from] CommandError),
    #[error("Failed to write generated content to {path}: {message}")]
    Io { path: String, message: String },
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome, GeneratorError>;
}

/// Stands in when no generator command is configured and fails every task
#[derive(Debug, Default)]
pub struct UnconfiguredGenerator;

#[async_trait]
impl ContentGenerator for UnconfiguredGenerator {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<GenerationOutcome, GeneratorError> {
        Err(GeneratorError::Unconfigured)
    }
}

/// The process generator when `generator.command` is set, otherwise the
/// unconfigured one
pub fn from_config(executor: Arc<dyn CommandExecutor>, config: &PatchwrightConfig) -> Arc<dyn ContentGenerator> {
    match &config.generator.command {
        Some(argv) if !argv.is_empty() => Arc::new(ProcessGenerator::new(
            executor,
            argv.clone(),
            config.timeouts.generator(),
            config.generator.write_stdout_to_file,
        )),
        _ => Arc::new(UnconfiguredGenerator),
    }
}
