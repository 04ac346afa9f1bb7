use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ContentGenerator, GenerationOutcome, GenerationRequest, GeneratorError};
use crate::external::command::{render_command, split_argv};
use crate::external::CommandExecutor;

/// Runs the configured generator command once per task.
///
/// The task directive is appended as the last argument and the command runs
/// in the project root. With `write_stdout_to_file` the command's stdout
/// becomes the file's new content; otherwise the command edits files itself.
pub struct ProcessGenerator {
    executor: Arc<dyn CommandExecutor>,
    argv: Vec<String>,
    timeout: Duration,
    write_stdout_to_file: bool,
}

impl ProcessGenerator {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        argv: Vec<String>,
        timeout: Duration,
        write_stdout_to_file: bool,
    ) -> Self {
        Self {
            executor,
            argv,
            timeout,
            write_stdout_to_file,
        }
    }
}

#[async_trait]
impl ContentGenerator for ProcessGenerator {
    fn name(&self) -> &str {
        "process"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome, GeneratorError> {
        let (program, base_args) = split_argv(&self.argv).ok_or(GeneratorError::Unconfigured)?;
        let mut args = base_args.to_vec();
        args.push(request.directive.clone());

        debug!(
            command = %render_command(program, base_args),
            file = %request.file_path,
            "Invoking content generator"
        );
        let output = self
            .executor
            .execute(&request.project_path, program, &args, self.timeout)
            .await?;

        if !output.success() {
            warn!(
                file = %request.file_path,
                status = output.status_code,
                "Content generator reported failure"
            );
            return Ok(GenerationOutcome::failed(format!(
                "generator exited with status {}: {}",
                output.status_code,
                output.combined().trim()
            )));
        }

        if self.write_stdout_to_file {
            let target = request.project_path.join(&request.file_path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| GeneratorError::Io {
                    path: request.file_path.clone(),
                    message: e.to_string(),
                })?;
            }
            tokio::fs::write(&target, &output.stdout)
                .await
                .map_err(|e| GeneratorError::Io {
                    path: request.file_path.clone(),
                    message: e.to_string(),
                })?;
            return Ok(GenerationOutcome::succeeded(
                Some(output.stdout),
                format!("wrote {}", request.file_path),
            ));
        }

        Ok(GenerationOutcome::succeeded(None, output.stdout.trim().to_string()))
    }
}
