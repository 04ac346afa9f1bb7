use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use patchwright::branching::BranchManager;
use patchwright::config::PatchwrightConfig;
use patchwright::external::{CommandExecutor, ProcessCommandExecutor};
use patchwright::index::IndexRegistry;
use patchwright::orchestrator::{OrchestrationOptions, Orchestrator};
use patchwright::reconcile::{ReconcileRequest, ReconcileScope, Reconciler};
use patchwright::shutdown::CancellationToken;
use patchwright::telemetry::init_telemetry;

const EXIT_PIPELINE_FAILURE: u8 = 1;
const EXIT_FATAL: u8 = 2;

#[derive(Parser)]
#[command(name = "patchwright")]
#[command(about = "Plan, apply, validate and land AI-generated code changes on isolated branches")]
struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true, help = "Path to the project repository")]
    project: Option<PathBuf>,

    /// Project identifier used for index records
    #[arg(long, global = true, help = "Project identifier for index records (defaults to the directory name)")]
    project_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a change request through the full pipeline
    Orchestrate {
        /// Natural-language change request
        request: String,
        #[arg(long, help = "Skip both validation gates")]
        skip_gates: bool,
        #[arg(long, help = "Continue even when pre-execution validation fails")]
        force: bool,
        #[arg(long, help = "Analyze, branch and snapshot without executing tasks")]
        dry_run: bool,
        #[arg(long, help = "Roll back automatically when post-execution checks fail")]
        auto_rollback: bool,
        #[arg(long = "file", help = "File to treat as a primary target (repeatable)")]
        files: Vec<String>,
    },
    /// Bring persisted indexes back in line with the codebase
    Reconcile {
        #[arg(long, default_value = "full", help = "full, incremental or selective")]
        scope: ReconcileScope,
        #[arg(long, help = "Treat indexes not updated within this many hours as outdated")]
        since: Option<i64>,
        #[arg(long, help = "Report planned actions without applying them")]
        dry_run: bool,
        #[arg(long = "index", help = "Index to reconcile (repeatable, defaults to all)")]
        indexes: Vec<String>,
    },
    /// Delete old generated branches and their snapshot refs
    Cleanup {
        #[arg(long, default_value = "7", help = "Delete branches whose last commit is older than this")]
        max_age_days: i64,
        #[arg(long, help = "Keep branches already merged into the current branch")]
        keep_merged: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {e}");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_PIPELINE_FAILURE),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Fatal error");
            println!("{}", json!({ "success": false, "error": format!("{e:#}") }));
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn project_id_for(project: &Path, explicit: Option<String>) -> String {
    explicit.unwrap_or_else(|| {
        project
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "default".to_string())
    })
}

/// `hours` before now, rejecting negative or unrepresentable spans
fn staleness_cutoff(hours: i64) -> Result<DateTime<Utc>> {
    if hours < 0 {
        bail!("--since must not be negative (got {hours})");
    }
    ChronoDuration::try_hours(hours)
        .and_then(|span| Utc::now().checked_sub_signed(span))
        .with_context(|| format!("--since {hours} is out of range"))
}

/// Returns whether the command succeeded
async fn run(cli: Cli) -> Result<bool> {
    let project = match cli.project {
        Some(project) => project,
        None => std::env::current_dir().context("Cannot determine current directory")?,
    };
    let project = project
        .canonicalize()
        .with_context(|| format!("Project path {} does not exist", project.display()))?;

    PatchwrightConfig::load_env_file(&project)?;
    let config = PatchwrightConfig::load(&project).context("Failed to load configuration")?;
    init_telemetry(config.observability.json_logs, &config.observability.log_level)?;

    let project_id = project_id_for(&project, cli.project_id);
    let executor: Arc<dyn CommandExecutor> = Arc::new(ProcessCommandExecutor);
    let indexes = IndexRegistry::from_config(&project, &config.index);

    match cli.command {
        Commands::Orchestrate {
            request,
            skip_gates,
            force,
            dry_run,
            auto_rollback,
            files,
        } => {
            let cancel = CancellationToken::new();
            cancel.cancel_on_ctrl_c();
            let generator = patchwright::generator::from_config(executor.clone(), &config);
            let orchestrator = Orchestrator::new(&project, project_id, config, executor, indexes, generator)
                .with_cancellation(cancel);
            let options = OrchestrationOptions {
                skip_gates,
                force,
                dry_run,
                auto_rollback,
                explicit_files: files,
            };

            let result = orchestrator.orchestrate(&request, &options).await?;
            let summary = json!({
                "success": result.success,
                "phase": result.phase,
                "branch": result.branch_name,
                "branch_status": result.branch_status,
                "risk_level": result.impact.as_ref().map(|impact| impact.risk_level),
                "total_files": result.impact.as_ref().map(|impact| impact.total_files),
                "completed_tasks": result.completed_tasks.len(),
                "failed_tasks": result.failed_tasks.len(),
                "blocking_errors": result.blocking_error_count(),
                "snapshots": result.snapshots.len(),
                "rollback_performed": result.rollback_performed,
                "integration_phase": result.integration_result.as_ref().map(|integration| integration.phase),
                "fixes_applied": result.integration_result.as_ref().map(|integration| integration.fixes_applied.clone()),
                "message": result.message,
                "next_steps": result.next_steps,
                "duration": result.estimated_time_actual,
                "correlation_id": result.correlation_id,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(result.success)
        }
        Commands::Reconcile {
            scope,
            since,
            dry_run,
            indexes: targets,
        } => {
            let reconciler = Reconciler::new(indexes, config.reconciliation.clone());
            let request = ReconcileRequest {
                project_path: project.clone(),
                project_id,
                scope,
                target_indexes: targets,
                since: since.map(staleness_cutoff).transpose()?,
                dry_run,
            };
            let result = reconciler.reconcile(&request).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(result.errors_encountered == 0)
        }
        Commands::Cleanup {
            max_age_days,
            keep_merged,
        } => {
            let branches = BranchManager::for_project(
                &project,
                executor,
                config.branching.clone(),
                config.timeouts.git(),
            );
            let report = branches.cleanup_branches(max_age_days, keep_merged).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(report.errors.is_empty())
        }
    }
}
