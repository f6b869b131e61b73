//! Command handlers.

use crate::config::ServerConfig;
use anyhow::Context;
use console::style;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_core::ProjectId;
use strata_core::ports::{PipelineRepository, ScheduleRepository, TaskQueue};
use strata_db::{Database, MemoryPipelineRepository, MemoryScheduleRepository, MemoryTaskQueue};
use strata_plugins::PluginRegistry;
use strata_runner::{ExecutionEngine, ExecutionPlan};
use strata_scheduler::{Orchestrator, Scheduler};
use strata_worker::{FileResultSink, WorkerContext, WorkerManager};
use tracing::info;

struct Backends {
    schedules: Arc<dyn ScheduleRepository>,
    pipelines: Arc<dyn PipelineRepository>,
    queue: Arc<dyn TaskQueue>,
}

async fn backends(config: &ServerConfig) -> anyhow::Result<Backends> {
    match &config.database.url {
        Some(url) => {
            let db = Database::connect_with(url, config.database.max_connections).await?;
            db.migrate().await?;
            info!("Using PostgreSQL backends");
            Ok(Backends {
                schedules: Arc::new(db.schedules()),
                pipelines: Arc::new(db.pipelines()),
                queue: Arc::new(db.task_queue()),
            })
        }
        None => {
            info!("No database configured, using in-memory backends");
            Ok(Backends {
                schedules: Arc::new(MemoryScheduleRepository::new()),
                pipelines: Arc::new(MemoryPipelineRepository::new()),
                queue: Arc::new(MemoryTaskQueue::new()),
            })
        }
    }
}

/// Run the scheduler and worker manager until Ctrl-C.
pub async fn serve(
    config: &ServerConfig,
    pipeline_dir: Option<&Path>,
    project: &str,
) -> anyhow::Result<()> {
    let backends = backends(config).await?;

    let registry = Arc::new(PluginRegistry::with_builtins(config.http_config())?);
    let engine = Arc::new(ExecutionEngine::new(registry, config.engine_config()));

    let scheduler = Scheduler::new(
        Arc::clone(&backends.schedules),
        Arc::clone(&backends.queue),
        config.scheduler_config(),
    );
    let orchestrator = Orchestrator::new(
        Arc::clone(&backends.schedules),
        Arc::clone(&backends.pipelines),
        Arc::clone(&backends.queue),
        Arc::clone(&scheduler),
    );

    if let Some(dir) = pipeline_dir {
        for path in pipeline_files(dir)? {
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let stored = orchestrator
                .register_pipeline(ProjectId::new(project), source)
                .await
                .with_context(|| format!("registering {}", path.display()))?;
            println!(
                "{} Registered {} as {}",
                style("✓").green(),
                style(&stored.name).bold(),
                stored.id
            );
        }
    }

    let context = Arc::new(WorkerContext::new(
        Arc::clone(&backends.queue),
        Arc::clone(&backends.pipelines),
        engine,
        Arc::new(FileResultSink::new(config.worker.results_dir.clone())),
    ));
    let manager = Arc::new(WorkerManager::new(config.worker.clone(), context));

    let scheduler_handle = scheduler.start().await?;
    let worker_handle = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.run().await })
    };

    info!("Strata running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    scheduler.shutdown();
    manager.shutdown().await;
    scheduler_handle.await?;
    worker_handle.await?;

    Ok(())
}

fn pipeline_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if path.is_file() && is_yaml {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn load_plan(path: &Path) -> anyhow::Result<ExecutionPlan> {
    let source =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(strata_runner::parse(&source)?)
}

/// Parse a pipeline source and print its steps.
pub fn validate(path: &Path) -> anyhow::Result<()> {
    let plan = load_plan(path)?;

    println!(
        "{} Pipeline \"{}\" ({}) is valid",
        style("✓").green(),
        plan.name(),
        plan.pipeline_type()
    );
    println!("  Steps: {}", plan.len());
    for step in plan.steps() {
        println!("    - {} [{}] -> {}", step.name, step.plugin, step.output);
    }

    Ok(())
}

pub fn name(path: &Path) -> anyhow::Result<()> {
    let source =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    println!("{}", strata_runner::get_name(&source)?);
    Ok(())
}

/// Execute a pipeline in-process with the builtin plugins.
pub async fn run(
    config: &ServerConfig,
    path: &Path,
    params: &[(String, Value)],
) -> anyhow::Result<()> {
    let plan = load_plan(path)?;
    let registry = Arc::new(PluginRegistry::with_builtins(config.http_config())?);
    let engine = ExecutionEngine::new(registry, config.engine_config());
    let params: HashMap<String, Value> = params.iter().cloned().collect();

    println!("{} Running {}", style("▶").cyan(), style(plan.name()).bold());

    match engine.execute(&plan, &params).await {
        Ok(report) => {
            println!(
                "{} Completed in {} steps",
                style("✓").green(),
                report.steps_executed
            );
            println!("{}", serde_json::to_string_pretty(&report.context)?);
            Ok(())
        }
        Err(failure) => {
            println!(
                "{} Failed after {} steps",
                style("✗").red(),
                failure.steps_executed
            );
            println!("{}", serde_json::to_string_pretty(&failure.context)?);
            Err(strata_core::Error::from(failure.error).into())
        }
    }
}

/// Print the JSON Schema for pipeline sources.
pub fn schema() -> anyhow::Result<()> {
    let schema = schemars::schema_for!(strata_core::pipeline::PipelineSource);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), "").unwrap();
        std::fs::write(dir.path().join("a.yml"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let names: Vec<_> = pipeline_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.yml", "b.yaml"]);
    }

    #[tokio::test]
    async fn test_run_reports_step_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(
            &path,
            "name: bad\ntype: processing\nsteps:\n  - name: one\n    plugin: context/set\n    config: { nope: 1 }\n",
        )
        .unwrap();

        let err = run(&ServerConfig::default(), &path, &[]).await.unwrap_err();
        assert!(err.to_string().contains("Step 'one' (#0)"));
    }
}
