//! `metabrain` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — check a workflow definition and describe its graph.
//! - `run`      — register definitions and process one task through them.
//! - `migrate`  — run pending database migrations.
//! - `memory`   — print what the hierarchical memory holds.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{
    validate_definition, EngineConfig, Orchestrator, TemplateRegistry, Workflow, WorkflowDefinition,
};
use memory::{BackendKind, HierarchicalMemory};

#[derive(Parser)]
#[command(name = "metabrain", about = "Node-graph workflow engine with hierarchical memory", version)]
struct Cli {
    /// Engine configuration file (TOML).
    #[arg(long, global = true, env = "METABRAIN_CONFIG")]
    config: Option<PathBuf>,

    /// Use the SQLite memory backend at this URL, overriding the config file.
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Register workflow definitions and process one task through them.
    Run {
        /// Workflow definition files, registered in order.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Task input as JSON.
        #[arg(long, default_value = "{}")]
        input: String,
        /// Only run workflows carrying all of these tags (comma separated).
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
    },
    /// Run pending database migrations.
    Migrate,
    /// Print memory statistics.
    Memory {
        /// Number of recent episodes to show.
        #[arg(long, default_value_t = 5)]
        episodes: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.database_url.as_deref())?;

    match cli.command {
        Command::Validate { path } => {
            let def = read_definition(&path)?;
            let report = validate_definition(&def).with_context(|| format!("{} is invalid", path.display()))?;
            Workflow::from_definition(&def, &TemplateRegistry::with_builtins(), &config.executor)
                .with_context(|| format!("{} cannot be built", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Run { paths, input, tags } => {
            let input: Value = serde_json::from_str(&input).context("--input is not valid JSON")?;
            let brain = Orchestrator::from_config(&config).await?;
            let factory = TemplateRegistry::with_builtins();

            for path in &paths {
                let def = read_definition(path)?;
                let workflow = Workflow::from_definition(&def, &factory, &config.executor)
                    .with_context(|| format!("cannot build {}", path.display()))?;
                let version = brain.register_workflow(&workflow).await;
                info!(workflow = workflow.name(), version, "definition loaded");
            }

            let processed = brain.process(input, tags.as_deref()).await?;
            let summary = json!({
                "context_id": processed.context.id(),
                "output": processed.output,
                "workflows": processed.workflows,
                "fallback_triggered": processed.fallback_triggered,
                "log": processed.context.log().iter().map(|r| json!({
                    "workflow": r.workflow,
                    "node_id": r.node_id,
                    "fingerprint": r.fingerprint,
                })).collect::<Vec<_>>(),
                "metadata": processed.context.all_metadata(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);

            save_snapshot(&config, brain.memory()).await?;
        }

        Command::Migrate => {
            let url = &config.memory.database_url;
            info!("Running migrations against {url}");
            let pool = db::pool::create_pool(url, 2).await.context("failed to connect to database")?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
        }

        Command::Memory { episodes } => {
            let memory = HierarchicalMemory::connect(&config.memory).await?;
            let report = json!({
                "episodes": memory.episode_count().await?,
                "recent": memory.recent_episodic(episodes).await?,
                "procedural": memory.all_procedural().await?.iter().map(|s| json!({
                    "name": s.name,
                    "invocations": s.invocations,
                    "success_rate": s.success_rate(),
                    "mean_cost": s.mean_cost(),
                    "total_duration_ms": s.total_duration_ms,
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>, database_url: Option<&str>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(url) = database_url {
        config.memory.backend = BackendKind::Sqlite;
        config.memory.database_url = url.to_owned();
    }
    Ok(config)
}

fn read_definition(path: &Path) -> Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path).with_context(|| format!("cannot read file {}", path.display()))?;
    Ok(WorkflowDefinition::from_json(&content)?)
}

async fn save_snapshot(config: &EngineConfig, memory: &HierarchicalMemory) -> Result<()> {
    if config.memory.backend != BackendKind::InMemory {
        return Ok(());
    }
    if let Some(path) = &config.memory.snapshot_path {
        memory.save_json(path).await?;
    }
    Ok(())
}
