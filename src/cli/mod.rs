pub mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::app::AppContext;
use crate::cli::config::TradeflowConfig;
use crate::engine::types::{Params, TriggerOrigin};

#[derive(Parser)]
#[command(name = "tradeflow", version, about = "Background job and workflow orchestration core")]
pub struct Cli {
    /// Path to a .env file to load (default: auto-detect .env in cwd)
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,

    /// Path to tradeflow.yaml (default: auto-detect in cwd)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Trigger a workflow and wait for its run to finish
    Trigger {
        /// Workflow ID
        workflow_id: String,

        /// Caller parameters as JSON string (win over workflow defaults)
        #[arg(short, long)]
        params: Option<String>,

        /// State store directory
        #[arg(long, default_value = "data/store")]
        store_dir: PathBuf,
    },

    /// Run a scheduled task immediately, bypassing its timer
    RunTask {
        /// Task ID from the catalog
        task_id: String,

        /// State store directory
        #[arg(long, default_value = "data/store")]
        store_dir: PathBuf,
    },

    /// List workflow runs
    Runs {
        /// Filter by workflow ID
        #[arg(short, long)]
        workflow: Option<String>,

        /// State store directory
        #[arg(long, default_value = "data/store")]
        store_dir: PathBuf,
    },

    /// List jobs
    Jobs {
        /// Filter by status (pending, running, completed, failed, cancelled)
        #[arg(short, long)]
        status: Option<String>,

        /// State store directory
        #[arg(long, default_value = "data/store")]
        store_dir: PathBuf,
    },

    /// List registered executor types
    Executors,

    /// Start the REST API server with the scheduler armed
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0", env = "HOST")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "3000", env = "PORT")]
        port: u16,

        /// State store directory
        #[arg(long, default_value = "data/store", env = "STORE_DIR")]
        store_dir: PathBuf,
    },
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file
    load_dotenv(cli.dotenv.as_deref());

    let config = TradeflowConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Trigger {
            workflow_id,
            params,
            store_dir,
        } => cmd_trigger(&config, workflow_id, params, store_dir).await,
        Commands::RunTask { task_id, store_dir } => cmd_run_task(&config, task_id, store_dir).await,
        Commands::Runs {
            workflow,
            store_dir,
        } => cmd_runs(&config, workflow, store_dir).await,
        Commands::Jobs { status, store_dir } => cmd_jobs(&config, status, store_dir).await,
        Commands::Executors => cmd_executors(&config),
        Commands::Serve {
            host,
            port,
            store_dir,
        } => {
            let host = config.host.clone().unwrap_or(host);
            let port = config.port.unwrap_or(port);
            let store_dir = config
                .store_dir
                .clone()
                .map(PathBuf::from)
                .unwrap_or(store_dir);

            let ctx = Arc::new(AppContext::build(&config, &store_dir));
            ctx.bootstrap(&config).await?;
            crate::api::serve(&host, port, ctx).await
        }
    }
}

/// Load environment variables from a .env file.
/// If an explicit path is given, load from that path (error if missing).
/// Otherwise, auto-detect .env in the current working directory (silently skip if absent).
fn load_dotenv(explicit_path: Option<&std::path::Path>) {
    match explicit_path {
        Some(path) => match dotenvy::from_path(path) {
            Ok(()) => info!("Loaded env from {}", path.display()),
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load dotenv file '{}': {}",
                    path.display(),
                    e
                );
            }
        },
        None => {
            // Auto-detect .env in current directory
            match dotenvy::dotenv() {
                Ok(path) => info!("Loaded env from {}", path.display()),
                Err(dotenvy::Error::Io(_)) => {
                    // No .env file found — that's fine, silently skip
                }
                Err(e) => {
                    eprintln!("Warning: Failed to parse .env file: {}", e);
                }
            }
        }
    }
}

fn parse_params(json: Option<String>) -> Result<Params> {
    match json {
        Some(s) => serde_json::from_str(&s).context("Failed to parse --params as a JSON object"),
        None => Ok(Params::new()),
    }
}

async fn cmd_trigger(
    config: &TradeflowConfig,
    workflow_id: String,
    params_json: Option<String>,
    store_dir: PathBuf,
) -> Result<()> {
    let ctx = Arc::new(AppContext::build(config, &store_dir));
    // Seed templates but leave the interval timers unarmed for a one-shot run.
    ctx.seed(config).await?;

    let params = parse_params(params_json)?;
    let run = ctx
        .engine
        .trigger(&workflow_id, TriggerOrigin::Manual, params)
        .await?;

    println!("Run: {} ({} steps)", run.id, run.total_steps);

    // Poll until the run reaches a terminal state.
    loop {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let Some(current) = ctx.store.get_run(&run.id).await? else {
            anyhow::bail!("Run record disappeared: {}", run.id);
        };
        if current.status.is_terminal() {
            println!("Status: {}", current.status);
            for step in &current.step_runs {
                println!(
                    "  [{}] {} — {}{}",
                    step.order,
                    step.name,
                    step.status,
                    step.error
                        .as_deref()
                        .map(|e| format!(" ({})", e))
                        .unwrap_or_default()
                );
            }
            if let Some(error) = &current.error {
                println!("Error: {}", error);
            }
            break;
        }
    }
    Ok(())
}

async fn cmd_run_task(config: &TradeflowConfig, task_id: String, store_dir: PathBuf) -> Result<()> {
    let ctx = Arc::new(AppContext::build(config, &store_dir));
    ctx.scheduler.sync_catalog(&config.tasks).await?;

    match ctx.scheduler.trigger(&task_id).await? {
        Some(job_id) => println!("Submitted job {}", job_id),
        None => println!("Task '{}' did not submit (missing or unknown type)", task_id),
    }
    Ok(())
}

async fn cmd_runs(
    config: &TradeflowConfig,
    workflow: Option<String>,
    store_dir: PathBuf,
) -> Result<()> {
    let ctx = AppContext::build(config, &store_dir);
    let runs = ctx.store.list_runs(workflow.as_deref()).await?;

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }
    for run in runs {
        println!(
            "{}  {}  {}  {}/{} steps  {}",
            run.id,
            run.workflow_id,
            run.status,
            run.current_step,
            run.total_steps,
            run.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn cmd_jobs(
    config: &TradeflowConfig,
    status: Option<String>,
    store_dir: PathBuf,
) -> Result<()> {
    let status = match status.as_deref() {
        Some(s) => Some(
            serde_json::from_value(serde_json::Value::String(s.to_string()))
                .with_context(|| format!("Invalid status filter: {}", s))?,
        ),
        None => None,
    };

    let ctx = AppContext::build(config, &store_dir);
    let jobs = ctx.store.list_jobs(status).await?;

    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }
    for job in jobs {
        println!(
            "{}  {}  {}  {:.0}%  {}",
            job.id,
            job.job_type,
            job.status,
            job.progress * 100.0,
            job.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn cmd_executors(config: &TradeflowConfig) -> Result<()> {
    let breakers = Arc::new(crate::breaker::BreakerRegistry::new(config.breaker_config()));
    let registry = crate::executors::ExecutorRegistry::with_builtins(breakers);

    println!("Available executors:");
    for (task_type, description) in registry.list() {
        println!("  {:<16} {}", task_type, description);
    }
    Ok(())
}
