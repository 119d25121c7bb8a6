//! Process-wide service wiring.
//!
//! Every long-lived service (runner, scheduler, engine, breaker registry) is
//! constructed exactly once here and passed by reference — no module-level
//! globals.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::breaker::BreakerRegistry;
use crate::cli::config::TradeflowConfig;
use crate::engine::WorkflowEngine;
use crate::engine::types::Workflow;
use crate::executors::ExecutorRegistry;
use crate::notify::TracingSink;
use crate::runner::JobRunner;
use crate::runner::hooks::BacktestSummaryHook;
use crate::scheduler::TaskScheduler;
use crate::storage::Store;
use crate::storage::json_store::JsonStore;

/// The assembled orchestration core.
pub struct AppContext {
    pub store: Arc<dyn Store>,
    pub runner: Arc<JobRunner>,
    pub registry: Arc<ExecutorRegistry>,
    pub breakers: Arc<BreakerRegistry>,
    pub scheduler: Arc<TaskScheduler>,
    pub engine: Arc<WorkflowEngine>,
}

impl AppContext {
    pub fn build(config: &TradeflowConfig, store_dir: &Path) -> Self {
        let store: Arc<dyn Store> = Arc::new(JsonStore::new(store_dir));

        let mut runner = match config.workers {
            Some(workers) => JobRunner::with_workers(store.clone(), workers),
            None => JobRunner::new(store.clone()),
        };
        runner.add_hook(Arc::new(BacktestSummaryHook::new(store.clone())));
        let runner = Arc::new(runner);

        let breakers = Arc::new(BreakerRegistry::new(config.breaker_config()));
        let registry = Arc::new(ExecutorRegistry::with_builtins(breakers.clone()));
        let sink = Arc::new(TracingSink);

        let scheduler = Arc::new(TaskScheduler::new(
            store.clone(),
            runner.clone(),
            registry.clone(),
            sink.clone(),
        ));

        let engine = Arc::new(WorkflowEngine::new(
            store.clone(),
            registry.clone(),
            runner.clone(),
            sink,
            config.condition_policy.unwrap_or_default(),
        ));

        Self {
            store,
            runner,
            registry,
            breakers,
            scheduler,
            engine,
        }
    }

    /// Reconcile configuration into the store and arm the scheduler.
    pub async fn bootstrap(&self, config: &TradeflowConfig) -> Result<()> {
        self.seed(config).await?;
        self.scheduler.start().await?;
        Ok(())
    }

    /// Reconcile configuration into the store without arming any timers.
    pub async fn seed(&self, config: &TradeflowConfig) -> Result<()> {
        self.scheduler.sync_catalog(&config.tasks).await?;
        self.seed_workflows(config).await?;
        Ok(())
    }

    /// Create-or-update workflow templates from configuration. Run-state
    /// fields (run_count, last_run_at) survive the update.
    async fn seed_workflows(&self, config: &TradeflowConfig) -> Result<()> {
        for seed in &config.workflows {
            let existing = self.store.get_workflow(&seed.id).await?;
            let (run_count, last_run_at) = existing
                .map(|w| (w.run_count, w.last_run_at))
                .unwrap_or((0, None));

            let mut steps = seed.steps.clone();
            steps.sort_by_key(|s| s.order);

            let workflow = Workflow {
                id: seed.id.clone(),
                name: seed.name.clone(),
                category: seed.category.clone(),
                active: true,
                is_template: true,
                schedule_interval_seconds: seed.schedule_interval_seconds,
                schedule_enabled: seed.schedule_enabled,
                default_params: seed.default_params.clone(),
                run_count,
                last_run_at,
                steps,
            };
            self.store.upsert_workflow(&workflow).await?;
        }
        if !config.workflows.is_empty() {
            tracing::info!(workflows = config.workflows.len(), "Workflow templates seeded");
        }
        Ok(())
    }
}
