pub mod json_store;
pub mod mem_store;

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::types::*;

/// Persistence collaborator for jobs, scheduled tasks, workflows and runs.
///
/// The store is the single source of truth across process restarts. Lookups
/// return `None` for missing ids — not-found is never an error here.
#[async_trait]
pub trait Store: Send + Sync {
    // --- Jobs ---

    async fn create_job(&self, job: &Job) -> Result<()>;

    async fn get_job(&self, id: &str) -> Result<Option<Job>>;

    async fn update_job(&self, job: &Job) -> Result<()>;

    /// List jobs, optionally filtered by status, newest first.
    async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>>;

    // --- Scheduled tasks ---

    async fn upsert_task(&self, task: &ScheduledTask) -> Result<()>;

    async fn get_task(&self, id: &str) -> Result<Option<ScheduledTask>>;

    async fn list_tasks(&self) -> Result<Vec<ScheduledTask>>;

    // --- Workflows ---

    async fn upsert_workflow(&self, workflow: &Workflow) -> Result<()>;

    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>>;

    async fn list_workflows(&self) -> Result<Vec<Workflow>>;

    // --- Workflow runs (step runs are embedded in the run record) ---

    async fn create_run(&self, run: &WorkflowRun) -> Result<()>;

    async fn get_run(&self, id: &str) -> Result<Option<WorkflowRun>>;

    async fn update_run(&self, run: &WorkflowRun) -> Result<()>;

    /// List runs, optionally for one workflow, newest first.
    async fn list_runs(&self, workflow_id: Option<&str>) -> Result<Vec<WorkflowRun>>;

    // --- Job-type specific post-processing output ---

    async fn save_backtest_summary(&self, summary: &BacktestSummary) -> Result<()>;
}
