use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::types::*;
use crate::storage::Store;

/// In-memory store. Holds records only for the lifetime of the instance;
/// used by tests and ephemeral setups.
#[derive(Default)]
pub struct MemStore {
    jobs: Mutex<HashMap<String, Job>>,
    tasks: Mutex<HashMap<String, ScheduledTask>>,
    workflows: Mutex<HashMap<String, Workflow>>,
    runs: Mutex<HashMap<String, WorkflowRun>>,
    summaries: Mutex<HashMap<String, BacktestSummary>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summaries saved by the backtest hook, for assertions in tests.
    pub fn backtest_summaries(&self) -> Vec<BacktestSummary> {
        self.summaries.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn create_job(&self, job: &Job) -> Result<()> {
        self.jobs
            .lock()
            .unwrap()
            .insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.jobs.lock().unwrap().get(id).cloned())
    }

    async fn update_job(&self, job: &Job) -> Result<()> {
        self.jobs
            .lock()
            .unwrap()
            .insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self.jobs.lock().unwrap().values().cloned().collect();
        if let Some(filter) = status {
            jobs.retain(|j| j.status == filter);
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn upsert_task(&self, task: &ScheduledTask) -> Result<()> {
        self.tasks
            .lock()
            .unwrap()
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get_task(&self, id: &str) -> Result<Option<ScheduledTask>> {
        Ok(self.tasks.lock().unwrap().get(id).cloned())
    }

    async fn list_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let mut tasks: Vec<ScheduledTask> = self.tasks.lock().unwrap().values().cloned().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    async fn upsert_workflow(&self, workflow: &Workflow) -> Result<()> {
        self.workflows
            .lock()
            .unwrap()
            .insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        Ok(self.workflows.lock().unwrap().get(id).cloned())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let mut workflows: Vec<Workflow> =
            self.workflows.lock().unwrap().values().cloned().collect();
        workflows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(workflows)
    }

    async fn create_run(&self, run: &WorkflowRun) -> Result<()> {
        self.runs
            .lock()
            .unwrap()
            .insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn get_run(&self, id: &str) -> Result<Option<WorkflowRun>> {
        Ok(self.runs.lock().unwrap().get(id).cloned())
    }

    async fn update_run(&self, run: &WorkflowRun) -> Result<()> {
        self.runs
            .lock()
            .unwrap()
            .insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn list_runs(&self, workflow_id: Option<&str>) -> Result<Vec<WorkflowRun>> {
        let mut runs: Vec<WorkflowRun> = self.runs.lock().unwrap().values().cloned().collect();
        if let Some(wf) = workflow_id {
            runs.retain(|r| r.workflow_id == wf);
        }
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    async fn save_backtest_summary(&self, summary: &BacktestSummary) -> Result<()> {
        self.summaries
            .lock()
            .unwrap()
            .insert(summary.job_id.clone(), summary.clone());
        Ok(())
    }
}
