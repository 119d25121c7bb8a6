use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use crate::engine::types::*;
use crate::storage::Store;

/// File-based JSON store. One subdirectory per collection, one file per
/// record, written atomically via tmp + rename.
pub struct JsonStore {
    base_dir: PathBuf,
    lock: RwLock<()>,
}

impl JsonStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            lock: RwLock::new(()),
        }
    }

    fn record_path(&self, collection: &str, id: &str) -> PathBuf {
        self.base_dir.join(collection).join(format!("{}.json", id))
    }

    async fn read_record<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>> {
        let path = self.record_path(collection, id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read record file: {}", path.display()))?;
        let record: T = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse record: {}/{}", collection, id))?;
        Ok(Some(record))
    }

    async fn write_record<T: Serialize>(&self, collection: &str, id: &str, record: &T) -> Result<()> {
        let dir = self.base_dir.join(collection);
        tokio::fs::create_dir_all(&dir).await?;

        let path = self.record_path(collection, id);
        let tmp_path = path.with_extension("json.tmp");

        let data = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        Ok(())
    }

    async fn read_all<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        let dir = self.base_dir.join(collection);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json")
                && let Ok(data) = tokio::fs::read_to_string(&path).await
                && let Ok(record) = serde_json::from_str::<T>(&data)
            {
                records.push(record);
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn create_job(&self, job: &Job) -> Result<()> {
        let _lock = self.lock.write().await;
        self.write_record("jobs", &job.id, job).await
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let _lock = self.lock.read().await;
        self.read_record("jobs", id).await
    }

    async fn update_job(&self, job: &Job) -> Result<()> {
        let _lock = self.lock.write().await;
        self.write_record("jobs", &job.id, job).await
    }

    async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
        let _lock = self.lock.read().await;
        let mut jobs: Vec<Job> = self.read_all("jobs").await?;
        if let Some(filter) = status {
            jobs.retain(|j| j.status == filter);
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn upsert_task(&self, task: &ScheduledTask) -> Result<()> {
        let _lock = self.lock.write().await;
        self.write_record("tasks", &task.id, task).await
    }

    async fn get_task(&self, id: &str) -> Result<Option<ScheduledTask>> {
        let _lock = self.lock.read().await;
        self.read_record("tasks", id).await
    }

    async fn list_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let _lock = self.lock.read().await;
        let mut tasks: Vec<ScheduledTask> = self.read_all("tasks").await?;
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    async fn upsert_workflow(&self, workflow: &Workflow) -> Result<()> {
        let _lock = self.lock.write().await;
        self.write_record("workflows", &workflow.id, workflow).await
    }

    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        let _lock = self.lock.read().await;
        self.read_record("workflows", id).await
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let _lock = self.lock.read().await;
        let mut workflows: Vec<Workflow> = self.read_all("workflows").await?;
        workflows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(workflows)
    }

    async fn create_run(&self, run: &WorkflowRun) -> Result<()> {
        let _lock = self.lock.write().await;
        self.write_record("runs", &run.id, run).await
    }

    async fn get_run(&self, id: &str) -> Result<Option<WorkflowRun>> {
        let _lock = self.lock.read().await;
        self.read_record("runs", id).await
    }

    async fn update_run(&self, run: &WorkflowRun) -> Result<()> {
        let _lock = self.lock.write().await;
        self.write_record("runs", &run.id, run).await
    }

    async fn list_runs(&self, workflow_id: Option<&str>) -> Result<Vec<WorkflowRun>> {
        let _lock = self.lock.read().await;
        let mut runs: Vec<WorkflowRun> = self.read_all("runs").await?;
        if let Some(wf) = workflow_id {
            runs.retain(|r| r.workflow_id == wf);
        }
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    async fn save_backtest_summary(&self, summary: &BacktestSummary) -> Result<()> {
        let _lock = self.lock.write().await;
        self.write_record("backtest_summaries", &summary.job_id, summary)
            .await
    }
}
