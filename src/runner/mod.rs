pub mod hooks;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::engine::types::{Job, JobStatus, Params};
use crate::executors::Executor;
use crate::runner::hooks::JobHook;
use crate::storage::Store;

/// Live progress of a job, held in memory only. Lost on restart — the
/// persisted record is authoritative once the job is terminal.
#[derive(Debug, Clone, Serialize)]
pub struct LiveProgress {
    pub progress: f64,
    pub message: String,
}

type ProgressMap = Arc<Mutex<HashMap<String, LiveProgress>>>;

/// Callback handed to executors for progress reporting. Writes only the
/// in-memory map; the job record is persisted at terminal transitions only,
/// to avoid write amplification.
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: String,
    map: ProgressMap,
}

impl ProgressReporter {
    pub fn report(&self, fraction: f64, message: &str) {
        let entry = LiveProgress {
            progress: fraction.clamp(0.0, 1.0),
            message: message.to_string(),
        };
        self.map.lock().unwrap().insert(self.job_id.clone(), entry);
    }

    /// Reporter that discards everything. Used for workflow steps, where only
    /// workflow-level progress is surfaced upward.
    pub fn noop() -> Self {
        Self {
            job_id: String::new(),
            map: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Executes units of work on a bounded worker pool.
///
/// Submission enqueues and returns immediately; the pool size is the only
/// backpressure mechanism — a full pool delays, never drops, new submissions.
pub struct JobRunner {
    store: Arc<dyn Store>,
    semaphore: Arc<Semaphore>,
    progress: ProgressMap,
    hooks: Vec<Arc<dyn JobHook>>,
}

impl JobRunner {
    /// Default worker count reflects a single desktop-scale process.
    pub const DEFAULT_WORKERS: usize = 2;

    pub fn new(store: Arc<dyn Store>) -> Self {
        let workers = std::env::var("TRADEFLOW_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| Self::DEFAULT_WORKERS.min(num_cpus::get().max(1)));
        Self::with_workers(store, workers)
    }

    pub fn with_workers(store: Arc<dyn Store>, workers: usize) -> Self {
        Self {
            store,
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            progress: Arc::new(Mutex::new(HashMap::new())),
            hooks: Vec::new(),
        }
    }

    /// Register a post-completion hook, matched against job_type.
    pub fn add_hook(&mut self, hook: Arc<dyn JobHook>) {
        self.hooks.push(hook);
    }

    /// Create the job record and hand the executor to the worker pool.
    /// Never blocks on the executor running.
    pub async fn submit(
        &self,
        job_type: &str,
        executor: Arc<dyn Executor>,
        params: Params,
    ) -> Result<String> {
        let job = Job::new(job_type, params);
        let job_id = job.id.clone();

        self.store.create_job(&job).await?;
        self.progress.lock().unwrap().insert(
            job_id.clone(),
            LiveProgress {
                progress: 0.0,
                message: "Queued".to_string(),
            },
        );

        info!(job_id = %job_id, job_type = %job_type, "Job submitted");

        let store = self.store.clone();
        let semaphore = self.semaphore.clone();
        let progress = self.progress.clone();
        let hooks = self.hooks.clone();

        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.unwrap();
            Self::run_job(store, progress, hooks, executor, &job_id).await;
        });

        Ok(job.id)
    }

    async fn run_job(
        store: Arc<dyn Store>,
        progress: ProgressMap,
        hooks: Vec<Arc<dyn JobHook>>,
        executor: Arc<dyn Executor>,
        job_id: &str,
    ) {
        let mut job = match store.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id = %job_id, "Job record vanished before execution");
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to load job");
                return;
            }
        };

        // Cancelled while waiting for a pool slot.
        if job.status == JobStatus::Cancelled {
            info!(job_id = %job_id, "Job cancelled while queued, skipping");
            return;
        }

        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        if let Err(e) = store.update_job(&job).await {
            error!(job_id = %job_id, error = %e, "Failed to mark job running");
            return;
        }

        let reporter = ProgressReporter {
            job_id: job_id.to_string(),
            map: progress.clone(),
        };
        reporter.report(0.0, "Running");

        let result = executor.execute(&job.params, reporter.clone()).await;

        // Advisory cancellation: if the job was cancelled mid-execution, the
        // cancel write wins and the executor's outcome is dropped.
        match store.get_job(job_id).await {
            Ok(Some(current)) if current.status == JobStatus::Cancelled => {
                info!(job_id = %job_id, "Job was cancelled during execution, discarding result");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to re-read job before terminal write");
                return;
            }
        }

        job.completed_at = Some(Utc::now());
        match result {
            Ok(output) => {
                job.status = JobStatus::Completed;
                job.progress = 1.0;
                job.progress_message = "Complete".to_string();
                job.result = Some(output);
                reporter.report(1.0, "Complete");

                if let Err(e) = store.update_job(&job).await {
                    error!(job_id = %job_id, error = %e, "Failed to persist completed job");
                    return;
                }
                info!(job_id = %job_id, job_type = %job.job_type, "Job completed");

                for hook in hooks.iter().filter(|h| h.job_type() == job.job_type) {
                    if let Err(e) = hook.on_completed(&job).await {
                        warn!(job_id = %job_id, error = %e, "Post-completion hook failed");
                    }
                }
            }
            Err(e) => {
                let err_msg = format!("{:#}", e);
                // Progress stays wherever the executor left it.
                if let Some(live) = progress.lock().unwrap().get(job_id) {
                    job.progress = live.progress;
                }
                job.status = JobStatus::Failed;
                job.progress_message = format!("Failed: {}", err_msg);
                job.error = Some(err_msg.clone());
                reporter.report(job.progress, &job.progress_message);

                if let Err(e) = store.update_job(&job).await {
                    error!(job_id = %job_id, error = %e, "Failed to persist failed job");
                    return;
                }
                error!(job_id = %job_id, job_type = %job.job_type, error = %err_msg, "Job failed");
            }
        }
    }

    /// Advisory cancellation: marks the job cancelled if it is still pending
    /// or running. Does not interrupt an executor already on a worker.
    pub async fn cancel(&self, job_id: &str) -> Result<bool> {
        let Some(mut job) = self.store.get_job(job_id).await? else {
            return Ok(false);
        };
        if job.status.is_terminal() {
            return Ok(false);
        }

        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        self.store.update_job(&job).await?;

        self.progress.lock().unwrap().insert(
            job_id.to_string(),
            LiveProgress {
                progress: job.progress,
                message: "Cancelled".to_string(),
            },
        );

        info!(job_id = %job_id, "Job cancelled");
        Ok(true)
    }

    /// Live in-process progress, if the job was submitted by this process.
    pub fn get_live_progress(&self, job_id: &str) -> Option<LiveProgress> {
        self.progress.lock().unwrap().get(job_id).cloned()
    }
}
