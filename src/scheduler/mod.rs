//! Interval-based task scheduling.
//!
//! One long-lived scheduler per process, constructed at startup and injected
//! where needed. It reconciles the configuration catalog into persisted task
//! records, arms one interval timer per active task, and on each tick submits
//! a job to the runner — cadence is fully decoupled from job duration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::types::{Params, ScheduledTask, TaskStatus};
use crate::executors::ExecutorRegistry;
use crate::notify::{NotificationEvent, NotificationSink};
use crate::runner::JobRunner;
use crate::storage::Store;

/// Catalog entry from configuration. Configuration is the source of truth for
/// these fields; run-state fields on the persisted record belong to the
/// scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub task_type: String,
    #[serde(default)]
    pub interval_seconds: Option<f64>,
    #[serde(default)]
    pub params: Params,
}

pub struct TaskScheduler {
    store: Arc<dyn Store>,
    runner: Arc<JobRunner>,
    registry: Arc<ExecutorRegistry>,
    sink: Arc<dyn NotificationSink>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TaskScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        runner: Arc<JobRunner>,
        registry: Arc<ExecutorRegistry>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            runner,
            registry,
            sink,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Reconcile the configuration catalog into persisted records,
    /// create-or-update by id. New tasks start active with zeroed counters.
    pub async fn sync_catalog(&self, catalog: &[TaskDefinition]) -> Result<()> {
        for def in catalog {
            let task = match self.store.get_task(&def.id).await? {
                Some(mut existing) => {
                    existing.name = def.name.clone();
                    existing.description = def.description.clone();
                    existing.task_type = def.task_type.clone();
                    existing.interval_seconds = def.interval_seconds;
                    existing.params = def.params.clone();
                    existing
                }
                None => ScheduledTask {
                    id: def.id.clone(),
                    name: def.name.clone(),
                    description: def.description.clone(),
                    task_type: def.task_type.clone(),
                    interval_seconds: def.interval_seconds,
                    status: TaskStatus::Active,
                    params: def.params.clone(),
                    last_run_at: None,
                    last_run_status: None,
                    last_job_id: None,
                    next_run_at: None,
                    run_count: 0,
                    error_count: 0,
                },
            };
            self.store.upsert_task(&task).await?;
        }
        info!(tasks = catalog.len(), "Task catalog synced");
        Ok(())
    }

    /// Arm timers for every active task with a positive interval.
    pub async fn start(&self) -> Result<()> {
        let tasks = self.store.list_tasks().await?;
        for mut task in tasks {
            if task.status != TaskStatus::Active {
                continue;
            }
            if let Some(next_run) = self.arm_timer(&task) {
                task.next_run_at = Some(next_run);
                self.store.upsert_task(&task).await?;
            }
        }
        Ok(())
    }

    /// Spawn the interval timer for one task. Returns the computed next-fire
    /// time, or None when the task has no valid interval.
    fn arm_timer(&self, task: &ScheduledTask) -> Option<DateTime<Utc>> {
        let secs = task.interval_seconds.filter(|s| *s > 0.0)?;
        let period = Duration::from_secs_f64(secs);

        let store = self.store.clone();
        let runner = self.runner.clone();
        let registry = self.registry.clone();
        let sink = self.sink.clone();
        let task_id = task.id.clone();

        let handle = tokio::spawn(async move {
            let first = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(first, period);
            loop {
                interval.tick().await;
                // A tick must never kill the timer loop.
                if let Err(e) =
                    Self::fire(&store, &runner, &registry, &sink, &task_id, false).await
                {
                    warn!(task_id = %task_id, error = %e, "Scheduled fire failed");
                }
            }
        });

        let mut timers = self.timers.lock().unwrap();
        if let Some(old) = timers.insert(task.id.clone(), handle) {
            old.abort();
        }

        Some(Utc::now() + chrono::Duration::milliseconds((secs * 1000.0) as i64))
    }

    /// Resolve the task and submit one job for it.
    async fn fire(
        store: &Arc<dyn Store>,
        runner: &Arc<JobRunner>,
        registry: &Arc<ExecutorRegistry>,
        sink: &Arc<dyn NotificationSink>,
        task_id: &str,
        manual: bool,
    ) -> Result<Option<String>> {
        let Some(mut task) = store.get_task(task_id).await? else {
            warn!(task_id = %task_id, "Timer fired for missing task");
            return Ok(None);
        };

        // Timer removal is eventually consistent with status changes.
        if !manual && task.status != TaskStatus::Active {
            debug!(task_id = %task_id, "Task no longer active, skipping fire");
            return Ok(None);
        }

        let Some(executor) = registry.get(&task.task_type) else {
            // Dangling catalog entry, not fatal.
            warn!(task_id = %task_id, task_type = %task.task_type, "No executor for task type");
            return Ok(None);
        };

        let job_type = format!("scheduled_{}", task.task_type);
        let job_id = runner
            .submit(&job_type, executor, task.params.clone())
            .await?;

        task.last_run_at = Some(Utc::now());
        task.last_run_status = Some("submitted".to_string());
        task.last_job_id = Some(job_id.clone());
        task.run_count += 1;
        if !manual && let Some(secs) = task.interval_seconds.filter(|s| *s > 0.0) {
            task.next_run_at =
                Some(Utc::now() + chrono::Duration::milliseconds((secs * 1000.0) as i64));
        }
        store.upsert_task(&task).await?;

        let event = if manual {
            NotificationEvent::TaskTriggered {
                task_id: task_id.to_string(),
                job_id: job_id.clone(),
            }
        } else {
            NotificationEvent::TaskSubmitted {
                task_id: task_id.to_string(),
                job_id: job_id.clone(),
            }
        };
        sink.notify(event).await;

        Ok(Some(job_id))
    }

    /// Pause a task: disarm its timer and clear the next-run time.
    /// Idempotent; false if the task does not exist.
    pub async fn pause(&self, task_id: &str) -> Result<bool> {
        let Some(mut task) = self.store.get_task(task_id).await? else {
            return Ok(false);
        };

        task.status = TaskStatus::Paused;
        task.next_run_at = None;
        self.store.upsert_task(&task).await?;

        if let Some(handle) = self.timers.lock().unwrap().remove(task_id) {
            handle.abort();
        }

        self.sink
            .notify(NotificationEvent::TaskPaused {
                task_id: task_id.to_string(),
            })
            .await;
        Ok(true)
    }

    /// Resume a task: re-arm the timer if the interval is valid.
    pub async fn resume(&self, task_id: &str) -> Result<bool> {
        let Some(mut task) = self.store.get_task(task_id).await? else {
            return Ok(false);
        };

        task.status = TaskStatus::Active;
        task.next_run_at = self.arm_timer(&task);
        self.store.upsert_task(&task).await?;

        self.sink
            .notify(NotificationEvent::TaskResumed {
                task_id: task_id.to_string(),
            })
            .await;
        Ok(true)
    }

    /// Run-now request: resolve and submit exactly like a timer fire, without
    /// touching the timer schedule.
    pub async fn trigger(&self, task_id: &str) -> Result<Option<String>> {
        Self::fire(
            &self.store,
            &self.runner,
            &self.registry,
            &self.sink,
            task_id,
            true,
        )
        .await
    }

    /// Abort all timers. Jobs already on the pool are unaffected.
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock().unwrap();
        for (task_id, handle) in timers.drain() {
            debug!(task_id = %task_id, "Disarming timer");
            handle.abort();
        }
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
