use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use crate::app::AppContext;
use crate::engine::types::*;
use crate::runner::LiveProgress;

use super::errors::AppError;

// --- Request/Response types ---

#[derive(Deserialize)]
pub struct SubmitJobRequest {
    /// Executor type tag to run (must be registered).
    pub task_type: String,
    #[serde(default)]
    pub params: Params,
}

#[derive(Serialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub job_type: String,
}

#[derive(Serialize)]
pub struct JobResponse {
    #[serde(flatten)]
    pub job: Job,
    /// Live in-process progress; present only while this process is running
    /// the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live: Option<LiveProgress>,
}

#[derive(Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<JobStatus>,
}

#[derive(Deserialize)]
pub struct TriggerWorkflowRequest {
    #[serde(default)]
    pub params: Params,
}

#[derive(Serialize)]
pub struct TriggerWorkflowResponse {
    pub run_id: String,
    pub job_id: Option<String>,
    pub total_steps: u32,
}

#[derive(Deserialize)]
pub struct ListRunsQuery {
    pub workflow_id: Option<String>,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Serialize)]
pub struct TaskActionResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

#[derive(Serialize)]
pub struct ExecutorInfo {
    pub task_type: String,
    pub description: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// --- Jobs ---

pub async fn submit_job(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<Json<SubmitJobResponse>, AppError> {
    let Some(executor) = ctx.registry.get(&req.task_type) else {
        return Err(AppError::BadRequest(format!(
            "Unknown task type: {}",
            req.task_type
        )));
    };

    let job_id = ctx
        .runner
        .submit(&req.task_type, executor, req.params)
        .await?;

    Ok(Json(SubmitJobResponse {
        job_id,
        job_type: req.task_type,
    }))
}

pub async fn list_jobs(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<Job>>, AppError> {
    Ok(Json(ctx.store.list_jobs(query.status).await?))
}

pub async fn get_job(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let Some(job) = ctx.store.get_job(&id).await? else {
        return Err(AppError::NotFound(format!("Job not found: {}", id)));
    };

    // Overlay live progress while running; the persisted record wins once
    // the job is terminal.
    let live = if job.status == JobStatus::Running {
        ctx.runner.get_live_progress(&id)
    } else {
        None
    };

    Ok(Json(JobResponse { job, live }))
}

pub async fn cancel_job(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    let cancelled = ctx.runner.cancel(&id).await?;
    Ok(Json(CancelResponse { cancelled }))
}

// --- Scheduled tasks ---

pub async fn list_tasks(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<Vec<ScheduledTask>>, AppError> {
    Ok(Json(ctx.store.list_tasks().await?))
}

pub async fn pause_task(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<TaskActionResponse>, AppError> {
    if !ctx.scheduler.pause(&id).await? {
        return Err(AppError::NotFound(format!("Task not found: {}", id)));
    }
    Ok(Json(TaskActionResponse {
        ok: true,
        job_id: None,
    }))
}

pub async fn resume_task(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<TaskActionResponse>, AppError> {
    if !ctx.scheduler.resume(&id).await? {
        return Err(AppError::NotFound(format!("Task not found: {}", id)));
    }
    Ok(Json(TaskActionResponse {
        ok: true,
        job_id: None,
    }))
}

pub async fn trigger_task(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<TaskActionResponse>, AppError> {
    match ctx.scheduler.trigger(&id).await? {
        Some(job_id) => Ok(Json(TaskActionResponse {
            ok: true,
            job_id: Some(job_id),
        })),
        None => Err(AppError::NotFound(format!(
            "Task not found or has no executor: {}",
            id
        ))),
    }
}

// --- Workflows & runs ---

pub async fn list_workflows(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<Vec<Workflow>>, AppError> {
    Ok(Json(ctx.store.list_workflows().await?))
}

pub async fn trigger_workflow(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(req): Json<TriggerWorkflowRequest>,
) -> Result<Json<TriggerWorkflowResponse>, AppError> {
    if ctx.store.get_workflow(&id).await?.is_none() {
        return Err(AppError::NotFound(format!("Workflow not found: {}", id)));
    }

    let run = ctx
        .engine
        .trigger(&id, TriggerOrigin::Api, req.params)
        .await
        .map_err(|e| AppError::BadRequest(format!("{:#}", e)))?;

    Ok(Json(TriggerWorkflowResponse {
        run_id: run.id,
        job_id: run.job_id,
        total_steps: run.total_steps,
    }))
}

pub async fn list_runs(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<WorkflowRun>>, AppError> {
    Ok(Json(ctx.store.list_runs(query.workflow_id.as_deref()).await?))
}

pub async fn get_run(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowRun>, AppError> {
    match ctx.store.get_run(&id).await? {
        Some(run) => Ok(Json(run)),
        None => Err(AppError::NotFound(format!("Run not found: {}", id))),
    }
}

pub async fn cancel_run(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    let cancelled = ctx.engine.cancel(&id).await?;
    Ok(Json(CancelResponse { cancelled }))
}

// --- Circuit breakers ---

pub async fn list_breakers(
    State(ctx): State<Arc<AppContext>>,
) -> Json<Vec<crate::breaker::BreakerSnapshot>> {
    Json(ctx.breakers.snapshots())
}

pub async fn reset_breaker(
    State(ctx): State<Arc<AppContext>>,
    Path(key): Path<String>,
) -> Result<Json<TaskActionResponse>, AppError> {
    if !ctx.breakers.reset(&key) {
        return Err(AppError::NotFound(format!("No breaker for key: {}", key)));
    }
    Ok(Json(TaskActionResponse {
        ok: true,
        job_id: None,
    }))
}

// --- Misc ---

pub async fn list_executors(State(ctx): State<Arc<AppContext>>) -> Json<Vec<ExecutorInfo>> {
    let executors = ctx
        .registry
        .list()
        .into_iter()
        .map(|(task_type, description)| ExecutorInfo {
            task_type: task_type.to_string(),
            description: description.to_string(),
        })
        .collect();
    Json(executors)
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
