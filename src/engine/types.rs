use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Input parameters handed to an executor — a JSON-compatible key-value map.
pub type Params = HashMap<String, serde_json::Value>;

/// Result payload returned by an executor. Opaque to the orchestration core.
pub type ExecResult = HashMap<String, serde_json::Value>;

/// Status of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal jobs are immutable — no further status writes are accepted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A unit of asynchronous work tracked by the job runner.
///
/// Created on submission, mutated only by the runner, immutable once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: String,
    pub status: JobStatus,
    /// Fraction in [0, 1]. Persisted only at terminal transitions; live values
    /// come from the runner's in-memory progress map.
    pub progress: f64,
    pub progress_message: String,
    pub params: Params,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(job_type: &str, params: Params) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_type: job_type.to_string(),
            status: JobStatus::Pending,
            progress: 0.0,
            progress_message: "Queued".to_string(),
            params,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Status of a recurring scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Paused,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Active => write!(f, "active"),
            TaskStatus::Paused => write!(f, "paused"),
        }
    }
}

/// A recurring trigger definition, reconciled from the configuration catalog.
///
/// Configuration owns name/description/type/interval/params; the scheduler
/// owns the run-state fields (last_run_*, next_run_at, counters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub task_type: String,
    /// None → the task never fires.
    pub interval_seconds: Option<f64>,
    pub status: TaskStatus,
    #[serde(default)]
    pub params: Params,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub error_count: u64,
}

/// One step of a workflow template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Unique within the workflow; steps execute in ascending order.
    pub order: u32,
    pub name: String,
    pub step_type: String,
    #[serde(default)]
    pub params: Params,
    /// Condition against the previous step's result, e.g. `result.score > 10`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
}

/// A named, ordered pipeline template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub active: bool,
    /// Templates are seeded from configuration and not user-deletable.
    #[serde(default)]
    pub is_template: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_interval_seconds: Option<f64>,
    #[serde(default)]
    pub schedule_enabled: bool,
    #[serde(default)]
    pub default_params: Params,
    pub run_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    pub steps: Vec<WorkflowStep>,
}

/// Status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What caused a workflow run to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerOrigin {
    Manual,
    Scheduled,
    Api,
}

impl std::fmt::Display for TriggerOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerOrigin::Manual => write!(f, "manual"),
            TriggerOrigin::Scheduled => write!(f, "scheduled"),
            TriggerOrigin::Api => write!(f, "api"),
        }
    }
}

/// Status of an individual step run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl std::fmt::Display for StepRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepRunStatus::Pending => write!(f, "pending"),
            StepRunStatus::Running => write!(f, "running"),
            StepRunStatus::Completed => write!(f, "completed"),
            StepRunStatus::Failed => write!(f, "failed"),
            StepRunStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Execution record of one step within a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRun {
    pub order: u32,
    pub name: String,
    pub step_type: String,
    pub status: StepRunStatus,
    /// Snapshot of the merged parameters and previous result, for audit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set iff the step declared a condition. False → the step was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_met: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl StepRun {
    pub fn new(step: &WorkflowStep) -> Self {
        Self {
            order: step.order,
            name: step.name.clone(),
            step_type: step.step_type.clone(),
            status: StepRunStatus::Pending,
            input: None,
            result: None,
            error: None,
            condition_met: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }
}

/// One execution of a workflow. Owns its step runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: String,
    pub workflow_id: String,
    /// The job carrying this run on the worker pool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub status: RunStatus,
    pub trigger_origin: TriggerOrigin,
    /// 1-based cursor; never exceeds total_steps.
    pub current_step: u32,
    pub total_steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub step_runs: Vec<StepRun>,
}

impl WorkflowRun {
    pub fn new(workflow: &Workflow, origin: TriggerOrigin) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow.id.clone(),
            job_id: None,
            status: RunStatus::Pending,
            trigger_origin: origin,
            current_step: 0,
            total_steps: workflow.steps.len() as u32,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            step_runs: workflow.steps.iter().map(StepRun::new).collect(),
        }
    }

    pub fn step_run_mut(&mut self, order: u32) -> Option<&mut StepRun> {
        self.step_runs.iter_mut().find(|s| s.order == order)
    }
}

/// Denormalized summary persisted by the backtest completion hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub job_id: String,
    pub framework: String,
    pub strategy: String,
    pub symbol: String,
    pub metrics: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// How the workflow engine treats a condition string it cannot parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionPolicy {
    /// Treat the step's condition as satisfied (logged as a warning).
    #[default]
    Lenient,
    /// Fail the step, and with it the run.
    Strict,
}
