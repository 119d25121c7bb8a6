use async_trait::async_trait;
use tracing::info;

/// Lifecycle events emitted by the scheduler and workflow engine.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    TaskSubmitted {
        task_id: String,
        job_id: String,
    },
    TaskPaused {
        task_id: String,
    },
    TaskResumed {
        task_id: String,
    },
    TaskTriggered {
        task_id: String,
        job_id: String,
    },
    WorkflowCompleted {
        run_id: String,
        workflow_id: String,
    },
    WorkflowFailed {
        run_id: String,
        workflow_id: String,
        error: String,
    },
}

/// Fire-and-forget notification delivery. Implementations must swallow their
/// own failures; nothing here may propagate back into the orchestration core.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: NotificationEvent);
}

/// Sink that writes events to the process log.
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, event: NotificationEvent) {
        match event {
            NotificationEvent::TaskSubmitted { task_id, job_id } => {
                info!(task_id = %task_id, job_id = %job_id, "Scheduled task submitted");
            }
            NotificationEvent::TaskPaused { task_id } => {
                info!(task_id = %task_id, "Task paused");
            }
            NotificationEvent::TaskResumed { task_id } => {
                info!(task_id = %task_id, "Task resumed");
            }
            NotificationEvent::TaskTriggered { task_id, job_id } => {
                info!(task_id = %task_id, job_id = %job_id, "Task triggered manually");
            }
            NotificationEvent::WorkflowCompleted { run_id, workflow_id } => {
                info!(run_id = %run_id, workflow_id = %workflow_id, "Workflow run completed");
            }
            NotificationEvent::WorkflowFailed {
                run_id,
                workflow_id,
                error,
            } => {
                info!(
                    run_id = %run_id,
                    workflow_id = %workflow_id,
                    error = %error,
                    "Workflow run failed"
                );
            }
        }
    }
}
