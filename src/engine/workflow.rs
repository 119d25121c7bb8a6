use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::engine::condition;
use crate::engine::types::*;
use crate::executors::{Executor, ExecutorRegistry};
use crate::notify::{NotificationEvent, NotificationSink};
use crate::runner::{JobRunner, ProgressReporter};
use crate::storage::Store;

/// Drives multi-step workflow runs.
///
/// A whole run executes as one job on the runner's worker pool; steps within
/// it are strictly sequential, each step's result feeding the next step's
/// parameters under the `_prev_result` key.
pub struct WorkflowEngine {
    store: Arc<dyn Store>,
    registry: Arc<ExecutorRegistry>,
    runner: Arc<JobRunner>,
    sink: Arc<dyn NotificationSink>,
    policy: ConditionPolicy,
}

/// Adapter that lets the runner execute one workflow run as a job.
struct WorkflowRunExecutor {
    engine: Arc<WorkflowEngine>,
    run_id: String,
}

#[async_trait]
impl Executor for WorkflowRunExecutor {
    fn task_type(&self) -> &str {
        "workflow"
    }

    fn description(&self) -> &str {
        "Execute the steps of a workflow run"
    }

    async fn execute(&self, params: &Params, progress: ProgressReporter) -> Result<ExecResult> {
        self.engine.execute_run(&self.run_id, params, progress).await
    }
}

fn run_output(status: &str, completed: u32, total: u32) -> ExecResult {
    let mut output = ExecResult::new();
    output.insert("status".to_string(), serde_json::json!(status));
    output.insert("completed_steps".to_string(), serde_json::json!(completed));
    output.insert("total_steps".to_string(), serde_json::json!(total));
    output
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ExecutorRegistry>,
        runner: Arc<JobRunner>,
        sink: Arc<dyn NotificationSink>,
        policy: ConditionPolicy,
    ) -> Self {
        Self {
            store,
            registry,
            runner,
            sink,
            policy,
        }
    }

    /// Create a run for a workflow and submit it to the job runner.
    /// Caller-supplied parameters win over the workflow's stored defaults.
    pub async fn trigger(
        self: &Arc<Self>,
        workflow_id: &str,
        origin: TriggerOrigin,
        params: Params,
    ) -> Result<WorkflowRun> {
        let Some(mut workflow) = self.store.get_workflow(workflow_id).await? else {
            bail!("Workflow not found: {}", workflow_id);
        };
        if workflow.steps.is_empty() {
            bail!("Workflow '{}' has no steps", workflow.name);
        }
        workflow.steps.sort_by_key(|s| s.order);

        let mut merged = workflow.default_params.clone();
        merged.extend(params);

        let mut run = WorkflowRun::new(&workflow, origin);
        self.store.create_run(&run).await?;

        let executor = Arc::new(WorkflowRunExecutor {
            engine: self.clone(),
            run_id: run.id.clone(),
        });
        let job_id = self.runner.submit("workflow", executor, merged).await?;

        run.job_id = Some(job_id);
        self.store.update_run(&run).await?;

        info!(
            run_id = %run.id,
            workflow_id = %workflow_id,
            origin = %origin,
            "Workflow run triggered"
        );
        Ok(run)
    }

    /// Execute every step of a run in ascending order.
    ///
    /// Business failures (step failure, unknown step type, missing records)
    /// come back inside the result payload; `Err` is reserved for store
    /// failures the engine cannot record.
    pub async fn execute_run(
        &self,
        run_id: &str,
        workflow_params: &Params,
        progress: ProgressReporter,
    ) -> Result<ExecResult> {
        let Some(mut run) = self.store.get_run(run_id).await? else {
            warn!(run_id = %run_id, "Workflow run not found");
            let mut output = run_output("failed", 0, 0);
            output.insert(
                "error".to_string(),
                serde_json::json!(format!("Workflow run not found: {}", run_id)),
            );
            return Ok(output);
        };

        // Status is monotonic: a run cancelled while its job sat in the pool
        // queue never transitions back to running.
        if run.status.is_terminal() {
            info!(run_id = %run_id, status = %run.status, "Run already terminal, skipping");
            let mut output = run_output(&run.status.to_string(), 0, run.total_steps);
            output.insert("skipped".to_string(), serde_json::json!(true));
            return Ok(output);
        }

        let Some(mut workflow) = self.store.get_workflow(&run.workflow_id).await? else {
            let error = format!("Workflow not found: {}", run.workflow_id);
            return self.fail_run(&mut run, error, 0).await;
        };
        workflow.steps.sort_by_key(|s| s.order);

        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
        run.total_steps = workflow.steps.len() as u32;
        self.store.update_run(&run).await?;

        let total = workflow.steps.len() as u32;
        let mut previous_result = ExecResult::new();
        let mut completed_steps: u32 = 0;

        for (index, step) in workflow.steps.iter().enumerate() {
            run.current_step = index as u32 + 1;
            progress.report(
                index as f64 / total as f64,
                &format!("Step {}/{}: {}", index + 1, total, step.name),
            );

            if run.step_run_mut(step.order).is_none() {
                // Should not happen in a well-formed run; not worth aborting.
                warn!(run_id = %run_id, order = step.order, "Step run record missing");
                continue;
            }

            // Step-local parameters win over workflow-level ones.
            let mut merged = workflow_params.clone();
            merged.extend(step.params.clone());

            // Condition gate against the previous step's result.
            if let Some(cond_str) = step.condition.as_deref().filter(|c| !c.trim().is_empty()) {
                let satisfied = match condition::parse(cond_str) {
                    Ok(cond) => condition::evaluate(&cond, &previous_result),
                    Err(e) => match self.policy {
                        ConditionPolicy::Lenient => {
                            warn!(
                                run_id = %run_id,
                                step = %step.name,
                                error = %e,
                                "Unparseable condition, treating as satisfied"
                            );
                            true
                        }
                        ConditionPolicy::Strict => {
                            let error = format!("Invalid condition on step '{}': {}", step.name, e);
                            if let Some(step_run) = run.step_run_mut(step.order) {
                                step_run.status = StepRunStatus::Failed;
                                step_run.error = Some(error.clone());
                                step_run.completed_at = Some(Utc::now());
                            }
                            return self.fail_run(&mut run, error, completed_steps).await;
                        }
                    },
                };

                if !satisfied {
                    if let Some(step_run) = run.step_run_mut(step.order) {
                        step_run.status = StepRunStatus::Skipped;
                        step_run.condition_met = Some(false);
                        step_run.completed_at = Some(Utc::now());
                    }
                    self.store.update_run(&run).await?;
                    info!(run_id = %run_id, step = %step.name, "Step skipped, condition not met");
                    continue;
                }
                if let Some(step_run) = run.step_run_mut(step.order) {
                    step_run.condition_met = Some(true);
                }
            }

            // An unresolved step type stops the whole pipeline — unlike a
            // failed step body, there is nothing to record a result against.
            let Some(executor) = self.registry.get(&step.step_type) else {
                let error = format!("Unknown step type: {}", step.step_type);
                if let Some(step_run) = run.step_run_mut(step.order) {
                    step_run.status = StepRunStatus::Failed;
                    step_run.error = Some(error.clone());
                    step_run.completed_at = Some(Utc::now());
                }
                return self.fail_run(&mut run, error, completed_steps).await;
            };

            let input_snapshot = serde_json::json!({
                "params": merged,
                "previous_result": previous_result,
            });
            if let Some(step_run) = run.step_run_mut(step.order) {
                step_run.status = StepRunStatus::Running;
                step_run.started_at = Some(Utc::now());
                step_run.input = Some(input_snapshot);
            }
            self.store.update_run(&run).await?;

            let mut exec_params = merged;
            exec_params.insert(
                "_prev_result".to_string(),
                serde_json::to_value(&previous_result)?,
            );

            // Per-step progress is not surfaced upward; the run reports only
            // workflow-level granularity.
            let started = std::time::Instant::now();
            let fut = executor.execute(&exec_params, ProgressReporter::noop());
            let result = match step.timeout_seconds.filter(|t| *t > 0.0) {
                Some(timeout_s) => {
                    match tokio::time::timeout(Duration::from_secs_f64(timeout_s), fut).await {
                        Ok(r) => r,
                        Err(_) => Err(anyhow::anyhow!("Step timed out after {}s", timeout_s)),
                    }
                }
                None => fut.await,
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    if let Some(step_run) = run.step_run_mut(step.order) {
                        step_run.status = StepRunStatus::Completed;
                        step_run.result = Some(output.clone());
                        step_run.completed_at = Some(Utc::now());
                        step_run.duration_ms = Some(duration_ms);
                    }
                    self.store.update_run(&run).await?;

                    previous_result = output;
                    completed_steps += 1;
                    info!(run_id = %run_id, step = %step.name, duration_ms, "Step completed");
                }
                Err(e) => {
                    let err_msg = format!("{:#}", e);
                    if let Some(step_run) = run.step_run_mut(step.order) {
                        step_run.status = StepRunStatus::Failed;
                        step_run.error = Some(err_msg.clone());
                        step_run.completed_at = Some(Utc::now());
                        step_run.duration_ms = Some(duration_ms);
                    }
                    let error = format!("Step '{}' failed: {}", step.name, err_msg);
                    return self.fail_run(&mut run, error, completed_steps).await;
                }
            }
        }

        run.status = RunStatus::Completed;
        run.result = Some(previous_result.clone());
        run.completed_at = Some(Utc::now());
        self.store.update_run(&run).await?;

        workflow.run_count += 1;
        workflow.last_run_at = Some(Utc::now());
        self.store.upsert_workflow(&workflow).await?;

        self.sink
            .notify(NotificationEvent::WorkflowCompleted {
                run_id: run.id.clone(),
                workflow_id: run.workflow_id.clone(),
            })
            .await;

        progress.report(1.0, "Workflow complete");
        info!(
            run_id = %run_id,
            completed_steps,
            total_steps = total,
            "Workflow run completed"
        );

        let mut output = run_output("completed", completed_steps, total);
        output.insert(
            "result".to_string(),
            serde_json::to_value(&previous_result)?,
        );
        Ok(output)
    }

    /// Record a fatal run failure. Later steps stay pending.
    async fn fail_run(
        &self,
        run: &mut WorkflowRun,
        error: String,
        completed_steps: u32,
    ) -> Result<ExecResult> {
        run.status = RunStatus::Failed;
        run.error = Some(error.clone());
        run.completed_at = Some(Utc::now());
        self.store.update_run(run).await?;

        self.sink
            .notify(NotificationEvent::WorkflowFailed {
                run_id: run.id.clone(),
                workflow_id: run.workflow_id.clone(),
                error: error.clone(),
            })
            .await;

        warn!(run_id = %run.id, error = %error, "Workflow run failed");

        let mut output = run_output("failed", completed_steps, run.total_steps);
        output.insert("error".to_string(), serde_json::json!(error));
        Ok(output)
    }

    /// Cancel a pending or running workflow run and, best-effort, its
    /// backing job. The advisory-cancellation caveat of the runner applies.
    pub async fn cancel(&self, run_id: &str) -> Result<bool> {
        let Some(mut run) = self.store.get_run(run_id).await? else {
            return Ok(false);
        };
        if run.status.is_terminal() {
            return Ok(false);
        }

        run.status = RunStatus::Cancelled;
        run.completed_at = Some(Utc::now());
        self.store.update_run(&run).await?;

        if let Some(job_id) = &run.job_id
            && let Err(e) = self.runner.cancel(job_id).await
        {
            warn!(run_id = %run_id, job_id = %job_id, error = %e, "Backing job cancel failed");
        }

        info!(run_id = %run_id, "Workflow run cancelled");
        Ok(true)
    }
}
