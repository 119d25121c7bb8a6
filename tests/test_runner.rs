//! Integration tests for the job runner.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use tradeflow::engine::types::{ExecResult, JobStatus, Params};
use tradeflow::executors::Executor;
use tradeflow::executors::builtin::delay::DelayExecutor;
use tradeflow::runner::hooks::BacktestSummaryHook;
use tradeflow::runner::{JobRunner, ProgressReporter};
use tradeflow::storage::Store;
use tradeflow::storage::mem_store::MemStore;

/// Reports 0.3 and 0.7, then returns `{x: 1}`.
struct SteppedExecutor;

#[async_trait]
impl Executor for SteppedExecutor {
    fn task_type(&self) -> &str {
        "stepped"
    }

    fn description(&self) -> &str {
        "test executor reporting staged progress"
    }

    async fn execute(&self, _params: &Params, progress: ProgressReporter) -> Result<ExecResult> {
        progress.report(0.3, "Stage one");
        tokio::time::sleep(Duration::from_millis(40)).await;
        progress.report(0.7, "Stage two");
        tokio::time::sleep(Duration::from_millis(40)).await;

        let mut result = ExecResult::new();
        result.insert("x".to_string(), serde_json::json!(1));
        Ok(result)
    }
}

/// Always fails with an infrastructure error.
struct FailingExecutor;

#[async_trait]
impl Executor for FailingExecutor {
    fn task_type(&self) -> &str {
        "failing"
    }

    fn description(&self) -> &str {
        "test executor that always fails"
    }

    async fn execute(&self, _params: &Params, _progress: ProgressReporter) -> Result<ExecResult> {
        anyhow::bail!("exchange unreachable")
    }
}

/// Sleeps for the given duration, then succeeds.
struct SlowExecutor(Duration);

#[async_trait]
impl Executor for SlowExecutor {
    fn task_type(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "test executor that sleeps"
    }

    async fn execute(&self, _params: &Params, _progress: ProgressReporter) -> Result<ExecResult> {
        tokio::time::sleep(self.0).await;
        Ok(ExecResult::new())
    }
}

/// Returns a fixed payload, for hook tests.
struct PayloadExecutor(ExecResult);

#[async_trait]
impl Executor for PayloadExecutor {
    fn task_type(&self) -> &str {
        "payload"
    }

    fn description(&self) -> &str {
        "test executor returning a fixed payload"
    }

    async fn execute(&self, _params: &Params, _progress: ProgressReporter) -> Result<ExecResult> {
        Ok(self.0.clone())
    }
}

async fn wait_terminal(store: &Arc<MemStore>, job_id: &str) -> tradeflow::engine::types::Job {
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let job = store.get_job(job_id).await.unwrap().unwrap();
        if job.status.is_terminal() {
            return job;
        }
    }
    panic!("job {} never reached a terminal state", job_id);
}

#[tokio::test]
async fn completed_job_persists_result_and_progress() {
    let store = Arc::new(MemStore::new());
    let runner = JobRunner::with_workers(store.clone(), 2);

    let job_id = runner
        .submit("stepped", Arc::new(SteppedExecutor), HashMap::new())
        .await
        .unwrap();

    let job = wait_terminal(&store, &job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 1.0);
    assert_eq!(job.progress_message, "Complete");
    assert_eq!(job.result.unwrap().get("x").unwrap(), &serde_json::json!(1));
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());

    let live = runner.get_live_progress(&job_id).unwrap();
    assert_eq!(live.progress, 1.0);
    assert_eq!(live.message, "Complete");
}

#[tokio::test]
async fn live_progress_is_non_decreasing() {
    let store = Arc::new(MemStore::new());
    let runner = JobRunner::with_workers(store.clone(), 2);

    let job_id = runner
        .submit("stepped", Arc::new(SteppedExecutor), HashMap::new())
        .await
        .unwrap();

    let mut samples = Vec::new();
    loop {
        if let Some(live) = runner.get_live_progress(&job_id) {
            samples.push(live.progress);
        }
        let job = store.get_job(&job_id).await.unwrap().unwrap();
        if job.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(samples.windows(2).all(|w| w[0] <= w[1]), "{:?}", samples);
    assert_eq!(runner.get_live_progress(&job_id).unwrap().progress, 1.0);
}

#[tokio::test]
async fn failed_job_records_error() {
    let store = Arc::new(MemStore::new());
    let runner = JobRunner::with_workers(store.clone(), 2);

    let job_id = runner
        .submit("failing", Arc::new(FailingExecutor), HashMap::new())
        .await
        .unwrap();

    let job = wait_terminal(&store, &job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("exchange unreachable"));
    assert!(job.progress_message.starts_with("Failed:"));
}

#[tokio::test]
async fn negative_delay_fails_instead_of_wedging() {
    let store = Arc::new(MemStore::new());
    let runner = JobRunner::with_workers(store.clone(), 2);

    let params = HashMap::from([("seconds".to_string(), serde_json::json!(-1))]);
    let job_id = runner
        .submit("delay", Arc::new(DelayExecutor), params)
        .await
        .unwrap();

    // The malformed parameter must surface as a failed job, never leave the
    // record stuck in running.
    let job = wait_terminal(&store, &job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.completed_at.is_some());
    assert!(job.error.unwrap().contains("non-negative 'seconds'"));
}

#[tokio::test]
async fn cancel_pending_job() {
    let store = Arc::new(MemStore::new());
    // One worker, keep it busy so the second job stays pending.
    let runner = JobRunner::with_workers(store.clone(), 1);

    let _busy = runner
        .submit(
            "slow",
            Arc::new(SlowExecutor(Duration::from_millis(300))),
            HashMap::new(),
        )
        .await
        .unwrap();
    let queued = runner
        .submit(
            "slow",
            Arc::new(SlowExecutor(Duration::from_millis(300))),
            HashMap::new(),
        )
        .await
        .unwrap();

    assert!(runner.cancel(&queued).await.unwrap());
    // Repeated cancel after the first success returns false.
    assert!(!runner.cancel(&queued).await.unwrap());

    let job = store.get_job(&queued).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.completed_at.is_some());

    // The worker must not overwrite the cancellation once it picks the job up.
    tokio::time::sleep(Duration::from_millis(800)).await;
    let job = store.get_job(&queued).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn cancel_unknown_or_terminal_returns_false() {
    let store = Arc::new(MemStore::new());
    let runner = JobRunner::with_workers(store.clone(), 2);

    assert!(!runner.cancel("no-such-job").await.unwrap());

    let job_id = runner
        .submit("stepped", Arc::new(SteppedExecutor), HashMap::new())
        .await
        .unwrap();
    wait_terminal(&store, &job_id).await;
    assert!(!runner.cancel(&job_id).await.unwrap());
}

#[tokio::test]
async fn pool_bounds_parallelism() {
    let store = Arc::new(MemStore::new());
    let runner = JobRunner::with_workers(store.clone(), 1);

    let first = runner
        .submit(
            "slow",
            Arc::new(SlowExecutor(Duration::from_millis(150))),
            HashMap::new(),
        )
        .await
        .unwrap();
    let second = runner
        .submit(
            "slow",
            Arc::new(SlowExecutor(Duration::from_millis(150))),
            HashMap::new(),
        )
        .await
        .unwrap();

    let a = wait_terminal(&store, &first).await;
    let b = wait_terminal(&store, &second).await;

    // With one worker the executions cannot overlap: whichever ran second
    // started no earlier than the other finished.
    let first_done = a.completed_at.unwrap().min(b.completed_at.unwrap());
    let last_started = a.started_at.unwrap().max(b.started_at.unwrap());
    assert!(last_started >= first_done);
}

#[tokio::test]
async fn backtest_hook_saves_summary() {
    let store = Arc::new(MemStore::new());
    let mut runner = JobRunner::with_workers(store.clone(), 2);
    runner.add_hook(Arc::new(BacktestSummaryHook::new(store.clone())));

    let mut payload = ExecResult::new();
    payload.insert("framework".to_string(), serde_json::json!("vectorbt"));
    payload.insert("strategy".to_string(), serde_json::json!("momentum"));
    payload.insert("symbol".to_string(), serde_json::json!("BTC/USDT"));
    payload.insert("metrics".to_string(), serde_json::json!({"sharpe": 1.4}));

    let job_id = runner
        .submit("backtest", Arc::new(PayloadExecutor(payload)), HashMap::new())
        .await
        .unwrap();
    wait_terminal(&store, &job_id).await;

    let summaries = store.backtest_summaries();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].job_id, job_id);
    assert_eq!(summaries[0].framework, "vectorbt");
    assert_eq!(summaries[0].symbol, "BTC/USDT");
    assert_eq!(summaries[0].metrics, serde_json::json!({"sharpe": 1.4}));
}

#[tokio::test]
async fn backtest_hook_skips_business_failures() {
    let store = Arc::new(MemStore::new());
    let mut runner = JobRunner::with_workers(store.clone(), 2);
    runner.add_hook(Arc::new(BacktestSummaryHook::new(store.clone())));

    let mut payload = ExecResult::new();
    payload.insert("error".to_string(), serde_json::json!("no data for symbol"));

    let job_id = runner
        .submit("backtest", Arc::new(PayloadExecutor(payload)), HashMap::new())
        .await
        .unwrap();
    let job = wait_terminal(&store, &job_id).await;

    // The job itself completes; the summary is not written.
    assert_eq!(job.status, JobStatus::Completed);
    assert!(store.backtest_summaries().is_empty());
}

#[tokio::test]
async fn hook_only_fires_for_its_job_type() {
    let store = Arc::new(MemStore::new());
    let mut runner = JobRunner::with_workers(store.clone(), 2);
    runner.add_hook(Arc::new(BacktestSummaryHook::new(store.clone())));

    let mut payload = ExecResult::new();
    payload.insert("framework".to_string(), serde_json::json!("vectorbt"));

    let job_id = runner
        .submit("stepped", Arc::new(PayloadExecutor(payload)), HashMap::new())
        .await
        .unwrap();
    wait_terminal(&store, &job_id).await;

    assert!(store.backtest_summaries().is_empty());
}
