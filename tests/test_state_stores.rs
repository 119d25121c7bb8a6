//! Tests for the JSON file store and the in-memory store.

use std::collections::HashMap;

use chrono::Utc;
use tempfile::tempdir;

use tradeflow::engine::types::*;
use tradeflow::storage::Store;
use tradeflow::storage::json_store::JsonStore;
use tradeflow::storage::mem_store::MemStore;

fn sample_job(job_type: &str) -> Job {
    Job::new(job_type, HashMap::new())
}

fn sample_workflow(id: &str) -> Workflow {
    Workflow {
        id: id.to_string(),
        name: format!("{} workflow", id),
        category: "crypto".to_string(),
        active: true,
        is_template: true,
        schedule_interval_seconds: Some(3600.0),
        schedule_enabled: false,
        default_params: HashMap::new(),
        run_count: 0,
        last_run_at: None,
        steps: vec![WorkflowStep {
            order: 1,
            name: "fetch".to_string(),
            step_type: "http_fetch".to_string(),
            params: HashMap::new(),
            condition: Some("result.rows > 0".to_string()),
            timeout_seconds: Some(30.0),
        }],
    }
}

#[tokio::test]
async fn json_store_job_lifecycle() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path());

    let mut job = sample_job("backtest");
    store.create_job(&job).await.unwrap();

    let loaded = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, job.id);
    assert_eq!(loaded.status, JobStatus::Pending);
    assert_eq!(loaded.progress_message, "Queued");

    job.status = JobStatus::Completed;
    job.progress = 1.0;
    job.result = Some(HashMap::from([(
        "pnl".to_string(),
        serde_json::json!(12.5),
    )]));
    job.completed_at = Some(Utc::now());
    store.update_job(&job).await.unwrap();

    let loaded = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Completed);
    assert_eq!(
        loaded.result.unwrap().get("pnl").unwrap(),
        &serde_json::json!(12.5)
    );
}

#[tokio::test]
async fn json_store_missing_records_are_none() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path());

    assert!(store.get_job("nope").await.unwrap().is_none());
    assert!(store.get_task("nope").await.unwrap().is_none());
    assert!(store.get_workflow("nope").await.unwrap().is_none());
    assert!(store.get_run("nope").await.unwrap().is_none());
    assert!(store.list_jobs(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn json_store_lists_jobs_newest_first_with_filter() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path());

    let mut old = sample_job("a");
    old.created_at = Utc::now() - chrono::Duration::seconds(10);
    old.status = JobStatus::Failed;
    store.create_job(&old).await.unwrap();

    let recent = sample_job("b");
    store.create_job(&recent).await.unwrap();

    let all = store.list_jobs(None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, recent.id);
    assert_eq!(all[1].id, old.id);

    let failed = store.list_jobs(Some(JobStatus::Failed)).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, old.id);
}

#[tokio::test]
async fn json_store_run_roundtrip_keeps_step_state() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path());

    let workflow = sample_workflow("wf-1");
    store.upsert_workflow(&workflow).await.unwrap();

    let mut run = WorkflowRun::new(&workflow, TriggerOrigin::Scheduled);
    store.create_run(&run).await.unwrap();

    run.status = RunStatus::Completed;
    if let Some(step_run) = run.step_run_mut(1) {
        step_run.status = StepRunStatus::Completed;
        step_run.condition_met = Some(true);
        step_run.duration_ms = Some(42);
        step_run.result = Some(HashMap::from([(
            "rows".to_string(),
            serde_json::json!(100),
        )]));
    }
    store.update_run(&run).await.unwrap();

    let loaded = store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, RunStatus::Completed);
    assert_eq!(loaded.trigger_origin, TriggerOrigin::Scheduled);
    assert_eq!(loaded.step_runs.len(), 1);
    assert_eq!(loaded.step_runs[0].status, StepRunStatus::Completed);
    assert_eq!(loaded.step_runs[0].condition_met, Some(true));
    assert_eq!(loaded.step_runs[0].duration_ms, Some(42));
}

#[tokio::test]
async fn json_store_filters_runs_by_workflow() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path());

    let wf_a = sample_workflow("wf-a");
    let wf_b = sample_workflow("wf-b");
    store
        .create_run(&WorkflowRun::new(&wf_a, TriggerOrigin::Manual))
        .await
        .unwrap();
    store
        .create_run(&WorkflowRun::new(&wf_a, TriggerOrigin::Manual))
        .await
        .unwrap();
    store
        .create_run(&WorkflowRun::new(&wf_b, TriggerOrigin::Manual))
        .await
        .unwrap();

    assert_eq!(store.list_runs(None).await.unwrap().len(), 3);
    assert_eq!(store.list_runs(Some("wf-a")).await.unwrap().len(), 2);
    assert_eq!(store.list_runs(Some("wf-b")).await.unwrap().len(), 1);
    assert!(store.list_runs(Some("wf-c")).await.unwrap().is_empty());
}

#[tokio::test]
async fn json_store_tasks_and_workflows_sorted_by_id() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path());

    for id in ["zeta", "alpha"] {
        store
            .upsert_task(&ScheduledTask {
                id: id.to_string(),
                name: id.to_string(),
                description: String::new(),
                task_type: "log".to_string(),
                interval_seconds: None,
                status: TaskStatus::Active,
                params: HashMap::new(),
                last_run_at: None,
                last_run_status: None,
                last_job_id: None,
                next_run_at: None,
                run_count: 0,
                error_count: 0,
            })
            .await
            .unwrap();
        store.upsert_workflow(&sample_workflow(id)).await.unwrap();
    }

    let tasks = store.list_tasks().await.unwrap();
    assert_eq!(tasks[0].id, "alpha");
    assert_eq!(tasks[1].id, "zeta");

    let workflows = store.list_workflows().await.unwrap();
    assert_eq!(workflows[0].id, "alpha");
    assert_eq!(workflows[1].id, "zeta");
}

#[tokio::test]
async fn json_store_writes_are_atomic_on_disk() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path());

    let job = sample_job("log");
    store.create_job(&job).await.unwrap();
    store.update_job(&job).await.unwrap();

    let jobs_dir = dir.path().join("jobs");
    let mut names: Vec<String> = std::fs::read_dir(&jobs_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    // Only the final record file remains, no leftover tmp files.
    assert_eq!(names, vec![format!("{}.json", job.id)]);
}

#[tokio::test]
async fn json_store_saves_backtest_summaries() {
    let dir = tempdir().unwrap();
    let store = JsonStore::new(dir.path());

    let summary = BacktestSummary {
        job_id: "job-1".to_string(),
        framework: "vectorbt".to_string(),
        strategy: "momentum".to_string(),
        symbol: "BTC/USDT".to_string(),
        metrics: serde_json::json!({"sharpe": 1.4}),
        created_at: Utc::now(),
    };
    store.save_backtest_summary(&summary).await.unwrap();

    let path = dir.path().join("backtest_summaries").join("job-1.json");
    let data = std::fs::read_to_string(path).unwrap();
    let parsed: BacktestSummary = serde_json::from_str(&data).unwrap();
    assert_eq!(parsed.framework, "vectorbt");
    assert_eq!(parsed.metrics, serde_json::json!({"sharpe": 1.4}));
}

#[tokio::test]
async fn mem_store_basic_crud() {
    let store = MemStore::new();

    let job = sample_job("log");
    store.create_job(&job).await.unwrap();
    assert!(store.get_job(&job.id).await.unwrap().is_some());
    assert!(store.get_job("nope").await.unwrap().is_none());

    let workflow = sample_workflow("wf-1");
    store.upsert_workflow(&workflow).await.unwrap();
    let run = WorkflowRun::new(&workflow, TriggerOrigin::Api);
    store.create_run(&run).await.unwrap();

    assert_eq!(store.list_runs(Some("wf-1")).await.unwrap().len(), 1);
    assert!(store.list_runs(Some("other")).await.unwrap().is_empty());
}
