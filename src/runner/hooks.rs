use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::engine::types::{BacktestSummary, Job};
use crate::storage::Store;

/// Post-processing attached to successful jobs of one job type.
///
/// Hook failures are logged by the runner and never fail the job itself.
#[async_trait]
pub trait JobHook: Send + Sync {
    /// Job type this hook fires for (exact match).
    fn job_type(&self) -> &str;

    async fn on_completed(&self, job: &Job) -> Result<()>;
}

/// Persists a denormalized result summary for completed backtest jobs, so
/// dashboards can list past backtests without unpacking full job payloads.
pub struct BacktestSummaryHook {
    store: Arc<dyn Store>,
}

impl BacktestSummaryHook {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

fn field(job: &Job, key: &str) -> String {
    // Prefer the result payload, fall back to the submitted parameters.
    job.result
        .as_ref()
        .and_then(|r| r.get(key))
        .or_else(|| job.params.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}

#[async_trait]
impl JobHook for BacktestSummaryHook {
    fn job_type(&self) -> &str {
        "backtest"
    }

    async fn on_completed(&self, job: &Job) -> Result<()> {
        let Some(result) = &job.result else {
            return Ok(());
        };
        // An "error" key marks a business failure inside a completed job;
        // no summary for those.
        if result.contains_key("error") {
            return Ok(());
        }

        let summary = BacktestSummary {
            job_id: job.id.clone(),
            framework: field(job, "framework"),
            strategy: field(job, "strategy"),
            symbol: field(job, "symbol"),
            metrics: result
                .get("metrics")
                .cloned()
                .unwrap_or(serde_json::Value::Null),
            created_at: Utc::now(),
        };

        self.store.save_backtest_summary(&summary).await
    }
}
