use anyhow::Result;
use async_trait::async_trait;

use crate::engine::types::{ExecResult, Params};
use crate::executors::Executor;
use crate::runner::ProgressReporter;

pub struct DelayExecutor;

#[async_trait]
impl Executor for DelayExecutor {
    fn task_type(&self) -> &str {
        "delay"
    }

    fn description(&self) -> &str {
        "Pause execution for a specified duration"
    }

    async fn execute(&self, params: &Params, progress: ProgressReporter) -> Result<ExecResult> {
        // A negative or non-finite duration would panic in Duration
        // construction; reject it so the job fails instead of wedging.
        let seconds = match params.get("seconds") {
            Some(value) => value
                .as_f64()
                .filter(|s| s.is_finite() && *s >= 0.0)
                .ok_or_else(|| {
                    anyhow::anyhow!("delay requires a non-negative 'seconds' parameter")
                })?,
            None => 1.0,
        };

        // Report in quarters so pollers see movement during long delays.
        let slice = std::time::Duration::from_secs_f64(seconds / 4.0);
        for quarter in 1..=4u32 {
            tokio::time::sleep(slice).await;
            progress.report(f64::from(quarter) / 4.0, "Waiting");
        }

        let mut output = ExecResult::new();
        output.insert(
            "delay_seconds".to_string(),
            serde_json::Value::Number(
                serde_json::Number::from_f64(seconds)
                    .unwrap_or_else(|| serde_json::Number::from(0)),
            ),
        );
        Ok(output)
    }
}
