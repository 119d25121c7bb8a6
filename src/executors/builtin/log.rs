use anyhow::Result;
use async_trait::async_trait;

use crate::engine::types::{ExecResult, Params};
use crate::executors::Executor;
use crate::runner::ProgressReporter;

pub struct LogExecutor;

#[async_trait]
impl Executor for LogExecutor {
    fn task_type(&self) -> &str {
        "log"
    }

    fn description(&self) -> &str {
        "Write a message to the process log"
    }

    async fn execute(&self, params: &Params, progress: ProgressReporter) -> Result<ExecResult> {
        let message = params.get("message").and_then(|v| v.as_str()).unwrap_or("");

        let level = params
            .get("level")
            .and_then(|v| v.as_str())
            .unwrap_or("info");

        match level {
            "debug" => tracing::debug!("{}", message),
            "warn" => tracing::warn!("{}", message),
            "error" => tracing::error!("{}", message),
            _ => tracing::info!("{}", message),
        }

        progress.report(1.0, "Logged");

        let mut output = ExecResult::new();
        output.insert(
            "log_message".to_string(),
            serde_json::Value::String(message.to_string()),
        );
        Ok(output)
    }
}
