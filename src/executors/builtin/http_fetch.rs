use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::breaker::BreakerRegistry;
use crate::engine::types::{ExecResult, Params};
use crate::executors::Executor;
use crate::runner::ProgressReporter;

/// Fetches JSON from an external HTTP endpoint, guarded by the circuit
/// breaker for that endpoint's host. The standard wrap pattern: check
/// `can_execute`, bail if the breaker is open, report the outcome after.
pub struct HttpFetchExecutor {
    breakers: Arc<BreakerRegistry>,
    client: reqwest::Client,
}

impl HttpFetchExecutor {
    pub fn new(breakers: Arc<BreakerRegistry>) -> Self {
        Self {
            breakers,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Executor for HttpFetchExecutor {
    fn task_type(&self) -> &str {
        "http_fetch"
    }

    fn description(&self) -> &str {
        "Fetch JSON from an external HTTP endpoint through a circuit breaker"
    }

    async fn execute(&self, params: &Params, progress: ProgressReporter) -> Result<ExecResult> {
        let url = params
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("http_fetch requires a 'url' parameter"))?;

        let timeout_s = params
            .get("timeout_seconds")
            .and_then(|v| v.as_f64())
            .filter(|t| t.is_finite() && *t > 0.0)
            .unwrap_or(30.0);

        // Breakers are keyed by dependency identity, here the host.
        let key = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| url.to_string());
        let breaker = self.breakers.get_or_create(&key);

        if !breaker.can_execute() {
            anyhow::bail!("Circuit breaker open for dependency: {}", key);
        }

        progress.report(0.1, "Requesting");

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs_f64(timeout_s))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                breaker.record_failure();
                return Err(e.into());
            }
        };

        let status = response.status();
        if status.is_server_error() {
            breaker.record_failure();
            anyhow::bail!("Upstream error from {}: {}", key, status);
        }
        breaker.record_success();

        progress.report(0.7, "Reading body");

        let body: serde_json::Value = response
            .json()
            .await
            .unwrap_or(serde_json::Value::Null);

        let mut output = ExecResult::new();
        output.insert(
            "status".to_string(),
            serde_json::Value::Number(status.as_u16().into()),
        );
        output.insert("body".to_string(), body);
        Ok(output)
    }
}
