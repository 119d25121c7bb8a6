use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Deserialize;

use crate::breaker::BreakerConfig;
use crate::engine::types::{ConditionPolicy, Params, WorkflowStep};
use crate::scheduler::TaskDefinition;

/// Configuration loaded from `tradeflow.yaml`.
/// All fields are optional — missing fields fall back to CLI/env/defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct TradeflowConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub store_dir: Option<String>,
    /// Worker pool size for the job runner.
    pub workers: Option<usize>,
    /// How unparseable step conditions are handled (lenient/strict).
    pub condition_policy: Option<ConditionPolicy>,
    pub breaker: Option<BreakerSettings>,
    /// Scheduled-task catalog, reconciled into the store at startup.
    pub tasks: Vec<TaskDefinition>,
    /// Workflow templates seeded at startup.
    pub workflows: Vec<WorkflowSeed>,
}

/// Circuit breaker defaults applied to every dependency key.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: Option<u32>,
    pub reset_timeout_seconds: Option<f64>,
    pub half_open_max_calls: Option<u32>,
}

/// Workflow template definition from configuration.
#[derive(Debug, Deserialize)]
pub struct WorkflowSeed {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub default_params: Params,
    #[serde(default)]
    pub schedule_interval_seconds: Option<f64>,
    #[serde(default)]
    pub schedule_enabled: bool,
    pub steps: Vec<WorkflowStep>,
}

impl TradeflowConfig {
    /// Load configuration from a YAML file.
    ///
    /// - If `path` is `Some`, load that specific file (error if missing).
    /// - If `path` is `None`, auto-detect `tradeflow.yaml` in cwd; return defaults if absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default_path = Path::new("tradeflow.yaml");
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path.to_path_buf()
            }
        };

        let contents = std::fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path.display()))?;

        let config: TradeflowConfig = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", file_path.display()))?;

        Ok(config)
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        let defaults = BreakerConfig::default();
        let Some(settings) = &self.breaker else {
            return defaults;
        };
        BreakerConfig {
            failure_threshold: settings
                .failure_threshold
                .unwrap_or(defaults.failure_threshold),
            reset_timeout: settings
                .reset_timeout_seconds
                .filter(|s| s.is_finite() && *s >= 0.0)
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.reset_timeout),
            half_open_max_calls: settings
                .half_open_max_calls
                .unwrap_or(defaults.half_open_max_calls),
        }
    }
}
