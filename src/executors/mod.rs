pub mod builtin;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::types::{ExecResult, Params};
use crate::runner::ProgressReporter;

/// Trait implemented by every unit-of-work executor.
///
/// Expected business failures belong inside the returned result (an `error`
/// key); an `Err` is treated as an infrastructure failure by the runner.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Type tag used for registry lookup (e.g. "market_data", "backtest").
    fn task_type(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Run the unit of work. The reporter feeds the runner's live progress
    /// map; fractions are clamped to [0, 1].
    async fn execute(&self, params: &Params, progress: ProgressReporter) -> Result<ExecResult>;
}

/// Static lookup from a task/step type tag to its executor.
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Create a registry with all built-in executors registered.
    pub fn with_builtins(breakers: Arc<crate::breaker::BreakerRegistry>) -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry, breakers);
        registry
    }

    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        self.executors
            .insert(executor.task_type().to_string(), executor);
    }

    /// Exact-match lookup. An unresolved type is a recoverable condition for
    /// callers, never a crash.
    pub fn get(&self, task_type: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(task_type).cloned()
    }

    /// List all registered types with descriptions, sorted by type.
    pub fn list(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .executors
            .values()
            .map(|e| (e.task_type(), e.description()))
            .collect();
        entries.sort_by_key(|(name, _)| *name);
        entries
    }
}
