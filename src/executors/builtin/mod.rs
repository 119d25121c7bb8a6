pub mod delay;
pub mod http_fetch;
pub mod log;

use std::sync::Arc;

use crate::breaker::BreakerRegistry;
use crate::executors::ExecutorRegistry;

/// Register all built-in executors.
pub fn register_all(registry: &mut ExecutorRegistry, breakers: Arc<BreakerRegistry>) {
    registry.register(Arc::new(log::LogExecutor));
    registry.register(Arc::new(delay::DelayExecutor));
    registry.register(Arc::new(http_fetch::HttpFetchExecutor::new(breakers)));
}
