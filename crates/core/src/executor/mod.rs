//! Scheduler / Pool Coordinator.

mod metrics;
mod retry;
mod scheduler;

pub use metrics::{PoolMetrics, PoolMetricsSnapshot};
pub use retry::{execute_with_retry, CircuitBreaker, CircuitState, RetryPolicy};
pub use scheduler::{OverloadPolicy, PoolConfig, PoolName, Scheduler};
