//! Scheduler / Pool Coordinator: four named bounded pools with
//! per-pool overload policy, retries, deadlines, and metrics.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::error::{Error, Result};

use super::metrics::{PoolMetrics, PoolMetricsSnapshot};
use super::retry::{execute_with_retry, CircuitBreaker, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolName {
    Audio,
    Stt,
    Llm,
    Scheduled,
}

impl PoolName {
    fn as_str(self) -> &'static str {
        match self {
            PoolName::Audio => "audio",
            PoolName::Stt => "stt",
            PoolName::Llm => "llm",
            PoolName::Scheduled => "scheduled",
        }
    }
}

/// Whether a full pool blocks the caller (never drop ingress) or rejects
/// immediately with a typed error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverloadPolicy {
    CallerRuns,
    RejectAndReport,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub size: usize,
    pub overload: OverloadPolicy,
    pub deadline: Duration,
    pub retry_policy: RetryPolicy,
}

impl PoolConfig {
    pub fn defaults_for(name: PoolName) -> Self {
        match name {
            PoolName::Audio => Self {
                size: 4,
                overload: OverloadPolicy::CallerRuns,
                deadline: Duration::from_secs(10),
                retry_policy: RetryPolicy::fixed(1, Duration::from_millis(200)),
            },
            PoolName::Stt => Self {
                size: 3,
                overload: OverloadPolicy::RejectAndReport,
                deadline: Duration::from_secs(10),
                retry_policy: RetryPolicy::exponential(2),
            },
            PoolName::Llm => Self {
                size: 2,
                overload: OverloadPolicy::RejectAndReport,
                deadline: Duration::from_secs(10),
                retry_policy: RetryPolicy::exponential(2),
            },
            PoolName::Scheduled => Self {
                size: 2,
                overload: OverloadPolicy::RejectAndReport,
                deadline: Duration::from_secs(10),
                retry_policy: RetryPolicy::None,
            },
        }
    }
}

struct Pool {
    config: PoolConfig,
    semaphore: Semaphore,
    metrics: PoolMetrics,
    circuit_breaker: Mutex<CircuitBreaker>,
}

impl Pool {
    fn new(config: PoolConfig) -> Self {
        let semaphore = Semaphore::new(config.size);
        Self {
            config,
            semaphore,
            metrics: PoolMetrics::default(),
            circuit_breaker: Mutex::new(CircuitBreaker::default()),
        }
    }

    fn in_flight(&self) -> usize {
        self.config.size.saturating_sub(self.semaphore.available_permits())
    }
}

/// Bounded worker pools by workload class.
pub struct Scheduler {
    pools: HashMap<PoolName, Pool>,
}

impl Scheduler {
    pub fn new() -> Self {
        let mut pools = HashMap::new();
        for name in [PoolName::Audio, PoolName::Stt, PoolName::Llm, PoolName::Scheduled] {
            pools.insert(name, Pool::new(PoolConfig::defaults_for(name)));
        }
        Self { pools }
    }

    /// Override a pool's configuration (for process config wiring, e.g.
    /// `pool.sizes`).
    pub fn with_pool_config(mut self, name: PoolName, config: PoolConfig) -> Self {
        self.pools.insert(name, Pool::new(config));
        self
    }

    fn pool(&self, name: PoolName) -> &Pool {
        self.pools.get(&name).expect("all PoolName variants are registered at construction")
    }

    /// Submit a job to `pool`. Applies the pool's overload policy, deadline,
    /// retry policy, and circuit breaker; records metrics throughout.
    pub async fn submit<F, Fut, T>(&self, pool_name: PoolName, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let pool = self.pool(pool_name);
        pool.metrics.record_submitted();

        if pool.circuit_breaker.lock().is_open() {
            pool.metrics.record_rejected();
            return Err(Error::CircuitOpen(pool_name.as_str().to_string()));
        }

        let _permit = match pool.config.overload {
            OverloadPolicy::CallerRuns => pool
                .semaphore
                .acquire()
                .await
                .map_err(|e| Error::Execution(format!("semaphore closed: {e}")))?,
            OverloadPolicy::RejectAndReport => match pool.semaphore.try_acquire() {
                Ok(permit) => permit,
                Err(_) => {
                    pool.metrics.record_rejected();
                    return Err(Error::PoolRejected {
                        pool: pool_name.as_str().to_string(),
                        reason: "queue full".to_string(),
                    });
                }
            },
        };

        let deadline = pool.config.deadline;
        let retry_policy = pool.config.retry_policy;

        let result = execute_with_retry(retry_policy, || async {
            match timeout(deadline, operation()).await {
                Ok(inner) => inner,
                Err(_) => Err(Error::Timeout(format!(
                    "job on pool '{}' exceeded deadline of {:?}",
                    pool_name.as_str(),
                    deadline
                ))),
            }
        })
        .await;

        let mut breaker = pool.circuit_breaker.lock();
        match &result {
            Ok(_) => {
                breaker.record_success();
                pool.metrics.record_completed();
            }
            Err(err) if err.is_cancellation() => {}
            Err(_) => {
                breaker.record_failure();
                pool.metrics.record_failed();
            }
        }

        result
    }

    pub fn metrics(&self, pool_name: PoolName) -> PoolMetricsSnapshot {
        let pool = self.pool(pool_name);
        pool.metrics.snapshot(pool.in_flight())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn caller_runs_never_rejects_audio() {
        let scheduler = Scheduler::new().with_pool_config(
            PoolName::Audio,
            PoolConfig {
                size: 1,
                overload: OverloadPolicy::CallerRuns,
                deadline: Duration::from_secs(1),
                retry_policy: RetryPolicy::None,
            },
        );
        let a = scheduler.submit(PoolName::Audio, || async { Ok::<_, Error>(1) });
        let b = scheduler.submit(PoolName::Audio, || async { Ok::<_, Error>(2) });
        let (ra, rb) = tokio::join!(a, b);
        assert_eq!(ra.unwrap(), 1);
        assert_eq!(rb.unwrap(), 2);
    }

    #[tokio::test]
    async fn reject_and_report_rejects_when_full() {
        let scheduler = Scheduler::new().with_pool_config(
            PoolName::Stt,
            PoolConfig {
                size: 1,
                overload: OverloadPolicy::RejectAndReport,
                deadline: Duration::from_secs(1),
                retry_policy: RetryPolicy::None,
            },
        );

        let (tx, rx) = tokio::sync::oneshot::channel();
        let scheduler = std::sync::Arc::new(scheduler);
        let s1 = scheduler.clone();
        let held = tokio::spawn(async move {
            s1.submit(PoolName::Stt, || async {
                let _ = rx.await;
                Ok::<_, Error>(())
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let rejected = scheduler.submit(PoolName::Stt, || async { Ok::<_, Error>(()) }).await;
        assert!(matches!(rejected, Err(Error::PoolRejected { .. })));

        let _ = tx.send(());
        held.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn deadline_exceeded_becomes_timeout_error() {
        let scheduler = Scheduler::new().with_pool_config(
            PoolName::Llm,
            PoolConfig {
                size: 1,
                overload: OverloadPolicy::RejectAndReport,
                deadline: Duration::from_millis(20),
                retry_policy: RetryPolicy::None,
            },
        );
        let result = scheduler
            .submit(PoolName::Llm, || async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, Error>(())
            })
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn metrics_track_completion_and_failure() {
        let scheduler = Scheduler::new();
        scheduler
            .submit(PoolName::Audio, || async { Ok::<_, Error>(()) })
            .await
            .unwrap();
        let _ = scheduler
            .submit(PoolName::Audio, || async { Err::<(), _>(Error::AudioIngress("bad".into())) })
            .await;
        let snap = scheduler.metrics(PoolName::Audio);
        assert_eq!(snap.submitted, 2);
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.failed, 1);
    }
}
