//! Health checks for free resources.
//!
//! Runs before a pooled resource is handed out. A check that errors or
//! outlives its timeout marks the resource unhealthy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::factory::BoxFuture;

/// Validates a pooled resource.
pub type HealthCheckFn<T> =
    Arc<dyn for<'a> Fn(&'a mut T) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync>;

/// Result of a single health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    Healthy,
    /// The check returned an error.
    Unhealthy(String),
    /// The check did not finish within the health-check timeout.
    TimedOut { elapsed: Duration },
}

pub(crate) struct HealthChecker<T> {
    check: HealthCheckFn<T>,
    timeout: Duration,
}

impl<T> HealthChecker<T> {
    pub(crate) fn new(check: HealthCheckFn<T>, timeout: Duration) -> Self {
        Self { check, timeout }
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) async fn run(&self, resource: &mut T) -> HealthOutcome {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, (self.check)(resource)).await {
            Ok(Ok(())) => HealthOutcome::Healthy,
            Ok(Err(e)) => HealthOutcome::Unhealthy(format!("{e:#}")),
            Err(_) => HealthOutcome::TimedOut {
                elapsed: started.elapsed(),
            },
        };
        debug!(
            result = ?result,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "health check finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(value: &mut u32) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            match *value {
                0 => anyhow::bail!("connection reset"),
                1 => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
                _ => Ok(()),
            }
        })
    }

    fn checker(timeout: Duration) -> HealthChecker<u32> {
        HealthChecker::new(Arc::new(check), timeout)
    }

    #[tokio::test]
    async fn healthy_resource_passes() {
        let mut value = 2;
        assert_eq!(
            checker(Duration::from_millis(50)).run(&mut value).await,
            HealthOutcome::Healthy
        );
    }

    #[tokio::test]
    async fn failing_check_is_unhealthy() {
        let mut value = 0;
        let result = checker(Duration::from_millis(50)).run(&mut value).await;
        assert_eq!(result, HealthOutcome::Unhealthy("connection reset".to_string()));
    }

    #[tokio::test]
    async fn slow_check_times_out() {
        let mut value = 1;
        let result = checker(Duration::from_millis(20)).run(&mut value).await;
        assert!(matches!(result, HealthOutcome::TimedOut { elapsed } if elapsed >= Duration::from_millis(20)));
    }
}
