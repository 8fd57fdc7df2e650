//! Resource construction and teardown.
//!
//! The factory is caller-supplied. Each attempt is bounded by the factory
//! timeout; failed attempts are retried up to the idle-retry budget with a
//! doubling backoff capped at the factory timeout.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::PoolError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Creates a new resource.
pub type FactoryFn<T> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// Releases a resource leaving the pool.
pub type TeardownFn<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// One failed factory attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    Failed { attempt: u32, message: String },
    TimedOut { attempt: u32, elapsed: Duration },
}

impl AttemptFailure {
    fn describe(&self, timeout: Duration) -> String {
        match self {
            AttemptFailure::Failed { message, .. } => message.clone(),
            AttemptFailure::TimedOut { .. } => format!("attempt timed out after {timeout:?}"),
        }
    }
}

/// Why `construct` produced no resource.
#[derive(Debug)]
pub(crate) enum ConstructError {
    /// The pool shut down mid-construction.
    Cancelled,
    /// Every attempt failed.
    Exhausted(PoolError),
}

pub(crate) struct ResourceFactory<T> {
    alias: String,
    create: FactoryFn<T>,
    teardown: Option<TeardownFn<T>>,
    timeout: Duration,
    idle_retry: u32,
    backoff: Duration,
}

impl<T: Send + 'static> ResourceFactory<T> {
    pub(crate) fn new(
        alias: &str,
        create: FactoryFn<T>,
        teardown: Option<TeardownFn<T>>,
        timeout: Duration,
        idle_retry: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            alias: alias.to_string(),
            create,
            teardown,
            timeout,
            idle_retry,
            backoff,
        }
    }

    /// Build one resource, retrying failed attempts.
    ///
    /// `on_failure` observes every failed attempt, including the last.
    pub(crate) async fn construct(
        &self,
        cancel: &CancellationToken,
        mut on_failure: impl FnMut(&AttemptFailure),
    ) -> Result<T, ConstructError> {
        let attempts = self.idle_retry.saturating_add(1);
        let mut backoff = self.backoff;
        let mut last_failure = String::new();

        for attempt in 1..=attempts {
            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ConstructError::Cancelled),
                r = tokio::time::timeout(self.timeout, (self.create)()) => r,
            };

            let failure = match outcome {
                Ok(Ok(resource)) => {
                    debug!(
                        alias = %self.alias,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "resource constructed"
                    );
                    return Ok(resource);
                }
                Ok(Err(e)) => AttemptFailure::Failed {
                    attempt,
                    message: format!("{e:#}"),
                },
                Err(_) => AttemptFailure::TimedOut {
                    attempt,
                    elapsed: started.elapsed(),
                },
            };

            last_failure = failure.describe(self.timeout);
            warn!(
                alias = %self.alias,
                attempt,
                attempts,
                error = %last_failure,
                "factory attempt failed"
            );
            on_failure(&failure);

            if attempt < attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ConstructError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = backoff.saturating_mul(2).min(self.timeout);
            }
        }

        Err(ConstructError::Exhausted(PoolError::Factory {
            alias: self.alias.clone(),
            attempts,
            message: last_failure,
        }))
    }

    /// Tear a resource down, waiting for the teardown to finish.
    pub(crate) async fn destroy(&self, resource: T) {
        match &self.teardown {
            Some(teardown) => teardown(resource).await,
            None => drop(resource),
        }
    }

    /// Tear a resource down from a synchronous context.
    ///
    /// Outside a runtime the resource is simply dropped.
    pub(crate) fn destroy_detached(&self, resource: T) {
        match (&self.teardown, Handle::try_current()) {
            (Some(teardown), Ok(handle)) => {
                handle.spawn(teardown(resource));
            }
            _ => drop(resource),
        }
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }
}
