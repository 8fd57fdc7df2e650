//! Error types for pool operations.
//!
//! One tagged enum covers the whole taxonomy. Callers tell timeouts from
//! faults through [`PoolError::kind`] and [`PoolError::is_timeout`]
//! instead of matching on a type hierarchy.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Pipeline stage an error or timeout originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Acquire,
    Factory,
    HealthCheck,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Acquire => write!(f, "acquire"),
            Stage::Factory => write!(f, "factory"),
            Stage::HealthCheck => write!(f, "health-check"),
            Stage::Report => write!(f, "report"),
        }
    }
}

/// Why an acquire gave up without a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireFailure {
    TimedOut,
    Cancelled,
    ShutDown,
}

impl fmt::Display for AcquireFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquireFailure::TimedOut => write!(f, "timed out"),
            AcquireFailure::Cancelled => write!(f, "cancelled"),
            AcquireFailure::ShutDown => write!(f, "aborted by shutdown"),
        }
    }
}

/// Discriminant of [`PoolError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Acquire,
    Factory,
    HealthCheck,
    Report,
    PolicyTimeout,
    FatalConfiguration,
    Timeout,
}

/// Errors surfaced by the pool.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// Waiting for a resource ended without one. Caller-recoverable.
    #[error("pool '{alias}': acquire {reason} after {elapsed:?}")]
    Acquire {
        alias: String,
        reason: AcquireFailure,
        elapsed: Duration,
    },

    /// Resource construction failed on every attempt.
    #[error("pool '{alias}': factory failed after {attempts} attempt(s): {message}")]
    Factory {
        alias: String,
        attempts: u32,
        message: String,
    },

    /// A free resource failed validation before hand-out.
    #[error("pool '{alias}': health check failed: {message}")]
    HealthCheck { alias: String, message: String },

    /// Sampling or deciding in the control loop failed.
    #[error("pool '{alias}': metrics report failed: {message}")]
    Report { alias: String, message: String },

    /// Acquire timed out while underlying stages also failed.
    #[error(
        "pool '{alias}': acquire timed out after {elapsed:?} (limit {timeout:?}) with {n} underlying failure(s)",
        n = .causes.len()
    )]
    PolicyTimeout {
        alias: String,
        elapsed: Duration,
        timeout: Duration,
        causes: Vec<PoolError>,
    },

    /// Invalid builder configuration. Raised once, the pool never starts.
    #[error("invalid pool configuration: {0}")]
    FatalConfiguration(String),

    /// A stage exceeded its configured bound.
    #[error("pool '{alias}': {stage} exceeded {timeout:?} (elapsed {elapsed:?})")]
    Timeout {
        alias: String,
        stage: Stage,
        elapsed: Duration,
        timeout: Duration,
    },
}

impl PoolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::Acquire { .. } => ErrorKind::Acquire,
            PoolError::Factory { .. } => ErrorKind::Factory,
            PoolError::HealthCheck { .. } => ErrorKind::HealthCheck,
            PoolError::Report { .. } => ErrorKind::Report,
            PoolError::PolicyTimeout { .. } => ErrorKind::PolicyTimeout,
            PoolError::FatalConfiguration(_) => ErrorKind::FatalConfiguration,
            PoolError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Whether this error means "ran out of time" rather than "broke".
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            PoolError::Acquire {
                reason: AcquireFailure::TimedOut,
                ..
            } | PoolError::PolicyTimeout { .. }
                | PoolError::Timeout { .. }
        )
    }

    /// Alias of the pool that raised the error.
    pub fn alias(&self) -> Option<&str> {
        match self {
            PoolError::Acquire { alias, .. }
            | PoolError::Factory { alias, .. }
            | PoolError::HealthCheck { alias, .. }
            | PoolError::Report { alias, .. }
            | PoolError::PolicyTimeout { alias, .. }
            | PoolError::Timeout { alias, .. } => Some(alias),
            PoolError::FatalConfiguration(_) => None,
        }
    }

    /// Time spent before the error, where measured.
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            PoolError::Acquire { elapsed, .. }
            | PoolError::PolicyTimeout { elapsed, .. }
            | PoolError::Timeout { elapsed, .. } => Some(*elapsed),
            _ => None,
        }
    }

    /// Underlying failures aggregated into a policy timeout.
    pub fn causes(&self) -> &[PoolError] {
        match self {
            PoolError::PolicyTimeout { causes, .. } => causes,
            _ => &[],
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        PoolError::FatalConfiguration(message.into())
    }
}
