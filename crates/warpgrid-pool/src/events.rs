//! Pool events and listener dispatch.
//!
//! Three event kinds are broadcast: capacity changes, stage timeouts and
//! errors. Dispatch is synchronous and ordered per pool. Each listener
//! runs inside its own unwind boundary so a panicking listener is logged
//! and skipped without affecting the others or the pool.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{ReentrantMutex, RwLock};
use tracing::{error, info, warn};

use warpgrid_autoscale::ScaleReason;
use warpgrid_metrics::MetricSnapshot;

use crate::error::{PoolError, Stage};

/// What caused a capacity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleTrigger {
    /// The control loop applied a decision.
    Autoscale(ScaleReason),
    /// `Pool::switch_to` was called.
    Manual,
}

impl std::fmt::Display for ScaleTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleTrigger::Autoscale(reason) => write!(f, "autoscale:{reason}"),
            ScaleTrigger::Manual => write!(f, "manual"),
        }
    }
}

/// Capacity changed.
#[derive(Debug, Clone)]
pub struct AutoscaleEvent {
    pub alias: String,
    pub old_capacity: usize,
    pub new_capacity: usize,
    pub trigger: ScaleTrigger,
    /// Snapshot the change was decided on (a peek for manual switches).
    pub snapshot: MetricSnapshot,
}

/// An operation exceeded its bound.
#[derive(Debug, Clone)]
pub struct TimeoutEvent {
    pub alias: String,
    pub stage: Stage,
    pub elapsed: Duration,
    pub timeout: Duration,
    pub snapshot: MetricSnapshot,
}

/// A stage failed.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub alias: String,
    pub error: PoolError,
}

#[derive(Debug, Clone)]
pub enum PoolEvent {
    Autoscale(AutoscaleEvent),
    Timeout(TimeoutEvent),
    Error(ErrorEvent),
}

impl PoolEvent {
    pub fn alias(&self) -> &str {
        match self {
            PoolEvent::Autoscale(e) => &e.alias,
            PoolEvent::Timeout(e) => &e.alias,
            PoolEvent::Error(e) => &e.alias,
        }
    }
}

/// Receives pool events.
///
/// Called synchronously on the task that raised the event, so
/// implementations should hand heavy work off elsewhere.
pub trait PoolListener: Send + Sync {
    fn on_event(&self, event: &PoolEvent);
}

impl<F> PoolListener for F
where
    F: Fn(&PoolEvent) + Send + Sync,
{
    fn on_event(&self, event: &PoolEvent) {
        self(event)
    }
}

/// Listener that forwards every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogListener;

impl PoolListener for LogListener {
    fn on_event(&self, event: &PoolEvent) {
        match event {
            PoolEvent::Autoscale(e) => info!(
                alias = %e.alias,
                old = e.old_capacity,
                new = e.new_capacity,
                trigger = %e.trigger,
                available = e.snapshot.available,
                running = e.snapshot.running,
                "pool capacity changed"
            ),
            PoolEvent::Timeout(e) => warn!(
                alias = %e.alias,
                stage = %e.stage,
                elapsed_ms = e.elapsed.as_millis() as u64,
                timeout_ms = e.timeout.as_millis() as u64,
                "pool operation timed out"
            ),
            PoolEvent::Error(e) => error!(alias = %e.alias, error = %e.error, "pool error"),
        }
    }
}

/// Ordered, panic-isolated fan-out to registered listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn PoolListener>>>,
    /// Serializes dispatch so listeners observe events in raise order.
    dispatch: ReentrantMutex<()>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn PoolListener>) {
        self.listeners.write().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver `event` to every listener.
    pub fn emit(&self, event: PoolEvent) {
        let _ordered = self.dispatch.lock();
        let listeners = self.listeners.read().clone();
        for (index, listener) in listeners.iter().enumerate() {
            let delivered = catch_unwind(AssertUnwindSafe(|| listener.on_event(&event)));
            if delivered.is_err() {
                error!(
                    alias = %event.alias(),
                    listener = index,
                    "pool event listener panicked"
                );
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
