//! Pool facade: builder, acquire protocol and capacity control.
//!
//! ```text
//!  acquire ──► checkout ──► try_take_free ──► health check ──► Lease
//!                  │                              │ fail
//!                  │ miss                         └──► discard (+ top-up)
//!                  ▼
//!             try_reserve ──► spawn construct ──► oneshot ──► Lease
//!                  │ full                │ acquirer gone
//!                  ▼                     └──► free list
//!               wait (overload)
//!
//!  control loop / switch_to ──► capacity gate ──► change_capacity
//! ```
//!
//! All slot state lives in the slot store; this module only moves
//! slots between the store, the factory and leases.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use warpgrid_metrics::{MetricSnapshot, MetricsCollector, PoolGauges};

use crate::config::{HealthFailureCounter, PoolConfig};
use crate::control;
use crate::error::{AcquireFailure, PoolError, PoolResult, Stage};
use crate::events::{
    AutoscaleEvent, ErrorEvent, EventBus, PoolEvent, PoolListener, ScaleTrigger, TimeoutEvent,
};
use crate::factory::{
    AttemptFailure, BoxFuture, ConstructError, FactoryFn, ResourceFactory, TeardownFn,
};
use crate::health::{HealthCheckFn, HealthChecker, HealthOutcome};
use crate::lease::Lease;
use crate::store::{Reservation, Slot, SlotStore};

/// Accounting and bounds of a pool at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub alias: String,
    pub capacity: usize,
    pub min_capacity: usize,
    pub max_capacity: usize,
    pub initial_capacity: usize,
    pub available: usize,
    pub running: usize,
    pub pending: usize,
    pub shut_down: bool,
}

/// Builds a [`Pool`] from a [`PoolConfig`] and caller-supplied functions.
pub struct PoolBuilder<T: Send + 'static> {
    config: PoolConfig,
    factory: Option<FactoryFn<T>>,
    teardown: Option<TeardownFn<T>>,
    health_check: Option<HealthCheckFn<T>>,
    listeners: Vec<Arc<dyn PoolListener>>,
}

impl<T: Send + 'static> PoolBuilder<T> {
    /// Resource constructor. Required.
    pub fn factory<F, Fut>(mut self, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.factory = Some(Arc::new(move || -> BoxFuture<'static, anyhow::Result<T>> {
            Box::pin(factory())
        }));
        self
    }

    /// Runs for every resource leaving the pool. Plain drop when unset.
    pub fn teardown<F, Fut>(mut self, teardown: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.teardown = Some(Arc::new(move |resource| -> BoxFuture<'static, ()> {
            Box::pin(teardown(resource))
        }));
        self
    }

    /// Validates a free resource before it is handed out.
    pub fn health_check<F>(mut self, check: F) -> Self
    where
        F: for<'a> Fn(&'a mut T) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.health_check = Some(Arc::new(check));
        self
    }

    pub fn listener(mut self, listener: impl PoolListener + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Build the pool. Slots up to the initial capacity are constructed in
    /// the background when a Tokio runtime is available.
    pub fn build(self) -> PoolResult<Pool<T>> {
        let pool = self.assemble()?;
        let scheduled = pool.shared.grow(pool.shared.store.capacity());
        debug!(alias = %pool.shared.alias, scheduled, "background fill scheduled");
        Ok(pool)
    }

    /// Build the pool and wait until it holds its initial capacity.
    ///
    /// Any construction failure shuts the pool down and is returned.
    pub async fn build_warmup(self) -> PoolResult<Pool<T>> {
        let pool = self.assemble()?;
        pool.warmup().await?;
        Ok(pool)
    }

    fn assemble(self) -> PoolResult<Pool<T>> {
        self.config.validate()?;
        let Some(create) = self.factory else {
            return Err(PoolError::config(format!(
                "pool '{}': a factory is required",
                self.config.name
            )));
        };
        if self.config.autoscale.is_some() && Handle::try_current().is_err() {
            return Err(PoolError::config(format!(
                "pool '{}': autoscaling requires a Tokio runtime",
                self.config.name
            )));
        }

        let config = self.config;
        let alias = config.name.clone();
        let events = EventBus::new();
        for listener in self.listeners {
            events.subscribe(listener);
        }

        let shared = Arc::new(Shared {
            store: Arc::new(SlotStore::new(
                config.capacity,
                config.min_capacity,
                config.max_capacity,
            )),
            factory: ResourceFactory::new(
                &alias,
                create,
                self.teardown,
                config.factory_timeout,
                config.factory_idle_retry,
                config.factory_retry_backoff,
            ),
            health: self
                .health_check
                .map(|check| HealthChecker::new(check, config.health_check_timeout)),
            metrics: MetricsCollector::with_target(config.capacity),
            events,
            capacity_gate: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            epoch: AtomicU64::new(0),
            autoscaler: Mutex::new(None),
            alias,
            config,
        });

        if let Some(autoscale) = &shared.config.autoscale {
            let handle = control::spawn(
                Arc::downgrade(&shared),
                autoscale.clone(),
                shared.shutdown.clone(),
            );
            *shared.autoscaler.lock() = Some(handle);
        }

        info!(
            alias = %shared.alias,
            capacity = shared.config.capacity,
            min = shared.config.min_capacity,
            max = shared.config.max_capacity,
            autoscale = shared.config.autoscale.is_some(),
            "pool built"
        );
        Ok(Pool { shared })
    }
}

/// A self-scaling pool of `T`. Cloning yields another handle to the same
/// pool.
pub struct Pool<T: Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool").field("status", &self.status()).finish()
    }
}

impl<T: Send + 'static> Pool<T> {
    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared<T>> {
        &self.shared
    }

    pub fn builder(config: PoolConfig) -> PoolBuilder<T> {
        PoolBuilder {
            config,
            factory: None,
            teardown: None,
            health_check: None,
            listeners: Vec::new(),
        }
    }

    /// Acquire with the configured acquire timeout.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Lease<T> {
        self.acquire_timeout(cancel, self.shared.config.acquire_timeout)
            .await
    }

    /// Acquire a resource, waiting at most `timeout`.
    ///
    /// Never fails outright: a lease that did not get a resource reports
    /// `succeeded() == false` and carries the error.
    pub async fn acquire_timeout(&self, cancel: &CancellationToken, timeout: Duration) -> Lease<T> {
        let shared = &self.shared;
        let started = Instant::now();
        let epoch = shared.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        shared.metrics.record_acquisition();

        let mut causes = Vec::new();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AcquireFailure::Cancelled),
            _ = shared.shutdown.cancelled() => Err(AcquireFailure::ShutDown),
            slot = shared.checkout(&mut causes) => slot,
            // `sleep` saturates, so `Duration::MAX` waits indefinitely.
            _ = tokio::time::sleep(timeout) => Err(AcquireFailure::TimedOut),
        };
        let elapsed = started.elapsed();

        match outcome {
            Ok(slot) => {
                debug!(
                    alias = %shared.alias,
                    epoch,
                    slot = slot.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "resource acquired"
                );
                Lease::acquired(Arc::clone(shared), slot, epoch, elapsed)
            }
            Err(reason) => {
                match reason {
                    AcquireFailure::ShutDown => shared.metrics.record_error(),
                    AcquireFailure::TimedOut | AcquireFailure::Cancelled => {
                        shared.metrics.record_timeout()
                    }
                }
                if reason == AcquireFailure::TimedOut {
                    shared.emit_timeout(Stage::Acquire, elapsed, timeout);
                }
                debug!(
                    alias = %shared.alias,
                    epoch,
                    %reason,
                    causes = causes.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "acquire failed"
                );
                let error = if reason == AcquireFailure::TimedOut && !causes.is_empty() {
                    PoolError::PolicyTimeout {
                        alias: shared.alias.clone(),
                        elapsed,
                        timeout,
                        causes,
                    }
                } else {
                    PoolError::Acquire {
                        alias: shared.alias.clone(),
                        reason,
                        elapsed,
                    }
                };
                Lease::failed(Arc::clone(shared), error, epoch, elapsed)
            }
        }
    }

    /// Manually move the pool to `capacity`, clamped to its bounds.
    ///
    /// Returns the capacity actually applied.
    pub async fn switch_to(&self, capacity: usize) -> usize {
        self.shared
            .change_capacity(capacity, ScaleTrigger::Manual, None)
            .await
    }

    pub fn alias(&self) -> &str {
        &self.shared.alias
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn current_capacity(&self) -> usize {
        self.shared.store.capacity()
    }

    pub fn min_capacity(&self) -> usize {
        self.shared.store.min()
    }

    pub fn max_capacity(&self) -> usize {
        self.shared.store.max()
    }

    pub fn initial_capacity(&self) -> usize {
        self.shared.config.capacity
    }

    pub fn is_min_capacity(&self) -> bool {
        self.current_capacity() == self.min_capacity()
    }

    pub fn is_max_capacity(&self) -> bool {
        self.current_capacity() == self.max_capacity()
    }

    pub fn is_init_capacity(&self) -> bool {
        self.current_capacity() == self.initial_capacity()
    }

    /// Free slots.
    pub fn available(&self) -> usize {
        self.shared.store.available()
    }

    /// Slots currently leased.
    pub fn running(&self) -> usize {
        self.shared.store.running()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    pub fn status(&self) -> PoolStatus {
        let store = self.shared.store.status();
        PoolStatus {
            alias: self.shared.alias.clone(),
            capacity: store.capacity,
            min_capacity: self.min_capacity(),
            max_capacity: self.max_capacity(),
            initial_capacity: self.initial_capacity(),
            available: store.available,
            running: store.running,
            pending: store.pending,
            shut_down: self.is_shut_down(),
        }
    }

    /// Metrics of the current window, without closing it.
    pub fn snapshot(&self) -> MetricSnapshot {
        self.shared.peek()
    }

    pub fn subscribe(&self, listener: impl PoolListener + 'static) {
        self.shared.events.subscribe(Arc::new(listener));
    }

    /// Stop the control loop, fail pending and future acquires, and tear
    /// down free resources. Leased resources are torn down on release.
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        if shared.shutdown.is_cancelled() {
            return;
        }
        shared.shutdown.cancel();

        let control = shared.autoscaler.lock().take();
        if let Some(handle) = control {
            let _ = handle.await;
        }

        let idle = shared.store.close();
        let retired = idle.len();
        for slot in idle {
            shared.factory.destroy(slot.resource).await;
        }
        info!(
            alias = %shared.alias,
            retired,
            running = shared.store.running(),
            "pool shut down"
        );
    }

    async fn warmup(&self) -> PoolResult<()> {
        let shared = &self.shared;
        let started = Instant::now();
        let mut tasks = JoinSet::new();
        while let Some(reservation) = shared.store.try_reserve() {
            let shared = Arc::clone(shared);
            tasks.spawn(async move { shared.construct(reservation).await });
        }

        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            let error = match joined {
                Ok(Some(Ok(constructed))) => {
                    // Lands on the free list.
                    drop(constructed);
                    continue;
                }
                Ok(Some(Err(error))) => error,
                Ok(None) => PoolError::Acquire {
                    alias: shared.alias.clone(),
                    reason: AcquireFailure::ShutDown,
                    elapsed: started.elapsed(),
                },
                Err(join) => PoolError::Factory {
                    alias: shared.alias.clone(),
                    attempts: 0,
                    message: format!("construction task failed: {join}"),
                },
            };
            if failure.is_none() {
                failure = Some(error);
            }
        }

        if let Some(error) = failure {
            warn!(alias = %shared.alias, error = %error, "pool warmup failed");
            self.shutdown().await;
            return Err(error);
        }

        info!(
            alias = %shared.alias,
            available = shared.store.available(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pool warmed up"
        );
        Ok(())
    }
}

type ConstructReply<T> = Result<Constructed<T>, PoolError>;

/// State shared by pool handles, leases, construction tasks and the
/// control loop.
pub(crate) struct Shared<T: Send + 'static> {
    alias: String,
    config: PoolConfig,
    store: Arc<SlotStore<T>>,
    factory: ResourceFactory<T>,
    health: Option<HealthChecker<T>>,
    metrics: MetricsCollector,
    events: EventBus,
    /// Serializes capacity changes between the control loop and
    /// `switch_to`.
    capacity_gate: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    epoch: AtomicU64,
    autoscaler: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Shared<T> {
    pub(crate) fn alias(&self) -> &str {
        &self.alias
    }

    pub(crate) fn store(&self) -> &SlotStore<T> {
        &self.store
    }

    fn gauges(&self) -> PoolGauges {
        let status = self.store.status();
        PoolGauges {
            target: status.capacity,
            running: status.running,
            available: status.available,
            minimum: self.store.min(),
            maximum: self.store.max(),
        }
    }

    pub(crate) fn peek(&self) -> MetricSnapshot {
        self.metrics.peek(self.gauges())
    }

    /// Close the metrics window.
    pub(crate) fn take_snapshot(&self) -> MetricSnapshot {
        self.metrics.snapshot(self.gauges())
    }

    /// The control loop applied `capacity` at the window boundary; the
    /// open window counts from there.
    pub(crate) fn rebase_window(&self, capacity: usize) {
        self.metrics.rebase_target(capacity);
    }

    pub(crate) fn emit_timeout(&self, stage: Stage, elapsed: Duration, timeout: Duration) {
        self.events.emit(PoolEvent::Timeout(TimeoutEvent {
            alias: self.alias.clone(),
            stage,
            elapsed,
            timeout,
            snapshot: self.peek(),
        }));
    }

    pub(crate) fn emit_error(&self, error: PoolError) {
        self.events.emit(PoolEvent::Error(ErrorEvent {
            alias: self.alias.clone(),
            error,
        }));
    }

    fn count_health_failure(&self) {
        match self.config.health_failure {
            HealthFailureCounter::Overload => self.metrics.record_overload(),
            HealthFailureCounter::Error => self.metrics.record_error(),
        }
    }

    /// Settle a slot coming back from a lease.
    pub(crate) fn release_slot(self: &Arc<Self>, slot: Slot<T>, discard: bool) {
        if discard {
            self.discard_slot(slot);
            return;
        }
        if let Some(surplus) = self.store.return_slot(slot) {
            debug!(alias = %self.alias, slot = surplus.id, "retiring slot above capacity");
            self.factory.destroy_detached(surplus.resource);
        }
    }

    fn discard_slot(self: &Arc<Self>, slot: Slot<T>) {
        let deficit = self.store.discard();
        debug!(alias = %self.alias, slot = slot.id, deficit, "slot discarded");
        self.factory.destroy_detached(slot.resource);
        self.grow(deficit);
    }

    /// Start up to `count` background constructions. Returns how many
    /// were started.
    fn grow(self: &Arc<Self>, count: usize) -> usize {
        let mut started = 0;
        for _ in 0..count {
            let Some(reservation) = self.store.try_reserve() else {
                break;
            };
            if !self.spawn_construct(reservation, None) {
                break;
            }
            started += 1;
        }
        started
    }

    /// Construct on a spawned task holding `reservation`. The outcome goes
    /// to `reply` if given; a resource nobody receives lands on the free
    /// list.
    fn spawn_construct(
        self: &Arc<Self>,
        reservation: Reservation<T>,
        reply: Option<oneshot::Sender<ConstructReply<T>>>,
    ) -> bool {
        let Ok(runtime) = Handle::try_current() else {
            return false;
        };
        let shared = Arc::clone(self);
        runtime.spawn(async move {
            let Some(outcome) = shared.construct(reservation).await else {
                return;
            };
            if let Some(reply) = reply {
                let _ = reply.send(outcome);
            }
        });
        true
    }

    /// Run the factory for a reserved slot. `None` means the pool shut
    /// down first.
    async fn construct(self: &Arc<Self>, reservation: Reservation<T>) -> Option<ConstructReply<T>> {
        let result = self
            .factory
            .construct(&self.shutdown, |failure| {
                if let AttemptFailure::TimedOut { elapsed, .. } = failure {
                    self.emit_timeout(Stage::Factory, *elapsed, self.factory.timeout());
                }
            })
            .await;

        match result {
            Ok(resource) => Some(Ok(Constructed {
                shared: Arc::clone(self),
                parts: Some((reservation, resource)),
            })),
            Err(ConstructError::Cancelled) => {
                debug!(alias = %self.alias, "construction cancelled by shutdown");
                None
            }
            Err(ConstructError::Exhausted(error)) => {
                self.metrics.record_error();
                self.emit_error(error.clone());
                Some(Err(error))
            }
        }
    }

    /// Apply a capacity change behind the capacity gate.
    pub(crate) async fn change_capacity(
        self: &Arc<Self>,
        requested: usize,
        trigger: ScaleTrigger,
        snapshot: Option<MetricSnapshot>,
    ) -> usize {
        let _gate = self.capacity_gate.lock().await;
        let change = self.store.change_capacity(requested);

        let retired = change.surplus.len();
        for slot in change.surplus {
            self.factory.destroy(slot.resource).await;
        }
        let scheduled = self.grow(change.gap);

        if change.old != change.new {
            info!(
                alias = %self.alias,
                old = change.old,
                new = change.new,
                %trigger,
                retired,
                scheduled,
                "pool capacity changed"
            );
            self.events.emit(PoolEvent::Autoscale(AutoscaleEvent {
                alias: self.alias.clone(),
                old_capacity: change.old,
                new_capacity: change.new,
                trigger,
                snapshot: snapshot.unwrap_or_else(|| self.peek()),
            }));
        }
        change.new
    }

    /// Run the health check on a slot taken from the free list.
    ///
    /// `None` means the slot failed and was discarded.
    async fn validate(
        self: &Arc<Self>,
        slot: Slot<T>,
        causes: &mut Vec<PoolError>,
    ) -> Option<Slot<T>> {
        let Some(health) = &self.health else {
            return Some(slot);
        };

        let mut taken = TakenSlot {
            shared: self,
            slot: Some(slot),
        };
        let resource = &mut taken.slot.as_mut()?.resource;
        match health.run(resource).await {
            HealthOutcome::Healthy => taken.slot.take(),
            HealthOutcome::Unhealthy(message) => {
                self.count_health_failure();
                let error = PoolError::HealthCheck {
                    alias: self.alias.clone(),
                    message,
                };
                warn!(alias = %self.alias, error = %error, "discarding unhealthy resource");
                self.emit_error(error.clone());
                causes.push(error);
                None
            }
            HealthOutcome::TimedOut { elapsed } => {
                self.count_health_failure();
                warn!(
                    alias = %self.alias,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "health check timed out, discarding resource"
                );
                self.emit_timeout(Stage::HealthCheck, elapsed, health.timeout());
                causes.push(PoolError::Timeout {
                    alias: self.alias.clone(),
                    stage: Stage::HealthCheck,
                    elapsed,
                    timeout: health.timeout(),
                });
                None
            }
        }
    }

    /// Wait for a slot: a free one, a new one inside the capacity gap, or
    /// one returned by another caller.
    ///
    /// Failures along the way are pushed to `causes`. After a factory
    /// failure this caller stops constructing and only waits.
    async fn checkout(
        self: &Arc<Self>,
        causes: &mut Vec<PoolError>,
    ) -> Result<Slot<T>, AcquireFailure> {
        let mut may_construct = true;
        let mut waited = false;
        let mut construction: Option<oneshot::Receiver<ConstructReply<T>>> = None;

        loop {
            let notified = self.store.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.store.is_closed() {
                return Err(AcquireFailure::ShutDown);
            }

            if let Some(slot) = self.store.try_take_free() {
                match self.validate(slot, causes).await {
                    Some(slot) => return Ok(slot),
                    None => continue,
                }
            }

            if construction.is_none()
                && may_construct
                && let Some(reservation) = self.store.try_reserve()
            {
                let (tx, rx) = oneshot::channel();
                if self.spawn_construct(reservation, Some(tx)) {
                    construction = Some(rx);
                }
            }

            let Some(rx) = construction.as_mut() else {
                if !waited {
                    waited = true;
                    self.metrics.record_overload();
                    debug!(alias = %self.alias, "no free slot, waiting");
                }
                notified.as_mut().await;
                continue;
            };

            let reply = tokio::select! {
                reply = rx => Some(reply),
                _ = notified.as_mut() => None,
            };
            let Some(reply) = reply else {
                continue;
            };
            construction = None;
            match reply {
                Ok(Ok(constructed)) => {
                    if let Some(slot) = constructed.into_running() {
                        return Ok(slot);
                    }
                }
                Ok(Err(error)) => {
                    causes.push(error);
                    may_construct = false;
                }
                Err(_) => {
                    causes.push(PoolError::Factory {
                        alias: self.alias.clone(),
                        attempts: 0,
                        message: "construction task ended without a result".to_string(),
                    });
                    may_construct = false;
                }
            }
        }
    }
}

impl<T: Send + 'static> Drop for Shared<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.autoscaler.get_mut().take() {
            handle.abort();
        }
        for slot in self.store.close() {
            self.factory.destroy_detached(slot.resource);
        }
    }
}

/// A freshly built resource still holding its reservation.
///
/// Dropped without being claimed, it goes to the free list.
struct Constructed<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    parts: Option<(Reservation<T>, T)>,
}

impl<T: Send + 'static> Constructed<T> {
    fn into_running(mut self) -> Option<Slot<T>> {
        self.parts
            .take()
            .map(|(reservation, resource)| reservation.into_running(resource))
    }
}

impl<T: Send + 'static> Drop for Constructed<T> {
    fn drop(&mut self) {
        let Some((reservation, resource)) = self.parts.take() else {
            return;
        };
        if let Some(surplus) = reservation.into_free(resource) {
            self.shared.factory.destroy_detached(surplus.resource);
        }
    }
}

/// A slot taken from the free list but not yet handed to a caller.
/// Dropping it discards the slot.
struct TakenSlot<'a, T: Send + 'static> {
    shared: &'a Arc<Shared<T>>,
    slot: Option<Slot<T>>,
}

impl<T: Send + 'static> Drop for TakenSlot<'_, T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.shared.discard_slot(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::AtomicUsize;

    fn config(capacity: usize, min: usize, max: usize) -> PoolConfig {
        PoolConfig {
            capacity,
            min_capacity: min,
            max_capacity: max,
            acquire_timeout: Duration::from_millis(200),
            factory_timeout: Duration::from_millis(100),
            factory_idle_retry: 0,
            factory_retry_backoff: Duration::from_millis(1),
            ..PoolConfig::named("test-pool")
        }
    }

    fn counting_pool(capacity: usize, min: usize, max: usize) -> (PoolBuilder<usize>, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let builder = Pool::builder(config(capacity, min, max)).factory(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, anyhow::Error>(n) }
        });
        (builder, created)
    }

    #[test]
    fn build_without_factory_is_fatal() {
        let err = Pool::<u32>::builder(config(2, 1, 4)).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FatalConfiguration);
    }

    #[test]
    fn autoscale_without_runtime_is_fatal() {
        let mut cfg = config(2, 1, 4);
        cfg.autoscale = Some(Default::default());
        let err = Pool::<u32>::builder(cfg)
            .factory(|| async { Ok::<_, anyhow::Error>(1) })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Tokio runtime"));
    }

    #[test]
    fn build_outside_runtime_is_lazy() {
        let (builder, created) = counting_pool(3, 1, 5);
        let pool = builder.build().unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 0);
        assert_eq!(pool.current_capacity(), 3);
        assert!(pool.is_init_capacity());
        assert_eq!(pool.status().available, 0);
    }

    #[tokio::test]
    async fn warmup_fills_to_initial_capacity() {
        let (builder, created) = counting_pool(3, 1, 5);
        let pool = builder.build_warmup().await.unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 3);
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.running(), 0);
    }

    #[tokio::test]
    async fn acquire_reuses_released_slot() {
        let (builder, created) = counting_pool(1, 1, 1);
        let pool = builder.build_warmup().await.unwrap();
        let token = CancellationToken::new();

        let first = pool.acquire(&token).await;
        let id = first.slot_id();
        drop(first);

        let second = pool.acquire(&token).await;
        assert!(second.succeeded());
        assert_eq!(second.slot_id(), id);
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn epochs_increase_per_acquire() {
        let (builder, _) = counting_pool(2, 1, 2);
        let pool = builder.build_warmup().await.unwrap();
        let token = CancellationToken::new();
        let a = pool.acquire(&token).await;
        let b = pool.acquire(&token).await;
        assert!(b.epoch() > a.epoch());
    }

    #[tokio::test]
    async fn switch_to_clamps_and_reports() {
        let (builder, _) = counting_pool(2, 1, 4);
        let pool = builder.build_warmup().await.unwrap();

        assert_eq!(pool.switch_to(99).await, 4);
        assert!(pool.is_max_capacity());
        assert_eq!(pool.switch_to(0).await, 1);
        assert!(pool.is_min_capacity());
        assert!(pool.available() <= 1);
    }

    #[tokio::test]
    async fn shutdown_fails_acquires_fast() {
        let (builder, _) = counting_pool(1, 1, 1);
        let pool = builder.build_warmup().await.unwrap();
        pool.shutdown().await;

        let lease = pool.acquire(&CancellationToken::new()).await;
        assert!(!lease.succeeded());
        assert!(matches!(
            lease.error(),
            Some(PoolError::Acquire {
                reason: AcquireFailure::ShutDown,
                ..
            })
        ));
        assert!(pool.is_shut_down());
        assert_eq!(pool.available(), 0);
    }
}
