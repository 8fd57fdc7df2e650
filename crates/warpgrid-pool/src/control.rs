//! Autoscale control loop.
//!
//! A background task wakes once per interval, closes the metrics window,
//! asks the [`Autoscaler`] for a decision and applies it through the same
//! capacity gate as manual switches. The task holds only a weak handle to
//! the pool, so it never keeps a dropped pool alive.
//!
//! Failures while sampling or deciding are reported as error events and
//! the loop carries on with the next tick.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use warpgrid_autoscale::{AutoscalePhase, Autoscaler, ScaleDecision};
use warpgrid_metrics::MetricSnapshot;

use crate::config::AutoscaleConfig;
use crate::error::{PoolError, Stage};
use crate::events::ScaleTrigger;
use crate::pool::Shared;

pub(crate) fn spawn<T: Send + 'static>(
    pool: Weak<Shared<T>>,
    config: AutoscaleConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_autoscale_loop(pool, config, shutdown))
}

async fn run_autoscale_loop<T: Send + 'static>(
    pool: Weak<Shared<T>>,
    config: AutoscaleConfig,
    shutdown: CancellationToken,
) {
    let mut scaler = Autoscaler::new(config.thresholds.clone(), config.sample_count);
    debug!(interval_ms = config.interval.as_millis() as u64, "autoscale loop starting");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {
                let Some(shared) = pool.upgrade() else {
                    break;
                };
                tick(&shared, &mut scaler, config.interval).await;
            }
            _ = shutdown.cancelled() => {
                debug!("autoscale loop shutting down");
                break;
            }
        }
    }
}

/// One pass through Sampling, Deciding and Scaling.
async fn tick<T: Send + 'static>(
    shared: &Arc<Shared<T>>,
    scaler: &mut Autoscaler,
    interval: Duration,
) {
    tick_with(shared, scaler, interval, Shared::take_snapshot).await;
}

/// [`tick`] with the sampling step supplied by the caller.
async fn tick_with<T, S>(
    shared: &Arc<Shared<T>>,
    scaler: &mut Autoscaler,
    interval: Duration,
    sample: S,
) where
    T: Send + 'static,
    S: FnOnce(&Shared<T>) -> MetricSnapshot,
{
    let started = Instant::now();
    scaler.set_phase(AutoscalePhase::Sampling);

    let decided = catch_unwind(AssertUnwindSafe(
        || -> Result<(ScaleDecision, MetricSnapshot), String> {
            let snapshot = sample(&**shared);
            snapshot.validate().map_err(|e| e.to_string())?;
            scaler.set_phase(AutoscalePhase::Deciding);

            let current = shared.store().capacity();
            if current != snapshot.target {
                debug!(
                    alias = %shared.alias(),
                    window_target = snapshot.target,
                    current,
                    "capacity changed during the window, skipping decision"
                );
                scaler.reset();
                return Ok((ScaleDecision::NoChange, snapshot));
            }
            Ok((scaler.evaluate(&snapshot), snapshot))
        },
    ));

    let decision = match decided {
        Ok(Ok(decision)) => Some(decision),
        Ok(Err(message)) => {
            report_failure(shared, message);
            None
        }
        Err(payload) => {
            report_failure(shared, panic_message(payload.as_ref()));
            None
        }
    };

    match decision {
        Some((ScaleDecision::ScaleTo { capacity, reason }, snapshot)) => {
            scaler.set_phase(AutoscalePhase::Scaling);
            let applied = shared
                .change_capacity(capacity, ScaleTrigger::Autoscale(reason), Some(snapshot))
                .await;
            shared.rebase_window(applied);
        }
        Some((ScaleDecision::NoChange, snapshot)) => {
            trace!(
                alias = %shared.alias(),
                target = snapshot.target,
                available = snapshot.available,
                running = snapshot.running,
                acquisitions = snapshot.acquisition_count,
                "autoscale tick, no change"
            );
        }
        None => {}
    }
    scaler.set_phase(AutoscalePhase::Idle);

    let elapsed = started.elapsed();
    if elapsed > interval {
        shared.emit_timeout(Stage::Report, elapsed, interval);
    }
}

fn report_failure<T: Send + 'static>(shared: &Shared<T>, message: String) {
    let err = PoolError::Report {
        alias: shared.alias().to_string(),
        message,
    };
    error!(alias = %shared.alias(), error = %err, "autoscale tick failed");
    shared.emit_error(err);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic with non-string payload".to_string()
    }
}
