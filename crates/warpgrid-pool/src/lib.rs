//! warpgrid-pool: a generic, self-scaling resource pool.
//!
//! Hands out expensive, reusable resources (connections, channels,
//! buffers) under variable load. Capacity moves between a minimum and a
//! maximum on its own, driven by a background control loop that samples
//! acquisition metrics once per window.
//!
//! # Architecture
//!
//! ```text
//! Pool<T>
//!   ├── SlotStore          free list, running/pending counts, capacity
//!   ├── ResourceFactory    caller factory with timeout, retry, backoff
//!   ├── HealthChecker      optional validation before hand-out
//!   ├── MetricsCollector   per-window counters (warpgrid-metrics)
//!   ├── EventBus           autoscale / timeout / error events
//!   └── control loop       timer → snapshot → Autoscaler (warpgrid-autoscale)
//!                                → change_capacity behind the capacity gate
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use warpgrid_pool::{Pool, PoolConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = PoolConfig::from_toml_str(r#"
//! name = "orders-db"
//! capacity = 8
//! min_capacity = 2
//! max_capacity = 12
//!
//! [autoscale]
//! interval = "10s"
//! "#)?;
//!
//! let pool = Pool::builder(config)
//!     .factory(|| async { Ok::<_, anyhow::Error>(String::from("connection")) })
//!     .build_warmup()
//!     .await?;
//!
//! let lease = pool.acquire(&CancellationToken::new()).await.into_result()?;
//! println!("got {:?}", lease.current());
//! # Ok(())
//! # }
//! ```
//!
//! Every acquire returns a [`Lease`]. Dropping it returns the resource;
//! [`Lease::invalidate`] discards it instead.

pub mod config;
mod control;
pub mod error;
pub mod events;
pub mod factory;
pub mod health;
pub mod lease;
pub mod pool;
pub mod registry;
mod store;

pub use config::{AutoscaleConfig, HealthFailureCounter, PoolConfig, parse_duration};
pub use error::{AcquireFailure, ErrorKind, PoolError, PoolResult, Stage};
pub use events::{
    AutoscaleEvent, ErrorEvent, EventBus, LogListener, PoolEvent, PoolListener, ScaleTrigger,
    TimeoutEvent,
};
pub use factory::{AttemptFailure, BoxFuture, FactoryFn, TeardownFn};
pub use health::{HealthCheckFn, HealthOutcome};
pub use lease::Lease;
pub use pool::{Pool, PoolBuilder, PoolStatus};
pub use registry::PoolRegistry;

pub use warpgrid_autoscale::{ScaleReason, ScaleThresholds, TieBreak};
pub use warpgrid_metrics::MetricSnapshot;
