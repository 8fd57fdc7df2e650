//! Shared fixtures for pool integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use warpgrid_pool::{Pool, PoolBuilder, PoolConfig, PoolEvent};

/// A fake connection.
#[derive(Debug)]
pub struct Conn {
    pub id: usize,
    pub healthy: bool,
}

/// Counts factory and teardown calls.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub created: Arc<AtomicUsize>,
    pub destroyed: Arc<AtomicUsize>,
}

impl Counters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn config(name: &str, capacity: usize, min: usize, max: usize) -> PoolConfig {
    PoolConfig {
        capacity,
        min_capacity: min,
        max_capacity: max,
        acquire_timeout: Duration::from_millis(300),
        factory_timeout: Duration::from_millis(100),
        factory_idle_retry: 1,
        factory_retry_backoff: Duration::from_millis(1),
        health_check_timeout: Duration::from_millis(50),
        ..PoolConfig::named(name)
    }
}

/// Builder whose factory hands out numbered, healthy connections.
pub fn conn_pool(config: PoolConfig) -> (PoolBuilder<Conn>, Counters) {
    conn_pool_with(config, |_| true)
}

/// Builder whose factory decides health per connection id.
pub fn conn_pool_with(
    config: PoolConfig,
    healthy: fn(usize) -> bool,
) -> (PoolBuilder<Conn>, Counters) {
    init_tracing();
    let counters = Counters::default();
    let created = Arc::clone(&counters.created);
    let destroyed = Arc::clone(&counters.destroyed);
    let builder = Pool::builder(config)
        .factory(move || {
            let id = created.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok::<_, anyhow::Error>(Conn {
                    id,
                    healthy: healthy(id),
                })
            }
        })
        .teardown(move |_conn: Conn| {
            let destroyed = Arc::clone(&destroyed);
            async move {
                destroyed.fetch_add(1, Ordering::SeqCst);
            }
        });
    (builder, counters)
}

/// Collects every event a pool emits.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<PoolEvent>>>,
}

impl Recorder {
    pub fn listener(&self) -> impl Fn(&PoolEvent) + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        move |event: &PoolEvent| events.lock().push(event.clone())
    }

    pub fn events(&self) -> Vec<PoolEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&PoolEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| matches(e)).count()
    }
}

/// Poll `condition` every few milliseconds until it holds or `limit`
/// passes. Returns whether it held.
pub async fn wait_for(limit: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
