//! Control loop and manual capacity switches, end to end.

mod common;

use std::time::Duration;

use common::{Recorder, config, conn_pool, wait_for};
use tokio_util::sync::CancellationToken;
use warpgrid_pool::{AutoscaleConfig, AutoscaleEvent, PoolEvent, ScaleReason, ScaleTrigger};

fn autoscale(interval_ms: u64) -> Option<AutoscaleConfig> {
    Some(AutoscaleConfig {
        interval: Duration::from_millis(interval_ms),
        ..Default::default()
    })
}

fn capacity_changes(recorder: &Recorder) -> Vec<AutoscaleEvent> {
    recorder
        .events()
        .into_iter()
        .filter_map(|event| match event {
            PoolEvent::Autoscale(e) => Some(e),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn idle_pool_shrinks_to_min_then_rolls_back() {
    let mut cfg = config("shrink", 8, 2, 12);
    cfg.autoscale = autoscale(100);
    let recorder = Recorder::default();
    let (builder, counters) = conn_pool(cfg);
    let pool = builder
        .listener(recorder.listener())
        .build_warmup()
        .await
        .unwrap();
    assert_eq!(pool.available(), 8);

    // Fully idle window: shrink to the minimum.
    assert!(wait_for(Duration::from_secs(2), || pool.current_capacity() == 2).await);
    let changes = capacity_changes(&recorder);
    assert_eq!(changes.len(), 1);
    assert_eq!((changes[0].old_capacity, changes[0].new_capacity), (8, 2));
    assert_eq!(
        changes[0].trigger,
        ScaleTrigger::Autoscale(ScaleReason::ShrinkToMin)
    );
    assert_eq!(changes[0].snapshot.available, 8);
    assert!(pool.is_min_capacity());
    assert!(wait_for(Duration::from_secs(1), || counters.destroyed() == 6).await);

    // Demand returns: one free slot left at the minimum.
    let _lease = pool.acquire(&CancellationToken::new()).await;
    assert_eq!(pool.available(), 1);

    assert!(wait_for(Duration::from_secs(2), || pool.current_capacity() == 8).await);
    let changes = capacity_changes(&recorder);
    assert_eq!(changes.len(), 2);
    assert_eq!((changes[1].old_capacity, changes[1].new_capacity), (2, 8));
    assert_eq!(
        changes[1].trigger,
        ScaleTrigger::Autoscale(ScaleReason::RollbackFromMin)
    );
    assert!(pool.is_init_capacity());

    // The regrown slots are built in the background.
    assert!(wait_for(Duration::from_secs(1), || pool.available() == 7).await);
    pool.shutdown().await;
}

#[tokio::test]
async fn idle_pool_with_min_one_shrinks_once_and_stays() {
    let mut cfg = config("idle-min-one", 8, 1, 12);
    cfg.autoscale = autoscale(50);
    let recorder = Recorder::default();
    let (builder, counters) = conn_pool(cfg);
    let pool = builder
        .listener(recorder.listener())
        .build_warmup()
        .await
        .unwrap();

    assert!(wait_for(Duration::from_secs(2), || pool.current_capacity() == 1).await);
    // Many more windows pass without a single acquire.
    tokio::time::sleep(Duration::from_millis(600)).await;

    let changes = capacity_changes(&recorder);
    assert_eq!(changes.len(), 1);
    assert_eq!((changes[0].old_capacity, changes[0].new_capacity), (8, 1));
    assert_eq!(pool.current_capacity(), 1);
    assert_eq!(counters.created(), 8);
    assert!(wait_for(Duration::from_secs(1), || counters.destroyed() == 7).await);

    // Real demand still brings the capacity back.
    let _lease = pool.acquire(&CancellationToken::new()).await;
    assert!(wait_for(Duration::from_secs(2), || pool.current_capacity() == 8).await);
    assert_eq!(
        capacity_changes(&recorder)[1].trigger,
        ScaleTrigger::Autoscale(ScaleReason::RollbackFromMin)
    );
    pool.shutdown().await;
}

#[tokio::test]
async fn exhausted_pool_grows_to_max_then_rolls_back() {
    let mut cfg = config("grow", 2, 2, 6);
    cfg.autoscale = autoscale(100);
    let recorder = Recorder::default();
    let (builder, _) = conn_pool(cfg);
    let pool = builder
        .listener(recorder.listener())
        .build_warmup()
        .await
        .unwrap();

    let token = CancellationToken::new();
    let a = pool.acquire(&token).await;
    let b = pool.acquire(&token).await;
    assert_eq!(pool.available(), 0);

    assert!(wait_for(Duration::from_secs(2), || pool.is_max_capacity()).await);
    let changes = capacity_changes(&recorder);
    assert_eq!((changes[0].old_capacity, changes[0].new_capacity), (2, 6));
    assert_eq!(
        changes[0].trigger,
        ScaleTrigger::Autoscale(ScaleReason::GrowToMax)
    );

    // New capacity is usable right away.
    let c = pool.acquire(&token).await;
    assert!(c.succeeded());

    drop((a, b, c));
    assert!(wait_for(Duration::from_secs(2), || pool.current_capacity() == 2).await);
    let changes = capacity_changes(&recorder);
    let last = changes.last().unwrap();
    assert_eq!((last.old_capacity, last.new_capacity), (6, 2));
    assert_eq!(
        last.trigger,
        ScaleTrigger::Autoscale(ScaleReason::RollbackFromMax)
    );
    assert!(pool.available() <= 2);
    pool.shutdown().await;
}

#[tokio::test]
async fn manual_switch_emits_only_on_change() {
    let recorder = Recorder::default();
    let (builder, _) = conn_pool(config("manual", 2, 1, 8));
    let pool = builder
        .listener(recorder.listener())
        .build_warmup()
        .await
        .unwrap();

    assert_eq!(pool.switch_to(5).await, 5);
    assert_eq!(pool.switch_to(5).await, 5);
    assert_eq!(pool.switch_to(40).await, 8);

    let changes = capacity_changes(&recorder);
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].trigger, ScaleTrigger::Manual);
    assert_eq!((changes[0].old_capacity, changes[0].new_capacity), (2, 5));
    assert_eq!((changes[1].old_capacity, changes[1].new_capacity), (5, 8));

    assert!(wait_for(Duration::from_secs(1), || pool.available() == 8).await);
    assert!(!pool.is_init_capacity());
}

#[tokio::test]
async fn concurrent_switches_are_serialized() {
    let recorder = Recorder::default();
    let (builder, _) = conn_pool(config("serialized", 4, 1, 16));
    let pool = builder
        .listener(recorder.listener())
        .build_warmup()
        .await
        .unwrap();

    let targets = [1, 16, 3, 9, 2, 12];
    let mut tasks = Vec::new();
    for target in targets {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move { pool.switch_to(target).await }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Each event starts where the previous one ended.
    let changes = capacity_changes(&recorder);
    for pair in changes.windows(2) {
        assert_eq!(pair[0].new_capacity, pair[1].old_capacity);
    }
    assert_eq!(
        changes.last().map(|c| c.new_capacity),
        Some(pool.current_capacity())
    );
}

#[tokio::test]
async fn dropped_pool_stops_its_control_loop() {
    let mut cfg = config("dropped", 2, 1, 4);
    cfg.autoscale = autoscale(20);
    let recorder = Recorder::default();
    let (builder, counters) = conn_pool(cfg);
    let pool = builder
        .listener(recorder.listener())
        .build_warmup()
        .await
        .unwrap();
    drop(pool);

    assert!(wait_for(Duration::from_secs(1), || counters.destroyed() == 2).await);
    let seen = recorder.events().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(recorder.events().len(), seen);
}
