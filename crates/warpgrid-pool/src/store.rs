//! Slot store: the pool's single shared mutable structure.
//!
//! ```text
//!              try_take_free           return_slot
//!   [ idle ] ---------------> running ------------> [ idle ]
//!      ^                         |
//!      |  Reservation::into_free | discard
//!   pending <-- try_reserve      v
//!                             (gone, capacity freed)
//! ```
//!
//! Every mutation happens under one lock. `available`, `running` and
//! `capacity` are mirrored into atomics after each mutation so status
//! reads never contend with the acquire path.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::futures::Notified;

/// One pooled resource.
#[derive(Debug)]
pub(crate) struct Slot<T> {
    pub(crate) id: u64,
    pub(crate) resource: T,
    pub(crate) created_at: Instant,
}

/// Point-in-time view of the store's accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StoreStatus {
    pub(crate) capacity: usize,
    pub(crate) available: usize,
    pub(crate) running: usize,
    /// Slots reserved for constructions in flight.
    pub(crate) pending: usize,
}

/// Result of a capacity change.
pub(crate) struct CapacityChange<T> {
    pub(crate) old: usize,
    pub(crate) new: usize,
    /// Free slots removed by a shrink; the caller tears them down.
    pub(crate) surplus: Vec<Slot<T>>,
    /// Slots to construct after a grow.
    pub(crate) gap: usize,
}

struct Inner<T> {
    idle: VecDeque<Slot<T>>,
    running: usize,
    pending: usize,
    capacity: usize,
    closed: bool,
}

impl<T> Inner<T> {
    fn total(&self) -> usize {
        self.idle.len() + self.running + self.pending
    }
}

pub(crate) struct SlotStore<T> {
    inner: Mutex<Inner<T>>,
    available: AtomicUsize,
    running: AtomicUsize,
    capacity: AtomicUsize,
    min: usize,
    max: usize,
    next_id: AtomicU64,
    /// Wakes acquirers when a slot or a capacity gap frees up.
    notify: Notify,
}

impl<T> SlotStore<T> {
    pub(crate) fn new(capacity: usize, min: usize, max: usize) -> Self {
        let capacity = capacity.clamp(min, max);
        Self {
            inner: Mutex::new(Inner {
                idle: VecDeque::with_capacity(capacity),
                running: 0,
                pending: 0,
                capacity,
                closed: false,
            }),
            available: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            capacity: AtomicUsize::new(capacity),
            min,
            max,
            next_id: AtomicU64::new(1),
            notify: Notify::new(),
        }
    }

    fn publish(&self, inner: &Inner<T>) {
        self.available.store(inner.idle.len(), Ordering::Release);
        self.running.store(inner.running, Ordering::Release);
        self.capacity.store(inner.capacity, Ordering::Release);
    }

    pub(crate) fn available(&self) -> usize {
        self.available.load(Ordering::Acquire)
    }

    pub(crate) fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    pub(crate) fn min(&self) -> usize {
        self.min
    }

    pub(crate) fn max(&self) -> usize {
        self.max
    }

    pub(crate) fn status(&self) -> StoreStatus {
        let inner = self.inner.lock();
        StoreStatus {
            capacity: inner.capacity,
            available: inner.idle.len(),
            running: inner.running,
            pending: inner.pending,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Future resolved by the next slot return, freed capacity or close.
    ///
    /// Enable it before inspecting the store to avoid missed wake-ups.
    pub(crate) fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    /// Take a free slot and mark it running.
    pub(crate) fn try_take_free(&self) -> Option<Slot<T>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        let slot = inner.idle.pop_front()?;
        inner.running += 1;
        self.publish(&inner);
        Some(slot)
    }

    /// Reserve room for one construction if the pool has a capacity gap.
    pub(crate) fn try_reserve(self: &Arc<Self>) -> Option<Reservation<T>> {
        let mut inner = self.inner.lock();
        if inner.closed || inner.total() >= inner.capacity {
            return None;
        }
        inner.pending += 1;
        Some(Reservation {
            store: Arc::clone(self),
            armed: true,
        })
    }

    /// Return a running slot to the free list.
    ///
    /// Returns the slot back when the pool is over capacity or closed;
    /// the caller tears it down.
    pub(crate) fn return_slot(&self, slot: Slot<T>) -> Option<Slot<T>> {
        let mut inner = self.inner.lock();
        inner.running = inner.running.saturating_sub(1);
        let surplus = if inner.closed || inner.total() >= inner.capacity {
            Some(slot)
        } else {
            inner.idle.push_back(slot);
            None
        };
        self.publish(&inner);
        drop(inner);
        self.notify.notify_one();
        surplus
    }

    /// Forget a running slot that is being torn down.
    ///
    /// Returns how many slots are missing to reach the minimum.
    pub(crate) fn discard(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.running = inner.running.saturating_sub(1);
        let deficit = if inner.closed {
            0
        } else {
            self.min.min(inner.capacity).saturating_sub(inner.total())
        };
        self.publish(&inner);
        drop(inner);
        self.notify.notify_one();
        deficit
    }

    /// Move to `requested`, clamped to `[min, max]`.
    pub(crate) fn change_capacity(&self, requested: usize) -> CapacityChange<T> {
        let mut inner = self.inner.lock();
        let old = inner.capacity;
        let new = requested.clamp(self.min, self.max);
        inner.capacity = new;

        let mut surplus = Vec::new();
        while inner.total() > new {
            match inner.idle.pop_back() {
                Some(slot) => surplus.push(slot),
                None => break,
            }
        }
        let gap = if inner.closed {
            0
        } else {
            new.saturating_sub(inner.total())
        };
        self.publish(&inner);
        drop(inner);
        if new > old {
            self.notify.notify_waiters();
        }

        CapacityChange {
            old,
            new,
            surplus,
            gap,
        }
    }

    /// Stop handing out slots and drain the free list.
    pub(crate) fn close(&self) -> Vec<Slot<T>> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let idle: Vec<_> = inner.idle.drain(..).collect();
        self.publish(&inner);
        drop(inner);
        self.notify.notify_waiters();
        idle
    }

    fn next_slot(&self, resource: T) -> Slot<T> {
        Slot {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            resource,
            created_at: Instant::now(),
        }
    }
}

/// Capacity held for one construction in flight.
///
/// Dropping an unused reservation gives the room back.
pub(crate) struct Reservation<T> {
    store: Arc<SlotStore<T>>,
    armed: bool,
}

impl<T> Reservation<T> {
    /// Hand the new resource straight to an acquirer.
    pub(crate) fn into_running(mut self, resource: T) -> Slot<T> {
        self.armed = false;
        let store = Arc::clone(&self.store);
        let mut inner = store.inner.lock();
        inner.pending = inner.pending.saturating_sub(1);
        inner.running += 1;
        store.publish(&inner);
        drop(inner);
        store.next_slot(resource)
    }

    /// Park the new resource on the free list.
    ///
    /// Returns the slot back when it no longer fits; the caller tears it
    /// down.
    pub(crate) fn into_free(mut self, resource: T) -> Option<Slot<T>> {
        self.armed = false;
        let store = Arc::clone(&self.store);
        let slot = store.next_slot(resource);
        let mut inner = store.inner.lock();
        inner.pending = inner.pending.saturating_sub(1);
        let surplus = if inner.closed || inner.total() >= inner.capacity {
            Some(slot)
        } else {
            inner.idle.push_back(slot);
            None
        };
        store.publish(&inner);
        drop(inner);
        store.notify.notify_one();
        surplus
    }
}

impl<T> Drop for Reservation<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.store.inner.lock();
        inner.pending = inner.pending.saturating_sub(1);
        self.store.publish(&inner);
        drop(inner);
        self.store.notify.notify_one();
    }
}
