//! Acquire result wrapper.
//!
//! A `Lease` is returned by every acquire, successful or not. A successful
//! lease owns the resource until it is released, either explicitly with
//! [`Lease::release`] or implicitly on drop. Release runs once; later calls
//! are no-ops.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{AcquireFailure, PoolError, PoolResult};
use crate::pool::Shared;
use crate::store::Slot;

pub struct Lease<T: Send + 'static> {
    alias: String,
    available: usize,
    epoch: u64,
    elapsed: Duration,
    succeeded: bool,
    error: Option<PoolError>,
    slot: Option<Slot<T>>,
    pool: Arc<Shared<T>>,
    invalidated: bool,
    released: bool,
}

impl<T: Send + 'static> Lease<T> {
    pub(crate) fn acquired(
        pool: Arc<Shared<T>>,
        slot: Slot<T>,
        epoch: u64,
        elapsed: Duration,
    ) -> Self {
        Self {
            alias: pool.alias().to_string(),
            available: pool.store().available(),
            epoch,
            elapsed,
            succeeded: true,
            error: None,
            slot: Some(slot),
            pool,
            invalidated: false,
            released: false,
        }
    }

    pub(crate) fn failed(pool: Arc<Shared<T>>, error: PoolError, epoch: u64, elapsed: Duration) -> Self {
        Self {
            alias: pool.alias().to_string(),
            available: pool.store().available(),
            epoch,
            elapsed,
            succeeded: false,
            error: Some(error),
            slot: None,
            pool,
            invalidated: false,
            released: true,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Free slots in the pool when the acquire finished.
    pub fn available(&self) -> usize {
        self.available
    }

    /// Sequence number of the acquire within its pool.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Time spent acquiring.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn error(&self) -> Option<&PoolError> {
        self.error.as_ref()
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// The leased resource. `None` for a failed or released lease.
    pub fn current(&self) -> Option<&T> {
        self.slot.as_ref().map(|slot| &slot.resource)
    }

    pub fn current_mut(&mut self) -> Option<&mut T> {
        self.slot.as_mut().map(|slot| &mut slot.resource)
    }

    /// Identifier of the pooled slot, stable across reuse.
    pub fn slot_id(&self) -> Option<u64> {
        self.slot.as_ref().map(|slot| slot.id)
    }

    /// How long ago the leased resource was constructed.
    pub fn resource_age(&self) -> Option<Duration> {
        self.slot.as_ref().map(|slot| slot.created_at.elapsed())
    }

    /// Mark the resource unusable. It is torn down on release instead of
    /// going back to the pool.
    pub fn invalidate(&mut self, error: Option<PoolError>) {
        if self.released {
            return;
        }
        self.invalidated = true;
        if let Some(error) = error {
            self.error = Some(error);
        }
    }

    /// Give the resource back to the pool, or discard it when the lease
    /// was invalidated or carries an error.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let Some(slot) = self.slot.take() else {
            return;
        };
        let discard = self.invalidated || self.error.is_some();
        debug!(
            alias = %self.alias,
            slot = slot.id,
            epoch = self.epoch,
            discard,
            "lease released"
        );
        self.pool.release_slot(slot, discard);
    }

    /// `Ok(self)` on success, the acquire error otherwise.
    pub fn into_result(mut self) -> PoolResult<Self> {
        if self.succeeded {
            return Ok(self);
        }
        Err(self.error.take().unwrap_or_else(|| PoolError::Acquire {
            alias: self.alias.clone(),
            reason: AcquireFailure::TimedOut,
            elapsed: self.elapsed,
        }))
    }
}

impl<T: Send + 'static> Drop for Lease<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: Send + 'static> fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("alias", &self.alias)
            .field("epoch", &self.epoch)
            .field("succeeded", &self.succeeded)
            .field("error", &self.error)
            .field("slot", &self.slot_id())
            .field("invalidated", &self.invalidated)
            .field("released", &self.released)
            .finish()
    }
}
