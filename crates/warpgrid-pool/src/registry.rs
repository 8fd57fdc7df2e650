//! Alias-keyed collection of pools.
//!
//! Aliases are unique: registering a second pool under a taken alias is a
//! configuration error.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::info;

use crate::error::{PoolError, PoolResult};
use crate::pool::Pool;

pub struct PoolRegistry<T: Send + 'static> {
    pools: RwLock<BTreeMap<String, Pool<T>>>,
}

impl<T: Send + 'static> Default for PoolRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> PoolRegistry<T> {
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add a pool under its alias.
    pub fn register(&self, pool: Pool<T>) -> PoolResult<()> {
        let mut pools = self.pools.write();
        let alias = pool.alias().to_string();
        if pools.contains_key(&alias) {
            return Err(PoolError::config(format!(
                "pool alias '{alias}' is already registered"
            )));
        }
        pools.insert(alias, pool);
        Ok(())
    }

    pub fn get(&self, alias: &str) -> Option<Pool<T>> {
        self.pools.read().get(alias).cloned()
    }

    /// Remove a pool without shutting it down.
    pub fn remove(&self, alias: &str) -> Option<Pool<T>> {
        self.pools.write().remove(alias)
    }

    /// Registered aliases in sorted order.
    pub fn aliases(&self) -> Vec<String> {
        self.pools.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.read().is_empty()
    }

    /// Shut every pool down and empty the registry.
    pub async fn shutdown_all(&self) {
        let pools: Vec<_> = std::mem::take(&mut *self.pools.write())
            .into_values()
            .collect();
        let count = pools.len();
        for pool in pools {
            pool.shutdown().await;
        }
        info!(count, "all pools shut down");
    }
}
