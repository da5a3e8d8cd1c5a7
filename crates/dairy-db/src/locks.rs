//! # Per-Aggregate Locks
//!
//! Serialises writers of the same cycle or product inside one process.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  settle(cycle A) ──► lock "cycle:A" ──► tx ──► commit ──► unlock        │
//! │  record_sale(A)  ──► lock "cycle:A" (waits) ──────────────► runs        │
//! │  settle(cycle B) ──► lock "cycle:B" (independent of A)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lock order is always cycle before product. Writers of different
//! aggregates do not wait on each other here, but SQLite still admits one
//! write transaction at a time (see `transaction`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// A held aggregate lock. Dropping it releases the aggregate.
pub type AggregateGuard = OwnedMutexGuard<()>;

/// Registry of async mutexes keyed by aggregate.
#[derive(Debug, Default)]
pub struct AggregateLocks {
    entries: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl AggregateLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cycle(&self, cycle_id: &str) -> AggregateGuard {
        self.lock(format!("cycle:{cycle_id}")).await
    }

    pub async fn product(&self, product_id: &str) -> AggregateGuard {
        self.lock(format!("product:{product_id}")).await
    }

    pub async fn settlement(&self, settlement_id: &str) -> AggregateGuard {
        self.lock(format!("settlement:{settlement_id}")).await
    }

    /// Waits for and returns the lock for `key`.
    pub async fn lock(&self, key: String) -> AggregateGuard {
        let mutex = {
            let mut entries = self
                .entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            // drop entries nobody holds or waits on
            entries.retain(|_, m| Arc::strong_count(m) > 1);
            Arc::clone(entries.entry(key.clone()).or_default())
        };
        trace!(key = %key, "Acquiring aggregate lock");
        mutex.lock_owned().await
    }

    /// Number of keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.entries
            .lock()
            .map(|e| e.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }
}
