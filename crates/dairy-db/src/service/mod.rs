//! # Service Module
//!
//! Workflows that combine the pure rules in `dairy-core` with storage.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  service call (actor)                                                   │
//! │       │                                                                 │
//! │       ├── now = clock.now()                                             │
//! │       ├── lock cycle:<id> ──► lock product:<id>   (always this order)   │
//! │       ▼                                                                 │
//! │  run_in_transaction                                                     │
//! │       ├── reload aggregate(s) inside the transaction                    │
//! │       ├── apply dairy-core rule (may fail: nothing written)             │
//! │       ├── write rows                                                    │
//! │       └── COMMIT  /  ROLLBACK + original error                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Single-row registry edits (customer details, product details) skip the
//! locks and the transaction.

pub mod customer;
pub mod cycle;
pub mod product;
pub mod settlement;

pub use customer::CustomerService;
pub use cycle::CycleService;
pub use product::ProductService;
pub use settlement::SettlementService;

use crate::error::{DbError, DbResult};

/// Turns a missing row into `NotFound`.
pub(crate) fn required<T>(entity: &str, id: &str, found: Option<T>) -> DbResult<T> {
    found.ok_or_else(|| DbError::not_found(entity, id))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};
    use dairy_core::{Actor, FixedClock};

    use tempfile::TempDir;

    use crate::{Database, DbConfig};

    pub(crate) fn noon(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
    }

    pub(crate) fn actor() -> Actor {
        Actor::new("admin").unwrap()
    }

    /// Fresh in-memory database pinned to 2024-01-`day` 12:00 UTC.
    pub(crate) async fn test_db(day: u32) -> Database {
        Database::new(DbConfig::in_memory())
            .await
            .unwrap()
            .with_clock(Arc::new(FixedClock::new(noon(day))))
    }

    /// File-backed database with a real multi-connection pool. Keep `dir`
    /// alive for the duration of the test.
    pub(crate) async fn file_db(dir: &TempDir, day: u32) -> Database {
        Database::new(DbConfig::new(dir.path().join("dairy.db")))
            .await
            .unwrap()
            .with_clock(Arc::new(FixedClock::new(noon(day))))
    }

    #[test]
    fn test_required() {
        assert_eq!(super::required("Product", "p-1", Some(3)).unwrap(), 3);
        let err = super::required::<i32>("Product", "p-1", None).unwrap_err();
        assert_eq!(err.to_string(), "Product not found: p-1");
    }
}
