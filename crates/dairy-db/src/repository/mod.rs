//! # Repository Module
//!
//! SQL for each aggregate, isolated in one place.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Service (locks + transaction)          Repository struct (pool reads)  │
//! │       │                                       │                         │
//! │       │  cycle::find(&mut tx, id)             │  db.cycle_repo().get()  │
//! │       ▼                                       ▼                         │
//! │  module functions over &mut SqliteConnection                            │
//! │  ├── find / list                                                        │
//! │  ├── insert                                                             │
//! │  └── update_*                                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The module functions take a plain connection so the same SQL runs inside
//! a service transaction or on a pooled connection.
//!
//! ## Available Repositories
//!
//! - [`CustomerRepository`] - Customer registry
//! - [`ProductRepository`] - Products, stock and purchases
//! - [`CycleRepository`] - Milk cycles with their sales and advances
//! - [`SettlementRepository`] - Settlements with their ledger lines

pub mod customer;
pub mod cycle;
pub mod product;
pub mod settlement;

pub use customer::CustomerRepository;
pub use cycle::CycleRepository;
pub use product::ProductRepository;
pub use settlement::SettlementRepository;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use dairy_core::AuditStamp;
use rust_decimal::Decimal;
use sqlx::FromRow;

use crate::error::{DbError, DbResult};

/// The four audit columns every table carries.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct AuditColumns {
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

impl From<AuditColumns> for AuditStamp {
    fn from(row: AuditColumns) -> Self {
        AuditStamp {
            created_at: row.created_at,
            created_by: row.created_by,
            updated_at: row.updated_at,
            updated_by: row.updated_by,
        }
    }
}

/// Parses a decimal stored as TEXT.
pub(crate) fn parse_decimal(column: &str, text: &str) -> DbResult<Decimal> {
    Decimal::from_str(text).map_err(|_| DbError::CorruptData {
        column: column.to_string(),
        value: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("amount", "1234.50").unwrap(), dec!(1234.50));
        assert_eq!(parse_decimal("amount", "-100").unwrap(), dec!(-100));
        assert!(matches!(
            parse_decimal("amount", "12,00"),
            Err(DbError::CorruptData { .. })
        ));
    }
}
