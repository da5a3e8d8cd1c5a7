//! # dairy-core: Pure Settlement Logic for Dairy Ledger
//!
//! A dairy collects milk from its farmer-customers over short cycles (ten
//! days, typically), sells them feed and supplements on credit, and hands out
//! cash advances. At the end of each cycle everything is netted into one
//! settlement. This crate holds those rules as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Dairy Ledger Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ dairy-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   money   │  │  product  │  │   cycle   │  │settlement │  │   │
//! │  │   │  Money    │  │  Product  │  │ MilkCycle │  │ Settlement│  │   │
//! │  │   │ Quantity  │  │  stock    │  │ Sale/Adv. │  │  receipt  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK READS • PURE FUNCTIONS        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    dairy-db (Persistence Layer)                 │   │
//! │  │     SQLite, migrations, repositories, transactional services    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] / [`quantity`] - Decimal value types with currency and unit tags
//! - [`types`] - Enums and [`DateRange`]
//! - [`customer`] / [`product`] - Registry records
//! - [`stock`] - Purchases into the stock ledger
//! - [`cycle`] - The MilkCycle aggregate with its sales and advances
//! - [`settlement`] - Settlement calculator
//! - [`receipt`] - Fixed-width receipt text
//! - [`audit`] / [`clock`] - Acting identity, audit stamps, injectable time
//! - [`error`] / [`validation`] - Error taxonomy and input checks
//!
//! ## Design Principles
//!
//! 1. **Explicit time and identity**: every mutator takes `actor` and `now`
//! 2. **No I/O**: the caller persists what these functions return
//! 3. **Decimal money**: `rust_decimal`, never floats
//! 4. **Typed errors**: no strings, no panics
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::{NaiveDate, TimeZone, Utc};
//! use dairy_core::{settlement, Actor, Currency, MilkCycle};
//! use rust_decimal::Decimal;
//!
//! let actor = Actor::new("admin").unwrap();
//! let now = Utc.with_ymd_and_hms(2024, 1, 11, 9, 0, 0).unwrap();
//! let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//!
//! let mut cycle = MilkCycle::ten_day("cust-1", start, Currency::Inr, &actor, now).unwrap();
//! cycle.set_milk_amount(Decimal::new(1000, 0), &actor, now).unwrap();
//!
//! let settled = settlement::settle(&mut cycle, "Cash", None, &actor, now).unwrap();
//! assert_eq!(settled.final_payable().amount(), Decimal::new(1000, 0));
//! assert!(cycle.is_settled());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod clock;
pub mod customer;
pub mod cycle;
pub mod error;
pub mod money;
pub mod product;
pub mod quantity;
pub mod receipt;
pub mod settlement;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use audit::{Actor, AuditStamp};
pub use clock::{Clock, FixedClock, SystemClock};
pub use customer::{Customer, CustomerDetails};
pub use cycle::{AdvanceInput, AdvancePayment, MilkCycle, MilkCycleHeader, ProductSale, SaleInput};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Currency, Money};
pub use product::{Product, ProductDetails};
pub use quantity::Quantity;
pub use receipt::{format_settlement_receipt, ReceiptHeader};
pub use settlement::{Settlement, SettlementDetail, SettlementHeader, SettlementPreview};
pub use stock::{ProductPurchase, PurchaseInput};
pub use types::*;

use rust_decimal::Decimal;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Currency used when none is configured.
pub const DEFAULT_CURRENCY: Currency = Currency::Inr;

/// Maximum length of customer and product codes.
pub const MAX_CODE_LENGTH: usize = 20;

/// Maximum length of customer and product names.
pub const MAX_NAME_LENGTH: usize = 200;

/// Length of a standard milk cycle, both ends inclusive.
pub const STANDARD_CYCLE_DAYS: u32 = 10;

/// Stock up to `reorder_level × 1.5` is reported as MediumStock.
///
/// ## Business Reason
/// Inherited stocking policy. Change only with product input.
pub const MEDIUM_STOCK_FACTOR: Decimal = Decimal::from_parts(15, 0, 0, false, 1);

/// Largest allowed gap between `final_payable` and its components (0.01).
pub const SETTLEMENT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Column width of a 58mm thermal printer.
pub const RECEIPT_WIDTH: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decimal_constants() {
        assert_eq!(MEDIUM_STOCK_FACTOR, dec!(1.5));
        assert_eq!(SETTLEMENT_TOLERANCE, dec!(0.01));
    }
}
