//! # Domain Types
//!
//! Small enums and value types shared by the registry, cycle and settlement
//! modules.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────────┐   ┌─────────────────┐  │
//! │  │  PaymentMode    │   │ SettlementDetailType │   │  StockStatus    │  │
//! │  │  ─────────────  │   │  ──────────────────  │   │  ─────────────  │  │
//! │  │  Cash           │   │  Milk        credit  │   │  OutOfStock     │  │
//! │  │  BankTransfer   │   │  ProductSale debit   │   │  LowStock       │  │
//! │  │  Cheque         │   │  Advance     debit   │   │  MediumStock    │  │
//! │  │  Upi            │   └──────────────────────┘   │  GoodStock      │  │
//! │  └─────────────────┘                              └─────────────────┘  │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────────────────────────────────┐ │
//! │  │  CycleState     │   │  DateRange  start ≤ end, inclusive of both  │ │
//! │  │  Open ──► Settled│  └─────────────────────────────────────────────┘ │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::validation::ValidationResult;
use crate::STANDARD_CYCLE_DAYS;

// =============================================================================
// Payment Mode
// =============================================================================

/// How money changed hands (advances and settlement payouts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Cash,
    BankTransfer,
    Cheque,
    Upi,
}

impl PaymentMode {
    pub const ALL: [PaymentMode; 4] = [
        PaymentMode::Cash,
        PaymentMode::BankTransfer,
        PaymentMode::Cheque,
        PaymentMode::Upi,
    ];

    /// Label printed on receipts.
    pub const fn label(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "Cash",
            PaymentMode::BankTransfer => "BankTransfer",
            PaymentMode::Cheque => "Cheque",
            PaymentMode::Upi => "UPI",
        }
    }

    /// Non-cash payments must carry a reference number.
    pub const fn requires_reference(&self) -> bool {
        !matches!(self, PaymentMode::Cash)
    }
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Case-insensitive; `_`, `-` and spaces are ignored, so `"bank transfer"`,
/// `"BANK_TRANSFER"` and `"BankTransfer"` all parse.
impl FromStr for PaymentMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "cash" => Ok(PaymentMode::Cash),
            "banktransfer" => Ok(PaymentMode::BankTransfer),
            "cheque" => Ok(PaymentMode::Cheque),
            "upi" => Ok(PaymentMode::Upi),
            _ => Err(ValidationError::NotAllowed {
                field: "payment_mode".to_string(),
                allowed: PaymentMode::ALL.iter().map(|m| m.label().to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Settlement Detail Type
// =============================================================================

/// Kind of a settlement ledger line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SettlementDetailType {
    Milk,
    ProductSale,
    Advance,
}

impl SettlementDetailType {
    /// Milk is the only credit; everything else reduces the payout.
    #[inline]
    pub const fn is_credit(&self) -> bool {
        matches!(self, SettlementDetailType::Milk)
    }

    #[inline]
    pub const fn is_debit(&self) -> bool {
        !self.is_credit()
    }
}

// =============================================================================
// Stock Status
// =============================================================================

/// Derived stock band for a product.
///
/// ```text
///  0 ─────── reorder ─────── 1.5 × reorder ─────────►
///  OutOfStock │  LowStock   │  MediumStock  │ GoodStock
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    LowStock,
    MediumStock,
    GoodStock,
}

// =============================================================================
// Cycle State
// =============================================================================

/// Lifecycle of a milk cycle. `Settled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Open,
    Settled,
}

impl CycleState {
    pub(crate) const fn from_settled(is_settled: bool) -> Self {
        if is_settled {
            CycleState::Settled
        } else {
            CycleState::Open
        }
    }
}

// =============================================================================
// Date Range
// =============================================================================

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Creates a range.
    ///
    /// ## Errors
    /// `InvalidRange` if `end < start`.
    pub fn create(start: NaiveDate, end: NaiveDate) -> ValidationResult<Self> {
        if end < start {
            return Err(ValidationError::InvalidRange {
                field: "date range".to_string(),
                reason: format!("end date {} is before start date {}", end, start),
            });
        }
        Ok(DateRange { start, end })
    }

    /// The standard 10-day milk cycle: `start` through `start + 9`.
    pub fn ten_day_cycle(start: NaiveDate) -> ValidationResult<Self> {
        DateRange::with_days(start, STANDARD_CYCLE_DAYS)
    }

    /// A range covering `days` calendar days starting at `start`.
    pub fn with_days(start: NaiveDate, days: u32) -> ValidationResult<Self> {
        if days == 0 {
            return Err(ValidationError::must_be_positive("number of days"));
        }
        let end = start
            .checked_add_days(Days::new(u64::from(days - 1)))
            .ok_or_else(|| ValidationError::InvalidRange {
                field: "date range".to_string(),
                reason: "end date out of range".to_string(),
            })?;
        Ok(DateRange { start, end })
    }

    #[inline]
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    #[inline]
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days, counting both ends.
    pub fn duration_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn overlaps_with(&self, other: &DateRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    pub fn has_ended(&self, today: NaiveDate) -> bool {
        self.end < today
    }

    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.contains(today)
    }

    pub fn is_future(&self, today: NaiveDate) -> bool {
        self.start > today
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format("%d/%m/%Y"),
            self.end.format("%d/%m/%Y")
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_payment_mode_parse() {
        assert_eq!("cash".parse::<PaymentMode>().unwrap(), PaymentMode::Cash);
        assert_eq!("CASH".parse::<PaymentMode>().unwrap(), PaymentMode::Cash);
        assert_eq!("BankTransfer".parse::<PaymentMode>().unwrap(), PaymentMode::BankTransfer);
        assert_eq!("bank_transfer".parse::<PaymentMode>().unwrap(), PaymentMode::BankTransfer);
        assert_eq!("Upi".parse::<PaymentMode>().unwrap(), PaymentMode::Upi);
        assert!(matches!(
            "barter".parse::<PaymentMode>().unwrap_err(),
            ValidationError::NotAllowed { .. }
        ));
    }

    #[test]
    fn test_payment_mode_reference_rule() {
        assert!(!PaymentMode::Cash.requires_reference());
        assert!(PaymentMode::Cheque.requires_reference());
        assert_eq!(PaymentMode::Upi.to_string(), "UPI");
    }

    #[test]
    fn test_detail_type_credit_debit() {
        assert!(SettlementDetailType::Milk.is_credit());
        assert!(SettlementDetailType::ProductSale.is_debit());
        assert!(SettlementDetailType::Advance.is_debit());
    }

    #[test]
    fn test_date_range_rejects_reversed() {
        assert!(DateRange::create(date(2024, 1, 10), date(2024, 1, 9)).is_err());
        let single = DateRange::create(date(2024, 1, 10), date(2024, 1, 10)).unwrap();
        assert_eq!(single.duration_days(), 1);
    }

    #[test]
    fn test_ten_day_cycle() {
        let range = DateRange::ten_day_cycle(date(2024, 1, 1)).unwrap();
        assert_eq!(range.end(), date(2024, 1, 10));
        assert_eq!(range.duration_days(), 10);
        assert_eq!(range.to_string(), "01/01/2024 to 10/01/2024");
        assert!(DateRange::with_days(date(2024, 1, 1), 0).is_err());
    }

    #[test]
    fn test_date_range_queries() {
        let range = DateRange::ten_day_cycle(date(2024, 1, 11)).unwrap();
        let today = date(2024, 1, 15);
        assert!(range.contains(today));
        assert!(range.is_active(today));
        assert!(!range.has_ended(today));
        assert!(!range.is_future(today));
        assert!(range.has_ended(date(2024, 1, 21)));
        assert!(range.is_future(date(2024, 1, 10)));

        let next = DateRange::ten_day_cycle(date(2024, 1, 21)).unwrap();
        assert!(!range.overlaps_with(&next));
        let overlapping = DateRange::create(date(2024, 1, 20), date(2024, 1, 25)).unwrap();
        assert!(range.overlaps_with(&overlapping));
    }
}
