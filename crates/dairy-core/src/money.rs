//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Decimal Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  With f64:                                                              │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Milk is paid per litre at fractional rates (e.g. 42.75/L), feed is    │
//! │  sold by fractional bags, so amounts are not whole cents at entry.     │
//! │                                                                         │
//! │  OUR SOLUTION: base-10 Decimal (rust_decimal)                          │
//! │    1000.00 - 200.00 - 100.00 = 700.00 exactly                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Constructors
//! - [`Money::from_amount`] rejects negatives. Line items, prices, milk
//!   totals, advances and every settlement component use it.
//! - [`Money::from_balance`] allows negatives. Only the settlement's final
//!   payable is built this way.
//!
//! ## Usage
//! ```rust
//! use dairy_core::money::{Currency, Money};
//! use rust_decimal::Decimal;
//!
//! let milk = Money::from_amount(Decimal::new(100000, 2), Currency::Inr).unwrap();
//! let feed = Money::from_amount(Decimal::new(20000, 2), Currency::Inr).unwrap();
//! let net = milk.try_sub(feed).unwrap();
//! assert_eq!(net.amount(), Decimal::new(80000, 2));
//!
//! assert!(Money::from_amount(Decimal::NEGATIVE_ONE, Currency::Inr).is_err());
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::validation::ValidationResult;

// =============================================================================
// Currency
// =============================================================================

/// Currency tag carried by every [`Money`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Indian Rupee.
    #[default]
    Inr,
    /// US Dollar.
    Usd,
}

impl Currency {
    /// ISO 4217 code.
    pub const fn code(&self) -> &'static str {
        match self {
            Currency::Inr => "INR",
            Currency::Usd => "USD",
        }
    }

    /// Display symbol.
    pub const fn symbol(&self) -> &'static str {
        match self {
            Currency::Inr => "₹",
            Currency::Usd => "$",
        }
    }

    /// ASCII prefix for thermal receipts.
    pub const fn receipt_prefix(&self) -> &'static str {
        match self {
            Currency::Inr => "Rs.",
            Currency::Usd => "$",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INR" => Ok(Currency::Inr),
            "USD" => Ok(Currency::Usd),
            _ => Err(ValidationError::NotAllowed {
                field: "currency".to_string(),
                allowed: vec!["INR".to_string(), "USD".to_string()],
            }),
        }
    }
}

// =============================================================================
// Money Type
// =============================================================================

/// A decimal amount tagged with its currency.
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Product.unit_price ──► ProductSale.total_amount ──┐                    │
/// │                                                    ├─► Settlement       │
/// │  AdvancePayment.amount ────────────────────────────┤   final_payable    │
/// │                                                    │   (from_balance)   │
/// │  MilkCycle.total_milk_amount ──────────────────────┘                    │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Creates a non-negative amount.
    ///
    /// ## Errors
    /// `ValidationError::Negative` if `amount < 0`.
    pub fn from_amount(amount: Decimal, currency: Currency) -> ValidationResult<Self> {
        if amount < Decimal::ZERO {
            return Err(ValidationError::negative("amount"));
        }
        Ok(Money { amount, currency })
    }

    /// Creates a signed balance. Negative means the customer owes money.
    #[inline]
    pub const fn from_balance(amount: Decimal, currency: Currency) -> Self {
        Money { amount, currency }
    }

    /// Zero in the given currency.
    #[inline]
    pub const fn zero(currency: Currency) -> Self {
        Money {
            amount: Decimal::ZERO,
            currency,
        }
    }

    #[inline]
    pub const fn amount(&self) -> Decimal {
        self.amount
    }

    #[inline]
    pub const fn currency(&self) -> Currency {
        self.currency
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// Absolute value, same currency.
    pub fn abs(&self) -> Money {
        Money::from_balance(self.amount.abs(), self.currency)
    }

    /// Adds two amounts of the same currency.
    pub fn try_add(self, other: Money) -> ValidationResult<Money> {
        self.ensure_same_currency(&other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| ValidationError::out_of_range("amount"))?;
        Ok(Money::from_balance(amount, self.currency))
    }

    /// Subtracts `other`. The result may be negative (a balance).
    pub fn try_sub(self, other: Money) -> ValidationResult<Money> {
        self.ensure_same_currency(&other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or_else(|| ValidationError::out_of_range("amount"))?;
        Ok(Money::from_balance(amount, self.currency))
    }

    /// Scales by a decimal factor (e.g. unit price × quantity).
    ///
    /// ## Errors
    /// `ValidationError::OutOfRange` if the product overflows.
    pub fn multiply(self, factor: Decimal) -> ValidationResult<Money> {
        let amount = self
            .amount
            .checked_mul(factor)
            .ok_or_else(|| ValidationError::out_of_range("amount"))?;
        Ok(Money::from_balance(amount, self.currency))
    }

    /// Sums an iterator of amounts. An empty iterator yields zero.
    pub fn sum<I>(items: I, currency: Currency) -> ValidationResult<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        items
            .into_iter()
            .try_fold(Money::zero(currency), |acc, m| acc.try_add(m))
    }

    /// Formats with an explicit `+` for non-negative values.
    pub fn to_string_with_sign(&self) -> String {
        if self.is_negative() {
            self.to_string()
        } else {
            format!("+{}", self)
        }
    }

    fn ensure_same_currency(&self, other: &Money) -> ValidationResult<()> {
        if self.currency != other.currency {
            return Err(ValidationError::CurrencyMismatch {
                left: self.currency.code().to_string(),
                right: other.currency.code().to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        write!(
            f,
            "{}{}{}",
            sign,
            self.currency.symbol(),
            format_grouped(self.amount.abs(), 2)
        )
    }
}

// =============================================================================
// Number Formatting
// =============================================================================

/// Formats a decimal with thousands separators and a fixed number of places.
///
/// Midpoints round away from zero: `1234.5` at 0 places is `"1,235"`.
///
/// ```rust
/// use dairy_core::money::format_grouped;
/// use rust_decimal::Decimal;
///
/// assert_eq!(format_grouped(Decimal::new(123456789, 2), 2), "1,234,567.89");
/// assert_eq!(format_grouped(Decimal::new(12345, 1), 0), "1,235");
/// ```
pub fn format_grouped(value: Decimal, decimals: u32) -> String {
    let rounded = value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.*}", decimals as usize, rounded.abs());

    let (int_part, frac_part) = match text.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (text.as_str(), None),
    };

    let mut grouped = String::with_capacity(text.len() + int_part.len() / 3 + 1);
    if rounded < Decimal::ZERO {
        grouped.push('-');
    }
    let digits = int_part.len();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (digits - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac_part) = frac_part {
        grouped.push('.');
        grouped.push_str(frac_part);
    }
    grouped
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn inr(amount: Decimal) -> Money {
        Money::from_amount(amount, Currency::Inr).unwrap()
    }

    #[test]
    fn test_from_amount_rejects_negative() {
        let err = Money::from_amount(dec!(-1), Currency::Inr).unwrap_err();
        assert!(matches!(err, ValidationError::Negative { .. }));

        assert!(Money::from_amount(dec!(0), Currency::Inr).is_ok());
        assert!(Money::from_amount(dec!(0.01), Currency::Inr).is_ok());
    }

    #[test]
    fn test_from_balance_allows_negative() {
        let owed = Money::from_balance(dec!(-100), Currency::Inr);
        assert!(owed.is_negative());
        assert_eq!(owed.abs().amount(), dec!(100));
    }

    #[test]
    fn test_subtraction_can_go_negative() {
        let net = inr(dec!(500)).try_sub(inr(dec!(600))).unwrap();
        assert_eq!(net.amount(), dec!(-100));
    }

    #[test]
    fn test_currency_mismatch() {
        let usd = Money::from_amount(dec!(1), Currency::Usd).unwrap();
        let err = inr(dec!(1)).try_add(usd).unwrap_err();
        assert!(matches!(err, ValidationError::CurrencyMismatch { .. }));
    }

    #[test]
    fn test_sum_and_multiply() {
        let total = Money::sum(vec![inr(dec!(10.50)), inr(dec!(4.25))], Currency::Inr).unwrap();
        assert_eq!(total.amount(), dec!(14.75));

        let empty = Money::sum(Vec::new(), Currency::Inr).unwrap();
        assert!(empty.is_zero());

        assert_eq!(inr(dec!(42.75)).multiply(dec!(2)).unwrap().amount(), dec!(85.50));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let huge = inr(Decimal::MAX);
        assert!(matches!(
            huge.try_add(inr(dec!(1))).unwrap_err(),
            ValidationError::OutOfRange { .. }
        ));
        assert!(matches!(
            huge.multiply(dec!(2)).unwrap_err(),
            ValidationError::OutOfRange { .. }
        ));
        assert!(Money::sum(vec![huge, huge], Currency::Inr).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(inr(dec!(1234.5)).to_string(), "₹1,234.50");
        assert_eq!(Money::from_balance(dec!(-100), Currency::Inr).to_string(), "-₹100.00");
        assert_eq!(inr(dec!(5)).to_string_with_sign(), "+₹5.00");
    }

    #[test]
    fn test_format_grouped() {
        assert_eq!(format_grouped(dec!(0), 0), "0");
        assert_eq!(format_grouped(dec!(999), 0), "999");
        assert_eq!(format_grouped(dec!(1000), 0), "1,000");
        assert_eq!(format_grouped(dec!(2.5), 0), "3");
        assert_eq!(format_grouped(dec!(-1234.567), 2), "-1,234.57");
        assert_eq!(format_grouped(dec!(-0.001), 2), "0.00");
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!("inr".parse::<Currency>().unwrap(), Currency::Inr);
        assert_eq!(" USD ".parse::<Currency>().unwrap(), Currency::Usd);
        assert!("EUR".parse::<Currency>().is_err());
    }
}
