//! # Quantity Module
//!
//! A non-negative decimal amount of some unit of measure (KG, BAG, LITRE).
//!
//! Units are normalised to upper case on construction, so `"kg"` and `"KG"`
//! compare equal. Arithmetic and comparison between different units fail with
//! [`ValidationError::UnitMismatch`] rather than silently converting.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::money::format_grouped;
use crate::validation::ValidationResult;

/// A quantity with a unit of measure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quantity {
    value: Decimal,
    unit: String,
}

impl Quantity {
    /// Creates a quantity.
    ///
    /// ## Errors
    /// - `Negative` if `value < 0`
    /// - `Required` if `unit` is blank
    pub fn create(value: Decimal, unit: &str) -> ValidationResult<Self> {
        if value < Decimal::ZERO {
            return Err(ValidationError::negative("quantity"));
        }
        Ok(Quantity {
            value,
            unit: normalize_unit(unit)?,
        })
    }

    /// Creates a strictly positive quantity (sales, purchases, stock moves).
    pub fn positive(value: Decimal, unit: &str) -> ValidationResult<Self> {
        if value <= Decimal::ZERO {
            return Err(ValidationError::must_be_positive("quantity"));
        }
        Quantity::create(value, unit)
    }

    /// Unchecked; callers hold a non-negative value and a normalised unit.
    pub(crate) fn from_parts(value: Decimal, unit: &str) -> Self {
        Quantity {
            value,
            unit: unit.to_string(),
        }
    }

    /// Zero of the given unit.
    pub fn zero(unit: &str) -> ValidationResult<Self> {
        Quantity::create(Decimal::ZERO, unit)
    }

    #[inline]
    pub fn value(&self) -> Decimal {
        self.value
    }

    #[inline]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.value > Decimal::ZERO
    }

    pub fn try_add(&self, other: &Quantity) -> ValidationResult<Quantity> {
        self.ensure_same_unit(other)?;
        let value = self
            .value
            .checked_add(other.value)
            .ok_or_else(|| ValidationError::out_of_range("quantity"))?;
        Ok(Quantity {
            value,
            unit: self.unit.clone(),
        })
    }

    /// Subtracts `other`.
    ///
    /// ## Errors
    /// `Negative` if the result would drop below zero.
    pub fn try_sub(&self, other: &Quantity) -> ValidationResult<Quantity> {
        self.ensure_same_unit(other)?;
        let value = self.value - other.value;
        if value < Decimal::ZERO {
            return Err(ValidationError::negative("resulting quantity"));
        }
        Ok(Quantity {
            value,
            unit: self.unit.clone(),
        })
    }

    pub fn multiply(&self, factor: Decimal) -> ValidationResult<Quantity> {
        if factor < Decimal::ZERO {
            return Err(ValidationError::negative("multiplier"));
        }
        let value = self
            .value
            .checked_mul(factor)
            .ok_or_else(|| ValidationError::out_of_range("quantity"))?;
        Ok(Quantity {
            value,
            unit: self.unit.clone(),
        })
    }

    /// `true` if this quantity covers `required`.
    pub fn is_sufficient_for(&self, required: &Quantity) -> ValidationResult<bool> {
        self.ensure_same_unit(required)?;
        Ok(self.value >= required.value)
    }

    fn ensure_same_unit(&self, other: &Quantity) -> ValidationResult<()> {
        if self.unit != other.unit {
            return Err(ValidationError::UnitMismatch {
                left: self.unit.clone(),
                right: other.unit.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", format_grouped(self.value, 2), self.unit)
    }
}

/// Trims and upper-cases a unit of measure.
pub fn normalize_unit(unit: &str) -> ValidationResult<String> {
    let unit = unit.trim();
    if unit.is_empty() {
        return Err(ValidationError::required("unit"));
    }
    Ok(unit.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_unit_is_normalized() {
        let q = Quantity::create(dec!(2.5), " kg ").unwrap();
        assert_eq!(q.unit(), "KG");
        assert_eq!(q, Quantity::create(dec!(2.5), "KG").unwrap());
    }

    #[test]
    fn test_create_rejects_bad_input() {
        assert!(matches!(
            Quantity::create(dec!(-0.01), "KG").unwrap_err(),
            ValidationError::Negative { .. }
        ));
        assert!(matches!(
            Quantity::create(dec!(1), "  ").unwrap_err(),
            ValidationError::Required { .. }
        ));
        assert!(matches!(
            Quantity::positive(dec!(0), "KG").unwrap_err(),
            ValidationError::MustBePositive { .. }
        ));
    }

    #[test]
    fn test_subtraction_cannot_go_negative() {
        let stock = Quantity::create(dec!(5), "BAG").unwrap();
        let five = Quantity::create(dec!(5), "BAG").unwrap();
        assert!(stock.try_sub(&five).unwrap().is_zero());

        let more = Quantity::create(dec!(5.01), "BAG").unwrap();
        assert!(stock.try_sub(&more).is_err());
    }

    #[test]
    fn test_unit_mismatch() {
        let kg = Quantity::create(dec!(1), "KG").unwrap();
        let bag = Quantity::create(dec!(1), "BAG").unwrap();
        assert!(matches!(
            kg.try_add(&bag).unwrap_err(),
            ValidationError::UnitMismatch { .. }
        ));
        assert!(kg.is_sufficient_for(&bag).is_err());
    }

    #[test]
    fn test_display() {
        let q = Quantity::create(dec!(1500), "kg").unwrap();
        assert_eq!(q.to_string(), "1,500.00 KG");
    }
}
