//! # Product Registry & Stock Ledger
//!
//! Products sold to customers against their milk earnings (feed, mineral
//! mixture, supplements).
//!
//! ## Stock Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ProductPurchase ──► increase_stock(qty) ──┐                           │
//! │                                             ▼                           │
//! │                                    Product.current_stock (≥ 0)          │
//! │                                             │                           │
//! │   ProductSale ◄──── decrease_stock(qty) ◄───┘                           │
//! │      (InsufficientStock when stock < qty; stock untouched)              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock is never set directly. The two ledger operations are the only
//! writers, and the persistence layer must store the new stock together
//! with the purchase or sale row that caused it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::audit::{Actor, AuditStamp};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Currency, Money};
use crate::quantity::{normalize_unit, Quantity};
use crate::types::StockStatus;
use crate::validation::{
    optional_text, validate_code, validate_name, validate_non_negative, ValidationResult,
};
use crate::MEDIUM_STOCK_FACTOR;

const MAX_DESCRIPTION_LENGTH: usize = 500;

/// Editable product attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub description: Option<String>,
    pub unit_price: Decimal,
    pub reorder_level: Decimal,
}

impl ProductDetails {
    fn validated(self) -> ValidationResult<Self> {
        Ok(ProductDetails {
            name: validate_name("product_name", &self.name)?,
            description: optional_text(
                "description",
                self.description.as_deref(),
                MAX_DESCRIPTION_LENGTH,
            )?,
            unit_price: validate_non_negative("unit_price", self.unit_price)?,
            reorder_level: validate_non_negative("reorder_level", self.reorder_level)?,
        })
    }
}

/// A stocked product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: String,
    code: String,
    unit: String,
    currency: Currency,
    details: ProductDetails,
    current_stock: Decimal,
    is_active: bool,
    audit: AuditStamp,
}

impl Product {
    /// Registers a product with zero stock.
    pub fn create(
        code: &str,
        unit: &str,
        currency: Currency,
        details: ProductDetails,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> ValidationResult<Self> {
        Ok(Product {
            id: Uuid::new_v4().to_string(),
            code: validate_code("product_code", code)?,
            unit: normalize_unit(unit)?,
            currency,
            details: details.validated()?,
            current_stock: Decimal::ZERO,
            is_active: true,
            audit: AuditStamp::created(actor, now),
        })
    }

    /// Rebuilds a product loaded from storage.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: String,
        code: String,
        unit: String,
        currency: Currency,
        details: ProductDetails,
        current_stock: Decimal,
        is_active: bool,
        audit: AuditStamp,
    ) -> Self {
        Product {
            id,
            code,
            unit,
            currency,
            details,
            current_stock,
            is_active,
            audit,
        }
    }

    /// Replaces name, price, reorder level and description.
    pub fn update(
        &mut self,
        details: ProductDetails,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> ValidationResult<()> {
        self.details = details.validated()?;
        self.audit.touch(actor, now);
        Ok(())
    }

    pub fn deactivate(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.is_active = false;
        self.audit.touch(actor, now);
    }

    pub fn activate(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.is_active = true;
        self.audit.touch(actor, now);
    }

    // =========================================================================
    // Stock Ledger
    // =========================================================================

    /// Adds `qty` to current stock.
    ///
    /// ## Errors
    /// - `ValidationError::MustBePositive` if `qty <= 0`
    /// - `ValidationError::OutOfRange` if the new stock does not fit
    ///
    /// Stock is unchanged on error.
    pub fn increase_stock(&mut self, qty: Decimal) -> CoreResult<()> {
        ensure_positive(qty)?;
        self.current_stock = self
            .current_stock
            .checked_add(qty)
            .ok_or_else(|| ValidationError::out_of_range("current_stock"))?;
        Ok(())
    }

    /// Removes `qty` from current stock.
    ///
    /// ## Errors
    /// - `ValidationError::MustBePositive` if `qty <= 0`
    /// - `CoreError::InsufficientStock` if `current_stock < qty`
    ///
    /// Stock is unchanged on error.
    pub fn decrease_stock(&mut self, qty: Decimal) -> CoreResult<()> {
        ensure_positive(qty)?;
        if !self.has_sufficient_stock(qty) {
            return Err(CoreError::InsufficientStock {
                product: self.code.clone(),
                unit: self.unit.clone(),
                available: self.current_stock,
                requested: qty,
            });
        }
        self.current_stock -= qty;
        Ok(())
    }

    /// Pure check, no mutation.
    pub fn has_sufficient_stock(&self, required: Decimal) -> bool {
        self.current_stock >= required
    }

    pub fn stock_status(&self) -> StockStatus {
        let reorder = self.details.reorder_level;
        if self.current_stock <= Decimal::ZERO {
            StockStatus::OutOfStock
        } else if self.current_stock <= reorder {
            StockStatus::LowStock
        } else if reorder
            .checked_mul(MEDIUM_STOCK_FACTOR)
            .map_or(true, |medium| self.current_stock <= medium)
        {
            StockStatus::MediumStock
        } else {
            StockStatus::GoodStock
        }
    }

    pub fn needs_reorder(&self) -> bool {
        self.current_stock <= self.details.reorder_level
    }

    pub(crate) fn touch(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.audit.touch(actor, now);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn details(&self) -> &ProductDetails {
        &self.details
    }

    pub fn unit_price(&self) -> Money {
        Money::from_balance(self.details.unit_price, self.currency)
    }

    pub fn current_stock(&self) -> Quantity {
        Quantity::from_parts(self.current_stock, &self.unit)
    }

    pub fn reorder_level(&self) -> Quantity {
        Quantity::from_parts(self.details.reorder_level, &self.unit)
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn audit(&self) -> &AuditStamp {
        &self.audit
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({})", self.code, self.details.name, self.current_stock())
    }
}

fn ensure_positive(qty: Decimal) -> Result<(), ValidationError> {
    if qty <= Decimal::ZERO {
        return Err(ValidationError::must_be_positive("quantity"));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    pub(crate) fn feed(price: Decimal, reorder: Decimal) -> Product {
        Product::create(
            "feed01",
            "bag",
            Currency::Inr,
            ProductDetails {
                name: "Cattle Feed".to_string(),
                description: None,
                unit_price: price,
                reorder_level: reorder,
            },
            &Actor::new("admin").unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 7, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_starts_empty() {
        let product = feed(dec!(1200), dec!(10));
        assert_eq!(product.code(), "FEED01");
        assert_eq!(product.unit(), "BAG");
        assert!(product.current_stock().is_zero());
        assert_eq!(product.stock_status(), StockStatus::OutOfStock);
        assert_eq!(product.unit_price().amount(), dec!(1200));
    }

    #[test]
    fn test_create_rejects_negative_price() {
        let err = Product::create(
            "P1",
            "KG",
            Currency::Inr,
            ProductDetails {
                name: "Salt".to_string(),
                description: None,
                unit_price: dec!(-1),
                reorder_level: dec!(0),
            },
            &Actor::new("admin").unwrap(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::Negative { .. }));
    }

    #[test]
    fn test_decrease_to_exactly_zero() {
        let mut product = feed(dec!(100), dec!(0));
        product.increase_stock(dec!(5)).unwrap();
        product.decrease_stock(dec!(5)).unwrap();
        assert_eq!(product.current_stock().value(), dec!(0));
    }

    #[test]
    fn test_decrease_beyond_stock_leaves_stock_unchanged() {
        let mut product = feed(dec!(100), dec!(0));
        product.increase_stock(dec!(5)).unwrap();

        let err = product.decrease_stock(dec!(5.01)).unwrap_err();
        match err {
            CoreError::InsufficientStock {
                available,
                requested,
                ..
            } => {
                assert_eq!(available, dec!(5));
                assert_eq!(requested, dec!(5.01));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(product.current_stock().value(), dec!(5));
    }

    #[test]
    fn test_non_positive_quantities_rejected() {
        let mut product = feed(dec!(100), dec!(0));
        assert!(matches!(
            product.increase_stock(dec!(0)),
            Err(CoreError::Validation(ValidationError::MustBePositive { .. }))
        ));
        assert!(matches!(
            product.decrease_stock(dec!(-1)),
            Err(CoreError::Validation(ValidationError::MustBePositive { .. }))
        ));
    }

    #[test]
    fn test_stock_status_bands() {
        let mut product = feed(dec!(100), dec!(10));
        product.increase_stock(dec!(10)).unwrap();
        assert_eq!(product.stock_status(), StockStatus::LowStock);
        assert!(product.needs_reorder());

        product.increase_stock(dec!(5)).unwrap();
        assert_eq!(product.stock_status(), StockStatus::MediumStock);
        assert!(!product.needs_reorder());

        product.increase_stock(dec!(0.5)).unwrap();
        assert_eq!(product.stock_status(), StockStatus::GoodStock);
    }

    #[test]
    fn test_has_sufficient_stock_is_pure() {
        let mut product = feed(dec!(100), dec!(0));
        product.increase_stock(dec!(2)).unwrap();
        assert!(product.has_sufficient_stock(dec!(2)));
        assert!(!product.has_sufficient_stock(dec!(2.5)));
        assert_eq!(product.current_stock().value(), dec!(2));
    }

    #[test]
    fn test_stock_overflow_is_rejected() {
        let mut product = feed(dec!(100), dec!(0));
        product.increase_stock(Decimal::MAX).unwrap();

        let err = product.increase_stock(dec!(1)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfRange { .. })
        ));
        assert_eq!(product.current_stock().value(), Decimal::MAX);
    }

    #[test]
    fn test_stock_status_with_huge_reorder_level() {
        let mut product = feed(dec!(100), Decimal::MAX);
        product.increase_stock(dec!(1)).unwrap();
        assert_eq!(product.stock_status(), StockStatus::LowStock);
    }
}
