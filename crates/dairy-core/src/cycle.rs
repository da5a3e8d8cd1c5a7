//! # Milk Cycle
//!
//! The aggregate that accumulates one customer's milk earnings, product
//! purchases and cash advances over a dated window.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   create() ──► ┌────────┐  mark_as_settled()   ┌─────────┐             │
//! │                │  Open  │ ───────────────────► │ Settled │ (terminal)  │
//! │                └────────┘  requires milk > 0   └─────────┘             │
//! │                    │                                │                   │
//! │     set_milk_amount│update_notes                    │ every mutator     │
//! │  record_product_sale│record_advance_payment         │ fails with        │
//! │                    ▼                                ▼ InvalidState      │
//! │                 allowed                                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership
//! The cycle owns its sales and advances by value. Customer and product are
//! referenced by id only; a sale snapshots the product name so ledger text
//! survives later renames.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::audit::{Actor, AuditStamp};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Currency, Money};
use crate::product::Product;
use crate::quantity::Quantity;
use crate::types::{CycleState, DateRange, PaymentMode};
use crate::validation::{
    optional_text, required, validate_non_negative, validate_positive, ValidationResult,
};

const MAX_NOTES_LENGTH: usize = 500;
const MAX_REFERENCE_LENGTH: usize = 50;

// =============================================================================
// Line Items
// =============================================================================

/// A product sold to the customer during a cycle (a debit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSale {
    pub id: String,
    pub customer_id: String,
    pub product_id: String,
    pub cycle_id: String,
    /// Product name at time of sale (frozen).
    pub product_name: String,
    pub sold_at: DateTime<Utc>,
    pub quantity: Quantity,
    pub unit_price: Money,
    /// quantity × unit_price
    pub total_amount: Money,
    pub notes: Option<String>,
    pub audit: AuditStamp,
}

/// Cash or transfer paid to the customer ahead of settlement (a debit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancePayment {
    pub id: String,
    pub customer_id: String,
    pub cycle_id: String,
    pub paid_at: DateTime<Utc>,
    pub amount: Money,
    pub payment_mode: PaymentMode,
    /// Required for every mode except cash.
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub audit: AuditStamp,
}

/// Caller-supplied data for [`MilkCycle::record_product_sale`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleInput {
    pub customer_id: String,
    pub quantity: Decimal,
    /// Overrides the product's list price when set.
    pub unit_price: Option<Decimal>,
    pub notes: Option<String>,
}

/// Caller-supplied data for [`MilkCycle::record_advance_payment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceInput {
    pub customer_id: String,
    pub amount: Decimal,
    pub payment_mode: PaymentMode,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
}

// =============================================================================
// Milk Cycle
// =============================================================================

/// Scalar state of a cycle as stored, without its line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilkCycleHeader {
    pub id: String,
    pub customer_id: String,
    pub period: DateRange,
    pub currency: Currency,
    pub total_milk_amount: Decimal,
    pub is_settled: bool,
    pub settled_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub audit: AuditStamp,
}

/// One customer's milk cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilkCycle {
    header: MilkCycleHeader,
    sales: Vec<ProductSale>,
    advances: Vec<AdvancePayment>,
}

impl MilkCycle {
    /// Opens a cycle with zero milk recorded.
    pub fn create(
        customer_id: &str,
        period: DateRange,
        currency: Currency,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> ValidationResult<Self> {
        let customer_id = required("customer_id", customer_id)?;
        Ok(MilkCycle {
            header: MilkCycleHeader {
                id: Uuid::new_v4().to_string(),
                customer_id: customer_id.to_string(),
                period,
                currency,
                total_milk_amount: Decimal::ZERO,
                is_settled: false,
                settled_at: None,
                notes: None,
                audit: AuditStamp::created(actor, now),
            },
            sales: Vec::new(),
            advances: Vec::new(),
        })
    }

    /// Opens a standard 10-day cycle starting at `start`.
    pub fn ten_day(
        customer_id: &str,
        start: NaiveDate,
        currency: Currency,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> ValidationResult<Self> {
        MilkCycle::create(customer_id, DateRange::ten_day_cycle(start)?, currency, actor, now)
    }

    /// Reassembles a cycle loaded from storage. Line items keep the given order.
    pub fn restore(
        header: MilkCycleHeader,
        sales: Vec<ProductSale>,
        advances: Vec<AdvancePayment>,
    ) -> Self {
        MilkCycle {
            header,
            sales,
            advances,
        }
    }

    // =========================================================================
    // Mutators (Open only)
    // =========================================================================

    /// Sets the accumulated milk earnings for the cycle.
    pub fn set_milk_amount(
        &mut self,
        amount: Decimal,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.ensure_open()?;
        self.header.total_milk_amount = validate_non_negative("milk_amount", amount)?;
        self.header.audit.touch(actor, now);
        Ok(())
    }

    pub fn update_notes(
        &mut self,
        notes: Option<&str>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.ensure_open()?;
        self.header.notes = optional_text("notes", notes, MAX_NOTES_LENGTH)?;
        self.header.audit.touch(actor, now);
        Ok(())
    }

    /// Sells `product` to the cycle's customer and decrements its stock.
    ///
    /// ## Check Order
    /// 1. Cycle is Open (`InvalidState`)
    /// 2. Sale customer matches cycle customer (`Mismatch`)
    /// 3. Quantity > 0, price ≥ 0, same currency (`Validation`)
    /// 4. Enough stock (`InsufficientStock`)
    ///
    /// Neither the cycle nor the product changes unless every check passes.
    pub fn record_product_sale(
        &mut self,
        product: &mut Product,
        input: SaleInput,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> CoreResult<ProductSale> {
        self.ensure_open()?;
        self.ensure_customer("sale", &input.customer_id)?;

        let quantity = Quantity::positive(input.quantity, product.unit())?;
        let price = input.unit_price.unwrap_or(product.details().unit_price);
        let unit_price = Money::from_amount(price, product.currency())?;
        self.ensure_currency(unit_price.currency())?;
        let notes = optional_text("notes", input.notes.as_deref(), MAX_NOTES_LENGTH)?;

        let total_amount = unit_price.multiply(quantity.value())?;
        self.ensure_deductions_fit(total_amount.amount())?;

        product.decrease_stock(quantity.value())?;
        product.touch(actor, now);

        let sale = ProductSale {
            id: Uuid::new_v4().to_string(),
            customer_id: self.header.customer_id.clone(),
            product_id: product.id().to_string(),
            cycle_id: self.header.id.clone(),
            product_name: product.name().to_string(),
            sold_at: now,
            total_amount,
            quantity,
            unit_price,
            notes,
            audit: AuditStamp::created(actor, now),
        };
        self.sales.push(sale.clone());
        Ok(sale)
    }

    /// Records an advance paid to the cycle's customer.
    pub fn record_advance_payment(
        &mut self,
        input: AdvanceInput,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> CoreResult<AdvancePayment> {
        self.ensure_open()?;
        self.ensure_customer("advance", &input.customer_id)?;

        let amount = validate_positive("advance_amount", input.amount)?;
        let reference_number = optional_text(
            "reference_number",
            input.reference_number.as_deref(),
            MAX_REFERENCE_LENGTH,
        )?;
        if input.payment_mode.requires_reference() && reference_number.is_none() {
            return Err(ValidationError::Required {
                field: "reference_number".to_string(),
            }
            .into());
        }
        let notes = optional_text("notes", input.notes.as_deref(), MAX_NOTES_LENGTH)?;
        self.ensure_deductions_fit(amount)?;

        let advance = AdvancePayment {
            id: Uuid::new_v4().to_string(),
            customer_id: self.header.customer_id.clone(),
            cycle_id: self.header.id.clone(),
            paid_at: now,
            amount: Money::from_amount(amount, self.header.currency)?,
            payment_mode: input.payment_mode,
            reference_number,
            notes,
            audit: AuditStamp::created(actor, now),
        };
        self.advances.push(advance.clone());
        Ok(advance)
    }

    // =========================================================================
    // Settlement Gate
    // =========================================================================

    /// Open and with milk recorded.
    pub fn can_be_settled(&self) -> bool {
        !self.header.is_settled && self.header.total_milk_amount > Decimal::ZERO
    }

    /// Moves the cycle to Settled.
    ///
    /// ## Errors
    /// `InvalidState` if already settled or no milk is recorded. The cycle
    /// is unchanged on error.
    pub fn mark_as_settled(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.header.is_settled {
            return Err(self.invalid_state("cycle is already settled"));
        }
        if self.header.total_milk_amount <= Decimal::ZERO {
            return Err(self.invalid_state("cannot settle a cycle with zero milk amount"));
        }
        self.header.is_settled = true;
        self.header.settled_at = Some(now);
        Ok(())
    }

    pub(crate) fn touch(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.header.audit.touch(actor, now);
    }

    // =========================================================================
    // Totals (pure, usable before settlement)
    // =========================================================================

    pub fn total_milk_amount(&self) -> Money {
        Money::from_balance(self.header.total_milk_amount, self.header.currency)
    }

    pub fn total_product_sales(&self) -> Money {
        let total = sum_amounts(self.sales.iter().map(|s| s.total_amount.amount()));
        Money::from_balance(total, self.header.currency)
    }

    pub fn total_advances(&self) -> Money {
        let total = sum_amounts(self.advances.iter().map(|a| a.amount.amount()));
        Money::from_balance(total, self.header.currency)
    }

    /// milk − sales − advances. May be negative.
    pub fn estimated_payable(&self) -> Money {
        Money::from_balance(
            self.header
                .total_milk_amount
                .saturating_sub(self.total_product_sales().amount())
                .saturating_sub(self.total_advances().amount()),
            self.header.currency,
        )
    }

    /// Rejects a new sale or advance whose amount would push sales plus
    /// advances past what a `Decimal` holds. With this in place the totals
    /// above are exact.
    fn ensure_deductions_fit(&self, extra: Decimal) -> ValidationResult<()> {
        self.sales
            .iter()
            .map(|s| s.total_amount.amount())
            .chain(self.advances.iter().map(|a| a.amount.amount()))
            .try_fold(extra, |acc, amount| acc.checked_add(amount))
            .map(|_| ())
            .ok_or_else(|| ValidationError::out_of_range("cycle deductions"))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> &str {
        &self.header.id
    }

    pub fn customer_id(&self) -> &str {
        &self.header.customer_id
    }

    pub fn period(&self) -> DateRange {
        self.header.period
    }

    pub fn currency(&self) -> Currency {
        self.header.currency
    }

    pub fn state(&self) -> CycleState {
        CycleState::from_settled(self.header.is_settled)
    }

    pub fn is_settled(&self) -> bool {
        self.header.is_settled
    }

    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        self.header.settled_at
    }

    pub fn notes(&self) -> Option<&str> {
        self.header.notes.as_deref()
    }

    pub fn header(&self) -> &MilkCycleHeader {
        &self.header
    }

    pub fn sales(&self) -> &[ProductSale] {
        &self.sales
    }

    pub fn advances(&self) -> &[AdvancePayment] {
        &self.advances
    }

    pub fn has_ended(&self, today: NaiveDate) -> bool {
        self.header.period.has_ended(today)
    }

    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.header.period.is_active(today)
    }

    // =========================================================================
    // Guards
    // =========================================================================

    fn ensure_open(&self) -> CoreResult<()> {
        if self.header.is_settled {
            return Err(self.invalid_state("cannot modify a settled cycle"));
        }
        Ok(())
    }

    fn ensure_customer(&self, what: &str, customer_id: &str) -> ValidationResult<()> {
        if customer_id.trim() != self.header.customer_id {
            return Err(ValidationError::Mismatch {
                field: "customer_id".to_string(),
                reason: format!("{} customer must match cycle customer", what),
            });
        }
        Ok(())
    }

    fn ensure_currency(&self, currency: Currency) -> ValidationResult<()> {
        if currency != self.header.currency {
            return Err(ValidationError::CurrencyMismatch {
                left: self.header.currency.code().to_string(),
                right: currency.code().to_string(),
            });
        }
        Ok(())
    }

    fn invalid_state(&self, reason: &str) -> CoreError {
        CoreError::invalid_state("MilkCycle", self.header.id.as_str(), reason)
    }
}

impl fmt::Display for MilkCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cycle {}: {}", self.header.id, self.header.period)
    }
}

/// Saturating sum. Line amounts are non-negative.
fn sum_amounts(amounts: impl Iterator<Item = Decimal>) -> Decimal {
    amounts.fold(Decimal::ZERO, Decimal::saturating_add)
}

// =============================================================================
// Unit Tests
// =============================================================================
