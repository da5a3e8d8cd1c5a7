//! # Settlement Calculator
//!
//! Derives the final payable for a cycle, builds the itemised ledger, and
//! moves the cycle to Settled.
//!
//! ## Calculation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   milk_amount            (credit, ≥ 0)      1000.00                     │
//! │ − total_product_sales    (debit,  ≥ 0)     − 200.00                     │
//! │ − total_advance_paid     (debit,  ≥ 0)     − 100.00                     │
//! │ ─────────────────────────────────────────  ────────                     │
//! │ = final_payable          (signed)            700.00  → pay customer     │
//! │                                                                         │
//! │   final_payable < 0  → customer owes |final_payable|                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ledger Order
//! 1. One Milk line, dated at the cycle's end date
//! 2. One ProductSale line per sale, by sale time (insertion order on ties)
//! 3. One Advance line per advance, by payment time (insertion order on ties)
//!
//! [`settle`] only changes memory. The persistence layer writes the
//! settlement and the settled cycle in one transaction.

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::audit::{Actor, AuditStamp};
use crate::cycle::MilkCycle;
use crate::error::{CoreError, CoreResult};
use crate::money::{Currency, Money};
use crate::types::{PaymentMode, SettlementDetailType};
use crate::validation::optional_text;
use crate::SETTLEMENT_TOLERANCE;

const MAX_NOTES_LENGTH: usize = 500;
const MAX_REFERENCE_LENGTH: usize = 50;

// =============================================================================
// Settlement Detail
// =============================================================================

/// One line of the settlement ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementDetail {
    pub id: String,
    pub settlement_id: String,
    /// Position within the ledger, starting at 1.
    pub line_no: u32,
    pub detail_type: SettlementDetailType,
    /// Originating sale or advance; `None` for the milk line.
    pub reference_id: Option<String>,
    pub description: String,
    /// Always non-negative; the sign comes from `detail_type`.
    pub amount: Money,
    pub transaction_date: DateTime<Utc>,
}

impl SettlementDetail {
    #[inline]
    pub fn is_credit(&self) -> bool {
        self.detail_type.is_credit()
    }

    #[inline]
    pub fn is_debit(&self) -> bool {
        self.detail_type.is_debit()
    }

    /// +amount for credits, −amount for debits.
    pub fn signed_amount(&self) -> Money {
        if self.is_credit() {
            self.amount
        } else {
            Money::from_balance(-self.amount.amount(), self.amount.currency())
        }
    }
}

// =============================================================================
// Preview
// =============================================================================

/// Settlement figures computed without touching the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPreview {
    pub cycle_id: String,
    pub customer_id: String,
    pub can_be_settled: bool,
    pub milk_amount: Money,
    pub total_product_sales: Money,
    pub total_advance_paid: Money,
    pub final_payable: Money,
}

impl SettlementPreview {
    pub fn customer_owes_money(&self) -> bool {
        self.final_payable.is_negative()
    }
}

/// Runs the totals only: no settlement object, no state change.
pub fn preview(cycle: &MilkCycle) -> SettlementPreview {
    SettlementPreview {
        cycle_id: cycle.id().to_string(),
        customer_id: cycle.customer_id().to_string(),
        can_be_settled: cycle.can_be_settled(),
        milk_amount: cycle.total_milk_amount(),
        total_product_sales: cycle.total_product_sales(),
        total_advance_paid: cycle.total_advances(),
        final_payable: cycle.estimated_payable(),
    }
}

// =============================================================================
// Settlement
// =============================================================================

/// Scalar state of a settlement as stored, without its ledger lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementHeader {
    pub id: String,
    pub customer_id: String,
    pub cycle_id: String,
    pub settled_at: DateTime<Utc>,
    pub currency: Currency,
    pub milk_amount: Decimal,
    pub total_product_sales: Decimal,
    pub total_advance_paid: Decimal,
    pub final_payable: Decimal,
    pub payment_mode: PaymentMode,
    pub notes: Option<String>,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_reference: Option<String>,
    pub audit: AuditStamp,
}

/// The locked-in result of settling one cycle.
///
/// Immutable after creation except for the one-way unpaid → paid transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    header: SettlementHeader,
    details: Vec<SettlementDetail>,
}

impl Settlement {
    /// Reassembles a settlement loaded from storage.
    pub fn restore(header: SettlementHeader, details: Vec<SettlementDetail>) -> Self {
        Settlement { header, details }
    }

    /// `true` when the customer owes the dairy.
    pub fn customer_owes_money(&self) -> bool {
        self.header.final_payable < Decimal::ZERO
    }

    /// |final_payable| when the customer owes money, else zero.
    pub fn amount_owed(&self) -> Money {
        if self.customer_owes_money() {
            self.final_payable().abs()
        } else {
            Money::zero(self.header.currency)
        }
    }

    pub fn requires_payment_to_customer(&self) -> bool {
        self.header.final_payable > Decimal::ZERO
    }

    /// Re-checks `final_payable` against its three components.
    ///
    /// ## Errors
    /// `CoreError::Consistency` when they differ by more than 0.01.
    pub fn validate_calculation(&self) -> CoreResult<()> {
        let h = &self.header;
        let expected = h
            .milk_amount
            .checked_sub(h.total_product_sales)
            .and_then(|v| v.checked_sub(h.total_advance_paid));
        let within_tolerance = expected
            .and_then(|e| e.checked_sub(h.final_payable))
            .is_some_and(|drift| drift.abs() <= SETTLEMENT_TOLERANCE);
        if !within_tolerance {
            let expected = h
                .milk_amount
                .saturating_sub(h.total_product_sales)
                .saturating_sub(h.total_advance_paid);
            return Err(CoreError::Consistency {
                settlement_id: self.header.id.clone(),
                expected,
                actual: self.header.final_payable,
            });
        }
        Ok(())
    }

    /// Records payment. One-way.
    ///
    /// ## Errors
    /// `InvalidState` if the settlement is already paid.
    pub fn mark_as_paid(
        &mut self,
        reference: Option<&str>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        if self.header.is_paid {
            return Err(CoreError::invalid_state(
                "Settlement",
                self.header.id.as_str(),
                "settlement is already marked as paid",
            ));
        }
        let reference = optional_text("payment_reference", reference, MAX_REFERENCE_LENGTH)?;

        self.header.is_paid = true;
        self.header.paid_at = Some(now);
        self.header.payment_reference = reference;
        self.header.audit.touch(actor, now);
        Ok(())
    }

    pub fn credits(&self) -> impl Iterator<Item = &SettlementDetail> {
        self.details.iter().filter(|d| d.is_credit())
    }

    pub fn debits(&self) -> impl Iterator<Item = &SettlementDetail> {
        self.details.iter().filter(|d| d.is_debit())
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

    pub fn cycle_id(&self) -> &str {
        &self.header.cycle_id
    }

    pub fn settled_at(&self) -> DateTime<Utc> {
        self.header.settled_at
    }

    pub fn milk_amount(&self) -> Money {
        Money::from_balance(self.header.milk_amount, self.header.currency)
    }

    pub fn total_product_sales(&self) -> Money {
        Money::from_balance(self.header.total_product_sales, self.header.currency)
    }

    pub fn total_advance_paid(&self) -> Money {
        Money::from_balance(self.header.total_advance_paid, self.header.currency)
    }

    /// Sales plus advances.
    pub fn total_deductions(&self) -> Money {
        Money::from_balance(
            self.header
                .total_product_sales
                .saturating_add(self.header.total_advance_paid),
            self.header.currency,
        )
    }

    pub fn final_payable(&self) -> Money {
        Money::from_balance(self.header.final_payable, self.header.currency)
    }

    pub fn payment_mode(&self) -> PaymentMode {
        self.header.payment_mode
    }

    pub fn is_paid(&self) -> bool {
        self.header.is_paid
    }

    pub fn header(&self) -> &SettlementHeader {
        &self.header
    }

    pub fn details(&self) -> &[SettlementDetail] {
        &self.details
    }
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.header.is_paid { "Paid" } else { "Unpaid" };
        write!(f, "Settlement {}: {} ({})", self.header.id, self.final_payable(), status)
    }
}

// =============================================================================
// Settle
// =============================================================================

/// Settles `cycle`: computes totals, builds the ledger, marks the cycle
/// Settled, and returns the new settlement.
///
/// ## Errors
/// - `InvalidState` if the cycle is already settled or has no milk
/// - `Validation` if `payment_mode` is not a known mode
///
/// The cycle is unchanged on error.
pub fn settle(
    cycle: &mut MilkCycle,
    payment_mode: &str,
    notes: Option<&str>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> CoreResult<Settlement> {
    if !cycle.can_be_settled() {
        return Err(CoreError::invalid_state(
            "MilkCycle",
            cycle.id(),
            "cycle cannot be settled: already settled or milk amount is zero",
        ));
    }
    let payment_mode: PaymentMode = payment_mode.parse()?;
    let notes = optional_text("notes", notes, MAX_NOTES_LENGTH)?;

    let currency = cycle.currency();
    let milk = Money::from_amount(cycle.total_milk_amount().amount(), currency)?;
    let sales = Money::from_amount(cycle.total_product_sales().amount(), currency)?;
    let advances = Money::from_amount(cycle.total_advances().amount(), currency)?;
    let final_payable = milk.try_sub(sales)?.try_sub(advances)?;

    let settlement_id = Uuid::new_v4().to_string();
    let details = build_details(&settlement_id, cycle);

    let settlement = Settlement {
        header: SettlementHeader {
            id: settlement_id,
            customer_id: cycle.customer_id().to_string(),
            cycle_id: cycle.id().to_string(),
            settled_at: now,
            currency,
            milk_amount: milk.amount(),
            total_product_sales: sales.amount(),
            total_advance_paid: advances.amount(),
            final_payable: final_payable.amount(),
            payment_mode,
            notes,
            is_paid: false,
            paid_at: None,
            payment_reference: None,
            audit: AuditStamp::created(actor, now),
        },
        details,
    };

    cycle.mark_as_settled(now)?;
    cycle.touch(actor, now);

    Ok(settlement)
}

fn build_details(settlement_id: &str, cycle: &MilkCycle) -> Vec<SettlementDetail> {
    let period = cycle.period();
    let mut lines = Vec::with_capacity(1 + cycle.sales().len() + cycle.advances().len());

    lines.push((
        SettlementDetailType::Milk,
        None,
        format!("Milk Amount ({} days)", period.duration_days()),
        cycle.total_milk_amount(),
        period.end().and_time(NaiveTime::MIN).and_utc(),
    ));

    let mut sales: Vec<_> = cycle.sales().iter().collect();
    sales.sort_by_key(|s| s.sold_at);
    for sale in sales {
        lines.push((
            SettlementDetailType::ProductSale,
            Some(sale.id.clone()),
            format!("{} - {}", sale.product_name, sale.quantity),
            sale.total_amount,
            sale.sold_at,
        ));
    }

    let mut advances: Vec<_> = cycle.advances().iter().collect();
    advances.sort_by_key(|a| a.paid_at);
    for advance in advances {
        lines.push((
            SettlementDetailType::Advance,
            Some(advance.id.clone()),
            format!("Advance on {}", advance.paid_at.format("%d/%m/%Y")),
            advance.amount,
            advance.paid_at,
        ));
    }

    lines
        .into_iter()
        .zip(1u32..)
        .map(
            |((detail_type, reference_id, description, amount, transaction_date), line_no)| {
                SettlementDetail {
                    id: Uuid::new_v4().to_string(),
                    settlement_id: settlement_id.to_string(),
                    line_no,
                    detail_type,
                    reference_id,
                    description,
                    amount,
                    transaction_date,
                }
            },
        )
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
