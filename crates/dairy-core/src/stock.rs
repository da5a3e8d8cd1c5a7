//! # Stock Purchases
//!
//! Incoming stock. A purchase row and the product's new stock level are one
//! unit of work: [`record_purchase`] produces both, and the persistence layer
//! writes them in a single transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{Actor, AuditStamp};
use crate::error::CoreResult;
use crate::money::Money;
use crate::product::Product;
use crate::quantity::Quantity;
use crate::validation::optional_text;

const MAX_SUPPLIER_LENGTH: usize = 200;
const MAX_INVOICE_LENGTH: usize = 50;
const MAX_NOTES_LENGTH: usize = 500;

/// Caller-supplied purchase data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseInput {
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub supplier_name: Option<String>,
    pub invoice_number: Option<String>,
    pub notes: Option<String>,
}

/// A recorded stock purchase. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPurchase {
    pub id: String,
    pub product_id: String,
    pub purchased_at: DateTime<Utc>,
    pub quantity: Quantity,
    pub unit_price: Money,
    /// quantity × unit_price
    pub total_amount: Money,
    pub supplier_name: Option<String>,
    pub invoice_number: Option<String>,
    pub notes: Option<String>,
    pub audit: AuditStamp,
}

/// Builds the purchase row and increases the product's stock.
///
/// ## Errors
/// - `MustBePositive` for a zero/negative quantity
/// - `Negative` for a negative unit price
/// - `OutOfRange` if the total or the new stock overflows
///
/// The product is untouched on error.
pub fn record_purchase(
    product: &mut Product,
    input: PurchaseInput,
    actor: &Actor,
    now: DateTime<Utc>,
) -> CoreResult<ProductPurchase> {
    let quantity = Quantity::positive(input.quantity, product.unit())?;
    let unit_price = Money::from_amount(input.unit_price, product.currency())?;
    let supplier_name =
        optional_text("supplier_name", input.supplier_name.as_deref(), MAX_SUPPLIER_LENGTH)?;
    let invoice_number =
        optional_text("invoice_number", input.invoice_number.as_deref(), MAX_INVOICE_LENGTH)?;
    let notes = optional_text("notes", input.notes.as_deref(), MAX_NOTES_LENGTH)?;

    let total_amount = unit_price.multiply(quantity.value())?;

    product.increase_stock(quantity.value())?;
    product.touch(actor, now);

    Ok(ProductPurchase {
        id: Uuid::new_v4().to_string(),
        product_id: product.id().to_string(),
        purchased_at: now,
        total_amount,
        quantity,
        unit_price,
        supplier_name,
        invoice_number,
        notes,
        audit: AuditStamp::created(actor, now),
    })
}
