//! # Cycle Repository
//!
//! Database operations for milk cycles and their line items.
//!
//! ## Aggregate Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  milk_cycles (header)                                                   │
//! │     ├── product_sales     (cycle_id, insertion order = rowid)           │
//! │     └── advance_payments  (cycle_id, insertion order = rowid)           │
//! │                                                                         │
//! │  find() reads all three and reassembles a MilkCycle.                    │
//! │  Line items are insert-only; the header is the only row updated.        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use dairy_core::{
    AdvancePayment, CoreError, Currency, DateRange, MilkCycle, MilkCycleHeader, Money,
    PaymentMode, ProductSale, Quantity,
};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use super::{parse_decimal, AuditColumns};
use crate::error::{DbError, DbResult};

const SELECT_CYCLE: &str = r#"
    SELECT id, customer_id, start_date, end_date, currency, total_milk_amount,
           is_settled, settled_at, notes, created_at, created_by, updated_at, updated_by
    FROM milk_cycles
"#;

#[derive(Debug, FromRow)]
struct CycleRow {
    id: String,
    customer_id: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    currency: Currency,
    total_milk_amount: String,
    is_settled: bool,
    settled_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    #[sqlx(flatten)]
    audit: AuditColumns,
}

impl CycleRow {
    fn into_header(self) -> DbResult<MilkCycleHeader> {
        Ok(MilkCycleHeader {
            period: DateRange::create(self.start_date, self.end_date)?,
            total_milk_amount: parse_decimal("milk_cycles.total_milk_amount", &self.total_milk_amount)?,
            id: self.id,
            customer_id: self.customer_id,
            currency: self.currency,
            is_settled: self.is_settled,
            settled_at: self.settled_at,
            notes: self.notes,
            audit: self.audit.into(),
        })
    }
}

#[derive(Debug, FromRow)]
struct SaleRow {
    id: String,
    cycle_id: String,
    customer_id: String,
    product_id: String,
    product_name: String,
    sold_at: DateTime<Utc>,
    quantity: String,
    unit: String,
    currency: Currency,
    unit_price: String,
    total_amount: String,
    notes: Option<String>,
    #[sqlx(flatten)]
    audit: AuditColumns,
}

impl SaleRow {
    fn into_domain(self) -> DbResult<ProductSale> {
        let quantity = parse_decimal("product_sales.quantity", &self.quantity)?;
        let unit_price = parse_decimal("product_sales.unit_price", &self.unit_price)?;
        let total = parse_decimal("product_sales.total_amount", &self.total_amount)?;
        Ok(ProductSale {
            id: self.id,
            customer_id: self.customer_id,
            product_id: self.product_id,
            cycle_id: self.cycle_id,
            product_name: self.product_name,
            sold_at: self.sold_at,
            quantity: Quantity::create(quantity, &self.unit)?,
            unit_price: Money::from_amount(unit_price, self.currency)?,
            total_amount: Money::from_amount(total, self.currency)?,
            notes: self.notes,
            audit: self.audit.into(),
        })
    }
}

#[derive(Debug, FromRow)]
struct AdvanceRow {
    id: String,
    cycle_id: String,
    customer_id: String,
    paid_at: DateTime<Utc>,
    currency: Currency,
    amount: String,
    payment_mode: PaymentMode,
    reference_number: Option<String>,
    notes: Option<String>,
    #[sqlx(flatten)]
    audit: AuditColumns,
}

impl AdvanceRow {
    fn into_domain(self) -> DbResult<AdvancePayment> {
        let amount = parse_decimal("advance_payments.amount", &self.amount)?;
        Ok(AdvancePayment {
            id: self.id,
            customer_id: self.customer_id,
            cycle_id: self.cycle_id,
            paid_at: self.paid_at,
            amount: Money::from_amount(amount, self.currency)?,
            payment_mode: self.payment_mode,
            reference_number: self.reference_number,
            notes: self.notes,
            audit: self.audit.into(),
        })
    }
}

fn already_settled(cycle_id: &str) -> DbError {
    CoreError::invalid_state("MilkCycle", cycle_id, "cycle is already settled").into()
}

// =============================================================================
// Connection-level operations
// =============================================================================

/// Loads a cycle with its sales and advances.
pub async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<MilkCycle>> {
    let Some(row) = sqlx::query_as::<_, CycleRow>(&format!("{SELECT_CYCLE} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };
    let header = row.into_header()?;

    let sales = sqlx::query_as::<_, SaleRow>(
        r#"
        SELECT id, cycle_id, customer_id, product_id, product_name, sold_at, quantity,
               unit, currency, unit_price, total_amount, notes,
               created_at, created_by, updated_at, updated_by
        FROM product_sales
        WHERE cycle_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(SaleRow::into_domain)
    .collect::<DbResult<Vec<_>>>()?;

    let advances = sqlx::query_as::<_, AdvanceRow>(
        r#"
        SELECT id, cycle_id, customer_id, paid_at, currency, amount, payment_mode,
               reference_number, notes, created_at, created_by, updated_at, updated_by
        FROM advance_payments
        WHERE cycle_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(AdvanceRow::into_domain)
    .collect::<DbResult<Vec<_>>>()?;

    debug!(
        id = %id,
        sales = sales.len(),
        advances = advances.len(),
        "Loaded cycle"
    );
    Ok(Some(MilkCycle::restore(header, sales, advances)))
}

/// Inserts the header of a new cycle.
pub async fn insert(conn: &mut SqliteConnection, cycle: &MilkCycle) -> DbResult<()> {
    let header = cycle.header();
    debug!(id = %header.id, customer_id = %header.customer_id, period = %header.period, "Inserting cycle");

    sqlx::query(
        r#"
        INSERT INTO milk_cycles (
            id, customer_id, start_date, end_date, currency, total_milk_amount,
            is_settled, settled_at, notes, created_at, created_by, updated_at, updated_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&header.id)
    .bind(&header.customer_id)
    .bind(header.period.start())
    .bind(header.period.end())
    .bind(header.currency)
    .bind(header.total_milk_amount.to_string())
    .bind(header.is_settled)
    .bind(header.settled_at)
    .bind(&header.notes)
    .bind(header.audit.created_at)
    .bind(&header.audit.created_by)
    .bind(header.audit.updated_at)
    .bind(&header.audit.updated_by)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Writes milk amount, notes and audit columns of an open cycle.
///
/// ## Errors
/// `InvalidState` if the stored cycle is already settled.
pub async fn update_open_header(conn: &mut SqliteConnection, header: &MilkCycleHeader) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE milk_cycles SET
            total_milk_amount = ?2,
            notes = ?3,
            updated_at = ?4,
            updated_by = ?5
        WHERE id = ?1 AND is_settled = 0
        "#,
    )
    .bind(&header.id)
    .bind(header.total_milk_amount.to_string())
    .bind(&header.notes)
    .bind(header.audit.updated_at)
    .bind(&header.audit.updated_by)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(already_settled(&header.id));
    }
    Ok(())
}

/// Flips a stored cycle from open to settled.
///
/// ## Errors
/// `InvalidState` if the stored cycle is already settled.
pub async fn mark_settled(conn: &mut SqliteConnection, header: &MilkCycleHeader) -> DbResult<()> {
    debug!(id = %header.id, "Marking cycle settled");

    let result = sqlx::query(
        r#"
        UPDATE milk_cycles SET
            is_settled = 1,
            settled_at = ?2,
            updated_at = ?3,
            updated_by = ?4
        WHERE id = ?1 AND is_settled = 0
        "#,
    )
    .bind(&header.id)
    .bind(header.settled_at)
    .bind(header.audit.updated_at)
    .bind(&header.audit.updated_by)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(already_settled(&header.id));
    }
    Ok(())
}

pub async fn insert_sale(conn: &mut SqliteConnection, sale: &ProductSale) -> DbResult<()> {
    debug!(id = %sale.id, cycle_id = %sale.cycle_id, product_id = %sale.product_id, "Inserting product sale");

    sqlx::query(
        r#"
        INSERT INTO product_sales (
            id, cycle_id, customer_id, product_id, product_name, sold_at, quantity,
            unit, currency, unit_price, total_amount, notes,
            created_at, created_by, updated_at, updated_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.cycle_id)
    .bind(&sale.customer_id)
    .bind(&sale.product_id)
    .bind(&sale.product_name)
    .bind(sale.sold_at)
    .bind(sale.quantity.value().to_string())
    .bind(sale.quantity.unit())
    .bind(sale.total_amount.currency())
    .bind(sale.unit_price.amount().to_string())
    .bind(sale.total_amount.amount().to_string())
    .bind(&sale.notes)
    .bind(sale.audit.created_at)
    .bind(&sale.audit.created_by)
    .bind(sale.audit.updated_at)
    .bind(&sale.audit.updated_by)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn insert_advance(conn: &mut SqliteConnection, advance: &AdvancePayment) -> DbResult<()> {
    debug!(id = %advance.id, cycle_id = %advance.cycle_id, amount = %advance.amount, "Inserting advance");

    sqlx::query(
        r#"
        INSERT INTO advance_payments (
            id, cycle_id, customer_id, paid_at, currency, amount, payment_mode,
            reference_number, notes, created_at, created_by, updated_at, updated_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&advance.id)
    .bind(&advance.cycle_id)
    .bind(&advance.customer_id)
    .bind(advance.paid_at)
    .bind(advance.amount.currency())
    .bind(advance.amount.amount().to_string())
    .bind(advance.payment_mode)
    .bind(&advance.reference_number)
    .bind(&advance.notes)
    .bind(advance.audit.created_at)
    .bind(&advance.audit.created_by)
    .bind(advance.audit.updated_at)
    .bind(&advance.audit.updated_by)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Read access to cycles over the pool.
#[derive(Debug, Clone)]
pub struct CycleRepository {
    pool: SqlitePool,
}

impl CycleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CycleRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<MilkCycle>> {
        let mut conn = self.pool.acquire().await?;
        find(&mut conn, id).await
    }

    /// Cycle headers, newest start date first.
    ///
    /// ## Arguments
    /// * `customer_id` - restrict to one customer
    /// * `unsettled_only` - skip settled cycles
    pub async fn list_headers(
        &self,
        customer_id: Option<&str>,
        unsettled_only: bool,
    ) -> DbResult<Vec<MilkCycleHeader>> {
        let rows = sqlx::query_as::<_, CycleRow>(&format!(
            "{SELECT_CYCLE}
             WHERE (?1 IS NULL OR customer_id = ?1)
               AND (?2 = 0 OR is_settled = 0)
             ORDER BY start_date DESC, created_at DESC"
        ))
        .bind(customer_id)
        .bind(unsettled_only)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CycleRow::into_header).collect()
    }
}
