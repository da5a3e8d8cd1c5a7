//! # Settlement Repository
//!
//! Database operations for settlements and their ledger lines. Settlements
//! are insert-once; only the payment columns are ever updated.

use chrono::{DateTime, Utc};
use dairy_core::{
    CoreError, Currency, Money, PaymentMode, Settlement, SettlementDetail, SettlementDetailType,
    SettlementHeader,
};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use super::{parse_decimal, AuditColumns};
use crate::error::{DbError, DbResult};

const SELECT_SETTLEMENT: &str = r#"
    SELECT id, customer_id, cycle_id, settled_at, currency, milk_amount,
           total_product_sales, total_advance_paid, final_payable, payment_mode,
           notes, is_paid, paid_at, payment_reference,
           created_at, created_by, updated_at, updated_by
    FROM settlements
"#;

#[derive(Debug, FromRow)]
struct SettlementRow {
    id: String,
    customer_id: String,
    cycle_id: String,
    settled_at: DateTime<Utc>,
    currency: Currency,
    milk_amount: String,
    total_product_sales: String,
    total_advance_paid: String,
    final_payable: String,
    payment_mode: PaymentMode,
    notes: Option<String>,
    is_paid: bool,
    paid_at: Option<DateTime<Utc>>,
    payment_reference: Option<String>,
    #[sqlx(flatten)]
    audit: AuditColumns,
}

impl SettlementRow {
    fn into_header(self) -> DbResult<SettlementHeader> {
        Ok(SettlementHeader {
            milk_amount: parse_decimal("settlements.milk_amount", &self.milk_amount)?,
            total_product_sales: parse_decimal(
                "settlements.total_product_sales",
                &self.total_product_sales,
            )?,
            total_advance_paid: parse_decimal(
                "settlements.total_advance_paid",
                &self.total_advance_paid,
            )?,
            final_payable: parse_decimal("settlements.final_payable", &self.final_payable)?,
            id: self.id,
            customer_id: self.customer_id,
            cycle_id: self.cycle_id,
            settled_at: self.settled_at,
            currency: self.currency,
            payment_mode: self.payment_mode,
            notes: self.notes,
            is_paid: self.is_paid,
            paid_at: self.paid_at,
            payment_reference: self.payment_reference,
            audit: self.audit.into(),
        })
    }
}

#[derive(Debug, FromRow)]
struct DetailRow {
    id: String,
    settlement_id: String,
    line_no: i64,
    detail_type: SettlementDetailType,
    reference_id: Option<String>,
    description: String,
    currency: Currency,
    amount: String,
    transaction_date: DateTime<Utc>,
}

impl DetailRow {
    fn into_domain(self) -> DbResult<SettlementDetail> {
        let line_no = u32::try_from(self.line_no).map_err(|_| DbError::CorruptData {
            column: "settlement_details.line_no".to_string(),
            value: self.line_no.to_string(),
        })?;
        let amount = parse_decimal("settlement_details.amount", &self.amount)?;
        Ok(SettlementDetail {
            id: self.id,
            settlement_id: self.settlement_id,
            line_no,
            detail_type: self.detail_type,
            reference_id: self.reference_id,
            description: self.description,
            amount: Money::from_amount(amount, self.currency)?,
            transaction_date: self.transaction_date,
        })
    }
}

async fn load_details(
    conn: &mut SqliteConnection,
    settlement_id: &str,
) -> DbResult<Vec<SettlementDetail>> {
    sqlx::query_as::<_, DetailRow>(
        r#"
        SELECT id, settlement_id, line_no, detail_type, reference_id, description,
               currency, amount, transaction_date
        FROM settlement_details
        WHERE settlement_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(settlement_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(DetailRow::into_domain)
    .collect()
}

async fn assemble(
    conn: &mut SqliteConnection,
    rows: Vec<SettlementRow>,
) -> DbResult<Vec<Settlement>> {
    let mut settlements = Vec::with_capacity(rows.len());
    for row in rows {
        let header = row.into_header()?;
        let details = load_details(conn, &header.id).await?;
        settlements.push(Settlement::restore(header, details));
    }
    Ok(settlements)
}

// =============================================================================
// Connection-level operations
// =============================================================================

pub async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Settlement>> {
    let rows = sqlx::query_as::<_, SettlementRow>(&format!("{SELECT_SETTLEMENT} WHERE id = ?1"))
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(assemble(conn, rows).await?.pop())
}

pub async fn find_by_cycle(
    conn: &mut SqliteConnection,
    cycle_id: &str,
) -> DbResult<Option<Settlement>> {
    let rows =
        sqlx::query_as::<_, SettlementRow>(&format!("{SELECT_SETTLEMENT} WHERE cycle_id = ?1"))
            .bind(cycle_id)
            .fetch_all(&mut *conn)
            .await?;
    Ok(assemble(conn, rows).await?.pop())
}

/// Inserts a settlement and all its ledger lines.
///
/// ## Errors
/// `InvalidState` if the cycle already has a settlement.
pub async fn insert(conn: &mut SqliteConnection, settlement: &Settlement) -> DbResult<()> {
    let header = settlement.header();
    debug!(
        id = %header.id,
        cycle_id = %header.cycle_id,
        final_payable = %header.final_payable,
        lines = settlement.details().len(),
        "Inserting settlement"
    );

    sqlx::query(
        r#"
        INSERT INTO settlements (
            id, customer_id, cycle_id, settled_at, currency, milk_amount,
            total_product_sales, total_advance_paid, final_payable, payment_mode,
            notes, is_paid, paid_at, payment_reference,
            created_at, created_by, updated_at, updated_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
        "#,
    )
    .bind(&header.id)
    .bind(&header.customer_id)
    .bind(&header.cycle_id)
    .bind(header.settled_at)
    .bind(header.currency)
    .bind(header.milk_amount.to_string())
    .bind(header.total_product_sales.to_string())
    .bind(header.total_advance_paid.to_string())
    .bind(header.final_payable.to_string())
    .bind(header.payment_mode)
    .bind(&header.notes)
    .bind(header.is_paid)
    .bind(header.paid_at)
    .bind(&header.payment_reference)
    .bind(header.audit.created_at)
    .bind(&header.audit.created_by)
    .bind(header.audit.updated_at)
    .bind(&header.audit.updated_by)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { field, .. } if field.ends_with("cycle_id") => {
            CoreError::invalid_state("MilkCycle", header.cycle_id.as_str(), "cycle already has a settlement")
                .into()
        }
        other => other,
    })?;

    for detail in settlement.details() {
        sqlx::query(
            r#"
            INSERT INTO settlement_details (
                id, settlement_id, line_no, detail_type, reference_id, description,
                currency, amount, transaction_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&detail.id)
        .bind(&detail.settlement_id)
        .bind(i64::from(detail.line_no))
        .bind(detail.detail_type)
        .bind(&detail.reference_id)
        .bind(&detail.description)
        .bind(detail.amount.currency())
        .bind(detail.amount.amount().to_string())
        .bind(detail.transaction_date)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Writes the payment columns of an unpaid settlement.
///
/// ## Errors
/// `InvalidState` if the stored settlement is already paid.
pub async fn update_payment(conn: &mut SqliteConnection, settlement: &Settlement) -> DbResult<()> {
    let header = settlement.header();
    debug!(id = %header.id, "Recording settlement payment");

    let result = sqlx::query(
        r#"
        UPDATE settlements SET
            is_paid = 1,
            paid_at = ?2,
            payment_reference = ?3,
            updated_at = ?4,
            updated_by = ?5
        WHERE id = ?1 AND is_paid = 0
        "#,
    )
    .bind(&header.id)
    .bind(header.paid_at)
    .bind(&header.payment_reference)
    .bind(header.audit.updated_at)
    .bind(&header.audit.updated_by)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::invalid_state(
            "Settlement",
            header.id.as_str(),
            "settlement is already marked as paid",
        )
        .into());
    }
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Read access to settlements over the pool.
#[derive(Debug, Clone)]
pub struct SettlementRepository {
    pool: SqlitePool,
}

impl SettlementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettlementRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Settlement>> {
        let mut conn = self.pool.acquire().await?;
        find(&mut conn, id).await
    }

    pub async fn get_by_cycle(&self, cycle_id: &str) -> DbResult<Option<Settlement>> {
        let mut conn = self.pool.acquire().await?;
        find_by_cycle(&mut conn, cycle_id).await
    }

    /// A customer's settlements, newest first.
    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<Settlement>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, SettlementRow>(&format!(
            "{SELECT_SETTLEMENT} WHERE customer_id = ?1 ORDER BY settled_at DESC"
        ))
        .bind(customer_id)
        .fetch_all(&mut *conn)
        .await?;
        assemble(&mut conn, rows).await
    }

    /// Unpaid settlements, oldest first.
    pub async fn list_unpaid(&self) -> DbResult<Vec<Settlement>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, SettlementRow>(&format!(
            "{SELECT_SETTLEMENT} WHERE is_paid = 0 ORDER BY settled_at"
        ))
        .fetch_all(&mut *conn)
        .await?;
        assemble(&mut conn, rows).await
    }
}
