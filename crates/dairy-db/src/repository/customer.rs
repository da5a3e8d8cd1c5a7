//! # Customer Repository
//!
//! Database operations for the customer registry.

use dairy_core::{Customer, CustomerDetails};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use super::AuditColumns;
use crate::error::{DbError, DbResult};

const SELECT_CUSTOMER: &str = r#"
    SELECT id, code, full_name, phone, address, village, is_active,
           created_at, created_by, updated_at, updated_by
    FROM customers
"#;

#[derive(Debug, FromRow)]
struct CustomerRow {
    id: String,
    code: String,
    full_name: String,
    phone: Option<String>,
    address: Option<String>,
    village: Option<String>,
    is_active: bool,
    #[sqlx(flatten)]
    audit: AuditColumns,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer::restore(
            row.id,
            row.code,
            CustomerDetails {
                full_name: row.full_name,
                phone: row.phone,
                address: row.address,
                village: row.village,
            },
            row.is_active,
            row.audit.into(),
        )
    }
}

// =============================================================================
// Connection-level operations
// =============================================================================

pub async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Customer>> {
    let row = sqlx::query_as::<_, CustomerRow>(&format!("{SELECT_CUSTOMER} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Customer::from))
}

pub async fn find_by_code(conn: &mut SqliteConnection, code: &str) -> DbResult<Option<Customer>> {
    let row = sqlx::query_as::<_, CustomerRow>(&format!("{SELECT_CUSTOMER} WHERE code = ?1"))
        .bind(code.trim().to_uppercase())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Customer::from))
}

pub async fn insert(conn: &mut SqliteConnection, customer: &Customer) -> DbResult<()> {
    debug!(id = %customer.id(), code = %customer.code(), "Inserting customer");

    let details = customer.details();
    let audit = customer.audit();
    sqlx::query(
        r#"
        INSERT INTO customers (
            id, code, full_name, phone, address, village, is_active,
            created_at, created_by, updated_at, updated_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(customer.id())
    .bind(customer.code())
    .bind(&details.full_name)
    .bind(&details.phone)
    .bind(&details.address)
    .bind(&details.village)
    .bind(customer.is_active())
    .bind(audit.created_at)
    .bind(&audit.created_by)
    .bind(audit.updated_at)
    .bind(&audit.updated_by)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { field, .. } => DbError::duplicate(field, customer.code()),
        other => other,
    })?;

    Ok(())
}

/// Writes contact details, active flag and audit columns.
pub async fn update(conn: &mut SqliteConnection, customer: &Customer) -> DbResult<()> {
    debug!(id = %customer.id(), "Updating customer");

    let details = customer.details();
    let audit = customer.audit();
    let result = sqlx::query(
        r#"
        UPDATE customers SET
            full_name = ?2,
            phone = ?3,
            address = ?4,
            village = ?5,
            is_active = ?6,
            updated_at = ?7,
            updated_by = ?8
        WHERE id = ?1
        "#,
    )
    .bind(customer.id())
    .bind(&details.full_name)
    .bind(&details.phone)
    .bind(&details.address)
    .bind(&details.village)
    .bind(customer.is_active())
    .bind(audit.updated_at)
    .bind(&audit.updated_by)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Customer", customer.id()));
    }
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Read access to customers over the pool.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        find(&mut conn, id).await
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        find_by_code(&mut conn, code).await
    }

    /// All customers by code, optionally only active ones.
    pub async fn list(&self, active_only: bool) -> DbResult<Vec<Customer>> {
        let rows = sqlx::query_as::<_, CustomerRow>(&format!(
            "{SELECT_CUSTOMER} WHERE (?1 = 0 OR is_active = 1) ORDER BY code"
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Customer::from).collect())
    }

    /// Case-insensitive substring match on name or code.
    pub async fn search(&self, term: &str, limit: u32) -> DbResult<Vec<Customer>> {
        let pattern = format!("%{}%", term.trim());
        let rows = sqlx::query_as::<_, CustomerRow>(&format!(
            "{SELECT_CUSTOMER} WHERE full_name LIKE ?1 OR code LIKE ?1 ORDER BY full_name LIMIT ?2"
        ))
        .bind(pattern)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Customer::from).collect())
    }

    pub async fn code_exists(&self, code: &str) -> DbResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM customers WHERE code = ?1)")
                .bind(code.trim().to_uppercase())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
