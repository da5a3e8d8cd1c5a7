//! # Product Repository
//!
//! Database operations for products, their stock level, and purchases.
//!
//! ## Stock Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  current_stock is written as an absolute value computed by the     │
//! │  domain (Product::increase_stock / decrease_stock) while the       │
//! │  caller holds the product lock, in the same transaction as the     │
//! │  purchase or sale row that caused the change.                      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use dairy_core::{Currency, Money, Product, ProductDetails, ProductPurchase, Quantity};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use super::{parse_decimal, AuditColumns};
use crate::error::{DbError, DbResult};

const SELECT_PRODUCT: &str = r#"
    SELECT id, code, name, description, unit, currency, unit_price, reorder_level,
           current_stock, is_active, created_at, created_by, updated_at, updated_by
    FROM products
"#;

const SELECT_PURCHASE: &str = r#"
    SELECT id, product_id, purchased_at, quantity, unit, currency, unit_price,
           total_amount, supplier_name, invoice_number, notes,
           created_at, created_by, updated_at, updated_by
    FROM product_purchases
"#;

#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    code: String,
    name: String,
    description: Option<String>,
    unit: String,
    currency: Currency,
    unit_price: String,
    reorder_level: String,
    current_stock: String,
    is_active: bool,
    #[sqlx(flatten)]
    audit: AuditColumns,
}

impl ProductRow {
    fn into_domain(self) -> DbResult<Product> {
        Ok(Product::restore(
            self.id,
            self.code,
            self.unit,
            self.currency,
            ProductDetails {
                name: self.name,
                description: self.description,
                unit_price: parse_decimal("products.unit_price", &self.unit_price)?,
                reorder_level: parse_decimal("products.reorder_level", &self.reorder_level)?,
            },
            parse_decimal("products.current_stock", &self.current_stock)?,
            self.is_active,
            self.audit.into(),
        ))
    }
}

#[derive(Debug, FromRow)]
struct PurchaseRow {
    id: String,
    product_id: String,
    purchased_at: chrono::DateTime<chrono::Utc>,
    quantity: String,
    unit: String,
    currency: Currency,
    unit_price: String,
    total_amount: String,
    supplier_name: Option<String>,
    invoice_number: Option<String>,
    notes: Option<String>,
    #[sqlx(flatten)]
    audit: AuditColumns,
}

impl PurchaseRow {
    fn into_domain(self) -> DbResult<ProductPurchase> {
        let quantity = parse_decimal("product_purchases.quantity", &self.quantity)?;
        let unit_price = parse_decimal("product_purchases.unit_price", &self.unit_price)?;
        let total = parse_decimal("product_purchases.total_amount", &self.total_amount)?;
        Ok(ProductPurchase {
            id: self.id,
            product_id: self.product_id,
            purchased_at: self.purchased_at,
            quantity: Quantity::create(quantity, &self.unit)?,
            unit_price: Money::from_amount(unit_price, self.currency)?,
            total_amount: Money::from_amount(total, self.currency)?,
            supplier_name: self.supplier_name,
            invoice_number: self.invoice_number,
            notes: self.notes,
            audit: self.audit.into(),
        })
    }
}

fn collect<R, T>(rows: Vec<R>, convert: impl Fn(R) -> DbResult<T>) -> DbResult<Vec<T>> {
    rows.into_iter().map(convert).collect()
}

// =============================================================================
// Connection-level operations
// =============================================================================

pub async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let row = sqlx::query_as::<_, ProductRow>(&format!("{SELECT_PRODUCT} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(ProductRow::into_domain).transpose()
}

pub async fn find_by_code(conn: &mut SqliteConnection, code: &str) -> DbResult<Option<Product>> {
    let row = sqlx::query_as::<_, ProductRow>(&format!("{SELECT_PRODUCT} WHERE code = ?1"))
        .bind(code.trim().to_uppercase())
        .fetch_optional(&mut *conn)
        .await?;
    row.map(ProductRow::into_domain).transpose()
}

pub async fn insert(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    debug!(id = %product.id(), code = %product.code(), "Inserting product");

    let details = product.details();
    let audit = product.audit();
    sqlx::query(
        r#"
        INSERT INTO products (
            id, code, name, description, unit, currency, unit_price, reorder_level,
            current_stock, is_active, created_at, created_by, updated_at, updated_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(product.id())
    .bind(product.code())
    .bind(&details.name)
    .bind(&details.description)
    .bind(product.unit())
    .bind(product.currency())
    .bind(details.unit_price.to_string())
    .bind(details.reorder_level.to_string())
    .bind(product.current_stock().value().to_string())
    .bind(product.is_active())
    .bind(audit.created_at)
    .bind(&audit.created_by)
    .bind(audit.updated_at)
    .bind(&audit.updated_by)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { field, .. } => DbError::duplicate(field, product.code()),
        other => other,
    })?;

    Ok(())
}

/// Writes name, description, price, reorder level, active flag and audit
/// columns. Stock is left alone.
pub async fn update_details(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    debug!(id = %product.id(), "Updating product details");

    let details = product.details();
    let audit = product.audit();
    let result = sqlx::query(
        r#"
        UPDATE products SET
            name = ?2,
            description = ?3,
            unit_price = ?4,
            reorder_level = ?5,
            is_active = ?6,
            updated_at = ?7,
            updated_by = ?8
        WHERE id = ?1
        "#,
    )
    .bind(product.id())
    .bind(&details.name)
    .bind(&details.description)
    .bind(details.unit_price.to_string())
    .bind(details.reorder_level.to_string())
    .bind(product.is_active())
    .bind(audit.updated_at)
    .bind(&audit.updated_by)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", product.id()));
    }
    Ok(())
}

/// Writes the product's current stock and audit columns.
pub async fn update_stock(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    let stock = product.current_stock().value();
    debug!(id = %product.id(), stock = %stock, "Updating stock");

    let audit = product.audit();
    let result = sqlx::query(
        r#"
        UPDATE products SET
            current_stock = ?2,
            updated_at = ?3,
            updated_by = ?4
        WHERE id = ?1
        "#,
    )
    .bind(product.id())
    .bind(stock.to_string())
    .bind(audit.updated_at)
    .bind(&audit.updated_by)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", product.id()));
    }
    Ok(())
}

pub async fn insert_purchase(
    conn: &mut SqliteConnection,
    purchase: &ProductPurchase,
) -> DbResult<()> {
    debug!(
        id = %purchase.id,
        product_id = %purchase.product_id,
        quantity = %purchase.quantity,
        "Inserting purchase"
    );

    sqlx::query(
        r#"
        INSERT INTO product_purchases (
            id, product_id, purchased_at, quantity, unit, currency, unit_price,
            total_amount, supplier_name, invoice_number, notes,
            created_at, created_by, updated_at, updated_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
    )
    .bind(&purchase.id)
    .bind(&purchase.product_id)
    .bind(purchase.purchased_at)
    .bind(purchase.quantity.value().to_string())
    .bind(purchase.quantity.unit())
    .bind(purchase.unit_price.currency())
    .bind(purchase.unit_price.amount().to_string())
    .bind(purchase.total_amount.amount().to_string())
    .bind(&purchase.supplier_name)
    .bind(&purchase.invoice_number)
    .bind(&purchase.notes)
    .bind(purchase.audit.created_at)
    .bind(&purchase.audit.created_by)
    .bind(purchase.audit.updated_at)
    .bind(&purchase.audit.updated_by)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Read access to products and purchases over the pool.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        find(&mut conn, id).await
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        find_by_code(&mut conn, code).await
    }

    /// All products by code, optionally only active ones.
    pub async fn list(&self, active_only: bool) -> DbResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "{SELECT_PRODUCT} WHERE (?1 = 0 OR is_active = 1) ORDER BY code"
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        collect(rows, ProductRow::into_domain)
    }

    /// Purchases of one product, newest first.
    pub async fn list_purchases(&self, product_id: &str) -> DbResult<Vec<ProductPurchase>> {
        let rows = sqlx::query_as::<_, PurchaseRow>(&format!(
            "{SELECT_PURCHASE} WHERE product_id = ?1 ORDER BY purchased_at DESC, rowid DESC"
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        collect(rows, PurchaseRow::into_domain)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
