//! # Product Service
//!
//! Product registry plus the purchase side of the stock ledger. The sale
//! side lives in the cycle service because every sale belongs to a cycle.

use chrono::{DateTime, Utc};
use dairy_core::stock::record_purchase;
use dairy_core::{
    Actor, Currency, Product, ProductDetails, ProductPurchase, PurchaseInput, Quantity,
};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use super::required;
use crate::error::DbResult;
use crate::repository::product as repo;
use crate::transaction::run_in_transaction;
use crate::Database;

/// Product registry and stock operations.
#[derive(Debug, Clone)]
pub struct ProductService {
    db: Database,
}

impl ProductService {
    pub fn new(db: Database) -> Self {
        ProductService { db }
    }

    /// Registers a product with zero stock.
    pub async fn create(
        &self,
        code: &str,
        unit: &str,
        currency: Currency,
        details: ProductDetails,
        actor: &Actor,
    ) -> DbResult<Product> {
        debug!(code = %code, "Creating product");

        let product = Product::create(code, unit, currency, details, actor, self.db.clock().now())?;
        let mut conn = self.db.pool().acquire().await?;
        repo::insert(&mut conn, &product).await?;

        info!(id = %product.id(), code = %product.code(), "Product created");
        Ok(product)
    }

    /// Replaces name, description, price and reorder level. Stock is untouched.
    pub async fn update(
        &self,
        id: &str,
        details: ProductDetails,
        actor: &Actor,
    ) -> DbResult<Product> {
        let mut conn = self.db.pool().acquire().await?;
        let mut product = required("Product", id, repo::find(&mut conn, id).await?)?;
        product.update(details, actor, self.db.clock().now())?;
        repo::update_details(&mut conn, &product).await?;

        debug!(id = %id, "Product updated");
        Ok(product)
    }

    pub async fn deactivate(&self, id: &str, actor: &Actor) -> DbResult<Product> {
        let mut conn = self.db.pool().acquire().await?;
        let mut product = required("Product", id, repo::find(&mut conn, id).await?)?;
        product.deactivate(actor, self.db.clock().now());
        repo::update_details(&mut conn, &product).await?;

        info!(id = %id, "Product deactivated");
        Ok(product)
    }

    pub async fn activate(&self, id: &str, actor: &Actor) -> DbResult<Product> {
        let mut conn = self.db.pool().acquire().await?;
        let mut product = required("Product", id, repo::find(&mut conn, id).await?)?;
        product.activate(actor, self.db.clock().now());
        repo::update_details(&mut conn, &product).await?;

        info!(id = %id, "Product activated");
        Ok(product)
    }

    pub async fn get(&self, id: &str) -> DbResult<Product> {
        required("Product", id, self.db.product_repo().get_by_id(id).await?)
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Product> {
        required("Product", code, self.db.product_repo().get_by_code(code).await?)
    }

    pub async fn list(&self, active_only: bool) -> DbResult<Vec<Product>> {
        self.db.product_repo().list(active_only).await
    }

    // =========================================================================
    // Stock
    // =========================================================================

    /// Records a purchase and raises the product's stock in one transaction.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown product
    /// - `Validation(..)` for a non-positive quantity or negative price
    pub async fn record_purchase(
        &self,
        product_id: &str,
        input: PurchaseInput,
        actor: &Actor,
    ) -> DbResult<ProductPurchase> {
        debug!(product_id = %product_id, quantity = %input.quantity, "Recording purchase");

        let guard = self.db.locks().product(product_id).await;
        let now = self.db.clock().now();
        let actor = actor.clone();
        let product_id = product_id.to_string();

        let purchase = run_in_transaction(
            self.db.pool(),
            "record_purchase",
            vec![guard],
            move |mut tx| async move {
                let result = purchase_in(&mut tx, &product_id, input, &actor, now).await;
                (tx, result)
            },
        )
        .await?;

        info!(
            id = %purchase.id,
            product_id = %purchase.product_id,
            quantity = %purchase.quantity,
            total = %purchase.total_amount,
            "Purchase recorded"
        );
        Ok(purchase)
    }

    pub async fn current_stock(&self, product_id: &str) -> DbResult<Quantity> {
        Ok(self.get(product_id).await?.current_stock())
    }

    /// `false` for an unknown product.
    pub async fn check_stock_availability(
        &self,
        product_id: &str,
        required_qty: Decimal,
    ) -> DbResult<bool> {
        Ok(self
            .db
            .product_repo()
            .get_by_id(product_id)
            .await?
            .is_some_and(|p| p.has_sufficient_stock(required_qty)))
    }

    /// Active products at or below their reorder level.
    pub async fn products_needing_reorder(&self) -> DbResult<Vec<Product>> {
        let products = self.db.product_repo().list(true).await?;
        Ok(products.into_iter().filter(Product::needs_reorder).collect())
    }

    /// Purchases of one product, newest first.
    pub async fn list_purchases(&self, product_id: &str) -> DbResult<Vec<ProductPurchase>> {
        self.db.product_repo().list_purchases(product_id).await
    }
}

/// Reloads the product, applies the purchase and writes both rows.
async fn purchase_in(
    conn: &mut SqliteConnection,
    product_id: &str,
    input: PurchaseInput,
    actor: &Actor,
    now: DateTime<Utc>,
) -> DbResult<ProductPurchase> {
    let mut product = required("Product", product_id, repo::find(conn, product_id).await?)?;
    let purchase = record_purchase(&mut product, input, actor, now)?;
    repo::insert_purchase(conn, &purchase).await?;
    repo::update_stock(conn, &product).await?;
    Ok(purchase)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::service::tests::{actor, test_db};
    use dairy_core::{CoreError, StockStatus, ValidationError};
    use rust_decimal_macros::dec;

    pub(crate) fn feed_details(price: Decimal, reorder: Decimal) -> ProductDetails {
        ProductDetails {
            name: "Cattle Feed".to_string(),
            description: None,
            unit_price: price,
            reorder_level: reorder,
        }
    }

    pub(crate) fn purchase(quantity: Decimal, unit_price: Decimal) -> PurchaseInput {
        PurchaseInput {
            quantity,
            unit_price,
            ..Default::default()
        }
    }

    pub(crate) async fn stocked_feed(db: &Database, stock: Decimal) -> Product {
        let product = db
            .products()
            .create("FEED", "bag", Currency::Inr, feed_details(dec!(100), dec!(5)), &actor())
            .await
            .unwrap();
        db.products()
            .record_purchase(product.id(), purchase(stock, dec!(80)), &actor())
            .await
            .unwrap();
        db.products().get(product.id()).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_starts_empty() {
        let db = test_db(1).await;
        let product = db
            .products()
            .create("feed", "bag", Currency::Inr, feed_details(dec!(1200), dec!(5)), &actor())
            .await
            .unwrap();

        assert_eq!(product.code(), "FEED");
        assert_eq!(product.unit(), "BAG");
        assert!(product.current_stock().is_zero());
        assert_eq!(product.stock_status(), StockStatus::OutOfStock);

        let stored = db.products().get_by_code("FEED").await.unwrap();
        assert_eq!(stored, product);
    }

    #[tokio::test]
    async fn test_purchase_updates_stock_and_history() {
        let db = test_db(1).await;
        let product = stocked_feed(&db, dec!(20)).await;
        assert_eq!(product.current_stock().value(), dec!(20));

        db.products()
            .record_purchase(
                product.id(),
                PurchaseInput {
                    supplier_name: Some("Godrej Agrovet".to_string()),
                    invoice_number: Some("INV-77".to_string()),
                    ..purchase(dec!(2.5), dec!(90))
                },
                &actor(),
            )
            .await
            .unwrap();

        let stock = db.products().current_stock(product.id()).await.unwrap();
        assert_eq!(stock.value(), dec!(22.5));
        assert_eq!(stock.unit(), "BAG");

        let history = db.products().list_purchases(product.id()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].total_amount.amount() + history[1].total_amount.amount(), dec!(1825));
        assert!(history.iter().any(|p| p.supplier_name.as_deref() == Some("Godrej Agrovet")));
    }

    #[tokio::test]
    async fn test_invalid_purchase_writes_nothing() {
        let db = test_db(1).await;
        let product = stocked_feed(&db, dec!(10)).await;

        let err = db
            .products()
            .record_purchase(product.id(), purchase(dec!(0), dec!(80)), &actor())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::Validation(ValidationError::MustBePositive { .. }))
        ));

        assert_eq!(
            db.products().current_stock(product.id()).await.unwrap().value(),
            dec!(10)
        );
        assert_eq!(db.products().list_purchases(product.id()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overflowing_purchase_is_a_validation_error() {
        let db = test_db(1).await;
        let product = stocked_feed(&db, dec!(10)).await;
        let trillion = Decimal::from(1_000_000_000_000_000_i64);

        let err = db
            .products()
            .record_purchase(product.id(), purchase(trillion, trillion), &actor())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));

        assert_eq!(
            db.products().current_stock(product.id()).await.unwrap().value(),
            dec!(10)
        );
        assert_eq!(db.products().list_purchases(product.id()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_purchase_unknown_product() {
        let db = test_db(1).await;
        let err = db
            .products()
            .record_purchase("missing", purchase(dec!(1), dec!(1)), &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_stock_availability() {
        let db = test_db(1).await;
        let product = stocked_feed(&db, dec!(10)).await;
        let service = db.products();

        assert!(service.check_stock_availability(product.id(), dec!(10)).await.unwrap());
        assert!(!service.check_stock_availability(product.id(), dec!(10.01)).await.unwrap());
        assert!(!service.check_stock_availability("missing", dec!(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_products_needing_reorder() {
        let db = test_db(1).await;
        let low = stocked_feed(&db, dec!(5)).await;
        let healthy = db
            .products()
            .create("MINERAL", "kg", Currency::Inr, feed_details(dec!(90), dec!(2)), &actor())
            .await
            .unwrap();
        db.products()
            .record_purchase(healthy.id(), purchase(dec!(50), dec!(70)), &actor())
            .await
            .unwrap();

        let reorder = db.products().products_needing_reorder().await.unwrap();
        assert_eq!(reorder.len(), 1);
        assert_eq!(reorder[0].id(), low.id());

        db.products().deactivate(low.id(), &actor()).await.unwrap();
        assert!(db.products().products_needing_reorder().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_stock() {
        let db = test_db(1).await;
        let product = stocked_feed(&db, dec!(7)).await;

        let updated = db
            .products()
            .update(product.id(), feed_details(dec!(1250), dec!(3)), &actor())
            .await
            .unwrap();

        assert_eq!(updated.unit_price().amount(), dec!(1250));
        assert_eq!(
            db.products().current_stock(product.id()).await.unwrap().value(),
            dec!(7)
        );
    }
}
