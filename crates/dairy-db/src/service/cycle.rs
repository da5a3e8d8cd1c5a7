//! # Milk Cycle Service
//!
//! Opens cycles and records everything that accumulates in them until
//! settlement: milk earnings, product sales and advances.
//!
//! ## Locking
//! ```text
//! set_milk_amount / update_notes / record_advance   cycle:<id>
//! record_sale                                       cycle:<id> → product:<id>
//! ```
//! Settlement takes the same cycle lock, so nothing can slip into a cycle
//! between the settlement's read and its commit.

use chrono::{DateTime, NaiveDate, Utc};
use dairy_core::{
    Actor, AdvanceInput, AdvancePayment, CoreError, Currency, DateRange, MilkCycle,
    MilkCycleHeader, ProductSale, SaleInput,
};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use super::required;
use crate::error::DbResult;
use crate::repository::{customer as customer_repo, cycle as repo, product as product_repo};
use crate::transaction::run_in_transaction;
use crate::Database;

/// Milk cycle operations.
#[derive(Debug, Clone)]
pub struct CycleService {
    db: Database,
}

impl CycleService {
    pub fn new(db: Database) -> Self {
        CycleService { db }
    }

    /// Opens a cycle for an active customer.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown customer
    /// - `InvalidState` for an inactive customer
    pub async fn create(
        &self,
        customer_id: &str,
        period: DateRange,
        currency: Currency,
        actor: &Actor,
    ) -> DbResult<MilkCycle> {
        debug!(customer_id = %customer_id, period = %period, "Creating cycle");

        let mut conn = self.db.pool().acquire().await?;
        let customer = required(
            "Customer",
            customer_id,
            customer_repo::find(&mut conn, customer_id).await?,
        )?;
        if !customer.can_create_new_cycle() {
            return Err(CoreError::invalid_state(
                "Customer",
                customer_id,
                "inactive customers cannot start a new cycle",
            )
            .into());
        }

        let cycle = MilkCycle::create(customer.id(), period, currency, actor, self.db.clock().now())?;
        repo::insert(&mut conn, &cycle).await?;

        info!(id = %cycle.id(), customer = %customer.code(), period = %period, "Cycle opened");
        Ok(cycle)
    }

    /// Opens a standard 10-day cycle starting at `start`.
    pub async fn create_ten_day(
        &self,
        customer_id: &str,
        start: NaiveDate,
        currency: Currency,
        actor: &Actor,
    ) -> DbResult<MilkCycle> {
        let period = DateRange::ten_day_cycle(start)?;
        self.create(customer_id, period, currency, actor).await
    }

    /// Loads a cycle with its sales and advances.
    pub async fn get(&self, id: &str) -> DbResult<MilkCycle> {
        required("MilkCycle", id, self.db.cycle_repo().get_by_id(id).await?)
    }

    /// Cycle headers, newest start date first.
    pub async fn list(
        &self,
        customer_id: Option<&str>,
        unsettled_only: bool,
    ) -> DbResult<Vec<MilkCycleHeader>> {
        self.db.cycle_repo().list_headers(customer_id, unsettled_only).await
    }

    pub async fn set_milk_amount(
        &self,
        id: &str,
        amount: Decimal,
        actor: &Actor,
    ) -> DbResult<MilkCycle> {
        let cycle = self
            .edit_header(id, "set_milk_amount", actor, move |cycle, actor, now| {
                cycle.set_milk_amount(amount, actor, now)
            })
            .await?;

        info!(id = %id, amount = %amount, "Milk amount recorded");
        Ok(cycle)
    }

    pub async fn update_notes(
        &self,
        id: &str,
        notes: Option<&str>,
        actor: &Actor,
    ) -> DbResult<MilkCycle> {
        let notes = notes.map(str::to_string);
        self.edit_header(id, "update_notes", actor, move |cycle, actor, now| {
            cycle.update_notes(notes.as_deref(), actor, now)
        })
        .await
    }

    async fn edit_header<F>(
        &self,
        id: &str,
        operation: &'static str,
        actor: &Actor,
        edit: F,
    ) -> DbResult<MilkCycle>
    where
        F: FnOnce(&mut MilkCycle, &Actor, DateTime<Utc>) -> Result<(), CoreError> + Send + 'static,
    {
        let guard = self.db.locks().cycle(id).await;
        let now = self.db.clock().now();
        let actor = actor.clone();
        let id = id.to_string();

        run_in_transaction(self.db.pool(), operation, vec![guard], move |mut tx| async move {
            let result = edit_header_in(&mut tx, &id, &actor, now, edit).await;
            (tx, result)
        })
        .await
    }

    /// Sells a product against the cycle and lowers its stock, atomically.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown cycle or product
    /// - `InvalidState` if the cycle is settled
    /// - `Validation(Mismatch)` if the sale is for another customer
    /// - `InsufficientStock` if the product can't cover the quantity
    ///
    /// Nothing is written on error.
    pub async fn record_sale(
        &self,
        cycle_id: &str,
        product_id: &str,
        input: SaleInput,
        actor: &Actor,
    ) -> DbResult<ProductSale> {
        debug!(cycle_id = %cycle_id, product_id = %product_id, quantity = %input.quantity, "Recording sale");

        let cycle_guard = self.db.locks().cycle(cycle_id).await;
        let product_guard = self.db.locks().product(product_id).await;
        let now = self.db.clock().now();
        let actor = actor.clone();
        let (cycle_id, product_id) = (cycle_id.to_string(), product_id.to_string());

        let sale = run_in_transaction(
            self.db.pool(),
            "record_sale",
            vec![cycle_guard, product_guard],
            move |mut tx| async move {
                let result = sale_in(&mut tx, &cycle_id, &product_id, input, &actor, now).await;
                (tx, result)
            },
        )
        .await?;

        info!(
            id = %sale.id,
            cycle_id = %sale.cycle_id,
            product = %sale.product_name,
            quantity = %sale.quantity,
            total = %sale.total_amount,
            "Sale recorded"
        );
        Ok(sale)
    }

    /// Records an advance paid to the cycle's customer.
    pub async fn record_advance(
        &self,
        cycle_id: &str,
        input: AdvanceInput,
        actor: &Actor,
    ) -> DbResult<AdvancePayment> {
        debug!(cycle_id = %cycle_id, amount = %input.amount, "Recording advance");

        let guard = self.db.locks().cycle(cycle_id).await;
        let now = self.db.clock().now();
        let actor = actor.clone();
        let cycle_id = cycle_id.to_string();

        let advance = run_in_transaction(
            self.db.pool(),
            "record_advance",
            vec![guard],
            move |mut tx| async move {
                let result = advance_in(&mut tx, &cycle_id, input, &actor, now).await;
                (tx, result)
            },
        )
        .await?;

        info!(
            id = %advance.id,
            cycle_id = %advance.cycle_id,
            amount = %advance.amount,
            mode = %advance.payment_mode,
            "Advance recorded"
        );
        Ok(advance)
    }
}

// =============================================================================
// Transaction bodies
// =============================================================================

async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<MilkCycle> {
    required("MilkCycle", id, repo::find(conn, id).await?)
}

async fn edit_header_in<F>(
    conn: &mut SqliteConnection,
    id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
    edit: F,
) -> DbResult<MilkCycle>
where
    F: FnOnce(&mut MilkCycle, &Actor, DateTime<Utc>) -> Result<(), CoreError>,
{
    let mut cycle = load(conn, id).await?;
    edit(&mut cycle, actor, now)?;
    repo::update_open_header(conn, cycle.header()).await?;
    Ok(cycle)
}

async fn sale_in(
    conn: &mut SqliteConnection,
    cycle_id: &str,
    product_id: &str,
    input: SaleInput,
    actor: &Actor,
    now: DateTime<Utc>,
) -> DbResult<ProductSale> {
    let mut cycle = load(conn, cycle_id).await?;
    let mut product = required(
        "Product",
        product_id,
        product_repo::find(conn, product_id).await?,
    )?;

    let sale = cycle.record_product_sale(&mut product, input, actor, now)?;
    repo::insert_sale(conn, &sale).await?;
    product_repo::update_stock(conn, &product).await?;
    Ok(sale)
}

async fn advance_in(
    conn: &mut SqliteConnection,
    cycle_id: &str,
    input: AdvanceInput,
    actor: &Actor,
    now: DateTime<Utc>,
) -> DbResult<AdvancePayment> {
    let mut cycle = load(conn, cycle_id).await?;
    let advance = cycle.record_advance_payment(input, actor, now)?;
    repo::insert_advance(conn, &advance).await?;
    Ok(advance)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::service::product::tests::stocked_feed;
    use crate::service::tests::{actor, file_db, noon, test_db};
    use dairy_core::{CustomerDetails, CycleState, PaymentMode, ValidationError};
    use rust_decimal_macros::dec;

    pub(crate) fn jan(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    pub(crate) async fn open_cycle(db: &Database, code: &str) -> MilkCycle {
        let customer = db
            .customers()
            .create(code, CustomerDetails::named("Ramesh Kumar"), &actor())
            .await
            .unwrap();
        db.cycles()
            .create_ten_day(customer.id(), jan(1), Currency::Inr, &actor())
            .await
            .unwrap()
    }

    pub(crate) fn sale(customer_id: &str, quantity: Decimal) -> SaleInput {
        SaleInput {
            customer_id: customer_id.to_string(),
            quantity,
            unit_price: None,
            notes: None,
        }
    }

    pub(crate) fn cash(customer_id: &str, amount: Decimal) -> AdvanceInput {
        AdvanceInput {
            customer_id: customer_id.to_string(),
            amount,
            payment_mode: PaymentMode::Cash,
            reference_number: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_create_ten_day_cycle() {
        let db = test_db(1).await;
        let cycle = open_cycle(&db, "C001").await;

        assert_eq!(cycle.period().start(), jan(1));
        assert_eq!(cycle.period().end(), jan(10));
        assert_eq!(cycle.state(), CycleState::Open);

        let stored = db.cycles().get(cycle.id()).await.unwrap();
        assert_eq!(stored.header(), cycle.header());
    }

    #[tokio::test]
    async fn test_inactive_customer_cannot_open_cycle() {
        let db = test_db(1).await;
        let customer = db
            .customers()
            .create("C009", CustomerDetails::named("Inactive"), &actor())
            .await
            .unwrap();
        db.customers().deactivate(customer.id(), &actor()).await.unwrap();

        let err = db
            .cycles()
            .create_ten_day(customer.id(), jan(1), Currency::Inr, &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InvalidState { .. })));

        let err = db
            .cycles()
            .create_ten_day("missing", jan(1), Currency::Inr, &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_milk_amount_and_notes() {
        let db = test_db(3).await;
        let cycle = open_cycle(&db, "C001").await;

        db.cycles()
            .set_milk_amount(cycle.id(), dec!(4520.50), &actor())
            .await
            .unwrap();
        let updated = db
            .cycles()
            .update_notes(cycle.id(), Some("morning + evening"), &actor())
            .await
            .unwrap();

        assert_eq!(updated.total_milk_amount().amount(), dec!(4520.50));

        let stored = db.cycles().get(cycle.id()).await.unwrap();
        assert_eq!(stored.total_milk_amount().amount(), dec!(4520.50));
        assert_eq!(stored.notes(), Some("morning + evening"));
        assert_eq!(stored.header().audit.updated_at, Some(noon(3)));

        let err = db
            .cycles()
            .set_milk_amount(cycle.id(), dec!(-1), &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_sale_decrements_stock() {
        let db = test_db(2).await;
        let cycle = open_cycle(&db, "C001").await;
        let product = stocked_feed(&db, dec!(10)).await;

        let recorded = db
            .cycles()
            .record_sale(cycle.id(), product.id(), sale(cycle.customer_id(), dec!(3)), &actor())
            .await
            .unwrap();
        assert_eq!(recorded.total_amount.amount(), dec!(300));
        assert_eq!(recorded.product_name, "Cattle Feed");

        let stock = db.products().current_stock(product.id()).await.unwrap();
        assert_eq!(stock.value(), dec!(7));

        let stored = db.cycles().get(cycle.id()).await.unwrap();
        assert_eq!(stored.sales().len(), 1);
        assert_eq!(stored.total_product_sales().amount(), dec!(300));
    }

    #[tokio::test]
    async fn test_insufficient_stock_writes_nothing() {
        let db = test_db(2).await;
        let cycle = open_cycle(&db, "C001").await;
        let product = stocked_feed(&db, dec!(2)).await;

        let err = db
            .cycles()
            .record_sale(cycle.id(), product.id(), sale(cycle.customer_id(), dec!(2.01)), &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InsufficientStock { .. })));

        assert_eq!(
            db.products().current_stock(product.id()).await.unwrap().value(),
            dec!(2)
        );
        assert!(db.cycles().get(cycle.id()).await.unwrap().sales().is_empty());

        db.cycles()
            .record_sale(cycle.id(), product.id(), sale(cycle.customer_id(), dec!(2)), &actor())
            .await
            .unwrap();
        assert!(db.products().current_stock(product.id()).await.unwrap().is_zero());
    }

    #[tokio::test]
    async fn test_sale_for_other_customer_rejected() {
        let db = test_db(2).await;
        let cycle = open_cycle(&db, "C001").await;
        let product = stocked_feed(&db, dec!(10)).await;

        let err = db
            .cycles()
            .record_sale(cycle.id(), product.id(), sale("someone-else", dec!(1)), &actor())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::Validation(ValidationError::Mismatch { .. }))
        ));
        assert_eq!(
            db.products().current_stock(product.id()).await.unwrap().value(),
            dec!(10)
        );
    }

    #[tokio::test]
    async fn test_advances_keep_recording_order() {
        let db = test_db(4).await;
        let cycle = open_cycle(&db, "C001").await;

        db.cycles()
            .record_advance(cycle.id(), cash(cycle.customer_id(), dec!(200)), &actor())
            .await
            .unwrap();
        db.cycles()
            .record_advance(
                cycle.id(),
                AdvanceInput {
                    payment_mode: PaymentMode::Upi,
                    reference_number: Some("UPI-123".to_string()),
                    ..cash(cycle.customer_id(), dec!(50))
                },
                &actor(),
            )
            .await
            .unwrap();

        let stored = db.cycles().get(cycle.id()).await.unwrap();
        let amounts: Vec<_> = stored.advances().iter().map(|a| a.amount.amount()).collect();
        assert_eq!(amounts, vec![dec!(200), dec!(50)]);
        assert_eq!(stored.advances()[1].payment_mode, PaymentMode::Upi);
        assert_eq!(stored.total_advances().amount(), dec!(250));
    }

    #[tokio::test]
    async fn test_upi_advance_requires_reference() {
        let db = test_db(4).await;
        let cycle = open_cycle(&db, "C001").await;

        let err = db
            .cycles()
            .record_advance(
                cycle.id(),
                AdvanceInput {
                    payment_mode: PaymentMode::Upi,
                    ..cash(cycle.customer_id(), dec!(50))
                },
                &actor(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::Validation(_))));
        assert!(db.cycles().get(cycle.id()).await.unwrap().advances().is_empty());
    }

    #[tokio::test]
    async fn test_list_unsettled() {
        let db = test_db(1).await;
        let first = open_cycle(&db, "C001").await;
        let later = db
            .cycles()
            .create_ten_day(first.customer_id(), jan(11), Currency::Inr, &actor())
            .await
            .unwrap();

        let headers = db.cycles().list(Some(first.customer_id()), true).await.unwrap();
        let ids: Vec<_> = headers.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec![later.id(), first.id()]);

        assert!(db.cycles().list(Some("nobody"), false).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_to_different_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let db = file_db(&dir, 5).await;

        let mut cycles = Vec::new();
        for i in 0..8 {
            cycles.push(open_cycle(&db, &format!("C{i:03}")).await);
        }

        let mut tasks = Vec::new();
        for _ in 0..20 {
            for cycle in &cycles {
                let db = db.clone();
                let cycle_id = cycle.id().to_string();
                let customer_id = cycle.customer_id().to_string();
                tasks.push(tokio::spawn(async move {
                    db.cycles()
                        .record_advance(&cycle_id, cash(&customer_id, dec!(10)), &actor())
                        .await
                }));
            }
        }

        let mut failures = Vec::new();
        for task in tasks {
            if let Err(err) = task.await.unwrap() {
                failures.push(err.to_string());
            }
        }
        assert!(failures.is_empty(), "failed writes: {failures:?}");

        for cycle in &cycles {
            let stored = db.cycles().get(cycle.id()).await.unwrap();
            assert_eq!(stored.advances().len(), 20);
            assert_eq!(stored.total_advances().amount(), dec!(200));
        }
        db.close().await;
    }
}
