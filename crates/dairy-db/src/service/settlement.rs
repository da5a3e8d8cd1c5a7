//! # Settlement Service
//!
//! Closes a milk cycle into a settlement and tracks its payout.
//!
//! ## Settlement Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  create(cycle_id, mode)                                                 │
//! │       │                                                                 │
//! │       ├── lock cycle:<id>                                               │
//! │       ▼                                                                 │
//! │  ┌──────────────────── one transaction ───────────────────────┐         │
//! │  │ reload cycle + sales + advances                            │         │
//! │  │ settle()              (InvalidState / Validation: abort)   │         │
//! │  │ validate_calculation  (Consistency: error!, abort)         │         │
//! │  │ INSERT settlement + details                                │         │
//! │  │ UPDATE cycle SET is_settled = 1                            │         │
//! │  └────────────────────────────────────────────────────────────┘         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT: both rows exist   /   ROLLBACK: neither exists                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use dairy_core::settlement::{preview, settle};
use dairy_core::{format_settlement_receipt, Actor, ReceiptHeader, Settlement, SettlementPreview};
use sqlx::SqliteConnection;
use tracing::{debug, error, info};

use super::required;
use crate::error::{DbError, DbResult};
use crate::repository::{cycle as cycle_repo, settlement as repo};
use crate::transaction::run_in_transaction;
use crate::Database;

/// Settlement operations.
#[derive(Debug, Clone)]
pub struct SettlementService {
    db: Database,
}

impl SettlementService {
    pub fn new(db: Database) -> Self {
        SettlementService { db }
    }

    /// Settles a cycle: writes the settlement with its ledger lines and
    /// marks the cycle settled, all or nothing.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown cycle
    /// - `InvalidState` if the cycle is settled or has no milk amount
    /// - `Validation(NotAllowed)` for an unknown payment mode
    /// - `Consistency` if the computed figures don't add up
    pub async fn create(
        &self,
        cycle_id: &str,
        payment_mode: &str,
        notes: Option<&str>,
        actor: &Actor,
    ) -> DbResult<Settlement> {
        debug!(cycle_id = %cycle_id, payment_mode = %payment_mode, "Creating settlement");

        let guard = self.db.locks().cycle(cycle_id).await;
        let now = self.db.clock().now();
        let actor = actor.clone();
        let cycle_id = cycle_id.to_string();
        let payment_mode = payment_mode.to_string();
        let notes = notes.map(str::to_string);

        let settlement = run_in_transaction(
            self.db.pool(),
            "create_settlement",
            vec![guard],
            move |mut tx| async move {
                let result = settle_in(
                    &mut tx,
                    &cycle_id,
                    &payment_mode,
                    notes.as_deref(),
                    &actor,
                    now,
                )
                .await;
                (tx, result)
            },
        )
        .await?;

        info!(
            id = %settlement.id(),
            cycle_id = %settlement.cycle_id(),
            final_payable = %settlement.final_payable(),
            lines = settlement.details().len(),
            "Settlement created"
        );
        Ok(settlement)
    }

    /// What settling the cycle now would produce. Writes nothing.
    pub async fn preview(&self, cycle_id: &str) -> DbResult<SettlementPreview> {
        let _guard = self.db.locks().cycle(cycle_id).await;
        let cycle = required("MilkCycle", cycle_id, self.db.cycle_repo().get_by_id(cycle_id).await?)?;
        Ok(preview(&cycle))
    }

    pub async fn get(&self, id: &str) -> DbResult<Settlement> {
        required("Settlement", id, self.db.settlement_repo().get_by_id(id).await?)
    }

    pub async fn get_by_cycle(&self, cycle_id: &str) -> DbResult<Settlement> {
        required(
            "Settlement",
            cycle_id,
            self.db.settlement_repo().get_by_cycle(cycle_id).await?,
        )
    }

    /// A customer's settlements, newest first.
    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<Settlement>> {
        self.db.settlement_repo().list_for_customer(customer_id).await
    }

    /// Settlements not yet paid out, oldest first.
    pub async fn list_unpaid(&self) -> DbResult<Vec<Settlement>> {
        self.db.settlement_repo().list_unpaid().await
    }

    /// Records the payout of a settlement.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown settlement
    /// - `InvalidState` if it is already paid
    pub async fn mark_paid(
        &self,
        id: &str,
        reference: Option<&str>,
        actor: &Actor,
    ) -> DbResult<Settlement> {
        let guard = self.db.locks().settlement(id).await;
        let now = self.db.clock().now();
        let actor = actor.clone();
        let id = id.to_string();
        let reference = reference.map(str::to_string);

        let settlement = run_in_transaction(
            self.db.pool(),
            "mark_settlement_paid",
            vec![guard],
            move |mut tx| async move {
                let result = pay_in(&mut tx, &id, reference.as_deref(), &actor, now).await;
                (tx, result)
            },
        )
        .await?;

        info!(id = %settlement.id(), amount = %settlement.final_payable(), "Settlement paid");
        Ok(settlement)
    }

    /// Re-checks a stored settlement's arithmetic.
    ///
    /// A failure means the stored row is wrong; it is logged and returned,
    /// never corrected.
    pub async fn verify(&self, id: &str) -> DbResult<()> {
        let settlement = self.get(id).await?;
        settlement.validate_calculation().map_err(|err| {
            error!(id = %id, error = %err, "Stored settlement failed verification");
            DbError::from(err)
        })
    }

    /// Renders the thermal-printer receipt for a stored settlement.
    pub async fn receipt(&self, id: &str, header: &ReceiptHeader) -> DbResult<String> {
        let settlement = self.get(id).await?;
        let customer = required(
            "Customer",
            settlement.customer_id(),
            self.db.customer_repo().get_by_id(settlement.customer_id()).await?,
        )?;
        let cycle = required(
            "MilkCycle",
            settlement.cycle_id(),
            self.db.cycle_repo().get_by_id(settlement.cycle_id()).await?,
        )?;

        Ok(format_settlement_receipt(
            &settlement,
            customer.code(),
            customer.full_name(),
            cycle.period(),
            header,
        ))
    }
}

// =============================================================================
// Transaction bodies
// =============================================================================

async fn settle_in(
    conn: &mut SqliteConnection,
    cycle_id: &str,
    payment_mode: &str,
    notes: Option<&str>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> DbResult<Settlement> {
    let mut cycle = required("MilkCycle", cycle_id, cycle_repo::find(conn, cycle_id).await?)?;

    let settlement = settle(&mut cycle, payment_mode, notes, actor, now)?;
    if let Err(err) = settlement.validate_calculation() {
        error!(cycle_id = %cycle_id, error = %err, "Computed settlement is inconsistent");
        return Err(err.into());
    }

    repo::insert(conn, &settlement).await?;
    cycle_repo::mark_settled(conn, cycle.header()).await?;
    Ok(settlement)
}

async fn pay_in(
    conn: &mut SqliteConnection,
    id: &str,
    reference: Option<&str>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> DbResult<Settlement> {
    let mut settlement = required("Settlement", id, repo::find(conn, id).await?)?;
    settlement.mark_as_paid(reference, actor, now)?;
    repo::update_payment(conn, &settlement).await?;
    Ok(settlement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::cycle::tests::{cash, jan, open_cycle, sale};
    use crate::service::product::tests::stocked_feed;
    use crate::service::tests::{actor, noon, test_db};
    use dairy_core::{CoreError, PaymentMode, SettlementDetailType, ValidationError};
    use rust_decimal_macros::dec;

    fn is_invalid_state(err: &DbError) -> bool {
        matches!(err.as_core(), Some(CoreError::InvalidState { .. }))
    }

    /// Milk 1000, one feed sale of 200, one cash advance of 100.
    async fn basic_cycle(db: &Database) -> String {
        let cycle = open_cycle(db, "C001").await;
        let product = stocked_feed(db, dec!(10)).await;
        let service = db.cycles();

        service.set_milk_amount(cycle.id(), dec!(1000), &actor()).await.unwrap();
        service
            .record_sale(cycle.id(), product.id(), sale(cycle.customer_id(), dec!(2)), &actor())
            .await
            .unwrap();
        service
            .record_advance(cycle.id(), cash(cycle.customer_id(), dec!(100)), &actor())
            .await
            .unwrap();
        cycle.id().to_string()
    }

    #[tokio::test]
    async fn test_basic_settlement() {
        let db = test_db(10).await;
        let cycle_id = basic_cycle(&db).await;

        let settlement = db
            .settlements()
            .create(&cycle_id, "cash", None, &actor())
            .await
            .unwrap();

        assert_eq!(settlement.final_payable().amount(), dec!(700));
        assert!(!settlement.customer_owes_money());
        assert_eq!(settlement.settled_at(), noon(10));

        let types: Vec<_> = settlement.details().iter().map(|d| d.detail_type).collect();
        assert_eq!(
            types,
            vec![
                SettlementDetailType::Milk,
                SettlementDetailType::ProductSale,
                SettlementDetailType::Advance,
            ]
        );

        let stored = db.settlements().get_by_cycle(&cycle_id).await.unwrap();
        assert_eq!(stored, settlement);

        let cycle = db.cycles().get(&cycle_id).await.unwrap();
        assert!(cycle.is_settled());
        assert_eq!(cycle.settled_at(), Some(noon(10)));
    }

    #[tokio::test]
    async fn test_customer_owes_money() {
        let db = test_db(10).await;
        let cycle = open_cycle(&db, "C002").await;
        let product = stocked_feed(&db, dec!(10)).await;
        let cycles = db.cycles();

        cycles.set_milk_amount(cycle.id(), dec!(500), &actor()).await.unwrap();
        cycles
            .record_sale(cycle.id(), product.id(), sale(cycle.customer_id(), dec!(4)), &actor())
            .await
            .unwrap();
        cycles
            .record_advance(cycle.id(), cash(cycle.customer_id(), dec!(200)), &actor())
            .await
            .unwrap();

        let settlement = db
            .settlements()
            .create(cycle.id(), "bank_transfer", Some("carry forward"), &actor())
            .await
            .unwrap();

        assert_eq!(settlement.final_payable().amount(), dec!(-100));
        assert!(settlement.customer_owes_money());
        assert_eq!(settlement.amount_owed().amount(), dec!(100));
        assert_eq!(settlement.payment_mode(), PaymentMode::BankTransfer);
    }

    #[tokio::test]
    async fn test_preview_matches_settlement() {
        let db = test_db(10).await;
        let cycle_id = basic_cycle(&db).await;

        let preview = db.settlements().preview(&cycle_id).await.unwrap();
        assert!(preview.can_be_settled);

        let settlement = db
            .settlements()
            .create(&cycle_id, "cash", None, &actor())
            .await
            .unwrap();
        assert_eq!(preview.final_payable, settlement.final_payable());

        let after = db.settlements().preview(&cycle_id).await.unwrap();
        assert!(!after.can_be_settled);
    }

    #[tokio::test]
    async fn test_zero_milk_cannot_settle() {
        let db = test_db(10).await;
        let cycle = open_cycle(&db, "C001").await;

        let err = db
            .settlements()
            .create(cycle.id(), "cash", None, &actor())
            .await
            .unwrap_err();
        assert!(is_invalid_state(&err));

        assert!(!db.cycles().get(cycle.id()).await.unwrap().is_settled());
        assert!(db.settlements().list_unpaid().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settle_twice_rejected() {
        let db = test_db(10).await;
        let cycle_id = basic_cycle(&db).await;
        let settlements = db.settlements();

        settlements.create(&cycle_id, "cash", None, &actor()).await.unwrap();
        let err = settlements
            .create(&cycle_id, "cash", None, &actor())
            .await
            .unwrap_err();

        assert!(is_invalid_state(&err));
        assert_eq!(settlements.list_unpaid().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_payment_mode_writes_nothing() {
        let db = test_db(10).await;
        let cycle_id = basic_cycle(&db).await;

        let err = db
            .settlements()
            .create(&cycle_id, "barter", None, &actor())
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::Validation(ValidationError::NotAllowed { .. }))
        ));

        assert!(!db.cycles().get(&cycle_id).await.unwrap().is_settled());
        assert!(db.settlement_repo().get_by_cycle(&cycle_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_settled_cycle_rejects_mutation() {
        let db = test_db(10).await;
        let cycle_id = basic_cycle(&db).await;
        db.settlements()
            .create(&cycle_id, "cash", None, &actor())
            .await
            .unwrap();

        let cycle = db.cycles().get(&cycle_id).await.unwrap();
        let product = db.products().get_by_code("FEED").await.unwrap();

        let err = db
            .cycles()
            .record_sale(&cycle_id, product.id(), sale(cycle.customer_id(), dec!(1)), &actor())
            .await
            .unwrap_err();
        assert!(is_invalid_state(&err));

        let err = db
            .cycles()
            .set_milk_amount(&cycle_id, dec!(2000), &actor())
            .await
            .unwrap_err();
        assert!(is_invalid_state(&err));

        let stored = db.cycles().get(&cycle_id).await.unwrap();
        assert_eq!(stored.sales().len(), 1);
        assert_eq!(stored.total_milk_amount().amount(), dec!(1000));
        assert_eq!(
            db.products().current_stock(product.id()).await.unwrap().value(),
            dec!(8)
        );
    }

    #[tokio::test]
    async fn test_concurrent_settlements_produce_one() {
        let db = test_db(10).await;
        let cycle_id = basic_cycle(&db).await;

        let (first, second) = (db.settlements(), db.settlements());
        let operator = actor();

        let (a, b) = tokio::join!(
            first.create(&cycle_id, "cash", None, &operator),
            second.create(&cycle_id, "upi", None, &operator),
        );

        assert!(a.is_ok() != b.is_ok());
        let err = a.err().or(b.err()).unwrap();
        assert!(is_invalid_state(&err));
        assert_eq!(db.settlements().list_unpaid().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_paid_once() {
        let db = test_db(10).await;
        let cycle_id = basic_cycle(&db).await;
        let settlement = db
            .settlements()
            .create(&cycle_id, "cash", None, &actor())
            .await
            .unwrap();

        let paid = db
            .settlements()
            .mark_paid(settlement.id(), Some("CASH-0110"), &actor())
            .await
            .unwrap();
        assert!(paid.is_paid());
        assert_eq!(paid.header().paid_at, Some(noon(10)));
        assert_eq!(paid.header().payment_reference.as_deref(), Some("CASH-0110"));

        let err = db
            .settlements()
            .mark_paid(settlement.id(), None, &actor())
            .await
            .unwrap_err();
        assert!(is_invalid_state(&err));
        assert!(db.settlements().list_unpaid().await.unwrap().is_empty());

        let stored = db.settlements().get(settlement.id()).await.unwrap();
        assert_eq!(stored.header().payment_reference.as_deref(), Some("CASH-0110"));
    }

    #[tokio::test]
    async fn test_list_for_customer() {
        let db = test_db(10).await;
        let cycle_id = basic_cycle(&db).await;
        let cycle = db.cycles().get(&cycle_id).await.unwrap();

        let next = db
            .cycles()
            .create_ten_day(cycle.customer_id(), jan(11), cycle.currency(), &actor())
            .await
            .unwrap();
        db.cycles()
            .set_milk_amount(next.id(), dec!(800), &actor())
            .await
            .unwrap();

        db.settlements().create(&cycle_id, "cash", None, &actor()).await.unwrap();
        db.settlements().create(next.id(), "cash", None, &actor()).await.unwrap();

        let listed = db.settlements().list_for_customer(cycle.customer_id()).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|s| s.customer_id() == cycle.customer_id()));
        assert!(db.settlements().list_for_customer("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_verify_detects_tampering() {
        let db = test_db(10).await;
        let cycle_id = basic_cycle(&db).await;
        let settlement = db
            .settlements()
            .create(&cycle_id, "cash", None, &actor())
            .await
            .unwrap();

        db.settlements().verify(settlement.id()).await.unwrap();

        sqlx::query("UPDATE settlements SET final_payable = '650' WHERE id = ?1")
            .bind(settlement.id())
            .execute(db.pool())
            .await
            .unwrap();

        let err = db.settlements().verify(settlement.id()).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Consistency { .. })));
    }

    #[tokio::test]
    async fn test_receipt_for_stored_settlement() {
        let db = test_db(10).await;
        let cycle_id = basic_cycle(&db).await;
        let settlement = db
            .settlements()
            .create(&cycle_id, "cash", None, &actor())
            .await
            .unwrap();

        let header = ReceiptHeader::default();
        let first = db.settlements().receipt(settlement.id(), &header).await.unwrap();
        let second = db.settlements().receipt(settlement.id(), &header).await.unwrap();

        assert_eq!(first, second);
        assert!(first.contains("Code: C001"));
        assert!(first.contains("Name: Ramesh Kumar"));
        assert!(first.contains("Period: 01/01 - 10/01"));
        assert!(first.contains("Net Payable:"));
        assert!(first.contains("Rs.700.00"));
        assert!(first.contains("Payment: Cash"));
        assert!(!first.contains("PAID"));

        let err = db.settlements().receipt("missing", &header).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
