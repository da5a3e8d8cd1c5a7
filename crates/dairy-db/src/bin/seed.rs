//! # Seed Data Generator
//!
//! Populates a database with demo data and settles one cycle end to end.
//!
//! ## Usage
//! ```bash
//! # Seed ./dairy.db (or $DAIRY_DB_PATH)
//! cargo run -p dairy-db --bin seed
//!
//! # Specify database path
//! cargo run -p dairy-db --bin seed -- --db ./data/dairy.db
//! ```
//!
//! ## Generated Data
//! - Customers: a handful of milk suppliers from nearby villages
//! - Products: cattle feed, mineral mixture, calcium supplement
//! - Purchases: opening stock for every product
//! - One 10-day cycle for the first customer, ended yesterday, with milk,
//!   two product sales and two advances
//!
//! The cycle is then settled and its receipt printed to stdout.

use std::env;
use std::path::PathBuf;

use chrono::Duration;
use dairy_core::{
    AdvanceInput, CustomerDetails, PaymentMode, ProductDetails, PurchaseInput, SaleInput,
};
use dairy_db::{AppConfig, Database};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

/// (code, name, village)
const CUSTOMERS: &[(&str, &str, &str)] = &[
    ("C001", "Ramesh Kumar", "Rampur"),
    ("C002", "Suresh Patel", "Rampur"),
    ("C003", "Geeta Devi", "Khanpur"),
    ("C004", "Mohan Singh", "Sultanpur"),
];

/// (code, name, unit, price, reorder level, opening stock, purchase price)
const PRODUCTS: &[(&str, &str, &str, i64, i64, i64, i64)] = &[
    ("FEED01", "Cattle Feed 50kg", "BAG", 1250, 5, 40, 1100),
    ("MIN01", "Mineral Mixture", "KG", 90, 10, 60, 72),
    ("CAL01", "Calcium Supplement", "LTR", 150, 4, 12, 120),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut config = AppConfig::from_env();

    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.database_path = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Dairy Ledger Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: $DAIRY_DB_PATH or ./dairy.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Dairy Ledger Seed Data Generator");
    println!("==================================");
    println!("Database: {}", config.database_path.display());
    println!();

    let db = Database::new(config.db_config()).await?;
    let actor = config.operator()?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.customer_repo().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} customers", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Customers
    let mut customers = Vec::with_capacity(CUSTOMERS.len());
    for (code, name, village) in CUSTOMERS {
        let details = CustomerDetails {
            village: Some(village.to_string()),
            ..CustomerDetails::named(*name)
        };
        customers.push(db.customers().create(code, details, &actor).await?);
    }
    println!("✓ Created {} customers", customers.len());

    // Products + opening stock
    let mut products = Vec::with_capacity(PRODUCTS.len());
    for (code, name, unit, price, reorder, stock, cost) in PRODUCTS {
        let details = ProductDetails {
            name: name.to_string(),
            description: None,
            unit_price: Decimal::from(*price),
            reorder_level: Decimal::from(*reorder),
        };
        let product = db
            .products()
            .create(code, unit, config.currency, details, &actor)
            .await?;
        db.products()
            .record_purchase(
                product.id(),
                PurchaseInput {
                    quantity: Decimal::from(*stock),
                    unit_price: Decimal::from(*cost),
                    supplier_name: Some("District Co-op Store".to_string()),
                    invoice_number: Some(format!("OPEN-{code}")),
                    notes: Some("Opening stock".to_string()),
                },
                &actor,
            )
            .await?;
        products.push(product);
    }
    println!("✓ Created {} products with opening stock", products.len());

    // One finished cycle for the first customer
    let customer = &customers[0];
    let start = db.clock().today() - Duration::days(10);
    let cycle = db
        .cycles()
        .create_ten_day(customer.id(), start, config.currency, &actor)
        .await?;
    db.cycles()
        .set_milk_amount(cycle.id(), Decimal::new(452050, 2), &actor)
        .await?;

    for (product, quantity) in products.iter().zip([Decimal::ONE, Decimal::new(25, 1)]) {
        db.cycles()
            .record_sale(
                cycle.id(),
                product.id(),
                SaleInput {
                    customer_id: customer.id().to_string(),
                    quantity,
                    ..Default::default()
                },
                &actor,
            )
            .await?;
    }

    db.cycles()
        .record_advance(
            cycle.id(),
            AdvanceInput {
                customer_id: customer.id().to_string(),
                amount: Decimal::from(500),
                payment_mode: PaymentMode::Cash,
                reference_number: None,
                notes: None,
            },
            &actor,
        )
        .await?;
    db.cycles()
        .record_advance(
            cycle.id(),
            AdvanceInput {
                customer_id: customer.id().to_string(),
                amount: Decimal::from(1000),
                payment_mode: PaymentMode::Upi,
                reference_number: Some("UPI-402311".to_string()),
                notes: Some("Vet bill".to_string()),
            },
            &actor,
        )
        .await?;
    println!("✓ Opened cycle {} for {}", cycle.period(), customer.code());

    let preview = db.settlements().preview(cycle.id()).await?;
    println!("  Preview: {}", serde_json::to_string(&preview)?);

    let settlement = db
        .settlements()
        .create(cycle.id(), "cash", None, &actor)
        .await?;
    db.settlements().verify(settlement.id()).await?;
    println!("✓ Settled: {}", settlement);

    let low = db.products().products_needing_reorder().await?;
    if !low.is_empty() {
        println!("⚠ {} product(s) at or below reorder level", low.len());
    }

    println!();
    print!(
        "{}",
        db.settlements()
            .receipt(settlement.id(), &config.receipt_header())
            .await?
    );

    println!("✓ Seed complete!");
    db.close().await;

    Ok(())
}

/// `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dairy=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
