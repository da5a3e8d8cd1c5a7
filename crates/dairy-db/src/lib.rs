//! # dairy-db: Database Layer for Dairy Ledger
//!
//! Stores the `dairy-core` aggregates in SQLite (via sqlx) and runs every
//! multi-write workflow as one transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Dairy Ledger Data Flow                            │
//! │                                                                         │
//! │  Caller (UI, seed binary)                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     dairy-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐    │   │
//! │  │   │   Services    │    │  Repositories │    │  Migrations  │    │   │
//! │  │   │ (service/)    │───►│ (repository/) │    │  (embedded)  │    │   │
//! │  │   │ locks + tx    │    │ SQL per       │    │ 001_initial  │    │   │
//! │  │   │ + core rules  │    │ aggregate     │    │ _schema.sql  │    │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘    │   │
//! │  │            │                   │                                 │   │
//! │  │            ▼                   ▼                                 │   │
//! │  │   ┌─────────────────────────────────────┐                       │   │
//! │  │   │  Database (pool.rs): SqlitePool,     │                       │   │
//! │  │   │  AggregateLocks, Clock               │                       │   │
//! │  │   └─────────────────────────────────────┘                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (dairy.db)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, clock and lock registry
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - SQL per aggregate
//! - [`service`] - Transactional workflows (settle, sell, purchase, ...)
//! - [`locks`] - Per-aggregate async mutexes
//! - [`config`] - Settings from the environment
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dairy_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("dairy.db")).await?;
//!
//! let cycle = db.cycles().create_ten_day(&customer_id, start, Currency::Inr, &actor).await?;
//! db.cycles().set_milk_amount(cycle.id(), dec!(4500), &actor).await?;
//! let settlement = db.settlements().create(cycle.id(), "cash", None, &actor).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod locks;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;
mod transaction;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::AppConfig;
pub use error::{DbError, DbResult};
pub use locks::AggregateLocks;
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::{CustomerRepository, CycleRepository, ProductRepository, SettlementRepository};

// Service re-exports
pub use service::{CustomerService, CycleService, ProductService, SettlementService};
