//! # Customer Service
//!
//! The customer registry: register, edit, (de)activate and look up.

use dairy_core::{Actor, Customer, CustomerDetails, ValidationError};
use tracing::{debug, info};

use super::required;
use crate::error::DbResult;
use crate::repository::customer as repo;
use crate::Database;

/// Customer registry operations.
#[derive(Debug, Clone)]
pub struct CustomerService {
    db: Database,
}

impl CustomerService {
    pub fn new(db: Database) -> Self {
        CustomerService { db }
    }

    /// Registers a new active customer.
    ///
    /// ## Errors
    /// - `Validation(Duplicate)` if the code is already taken
    /// - `Validation(..)` for a bad code or details
    pub async fn create(
        &self,
        code: &str,
        details: CustomerDetails,
        actor: &Actor,
    ) -> DbResult<Customer> {
        debug!(code = %code, "Creating customer");

        let customer = Customer::create(code, details, actor, self.db.clock().now())?;
        if self.db.customer_repo().code_exists(customer.code()).await? {
            return Err(ValidationError::Duplicate {
                field: "customer_code".to_string(),
                value: customer.code().to_string(),
            }
            .into());
        }

        let mut conn = self.db.pool().acquire().await?;
        repo::insert(&mut conn, &customer).await?;

        info!(id = %customer.id(), code = %customer.code(), "Customer created");
        Ok(customer)
    }

    /// Replaces a customer's contact details.
    pub async fn update(
        &self,
        id: &str,
        details: CustomerDetails,
        actor: &Actor,
    ) -> DbResult<Customer> {
        let mut conn = self.db.pool().acquire().await?;
        let mut customer = required("Customer", id, repo::find(&mut conn, id).await?)?;
        customer.update(details, actor, self.db.clock().now())?;
        repo::update(&mut conn, &customer).await?;

        debug!(id = %id, "Customer updated");
        Ok(customer)
    }

    pub async fn deactivate(&self, id: &str, actor: &Actor) -> DbResult<Customer> {
        self.set_active(id, false, actor).await
    }

    pub async fn activate(&self, id: &str, actor: &Actor) -> DbResult<Customer> {
        self.set_active(id, true, actor).await
    }

    async fn set_active(&self, id: &str, active: bool, actor: &Actor) -> DbResult<Customer> {
        let mut conn = self.db.pool().acquire().await?;
        let mut customer = required("Customer", id, repo::find(&mut conn, id).await?)?;
        let now = self.db.clock().now();
        if active {
            customer.activate(actor, now);
        } else {
            customer.deactivate(actor, now);
        }
        repo::update(&mut conn, &customer).await?;

        info!(id = %id, active, "Customer status changed");
        Ok(customer)
    }

    pub async fn get(&self, id: &str) -> DbResult<Customer> {
        required("Customer", id, self.db.customer_repo().get_by_id(id).await?)
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Customer> {
        required("Customer", code, self.db.customer_repo().get_by_code(code).await?)
    }

    pub async fn list(&self, active_only: bool) -> DbResult<Vec<Customer>> {
        self.db.customer_repo().list(active_only).await
    }

    /// Matches on name or code, at most `limit` results.
    pub async fn search(&self, term: &str, limit: u32) -> DbResult<Vec<Customer>> {
        self.db.customer_repo().search(term, limit).await
    }

    pub async fn code_exists(&self, code: &str) -> DbResult<bool> {
        self.db.customer_repo().code_exists(code).await
    }
}
