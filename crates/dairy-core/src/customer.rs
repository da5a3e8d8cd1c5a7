//! # Customer Registry
//!
//! Milk suppliers identified by a unique, upper-cased code.
//!
//! Customers are never deleted: deactivation hides them from new cycles but
//! keeps every cycle and settlement that references them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::audit::{Actor, AuditStamp};
use crate::validation::{optional_text, validate_code, validate_name, ValidationResult};

const MAX_PHONE_LENGTH: usize = 15;
const MAX_ADDRESS_LENGTH: usize = 500;
const MAX_VILLAGE_LENGTH: usize = 100;

/// Editable contact details of a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub village: Option<String>,
}

impl CustomerDetails {
    pub fn named(full_name: impl Into<String>) -> Self {
        CustomerDetails {
            full_name: full_name.into(),
            ..Default::default()
        }
    }

    fn validated(self) -> ValidationResult<Self> {
        Ok(CustomerDetails {
            full_name: validate_name("full_name", &self.full_name)?,
            phone: optional_text("phone", self.phone.as_deref(), MAX_PHONE_LENGTH)?,
            address: optional_text("address", self.address.as_deref(), MAX_ADDRESS_LENGTH)?,
            village: optional_text("village", self.village.as_deref(), MAX_VILLAGE_LENGTH)?,
        })
    }
}

/// A milk supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    id: String,
    code: String,
    details: CustomerDetails,
    is_active: bool,
    audit: AuditStamp,
}

impl Customer {
    /// Registers a new, active customer.
    ///
    /// Code uniqueness is checked by the caller against storage; the
    /// database UNIQUE index is the backstop.
    pub fn create(
        code: &str,
        details: CustomerDetails,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> ValidationResult<Self> {
        Ok(Customer {
            id: Uuid::new_v4().to_string(),
            code: validate_code("customer_code", code)?,
            details: details.validated()?,
            is_active: true,
            audit: AuditStamp::created(actor, now),
        })
    }

    /// Rebuilds a customer loaded from storage.
    pub fn restore(
        id: String,
        code: String,
        details: CustomerDetails,
        is_active: bool,
        audit: AuditStamp,
    ) -> Self {
        Customer {
            id,
            code,
            details,
            is_active,
            audit,
        }
    }

    /// Replaces the contact details. The code never changes.
    pub fn update(
        &mut self,
        details: CustomerDetails,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> ValidationResult<()> {
        self.details = details.validated()?;
        self.audit.touch(actor, now);
        Ok(())
    }

    pub fn deactivate(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.is_active = false;
        self.audit.touch(actor, now);
    }

    pub fn activate(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.is_active = true;
        self.audit.touch(actor, now);
    }

    /// Only active customers may start a new milk cycle.
    pub fn can_create_new_cycle(&self) -> bool {
        self.is_active
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn full_name(&self) -> &str {
        &self.details.full_name
    }

    pub fn details(&self) -> &CustomerDetails {
        &self.details
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn audit(&self) -> &AuditStamp {
        &self.audit
    }
}

impl fmt::Display for Customer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.code, self.details.full_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 7, 0, 0).unwrap()
    }

    fn admin() -> Actor {
        Actor::new("admin").unwrap()
    }

    #[test]
    fn test_create_normalizes_code() {
        let customer = Customer::create(
            " c001 ",
            CustomerDetails {
                full_name: "Ramesh Patil".to_string(),
                phone: Some("9820012345".to_string()),
                address: None,
                village: Some("  ".to_string()),
            },
            &admin(),
            now(),
        )
        .unwrap();

        assert_eq!(customer.code(), "C001");
        assert!(customer.is_active());
        assert!(customer.can_create_new_cycle());
        assert_eq!(customer.details().village, None);
        assert_eq!(customer.audit().created_by, "admin");
        assert_eq!(customer.to_string(), "C001 - Ramesh Patil");
    }

    #[test]
    fn test_create_rejects_invalid_input() {
        let err = Customer::create("", CustomerDetails::named("A"), &admin(), now()).unwrap_err();
        assert!(matches!(err, ValidationError::Required { .. }));

        let err = Customer::create(&"X".repeat(21), CustomerDetails::named("A"), &admin(), now())
            .unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { max: 20, .. }));

        let err = Customer::create("C1", CustomerDetails::named(" "), &admin(), now()).unwrap_err();
        assert!(matches!(err, ValidationError::Required { .. }));

        let mut details = CustomerDetails::named("A");
        details.phone = Some("1".repeat(16));
        assert!(Customer::create("C1", details, &admin(), now()).is_err());
    }

    #[test]
    fn test_deactivate_blocks_new_cycles() {
        let mut customer =
            Customer::create("C1", CustomerDetails::named("Sita"), &admin(), now()).unwrap();
        customer.deactivate(&admin(), now());
        assert!(!customer.can_create_new_cycle());
        assert!(customer.audit().updated_at.is_some());

        customer.activate(&admin(), now());
        assert!(customer.can_create_new_cycle());
    }

    #[test]
    fn test_update_keeps_code() {
        let mut customer =
            Customer::create("C1", CustomerDetails::named("Sita"), &admin(), now()).unwrap();
        let clerk = Actor::new("clerk").unwrap();
        customer
            .update(CustomerDetails::named("Sita Devi"), &clerk, now())
            .unwrap();
        assert_eq!(customer.code(), "C1");
        assert_eq!(customer.full_name(), "Sita Devi");
        assert_eq!(customer.audit().updated_by.as_deref(), Some("clerk"));
    }
}
