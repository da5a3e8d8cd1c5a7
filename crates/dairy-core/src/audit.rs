//! # Audit Trail
//!
//! Who touched a record and when.
//!
//! Every mutating operation takes an explicit [`Actor`]; there is no ambient
//! "current user". Factories stamp `created_*`, mutators stamp `updated_*`.
//!
//! ```text
//! UI login ──► Actor::new("ramesh") ──► service call ──► entity mutator
//!                                                         │
//!                                                         ▼
//!                                           AuditStamp { updated_by: "ramesh",
//!                                                        updated_at: clock.now() }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::validation::{required, ValidationResult};

// =============================================================================
// Actor
// =============================================================================

/// The acting username attached to created/updated records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor(String);

impl Actor {
    /// Creates an actor from a username.
    ///
    /// ## Errors
    /// `ValidationError::Required` if the username is empty or whitespace.
    pub fn new(username: &str) -> ValidationResult<Self> {
        Ok(Actor(required("username", username)?.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Audit Stamp
// =============================================================================

/// Creation and last-update metadata carried by every entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

impl AuditStamp {
    /// Stamp for a freshly created record.
    pub fn created(actor: &Actor, now: DateTime<Utc>) -> Self {
        AuditStamp {
            created_at: now,
            created_by: actor.as_str().to_string(),
            updated_at: None,
            updated_by: None,
        }
    }

    /// Records a modification.
    pub fn touch(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.updated_at = Some(now);
        self.updated_by = Some(actor.as_str().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_actor_rejects_blank() {
        assert!(Actor::new("").is_err());
        assert!(Actor::new(" \t ").is_err());
        assert_eq!(Actor::new(" admin ").unwrap().as_str(), "admin");
    }

    #[test]
    fn test_touch_keeps_creation() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap();

        let mut stamp = AuditStamp::created(&Actor::new("admin").unwrap(), created);
        stamp.touch(&Actor::new("clerk").unwrap(), later);

        assert_eq!(stamp.created_by, "admin");
        assert_eq!(stamp.created_at, created);
        assert_eq!(stamp.updated_by.as_deref(), Some("clerk"));
        assert_eq!(stamp.updated_at, Some(later));
    }
}
