//! # Error Types
//!
//! Domain-specific error types for dairy-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  dairy-core errors (this file)                                         │
//! │  ├── CoreError        - Lifecycle, stock and consistency failures      │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  dairy-db errors (separate crate)                                      │
//! │  └── DbError          - Storage failures, NotFound, wraps CoreError    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retry Policy
//! Nothing in this crate is retried. Every variant is surfaced to the
//! caller as-is; the caller must change input or state before trying again.

use rust_decimal::Decimal;
use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations or domain logic failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Operation violates an aggregate's lifecycle.
    ///
    /// ## When This Occurs
    /// - Mutating a settled cycle (milk amount, notes, sales, advances)
    /// - Settling a cycle twice
    /// - Settling a cycle with no milk recorded
    /// - Marking a settlement paid twice
    #[error("{entity} {id}: {reason}")]
    InvalidState {
        entity: String,
        id: String,
        reason: String,
    },

    /// Insufficient stock to complete a sale.
    ///
    /// ## User Workflow
    /// ```text
    /// Record sale (qty: 5 BAG)
    ///      │
    ///      ▼
    /// Check stock: available=3 BAG
    ///      │
    ///      ▼
    /// InsufficientStock { product: "FEED01", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// UI shows: "Insufficient stock for FEED01. Available: 3 BAG, Required: 5 BAG"
    /// ```
    #[error("Insufficient stock for {product}. Available: {available} {unit}, Required: {requested} {unit}")]
    InsufficientStock {
        product: String,
        unit: String,
        available: Decimal,
        requested: Decimal,
    },

    /// A stored settlement no longer satisfies its own arithmetic.
    ///
    /// Fatal: logged and surfaced, never corrected in place.
    #[error("Settlement {settlement_id} is inconsistent: final payable {actual}, expected {expected}")]
    Consistency {
        settlement_id: String,
        expected: Decimal,
        actual: Decimal,
    },
}

impl CoreError {
    /// Creates an InvalidState error for the given entity.
    pub fn invalid_state(
        entity: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::InvalidState {
            entity: entity.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised by factories and value types before any state changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must not be negative.
    #[error("{field} cannot be negative")]
    Negative { field: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., unparseable decimal, malformed id).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., duplicate customer code).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Arithmetic between two different currencies.
    #[error("Currency mismatch: {left} and {right}")]
    CurrencyMismatch { left: String, right: String },

    /// Arithmetic or comparison between two different units.
    #[error("Unit mismatch: {left} and {right}")]
    UnitMismatch { left: String, right: String },

    /// Two related values disagree (e.g., sale customer vs cycle customer).
    #[error("{field} mismatch: {reason}")]
    Mismatch { field: String, reason: String },

    /// A range whose bounds are reversed or empty.
    #[error("Invalid {field}: {reason}")]
    InvalidRange { field: String, reason: String },

    /// Arithmetic result does not fit in a `Decimal`.
    #[error("{field} is out of range")]
    OutOfRange { field: String },
}

impl ValidationError {
    pub(crate) fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }

    pub(crate) fn negative(field: &str) -> Self {
        ValidationError::Negative {
            field: field.to_string(),
        }
    }

    pub(crate) fn must_be_positive(field: &str) -> Self {
        ValidationError::MustBePositive {
            field: field.to_string(),
        }
    }

    pub(crate) fn out_of_range(field: &str) -> Self {
        ValidationError::OutOfRange {
            field: field.to_string(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
