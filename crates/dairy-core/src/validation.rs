//! # Validation Module
//!
//! Input validation utilities shared by the registry and ledger factories.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI form (outside this workspace)                             │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Entity factories (dairy-core)                                │
//! │  └── THIS MODULE: trimming, lengths, signs, normalisation              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE (customer code, product code, settlement per cycle)        │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validators return the cleaned value so factories can store it directly.

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::{MAX_CODE_LENGTH, MAX_NAME_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a business code (customer code, product code).
///
/// ## Rules
/// - Must not be blank
/// - At most 20 characters after trimming
/// - Stored upper-cased
///
/// ## Example
/// ```rust
/// use dairy_core::validation::validate_code;
///
/// assert_eq!(validate_code("code", " c001 ").unwrap(), "C001");
/// assert!(validate_code("code", "").is_err());
/// ```
pub fn validate_code(field: &str, code: &str) -> ValidationResult<String> {
    let code = required(field, code)?;

    if code.chars().count() > MAX_CODE_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_CODE_LENGTH,
        });
    }

    Ok(code.to_uppercase())
}

/// Validates a display name (customer name, product name).
///
/// ## Rules
/// - Must not be blank
/// - At most 200 characters after trimming
pub fn validate_name(field: &str, name: &str) -> ValidationResult<String> {
    let name = required(field, name)?;

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LENGTH,
        });
    }

    Ok(name.to_string())
}

/// Trims an optional free-text field; blank becomes `None`.
pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> ValidationResult<Option<String>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(Some(value.to_string()))
}

/// Returns the trimmed value, or `Required` when blank.
pub fn required<'a>(field: &str, value: &'a str) -> ValidationResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(value)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates that a decimal is zero or more (prices, reorder levels).
pub fn validate_non_negative(field: &str, value: Decimal) -> ValidationResult<Decimal> {
    if value < Decimal::ZERO {
        return Err(ValidationError::negative(field));
    }
    Ok(value)
}

/// Validates that a decimal is strictly positive (advance amounts).
pub fn validate_positive(field: &str, value: Decimal) -> ValidationResult<Decimal> {
    if value <= Decimal::ZERO {
        return Err(ValidationError::must_be_positive(field));
    }
    Ok(value)
}

/// Parses an id-like string that must be a UUID.
pub fn validate_uuid(field: &str, value: &str) -> ValidationResult<String> {
    let value = required(field, value)?;
    uuid::Uuid::parse_str(value)
        .map(|id| id.to_string())
        .map_err(|e| ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: e.to_string(),
        })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_code() {
        assert_eq!(validate_code("code", "abc-1").unwrap(), "ABC-1");
        assert!(matches!(
            validate_code("code", "   ").unwrap_err(),
            ValidationError::Required { .. }
        ));
        assert!(validate_code("code", &"A".repeat(20)).is_ok());
        assert!(matches!(
            validate_code("code", &"A".repeat(21)).unwrap_err(),
            ValidationError::TooLong { max: 20, .. }
        ));
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("name", "  Ramesh Patil ").unwrap(), "Ramesh Patil");
        assert!(validate_name("name", &"x".repeat(201)).is_err());
    }

    #[test]
    fn test_optional_text() {
        assert_eq!(optional_text("phone", None, 20).unwrap(), None);
        assert_eq!(optional_text("phone", Some("  "), 20).unwrap(), None);
        assert_eq!(
            optional_text("phone", Some(" 98200 "), 20).unwrap(),
            Some("98200".to_string())
        );
        assert!(optional_text("phone", Some(&"9".repeat(21)), 20).is_err());
    }

    #[test]
    fn test_numeric_validators() {
        assert!(validate_non_negative("price", dec!(0)).is_ok());
        assert!(validate_non_negative("price", dec!(-0.5)).is_err());
        assert!(validate_positive("amount", dec!(0)).is_err());
        assert!(validate_positive("amount", dec!(0.01)).is_ok());
    }

    #[test]
    fn test_validate_uuid() {
        let id = uuid::Uuid::new_v4().to_string();
        assert_eq!(validate_uuid("id", &id).unwrap(), id);
        assert!(matches!(
            validate_uuid("id", "not-a-uuid").unwrap_err(),
            ValidationError::InvalidFormat { .. }
        ));
    }
}
