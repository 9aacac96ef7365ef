//! # Validation Module
//!
//! Input validation for intake, completion and counter registration.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP handler (axum)                                          │
//! │  └── Type validation (JSON deserialization)                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Category / ticket number format                                   │
//! │  └── Duration and counter number ranges                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints on class / status                               │
//! │  └── Partial UNIQUE index on active ticket numbers                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use beacon_core::validation::{validate_category, validate_ticket_number};
//!
//! assert_eq!(validate_category("  Battery ").unwrap(), "Battery");
//! assert_eq!(validate_ticket_number(" w15 ").unwrap(), "W15");
//! ```

use crate::error::ValidationError;
use crate::{MAX_CATEGORY_LEN, MAX_COUNTER_LABEL_LEN, MAX_TICKET_NUMBER_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates and trims a service category.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 100 characters
pub fn validate_category(category: &str) -> ValidationResult<String> {
    let category = category.trim();

    if category.is_empty() {
        return Err(ValidationError::Required {
            field: "category".to_string(),
        });
    }

    if category.chars().count() > MAX_CATEGORY_LEN {
        return Err(ValidationError::TooLong {
            field: "category".to_string(),
            max: MAX_CATEGORY_LEN,
        });
    }

    Ok(category.to_string())
}

/// Validates and normalizes a manually entered ticket number.
///
/// ## Rules
/// - Trimmed and upper-cased (`" w15 "` becomes `"W15"`)
/// - Must not be empty
/// - At most 10 characters
/// - ASCII letters and digits only
pub fn validate_ticket_number(number: &str) -> ValidationResult<String> {
    let number = number.trim().to_ascii_uppercase();

    if number.is_empty() {
        return Err(ValidationError::Required {
            field: "number".to_string(),
        });
    }

    if number.len() > MAX_TICKET_NUMBER_LEN {
        return Err(ValidationError::TooLong {
            field: "number".to_string(),
            max: MAX_TICKET_NUMBER_LEN,
        });
    }

    if !number.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "number".to_string(),
            reason: "only letters and digits are allowed".to_string(),
        });
    }

    Ok(number)
}

/// Validates a counter label.
pub fn validate_counter_label(label: &str) -> ValidationResult<String> {
    let label = label.trim();

    if label.is_empty() {
        return Err(ValidationError::Required {
            field: "label".to_string(),
        });
    }

    if label.chars().count() > MAX_COUNTER_LABEL_LEN {
        return Err(ValidationError::TooLong {
            field: "label".to_string(),
            max: MAX_COUNTER_LABEL_LEN,
        });
    }

    Ok(label.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Service duration in seconds. Zero is allowed.
pub fn validate_duration(duration_secs: i64) -> ValidationResult<()> {
    if duration_secs < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "duration".to_string(),
        });
    }
    Ok(())
}

/// Counter numbers start at 1.
pub fn validate_counter_number(number: i64) -> ValidationResult<()> {
    if number <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "number".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
