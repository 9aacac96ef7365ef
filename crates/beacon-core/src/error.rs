//! # Error Types
//!
//! Domain-specific error types for beacon-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  beacon-core errors (this file)                                        │
//! │  ├── CoreError        - Queue rule violations                          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  beacon-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  beacon-dispatch errors                                                │
//! │  └── DispatchError    - Core | Storage, with a stable ErrorKind        │
//! │                                                                         │
//! │  beacon-server errors                                                  │
//! │  └── ApiError         - {code, message} + HTTP status                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DispatchError → ApiError          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::TicketStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Queue rule violations.
///
/// Every variant is something a caller can act on; storage failures live in
/// `beacon-db` and never appear here.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Ticket class string is not recognised.
    #[error("Invalid ticket class: {0}")]
    InvalidClass(String),

    /// Display number is already held by a waiting or serving ticket.
    ///
    /// ## When This Occurs
    /// - A manual walk-in number collides with an active ticket
    /// - Two intakes race for the same number and the store's unique index
    ///   rejects the second one
    #[error("Ticket number {number} is already active")]
    DuplicateActiveTicket { number: String },

    /// Ticket id does not exist.
    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    /// Counter id does not exist.
    #[error("Counter not found: {0}")]
    CounterNotFound(String),

    /// Ticket is not in the state the operation requires.
    ///
    /// ## When This Occurs
    /// - Completing a ticket that is still waiting
    /// - Cancelling a ticket that is already completed or cancelled
    /// - Another request changed the ticket between read and write
    ///
    /// The ticket is left unchanged.
    #[error("Ticket {ticket_id} cannot move from {from} to {to}")]
    InvalidTransition {
        ticket_id: String,
        from: TicketStatus,
        to: TicketStatus,
    },

    /// Counter already holds a serving ticket.
    #[error("Counter {counter_id} is already serving ticket {ticket_id}")]
    CounterBusy {
        counter_id: String,
        ticket_id: String,
    },

    /// Counter is registered but not active.
    #[error("Counter {0} is not active")]
    CounterInactive(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any state is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be zero or greater.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., non-alphanumeric ticket number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidTransition {
            ticket_id: "t-1".to_string(),
            from: TicketStatus::Completed,
            to: TicketStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "Ticket t-1 cannot move from completed to cancelled"
        );

        let err = CoreError::DuplicateActiveTicket {
            number: "W001".to_string(),
        };
        assert_eq!(err.to_string(), "Ticket number W001 is already active");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustNotBeNegative {
            field: "duration".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(
            core_err.to_string(),
            "Validation error: duration must not be negative"
        );
    }
}
