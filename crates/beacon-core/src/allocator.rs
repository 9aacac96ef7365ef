//! # Ticket Number Allocator
//!
//! Picks display numbers for new tickets.
//!
//! ## Allocation Rule
//! ```text
//! active: W001 W002 W004          (W003 completed earlier)
//!                │
//!                ▼
//! lowest i ≥ 1 with "W" + {i:03} not active  →  W003
//! ```
//!
//! Numbers of completed and cancelled tickets are free again, so a short
//! queue keeps short numbers all day.
//!
//! This module only computes. The number is reserved when the store inserts
//! the ticket inside the same write transaction; a partial unique index on
//! active numbers backs that up.

use std::collections::HashSet;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::TicketClass;
use crate::validation::validate_ticket_number;

/// Digits after the class prefix for allocated numbers.
pub const NUMBER_WIDTH: usize = 3;

/// Formats `seq` as a display number for `class` (`W007`).
pub fn format_number(class: TicketClass, seq: u32) -> String {
    format!("{}{:0width$}", class.prefix(), seq, width = NUMBER_WIDTH)
}

/// Lowest free display number for `class`.
///
/// `active` holds the numbers of every waiting or serving ticket. Numbers
/// with another prefix never match a candidate, so the full active set can
/// be passed as is.
pub fn allocate<I, S>(class: TicketClass, active: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let active: Vec<S> = active.into_iter().collect();
    let taken: HashSet<&str> = active.iter().map(AsRef::as_ref).collect();

    let mut seq = 1u32;
    loop {
        let candidate = format_number(class, seq);
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
        seq += 1;
    }
}

/// Validates a manually entered number against the active set.
///
/// Only walk-in tickets take manual numbers. Returns the normalized number.
pub fn validate_manual<I, S>(class: TicketClass, number: &str, active: I) -> CoreResult<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if class != TicketClass::WalkIn {
        return Err(ValidationError::NotAllowed {
            field: "number".to_string(),
            allowed: vec![format!("omitted for {class} tickets")],
        }
        .into());
    }

    let number = validate_ticket_number(number)?;

    if active.into_iter().any(|n| n.as_ref() == number) {
        return Err(CoreError::DuplicateActiveTicket { number });
    }

    Ok(number)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_number() {
        let none: [&str; 0] = [];
        assert_eq!(allocate(TicketClass::WalkIn, none), "W001");
        assert_eq!(allocate(TicketClass::Appointment, none), "A001");
    }

    #[test]
    fn test_fills_lowest_gap() {
        let active = ["W001", "W002", "W004"];
        assert_eq!(allocate(TicketClass::WalkIn, active), "W003");
    }

    #[test]
    fn test_ignores_other_prefix() {
        let active = ["A001", "A002"];
        assert_eq!(allocate(TicketClass::WalkIn, active), "W001");
        assert_eq!(allocate(TicketClass::Appointment, active), "A003");
    }

    #[test]
    fn test_manual_numbers_do_not_shift_sequence() {
        // "W1" is not "W001", so the sequence is unaffected.
        let active = ["W1", "W001"];
        assert_eq!(allocate(TicketClass::WalkIn, active), "W002");
    }

    #[test]
    fn test_grows_past_width() {
        let active: Vec<String> = (1..=999).map(|i| format_number(TicketClass::WalkIn, i)).collect();
        assert_eq!(allocate(TicketClass::WalkIn, &active), "W1000");
    }

    #[test]
    fn test_manual_number_accepted_and_normalized() {
        let active = ["W001"];
        let number = validate_manual(TicketClass::WalkIn, " w050 ", active).unwrap();
        assert_eq!(number, "W050");
    }

    #[test]
    fn test_manual_number_collision() {
        let active = ["W001", "A001"];
        let err = validate_manual(TicketClass::WalkIn, "a001", active).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateActiveTicket { ref number } if number == "A001"));
    }

    #[test]
    fn test_manual_number_rejected_for_appointments() {
        let none: [&str; 0] = [];
        let err = validate_manual(TicketClass::Appointment, "A050", none).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::NotAllowed { .. })));
    }
}
