//! # Ticket Lifecycle
//!
//! The ticket state machine and the operating-day boundary used to decide
//! staleness.
//!
//! Every status change goes through a [`TicketChange`]. The store applies it
//! with a conditional update, so checking [`TicketChange::check`] up front
//! only saves a round trip; the database remains the arbiter.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};

use crate::error::{CoreError, CoreResult};
use crate::types::TicketStatus;

// =============================================================================
// Ticket Change
// =============================================================================

/// A single permitted mutation of a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketChange {
    /// `waiting → serving`, bound to a counter.
    Call {
        counter_id: String,
        at: DateTime<Utc>,
    },

    /// `serving → completed`. Duration is `None` when the ticket was
    /// auto-completed by the next call at its counter.
    Complete {
        at: DateTime<Utc>,
        duration_secs: Option<i64>,
    },

    /// `waiting | serving → cancelled`.
    Cancel { at: DateTime<Utc> },

    /// `serving → waiting`. Issued only by the staleness reconciler.
    Requeue,
}

impl TicketChange {
    /// Status the ticket ends up in.
    pub const fn target(&self) -> TicketStatus {
        match self {
            TicketChange::Call { .. } => TicketStatus::Serving,
            TicketChange::Complete { .. } => TicketStatus::Completed,
            TicketChange::Cancel { .. } => TicketStatus::Cancelled,
            TicketChange::Requeue => TicketStatus::Waiting,
        }
    }

    /// Whether the state machine allows this change from `from`.
    pub fn permits(&self, from: TicketStatus) -> bool {
        matches!(
            (self, from),
            (TicketChange::Call { .. }, TicketStatus::Waiting)
                | (TicketChange::Complete { .. }, TicketStatus::Serving)
                | (
                    TicketChange::Cancel { .. },
                    TicketStatus::Waiting | TicketStatus::Serving
                )
                | (TicketChange::Requeue, TicketStatus::Serving)
        )
    }

    /// Errors with `InvalidTransition` if the change is not allowed.
    pub fn check(&self, ticket_id: &str, from: TicketStatus) -> CoreResult<()> {
        if self.permits(from) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                ticket_id: ticket_id.to_string(),
                from,
                to: self.target(),
            })
        }
    }
}

// =============================================================================
// Operating Day
// =============================================================================

/// Start of the operating day containing `now`, as a UTC instant.
///
/// The day starts at local midnight for a site whose clock is
/// `utc_offset_minutes` ahead of UTC. Waiting tickets created before this
/// instant are left over from a previous day.
///
/// An out-of-range offset (beyond ±24h) falls back to UTC.
pub fn operating_day_start(now: DateTime<Utc>, utc_offset_minutes: i32) -> DateTime<Utc> {
    let Some(offset) = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60)) else {
        return operating_day_start(now, 0);
    };
    let local_midnight = now.with_timezone(&offset).date_naive().and_time(NaiveTime::MIN);
    let utc_midnight = local_midnight - Duration::seconds(i64::from(offset.local_minus_utc()));
    Utc.from_utc_datetime(&utc_midnight)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_forward_transitions_permitted() {
        let now = Utc::now();
        let call = TicketChange::Call {
            counter_id: "c-1".to_string(),
            at: now,
        };
        let complete = TicketChange::Complete {
            at: now,
            duration_secs: Some(42),
        };
        assert!(call.permits(TicketStatus::Waiting));
        assert!(complete.permits(TicketStatus::Serving));
        assert!(TicketChange::Cancel { at: now }.permits(TicketStatus::Waiting));
        assert!(TicketChange::Cancel { at: now }.permits(TicketStatus::Serving));
        assert!(TicketChange::Requeue.permits(TicketStatus::Serving));
    }

    #[test]
    fn test_nothing_leaves_terminal_states() {
        let now = Utc::now();
        let changes = [
            TicketChange::Call {
                counter_id: "c-1".to_string(),
                at: now,
            },
            TicketChange::Complete {
                at: now,
                duration_secs: None,
            },
            TicketChange::Cancel { at: now },
            TicketChange::Requeue,
        ];
        for change in &changes {
            assert!(!change.permits(TicketStatus::Completed));
            assert!(!change.permits(TicketStatus::Cancelled));
        }
    }

    #[test]
    fn test_complete_requires_serving() {
        let change = TicketChange::Complete {
            at: Utc::now(),
            duration_secs: Some(10),
        };
        let err = change.check("t-9", TicketStatus::Waiting).unwrap_err();
        match err {
            CoreError::InvalidTransition { ticket_id, from, to } => {
                assert_eq!(ticket_id, "t-9");
                assert_eq!(from, TicketStatus::Waiting);
                assert_eq!(to, TicketStatus::Completed);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_requeue_only_from_serving() {
        assert!(!TicketChange::Requeue.permits(TicketStatus::Waiting));
        assert_eq!(TicketChange::Requeue.target(), TicketStatus::Waiting);
    }

    #[test]
    fn test_operating_day_start_utc() {
        let start = operating_day_start(at("2024-05-10T15:30:00Z"), 0);
        assert_eq!(start, at("2024-05-10T00:00:00Z"));
    }

    #[test]
    fn test_operating_day_start_positive_offset() {
        // 23:30 UTC is already the 11th in UTC+8.
        let start = operating_day_start(at("2024-05-10T23:30:00Z"), 8 * 60);
        assert_eq!(start, at("2024-05-10T16:00:00Z"));
    }

    #[test]
    fn test_operating_day_start_negative_offset() {
        // 02:00 UTC on the 10th is still the 9th in UTC-5.
        let start = operating_day_start(at("2024-05-10T02:00:00Z"), -5 * 60);
        assert_eq!(start, at("2024-05-09T05:00:00Z"));
    }
}
