//! # Queue Events
//!
//! What display boards, counter screens and the webhook sink receive.
//!
//! ## Wire Format
//! Events are flat JSON objects tagged by `type`:
//! ```json
//! {
//!   "type": "customer_called",
//!   "ticket_number": "W003",
//!   "class": "walk-in",
//!   "category": "Battery",
//!   "status": "serving",
//!   "counter_number": 2,
//!   "timestamp": "2024-05-10T09:14:03.512Z"
//! }
//! ```
//!
//! Exactly one event is produced per committed ticket transition. Events are
//! never persisted; consumers de-duplicate on [`QueueEvent::dedup_key`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{Counter, Ticket, TicketClass, TicketStatus};

// =============================================================================
// Ticket Snapshot
// =============================================================================

/// The ticket fields every event carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TicketSnapshot {
    pub ticket_number: String,
    pub class: TicketClass,
    pub category: String,
    pub status: TicketStatus,
}

impl From<&Ticket> for TicketSnapshot {
    fn from(ticket: &Ticket) -> Self {
        Self {
            ticket_number: ticket.number.clone(),
            class: ticket.class,
            category: ticket.category.clone(),
            status: ticket.status,
        }
    }
}

/// Why a `queue_status_changed` event was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StatusChangeReason {
    /// Explicit cancel.
    Cancelled,
    /// Stuck serving ticket put back in line.
    Requeued,
    /// Waiting ticket left over from a previous operating day.
    Expired,
}

// =============================================================================
// Queue Event
// =============================================================================

/// A committed ticket transition, as broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A ticket joined the queue.
    QueueAdded {
        #[serde(flatten)]
        ticket: TicketSnapshot,
        #[ts(as = "String")]
        timestamp: DateTime<Utc>,
    },

    /// A counter called a ticket.
    CustomerCalled {
        #[serde(flatten)]
        ticket: TicketSnapshot,
        counter_number: i64,
        #[ts(as = "String")]
        timestamp: DateTime<Utc>,
    },

    /// Service finished, explicitly or by the counter calling the next ticket.
    ServiceCompleted {
        #[serde(flatten)]
        ticket: TicketSnapshot,
        counter_number: Option<i64>,
        service_duration: Option<i64>,
        #[ts(as = "String")]
        timestamp: DateTime<Utc>,
    },

    /// Cancelled, requeued or expired.
    QueueStatusChanged {
        #[serde(flatten)]
        ticket: TicketSnapshot,
        counter_number: Option<i64>,
        reason: StatusChangeReason,
        #[ts(as = "String")]
        timestamp: DateTime<Utc>,
    },
}

impl QueueEvent {
    pub fn queue_added(ticket: &Ticket) -> Self {
        QueueEvent::QueueAdded {
            ticket: ticket.into(),
            timestamp: ticket.created_at,
        }
    }

    pub fn customer_called(ticket: &Ticket, counter: &Counter, at: DateTime<Utc>) -> Self {
        QueueEvent::CustomerCalled {
            ticket: ticket.into(),
            counter_number: counter.number,
            timestamp: at,
        }
    }

    pub fn service_completed(ticket: &Ticket, counter: Option<&Counter>, at: DateTime<Utc>) -> Self {
        QueueEvent::ServiceCompleted {
            ticket: ticket.into(),
            counter_number: counter.map(|c| c.number),
            service_duration: ticket.service_duration,
            timestamp: at,
        }
    }

    pub fn status_changed(
        ticket: &Ticket,
        counter: Option<&Counter>,
        reason: StatusChangeReason,
        at: DateTime<Utc>,
    ) -> Self {
        QueueEvent::QueueStatusChanged {
            ticket: ticket.into(),
            counter_number: counter.map(|c| c.number),
            reason,
            timestamp: at,
        }
    }

    /// Wire tag (`queue_added`, `customer_called`, ...).
    pub const fn kind(&self) -> &'static str {
        match self {
            QueueEvent::QueueAdded { .. } => "queue_added",
            QueueEvent::CustomerCalled { .. } => "customer_called",
            QueueEvent::ServiceCompleted { .. } => "service_completed",
            QueueEvent::QueueStatusChanged { .. } => "queue_status_changed",
        }
    }

    pub fn ticket(&self) -> &TicketSnapshot {
        match self {
            QueueEvent::QueueAdded { ticket, .. }
            | QueueEvent::CustomerCalled { ticket, .. }
            | QueueEvent::ServiceCompleted { ticket, .. }
            | QueueEvent::QueueStatusChanged { ticket, .. } => ticket,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            QueueEvent::QueueAdded { timestamp, .. }
            | QueueEvent::CustomerCalled { timestamp, .. }
            | QueueEvent::ServiceCompleted { timestamp, .. }
            | QueueEvent::QueueStatusChanged { timestamp, .. } => *timestamp,
        }
    }

    /// `(type, ticket_number, timestamp)`, used by sinks to drop repeats.
    pub fn dedup_key(&self) -> (&'static str, &str, DateTime<Utc>) {
        (self.kind(), &self.ticket().ticket_number, self.timestamp())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(status: TicketStatus) -> Ticket {
        Ticket {
            id: "t-1".to_string(),
            number: "W003".to_string(),
            class: TicketClass::WalkIn,
            category: "Battery".to_string(),
            status,
            counter_id: None,
            created_at: Utc::now(),
            called_at: None,
            completed_at: None,
            service_duration: None,
        }
    }

    fn counter() -> Counter {
        Counter {
            id: "c-2".to_string(),
            label: "Counter 2".to_string(),
            number: 2,
            is_active: true,
            current_ticket_id: None,
        }
    }

    #[test]
    fn test_customer_called_wire_form_is_flat() {
        let event = QueueEvent::customer_called(&ticket(TicketStatus::Serving), &counter(), Utc::now());
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "customer_called");
        assert_eq!(value["ticket_number"], "W003");
        assert_eq!(value["class"], "walk-in");
        assert_eq!(value["category"], "Battery");
        assert_eq!(value["status"], "serving");
        assert_eq!(value["counter_number"], 2);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_service_completed_carries_duration() {
        let mut done = ticket(TicketStatus::Completed);
        done.service_duration = Some(42);
        let event = QueueEvent::service_completed(&done, Some(&counter()), Utc::now());
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "service_completed");
        assert_eq!(value["service_duration"], 42);
        assert_eq!(value["counter_number"], 2);
    }

    #[test]
    fn test_status_changed_reason() {
        let event = QueueEvent::status_changed(
            &ticket(TicketStatus::Waiting),
            None,
            StatusChangeReason::Requeued,
            Utc::now(),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "queue_status_changed");
        assert_eq!(value["reason"], "requeued");
        assert!(value["counter_number"].is_null());
    }

    #[test]
    fn test_event_deserializes_from_wire() {
        let event = QueueEvent::queue_added(&ticket(TicketStatus::Waiting));
        let json = serde_json::to_string(&event).unwrap();
        let back: QueueEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.kind(), "queue_added");
    }

    #[test]
    fn test_dedup_key() {
        let t = ticket(TicketStatus::Waiting);
        let event = QueueEvent::queue_added(&t);
        let (kind, number, ts) = event.dedup_key();
        assert_eq!(kind, "queue_added");
        assert_eq!(number, "W003");
        assert_eq!(ts, t.created_at);
    }
}
