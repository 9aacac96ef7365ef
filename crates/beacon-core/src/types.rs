//! # Domain Types
//!
//! Core domain types used throughout Beacon Queue.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Ticket      │   │    Counter      │   │  TicketClass    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  WalkIn    (W)  │       │
//! │  │  number (W003)  │   │  number (1..)   │   │  Appointment(A) │       │
//! │  │  class          │   │  label          │   └─────────────────┘       │
//! │  │  status         │   │  is_active      │                             │
//! │  │  counter_id  ───┼──►│  current_ticket │   ┌─────────────────┐       │
//! │  └─────────────────┘   └─────────────────┘   │  TicketStatus   │       │
//! │                                              │  ─────────────  │       │
//! │                                              │  Waiting        │       │
//! │                                              │  Serving        │       │
//! │                                              │  Completed      │       │
//! │                                              │  Cancelled      │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for relations and API paths
//! - Display key: ticket `number` / counter `number` - what people see on
//!   the board. Ticket numbers are reused once a ticket leaves the queue.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;

// =============================================================================
// Ticket Class
// =============================================================================

/// Queue partition. Each class has its own number prefix and FIFO order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "kebab-case"))]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum TicketClass {
    /// Customer arrived without a booking.
    WalkIn,
    /// Customer holds a booking.
    Appointment,
}

impl TicketClass {
    /// Every class, in display order.
    pub const ALL: [TicketClass; 2] = [TicketClass::WalkIn, TicketClass::Appointment];

    /// Display-number prefix (`W003`, `A012`).
    #[inline]
    pub const fn prefix(&self) -> char {
        match self {
            TicketClass::WalkIn => 'W',
            TicketClass::Appointment => 'A',
        }
    }

    /// Wire and storage form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TicketClass::WalkIn => "walk-in",
            TicketClass::Appointment => "appointment",
        }
    }
}

impl fmt::Display for TicketClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "walk-in" | "walkin" | "walk_in" => Ok(TicketClass::WalkIn),
            "appointment" => Ok(TicketClass::Appointment),
            _ => Err(CoreError::InvalidClass(s.to_string())),
        }
    }
}

// =============================================================================
// Ticket Status
// =============================================================================

/// Where a ticket is in its lifecycle.
///
/// ```text
///            call              complete
/// Waiting ──────────► Serving ──────────► Completed
///    │    ◄──────────    │
///    │      requeue      │ cancel
///    │  (reconciler)     ▼
///    └──────────────► Cancelled
///          cancel
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// In line, not yet called.
    Waiting,
    /// Called to a counter and being served.
    Serving,
    /// Service finished.
    Completed,
    /// Left the queue without finishing service.
    Cancelled,
}

impl TicketStatus {
    /// Waiting and serving tickets hold their display number.
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self, TicketStatus::Waiting | TicketStatus::Serving)
    }

    /// Nothing leaves a terminal status.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Waiting => "waiting",
            TicketStatus::Serving => "serving",
            TicketStatus::Completed => "completed",
            TicketStatus::Cancelled => "cancelled",
        }
    }
}

impl Default for TicketStatus {
    fn default() -> Self {
        TicketStatus::Waiting
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waiting" => Ok(TicketStatus::Waiting),
            "serving" => Ok(TicketStatus::Serving),
            "completed" => Ok(TicketStatus::Completed),
            "cancelled" | "canceled" => Ok(TicketStatus::Cancelled),
            _ => Err(crate::error::ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: ["waiting", "serving", "completed", "cancelled"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }
            .into()),
        }
    }
}

// =============================================================================
// Ticket
// =============================================================================

/// One customer's place in line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display number, e.g. `W003`. Unique among active tickets only.
    pub number: String,

    pub class: TicketClass,

    /// Free-text service label ("Screen Replacement", "Battery", ...).
    pub category: String,

    pub status: TicketStatus,

    /// Counter serving this ticket. Set iff status is `serving`.
    pub counter_id: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// When the ticket was last called to a counter.
    #[ts(as = "Option<String>")]
    pub called_at: Option<DateTime<Utc>>,

    /// When the ticket reached `completed` or `cancelled`.
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Service time in seconds, reported by the counter on completion.
    pub service_duration: Option<i64>,
}

impl Ticket {
    /// Holds its display number (waiting or serving).
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

// =============================================================================
// Counter
// =============================================================================

/// A service position. Serves at most one ticket at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Counter {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Operator-facing label ("Counter 3").
    pub label: String,

    /// Display-facing number shown on the board. Stable and unique.
    pub number: i64,

    /// Inactive counters cannot call tickets.
    pub is_active: bool,

    /// Ticket currently being served here.
    pub current_ticket_id: Option<String>,
}

impl Counter {
    /// Not holding a ticket.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.current_ticket_id.is_none()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
