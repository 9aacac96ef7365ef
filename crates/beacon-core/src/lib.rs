//! # beacon-core: Pure Queue Logic for Beacon
//!
//! Ticket and counter types, the ticket state machine, number allocation,
//! event payloads and validation. Nothing in this crate touches a database,
//! a socket or the clock; callers pass `now` in.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Beacon Queue Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            Display boards / counter screens / kiosks            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ HTTP + WebSocket                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    beacon-server (axum)                         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │     beacon-dispatch: engine, reconciler, broadcaster            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ beacon-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ lifecycle │  │ allocator │  │   event   │  │   │
//! │  │   │  Ticket   │  │  Ticket-  │  │  W001..   │  │ QueueEvent│  │   │
//! │  │   │  Counter  │  │  Change   │  │  A001..   │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 beacon-db (Database Layer)                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Ticket, Counter, TicketClass, TicketStatus
//! - [`lifecycle`] - Ticket state machine and operating-day boundary
//! - [`allocator`] - Display number allocation
//! - [`event`] - Broadcast event payloads
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use beacon_core::allocator::allocate;
//! use beacon_core::types::TicketClass;
//!
//! let active = ["W001", "W002", "W004"];
//! assert_eq!(allocate(TicketClass::WalkIn, active), "W003");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocator;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use event::{QueueEvent, StatusChangeReason, TicketSnapshot};
pub use lifecycle::TicketChange;
pub use types::{Counter, Ticket, TicketClass, TicketStatus};

// =============================================================================
// Constants
// =============================================================================

/// Longest service category accepted (matches the column width).
pub const MAX_CATEGORY_LEN: usize = 100;

/// Longest display number, manual or allocated.
pub const MAX_TICKET_NUMBER_LEN: usize = 10;

/// Longest counter label.
pub const MAX_COUNTER_LABEL_LEN: usize = 100;
