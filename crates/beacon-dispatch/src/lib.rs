//! # beacon-dispatch: Dispatch Engine for Beacon Queue
//!
//! Owns every multi-step queue mutation and the event stream that reports
//! them.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Dispatch Architecture                            │
//! │                                                                         │
//! │  HTTP handlers ──► DispatchEngine ──────────────┐                      │
//! │                    intake / call_next /         │ commit               │
//! │                    complete / cancel            ▼                      │
//! │                         │                 beacon-db (single writer)    │
//! │                         │ publish               ▲                      │
//! │                         ▼                       │ sweep                │
//! │                  EventBroadcaster ◄──── StalenessReconciler            │
//! │                    │         │                                         │
//! │                    ▼         ▼                                         │
//! │            /events WS    WebhookForwarder                              │
//! │            sessions      (optional POST sink)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - `DispatchEngine`: intake, call-next, complete, cancel, reads
//! - [`reconciler`] - periodic stuck/stale/dangling sweep
//! - [`broadcast`] - ordered in-process event fan-out
//! - [`webhook`] - forwards events to an HTTP endpoint with retry
//! - [`locks`] - per-key async critical sections
//! - [`config`] - layered TOML + environment configuration
//! - [`error`] - `DispatchError` and stable error codes
//!
//! ## Example
//! ```rust,ignore
//! let db = Database::new(DbConfig::new("./beacon.db")).await?;
//! let engine = DispatchEngine::new(db, EventBroadcaster::default());
//!
//! let ticket = engine.intake(TicketClass::WalkIn, "Battery", None).await?;
//! match engine.call_next(&counter_id, TicketClass::WalkIn).await? {
//!     CallNextOutcome::Called { ticket, .. } => println!("Now serving {}", ticket.number),
//!     CallNextOutcome::NoCustomersWaiting { .. } => println!("Queue empty"),
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod broadcast;
pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod reconciler;
pub mod webhook;

// =============================================================================
// Re-exports
// =============================================================================

pub use broadcast::{EventBroadcaster, EventSubscription};
pub use config::{BeaconConfig, CounterSeed, ReconcilerSettings};
pub use engine::{CallNextOutcome, CounterView, DispatchEngine};
pub use error::{DispatchError, DispatchResult, ErrorKind};
pub use locks::KeyedLocks;
pub use reconciler::{ReconcilerHandle, StalenessReconciler, SweepReport};
pub use webhook::{WebhookForwarder, WebhookHandle};
