//! # Repository Module
//!
//! Database repository implementations for Beacon Queue.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Ways In                                          │
//! │                                                                         │
//! │  Standalone (one call = one transaction)                               │
//! │       db.tickets().get(id)                                             │
//! │       db.counters().register("Counter 1", 1)                           │
//! │                                                                         │
//! │  Compound (many calls = one transaction)                               │
//! │       let mut lease = db.write().await?;                               │
//! │       let mut tx = lease.begin().await?;                               │
//! │       tx.oldest_waiting(..) / tx.transition(..) / tx.assign_ticket(..) │
//! │       tx.commit().await?;                                              │
//! │                                                                         │
//! │  Both end up in the same query functions in these modules.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`TicketStore`](ticket::TicketStore) - Ticket intake, lookup and transitions
//! - [`CounterRegistry`](counter::CounterRegistry) - Counter registration and assignment

pub mod counter;
pub mod ticket;
