//! # beacon-db: Database Layer for Beacon Queue
//!
//! SQLite persistence for tickets and counters, using sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Beacon Queue Data Flow                           │
//! │                                                                         │
//! │  DispatchEngine::call_next(counter, class)                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    beacon-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │ writer (1)    │◄───│ TicketStore   │    │ 001_initial_ │  │   │
//! │  │   │ reader (N)    │    │ CounterRegis- │    │   schema.sql │  │   │
//! │  │   │ WriteLease    │    │   try         │    │              │  │   │
//! │  │   │ StoreTx       │    │               │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pools and configuration
//! - [`tx`] - Write lease and write transactions
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Ticket store and counter registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use beacon_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("beacon.db")).await?;
//! db.counters().register("Counter 1", 1).await?;
//! let waiting = db.tickets().list_by_status(TicketStatus::Waiting, None).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod tx;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use tx::{StoreTx, WriteLease};

// Repository re-exports for convenience
pub use repository::counter::CounterRegistry;
pub use repository::ticket::TicketStore;
