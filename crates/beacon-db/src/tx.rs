//! # Write Transactions
//!
//! Every compound mutation (claim a ticket and bind it to a counter, cancel
//! and free the counter, sweep stale tickets) runs as one [`StoreTx`] on the
//! single writer connection.
//!
//! ```text
//! db.write().await?            ← WriteLease: exclusive writer connection
//!    └── lease.begin().await?  ← StoreTx: BEGIN
//!          ├── tx.oldest_waiting(..)
//!          ├── tx.transition(..)
//!          ├── tx.assign_ticket(..)
//!          └── tx.commit()     ← COMMIT (drop without commit = ROLLBACK)
//!    (publish events here, while the lease is still held)
//! drop(lease)
//! ```
//!
//! Publishing between commit and lease release makes event order match
//! commit order.

use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, Transaction};

use beacon_core::{Counter, Ticket, TicketChange, TicketClass, TicketStatus};

use crate::error::DbResult;
use crate::repository::{counter, ticket};

// =============================================================================
// Write Lease
// =============================================================================

/// Exclusive hold on the writer connection.
#[derive(Debug)]
pub struct WriteLease {
    conn: PoolConnection<Sqlite>,
}

impl WriteLease {
    pub(crate) fn new(conn: PoolConnection<Sqlite>) -> Self {
        WriteLease { conn }
    }

    /// Starts a transaction on the writer connection.
    pub async fn begin(&mut self) -> DbResult<StoreTx<'_>> {
        let tx = sqlx::Connection::begin(&mut *self.conn).await?;
        Ok(StoreTx { tx })
    }
}

// =============================================================================
// Store Transaction
// =============================================================================

/// An open write transaction over tickets and counters.
///
/// Nothing is visible to readers until [`StoreTx::commit`]. Dropping the
/// transaction rolls it back.
#[derive(Debug)]
pub struct StoreTx<'c> {
    tx: Transaction<'c, Sqlite>,
}

impl StoreTx<'_> {
    /// Commits all changes.
    pub async fn commit(self) -> DbResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Discards all changes.
    pub async fn rollback(self) -> DbResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Tickets
    // -------------------------------------------------------------------------

    /// Inserts a waiting ticket. `DuplicateActiveTicket` if `number` is held.
    pub async fn create_ticket(
        &mut self,
        class: TicketClass,
        category: &str,
        number: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Ticket> {
        ticket::insert(&mut self.tx, class, category, number, now).await
    }

    pub async fn ticket(&mut self, id: &str) -> DbResult<Option<Ticket>> {
        ticket::fetch(&mut self.tx, id).await
    }

    /// Display numbers of all waiting and serving tickets.
    pub async fn active_numbers(&mut self) -> DbResult<Vec<String>> {
        ticket::active_numbers(&mut self.tx).await
    }

    /// Head of the FIFO queue for `class`.
    pub async fn oldest_waiting(&mut self, class: TicketClass) -> DbResult<Option<Ticket>> {
        ticket::oldest_waiting(&mut self.tx, class).await
    }

    /// Applies `change` if the ticket is still in `expected`.
    pub async fn transition(
        &mut self,
        id: &str,
        expected: TicketStatus,
        change: &TicketChange,
    ) -> DbResult<Ticket> {
        ticket::apply(&mut self.tx, id, expected, change).await
    }

    /// The serving ticket bound to `counter_id`, if any.
    pub async fn current_for_counter(&mut self, counter_id: &str) -> DbResult<Option<Ticket>> {
        ticket::current_for_counter(&mut self.tx, counter_id).await
    }

    /// Serving tickets called before `called_before`.
    pub async fn stuck_serving(&mut self, called_before: DateTime<Utc>) -> DbResult<Vec<Ticket>> {
        ticket::stuck_serving(&mut self.tx, called_before).await
    }

    /// Waiting tickets created before `created_before`.
    pub async fn stale_waiting(&mut self, created_before: DateTime<Utc>) -> DbResult<Vec<Ticket>> {
        ticket::stale_waiting(&mut self.tx, created_before).await
    }

    // -------------------------------------------------------------------------
    // Counters
    // -------------------------------------------------------------------------

    pub async fn counter(&mut self, id: &str) -> DbResult<Option<Counter>> {
        counter::fetch(&mut self.tx, id).await
    }

    /// Binds `ticket_id` to an idle counter. `CounterBusy` otherwise.
    pub async fn assign_ticket(&mut self, counter_id: &str, ticket_id: &str) -> DbResult<()> {
        counter::assign(&mut self.tx, counter_id, ticket_id).await
    }

    /// Frees the counter.
    pub async fn clear_ticket(&mut self, counter_id: &str) -> DbResult<()> {
        counter::clear(&mut self.tx, counter_id).await
    }

    /// Frees whichever counter holds `ticket_id` and returns it.
    pub async fn release_ticket(&mut self, ticket_id: &str) -> DbResult<Option<Counter>> {
        counter::release(&mut self.tx, ticket_id).await
    }

    /// Counters pointing at a ticket that is not serving there.
    pub async fn dangling_counters(&mut self) -> DbResult<Vec<Counter>> {
        counter::dangling(&mut self.tx).await
    }
}
