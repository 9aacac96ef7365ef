//! # Dispatch Engine
//!
//! Every multi-step queue mutation: intake, call-next, complete, cancel.
//!
//! ## Operation Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        One Engine Operation                             │
//! │                                                                         │
//! │  1. keyed lock        class (intake) │ counter id (call-next)          │
//! │                       ticket id (complete, cancel)                     │
//! │  2. write lease       the single SQLite writer connection              │
//! │  3. BEGIN                                                              │
//! │       read → check → conditional UPDATEs                               │
//! │  4. COMMIT            any error before this rolls everything back      │
//! │  5. publish events    still holding the lease: publish order equals   │
//! │                       commit order                                     │
//! │  6. release lease, then the keyed lock                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No operation takes two keyed locks, and the lease is always taken last,
//! so lock order cannot cycle. Failed transitions are reported, never
//! retried.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use beacon_core::allocator;
use beacon_core::validation::{validate_category, validate_duration};
use beacon_core::{
    CoreError, Counter, QueueEvent, StatusChangeReason, Ticket, TicketChange, TicketClass,
    TicketStatus,
};
use beacon_db::Database;

use crate::broadcast::EventBroadcaster;
use crate::error::DispatchResult;
use crate::locks::KeyedLocks;

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a call-next request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallNextOutcome {
    /// The oldest waiting ticket is now serving at the counter.
    Called {
        ticket: Ticket,
        counter: Counter,
        /// Ticket the counter was serving before, now completed.
        completed_prior: Option<Ticket>,
    },

    /// Nothing of the requested class is waiting. Not an error.
    NoCustomersWaiting { completed_prior: Option<Ticket> },
}

impl CallNextOutcome {
    /// The newly called ticket, if any.
    pub fn called(&self) -> Option<&Ticket> {
        match self {
            CallNextOutcome::Called { ticket, .. } => Some(ticket),
            CallNextOutcome::NoCustomersWaiting { .. } => None,
        }
    }

    pub fn completed_prior(&self) -> Option<&Ticket> {
        match self {
            CallNextOutcome::Called { completed_prior, .. }
            | CallNextOutcome::NoCustomersWaiting { completed_prior } => completed_prior.as_ref(),
        }
    }
}

/// A counter together with the ticket it is serving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterView {
    #[serde(flatten)]
    pub counter: Counter,
    pub current_ticket: Option<Ticket>,
}

// =============================================================================
// Dispatch Engine
// =============================================================================

/// Serializes queue mutations and publishes their events.
///
/// Share one instance (behind an `Arc`) across all request handlers; two
/// engines over the same database would not see each other's locks.
#[derive(Debug)]
pub struct DispatchEngine {
    db: Database,
    broadcaster: EventBroadcaster,
    intake_locks: KeyedLocks<TicketClass>,
    counter_locks: KeyedLocks<String>,
    ticket_locks: KeyedLocks<String>,
}

impl DispatchEngine {
    pub fn new(db: Database, broadcaster: EventBroadcaster) -> Self {
        DispatchEngine {
            db,
            broadcaster,
            intake_locks: KeyedLocks::new(),
            counter_locks: KeyedLocks::new(),
            ticket_locks: KeyedLocks::new(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Issues a ticket.
    ///
    /// Without `manual_number` the lowest free number for `class` is
    /// allocated. A manual number (walk-in only) must not be held by any
    /// waiting or serving ticket.
    ///
    /// ## Errors
    /// - `Validation` for a bad category or manual number
    /// - `DuplicateActiveTicket` if the manual number is taken
    pub async fn intake(
        &self,
        class: TicketClass,
        category: &str,
        manual_number: Option<&str>,
    ) -> DispatchResult<Ticket> {
        let category = validate_category(category)?;

        let _class_guard = self.intake_locks.lock(&class).await;
        let mut lease = self.db.write().await?;
        let mut tx = lease.begin().await?;

        let active = tx.active_numbers().await?;
        let number = match manual_number {
            Some(manual) => allocator::validate_manual(class, manual, &active)?,
            None => allocator::allocate(class, &active),
        };

        let ticket = tx.create_ticket(class, &category, &number, Utc::now()).await?;
        tx.commit().await?;

        self.broadcaster.publish(QueueEvent::queue_added(&ticket));
        drop(lease);

        info!(
            ticket = %ticket.number,
            class = %class,
            category = %ticket.category,
            manual = manual_number.is_some(),
            "Ticket issued"
        );
        Ok(ticket)
    }

    /// Claims the oldest waiting ticket of `class` for a counter.
    ///
    /// Whatever the counter was still serving is completed first, without a
    /// recorded duration.
    ///
    /// ## Errors
    /// - `CounterNotFound` / `CounterInactive`
    pub async fn call_next(
        &self,
        counter_id: &str,
        class: TicketClass,
    ) -> DispatchResult<CallNextOutcome> {
        let _counter_guard = self.counter_locks.lock(&counter_id.to_string()).await;
        let mut lease = self.db.write().await?;
        let mut tx = lease.begin().await?;
        let now = Utc::now();

        let mut counter = tx
            .counter(counter_id)
            .await?
            .ok_or_else(|| CoreError::CounterNotFound(counter_id.to_string()))?;
        if !counter.is_active {
            return Err(CoreError::CounterInactive(counter_id.to_string()).into());
        }

        // 1. Finish whatever is still on the counter.
        let completed_prior = match tx.current_for_counter(counter_id).await? {
            Some(prior) => {
                let change = TicketChange::Complete {
                    at: now,
                    duration_secs: None,
                };
                Some(tx.transition(&prior.id, TicketStatus::Serving, &change).await?)
            }
            None => None,
        };
        if counter.current_ticket_id.is_some() {
            tx.clear_ticket(counter_id).await?;
            counter.current_ticket_id = None;
        }

        // 2. Head of the queue.
        let Some(next) = tx.oldest_waiting(class).await? else {
            tx.commit().await?;
            if let Some(prior) = &completed_prior {
                self.broadcaster
                    .publish(QueueEvent::service_completed(prior, Some(&counter), now));
            }
            drop(lease);

            debug!(counter = counter.number, class = %class, "No customers waiting");
            return Ok(CallNextOutcome::NoCustomersWaiting { completed_prior });
        };

        // 3-4. Claim it and bind it to the counter.
        let change = TicketChange::Call {
            counter_id: counter_id.to_string(),
            at: now,
        };
        let ticket = tx.transition(&next.id, TicketStatus::Waiting, &change).await?;
        tx.assign_ticket(counter_id, &ticket.id).await?;
        counter.current_ticket_id = Some(ticket.id.clone());
        tx.commit().await?;

        // 5. Publish in commit order.
        if let Some(prior) = &completed_prior {
            self.broadcaster
                .publish(QueueEvent::service_completed(prior, Some(&counter), now));
        }
        self.broadcaster
            .publish(QueueEvent::customer_called(&ticket, &counter, now));
        drop(lease);

        info!(
            ticket = %ticket.number,
            counter = counter.number,
            auto_completed = completed_prior.as_ref().map(|t| t.number.as_str()),
            "Customer called"
        );
        Ok(CallNextOutcome::Called {
            ticket,
            counter,
            completed_prior,
        })
    }

    /// Finishes a serving ticket and frees its counter.
    ///
    /// ## Errors
    /// - `Validation` if `duration_secs` is negative
    /// - `TicketNotFound`
    /// - `InvalidTransition` unless the ticket is serving
    pub async fn complete(&self, ticket_id: &str, duration_secs: i64) -> DispatchResult<Ticket> {
        validate_duration(duration_secs)?;

        let _ticket_guard = self.ticket_locks.lock(&ticket_id.to_string()).await;
        let mut lease = self.db.write().await?;
        let mut tx = lease.begin().await?;
        let now = Utc::now();

        let change = TicketChange::Complete {
            at: now,
            duration_secs: Some(duration_secs),
        };
        let ticket = tx.transition(ticket_id, TicketStatus::Serving, &change).await?;
        let counter = tx.release_ticket(ticket_id).await?;
        tx.commit().await?;

        self.broadcaster
            .publish(QueueEvent::service_completed(&ticket, counter.as_ref(), now));
        drop(lease);

        info!(
            ticket = %ticket.number,
            counter = counter.as_ref().map(|c| c.number),
            duration_secs,
            "Service completed"
        );
        Ok(ticket)
    }

    /// Cancels a waiting or serving ticket, freeing its counter if any.
    ///
    /// ## Errors
    /// - `TicketNotFound`
    /// - `InvalidTransition` for completed or cancelled tickets
    pub async fn cancel(&self, ticket_id: &str) -> DispatchResult<Ticket> {
        let _ticket_guard = self.ticket_locks.lock(&ticket_id.to_string()).await;
        let mut lease = self.db.write().await?;
        let mut tx = lease.begin().await?;
        let now = Utc::now();

        let current = tx
            .ticket(ticket_id)
            .await?
            .ok_or_else(|| CoreError::TicketNotFound(ticket_id.to_string()))?;

        let change = TicketChange::Cancel { at: now };
        change.check(ticket_id, current.status)?;

        let ticket = tx.transition(ticket_id, current.status, &change).await?;
        let counter = if current.status == TicketStatus::Serving {
            tx.release_ticket(ticket_id).await?
        } else {
            None
        };
        tx.commit().await?;

        self.broadcaster.publish(QueueEvent::status_changed(
            &ticket,
            counter.as_ref(),
            StatusChangeReason::Cancelled,
            now,
        ));
        drop(lease);

        info!(ticket = %ticket.number, was = %current.status, "Ticket cancelled");
        Ok(ticket)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// One ticket by id.
    pub async fn ticket(&self, id: &str) -> DispatchResult<Ticket> {
        Ok(self.db.tickets().get(id).await?)
    }

    /// Tickets in `status`, oldest first.
    pub async fn list(
        &self,
        status: TicketStatus,
        class: Option<TicketClass>,
    ) -> DispatchResult<Vec<Ticket>> {
        Ok(self.db.tickets().list_by_status(status, class).await?)
    }

    /// Active counters, by number, each with its current ticket.
    pub async fn counters(&self) -> DispatchResult<Vec<CounterView>> {
        let counters = self.db.counters().list_active().await?;
        let mut views = Vec::with_capacity(counters.len());
        for counter in counters {
            views.push(self.view(counter).await?);
        }
        Ok(views)
    }

    /// One counter with its current ticket.
    pub async fn counter(&self, id: &str) -> DispatchResult<CounterView> {
        let counter = self.db.counters().get(id).await?;
        self.view(counter).await
    }

    /// The ticket a counter is serving, if any.
    pub async fn current_for_counter(&self, counter_id: &str) -> DispatchResult<Option<Ticket>> {
        self.db.counters().get(counter_id).await?;
        Ok(self.db.tickets().current_for_counter(counter_id).await?)
    }

    /// The number the next auto-allocated intake of `class` would get.
    ///
    /// Nothing is reserved; a concurrent intake may take it first.
    pub async fn preview_number(&self, class: TicketClass) -> DispatchResult<String> {
        let active = self.db.tickets().active_numbers().await?;
        Ok(allocator::allocate(class, &active))
    }

    async fn view(&self, counter: Counter) -> DispatchResult<CounterView> {
        let current_ticket = match &counter.current_ticket_id {
            Some(ticket_id) => self.db.tickets().find(ticket_id).await?,
            None => None,
        };
        Ok(CounterView {
            counter,
            current_ticket,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
