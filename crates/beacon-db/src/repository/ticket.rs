//! # Ticket Store
//!
//! Persistence for tickets.
//!
//! ## Ticket Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Ticket Lifecycle                                  │
//! │                                                                         │
//! │  1. INTAKE                                                             │
//! │     └── insert() → Ticket { status: Waiting }                          │
//! │                                                                         │
//! │  2. CALL                                                               │
//! │     └── apply(Call) → Ticket { status: Serving, counter_id, called_at }│
//! │                                                                         │
//! │  3. FINISH                                                             │
//! │     └── apply(Complete) → Completed (completed_at, service_duration)   │
//! │     └── apply(Cancel)   → Cancelled (completed_at)                     │
//! │                                                                         │
//! │  (RECONCILER) apply(Requeue) → back to Waiting                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Status changes are conditional updates (`WHERE id = ? AND status = ?`),
//! so a change computed from a stale read matches zero rows and fails with
//! `InvalidTransition` instead of overwriting newer state.
//!
//! Free functions here take a bare connection so they can run either inside
//! a [`StoreTx`](crate::StoreTx) or on a pooled reader connection.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use beacon_core::{CoreError, Ticket, TicketChange, TicketClass, TicketStatus};

use crate::error::{DbError, DbResult};
use crate::pool::Database;

const TICKET_COLUMNS: &str = "id, number, class, category, status, counter_id, \
                              created_at, called_at, completed_at, service_duration";

// =============================================================================
// Ticket Store
// =============================================================================

/// Repository for ticket database operations.
///
/// Reads go through the reader pool. Standalone mutations take the write
/// lease for the duration of one transaction.
#[derive(Debug, Clone)]
pub struct TicketStore {
    db: Database,
}

impl TicketStore {
    pub(crate) fn new(db: Database) -> Self {
        TicketStore { db }
    }

    /// Inserts a waiting ticket with an already chosen number.
    pub async fn create(
        &self,
        class: TicketClass,
        category: &str,
        number: &str,
    ) -> DbResult<Ticket> {
        let mut lease = self.db.write().await?;
        let mut tx = lease.begin().await?;
        let ticket = tx.create_ticket(class, category, number, Utc::now()).await?;
        tx.commit().await?;
        Ok(ticket)
    }

    /// Gets a ticket by ID. `TicketNotFound` if unknown.
    pub async fn get(&self, id: &str) -> DbResult<Ticket> {
        self.find(id)
            .await?
            .ok_or_else(|| CoreError::TicketNotFound(id.to_string()).into())
    }

    /// Gets a ticket by ID, if it exists.
    pub async fn find(&self, id: &str) -> DbResult<Option<Ticket>> {
        let mut conn = self.db.reader().acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Tickets in `status`, oldest first. Insertion order breaks ties.
    pub async fn list_by_status(
        &self,
        status: TicketStatus,
        class: Option<TicketClass>,
    ) -> DbResult<Vec<Ticket>> {
        let mut conn = self.db.reader().acquire().await?;
        fetch_by_status(&mut conn, status, class).await
    }

    /// Applies one state machine change atomically.
    ///
    /// ## Errors
    /// - `TicketNotFound` if `id` is unknown
    /// - `InvalidTransition` if the ticket is not in `expected`, or the
    ///   change is not allowed from `expected`
    pub async fn transition(
        &self,
        id: &str,
        expected: TicketStatus,
        change: &TicketChange,
    ) -> DbResult<Ticket> {
        let mut lease = self.db.write().await?;
        let mut tx = lease.begin().await?;
        let ticket = tx.transition(id, expected, change).await?;
        tx.commit().await?;
        Ok(ticket)
    }

    /// The ticket currently being served at `counter_id`.
    pub async fn current_for_counter(&self, counter_id: &str) -> DbResult<Option<Ticket>> {
        let mut conn = self.db.reader().acquire().await?;
        current_for_counter(&mut conn, counter_id).await
    }

    /// Display numbers held by waiting and serving tickets.
    pub async fn active_numbers(&self) -> DbResult<Vec<String>> {
        let mut conn = self.db.reader().acquire().await?;
        active_numbers(&mut conn).await
    }
}

// =============================================================================
// Queries
// =============================================================================

pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    class: TicketClass,
    category: &str,
    number: &str,
    now: DateTime<Utc>,
) -> DbResult<Ticket> {
    let ticket = Ticket {
        id: Uuid::new_v4().to_string(),
        number: number.to_string(),
        class,
        category: category.to_string(),
        status: TicketStatus::Waiting,
        counter_id: None,
        created_at: now,
        called_at: None,
        completed_at: None,
        service_duration: None,
    };

    debug!(id = %ticket.id, number = %ticket.number, class = %class, "Inserting ticket");

    sqlx::query(
        r#"
        INSERT INTO tickets (id, number, class, category, status, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&ticket.id)
    .bind(&ticket.number)
    .bind(ticket.class)
    .bind(&ticket.category)
    .bind(ticket.status)
    .bind(ticket.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|err| match DbError::from(err) {
        DbError::UniqueViolation { .. } => DbError::Domain(CoreError::DuplicateActiveTicket {
            number: ticket.number.clone(),
        }),
        other => other,
    })?;

    Ok(ticket)
}

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Ticket>> {
    let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1");
    let ticket = sqlx::query_as::<_, Ticket>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(ticket)
}

pub(crate) async fn fetch_by_status(
    conn: &mut SqliteConnection,
    status: TicketStatus,
    class: Option<TicketClass>,
) -> DbResult<Vec<Ticket>> {
    let sql = format!(
        "SELECT {TICKET_COLUMNS} FROM tickets \
         WHERE status = ?1 AND (?2 IS NULL OR class = ?2) \
         ORDER BY created_at ASC, rowid ASC"
    );
    let tickets = sqlx::query_as::<_, Ticket>(&sql)
        .bind(status)
        .bind(class)
        .fetch_all(&mut *conn)
        .await?;
    Ok(tickets)
}

pub(crate) async fn oldest_waiting(
    conn: &mut SqliteConnection,
    class: TicketClass,
) -> DbResult<Option<Ticket>> {
    let sql = format!(
        "SELECT {TICKET_COLUMNS} FROM tickets \
         WHERE status = 'waiting' AND class = ?1 \
         ORDER BY created_at ASC, rowid ASC \
         LIMIT 1"
    );
    let ticket = sqlx::query_as::<_, Ticket>(&sql)
        .bind(class)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(ticket)
}

pub(crate) async fn active_numbers(conn: &mut SqliteConnection) -> DbResult<Vec<String>> {
    let numbers = sqlx::query_scalar::<_, String>(
        "SELECT number FROM tickets WHERE status IN ('waiting', 'serving')",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(numbers)
}

pub(crate) async fn current_for_counter(
    conn: &mut SqliteConnection,
    counter_id: &str,
) -> DbResult<Option<Ticket>> {
    let sql = format!(
        "SELECT {TICKET_COLUMNS} FROM tickets \
         WHERE counter_id = ?1 AND status = 'serving' \
         ORDER BY called_at DESC \
         LIMIT 1"
    );
    let ticket = sqlx::query_as::<_, Ticket>(&sql)
        .bind(counter_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(ticket)
}

pub(crate) async fn stuck_serving(
    conn: &mut SqliteConnection,
    called_before: DateTime<Utc>,
) -> DbResult<Vec<Ticket>> {
    let sql = format!(
        "SELECT {TICKET_COLUMNS} FROM tickets \
         WHERE status = 'serving' AND called_at < ?1 \
         ORDER BY called_at ASC, rowid ASC"
    );
    let tickets = sqlx::query_as::<_, Ticket>(&sql)
        .bind(called_before)
        .fetch_all(&mut *conn)
        .await?;
    Ok(tickets)
}

pub(crate) async fn stale_waiting(
    conn: &mut SqliteConnection,
    created_before: DateTime<Utc>,
) -> DbResult<Vec<Ticket>> {
    let sql = format!(
        "SELECT {TICKET_COLUMNS} FROM tickets \
         WHERE status = 'waiting' AND created_at < ?1 \
         ORDER BY created_at ASC, rowid ASC"
    );
    let tickets = sqlx::query_as::<_, Ticket>(&sql)
        .bind(created_before)
        .fetch_all(&mut *conn)
        .await?;
    Ok(tickets)
}

/// Conditional status update. Returns the ticket as stored afterwards.
pub(crate) async fn apply(
    conn: &mut SqliteConnection,
    id: &str,
    expected: TicketStatus,
    change: &TicketChange,
) -> DbResult<Ticket> {
    change.check(id, expected)?;

    let target = change.target();
    let query = match change {
        TicketChange::Call { counter_id, at } => sqlx::query(
            r#"
            UPDATE tickets SET status = ?1, counter_id = ?2, called_at = ?3
            WHERE id = ?4 AND status = ?5
            "#,
        )
        .bind(target)
        .bind(counter_id)
        .bind(*at),

        TicketChange::Complete { at, duration_secs } => sqlx::query(
            r#"
            UPDATE tickets SET status = ?1, counter_id = NULL,
                completed_at = ?2, service_duration = ?3
            WHERE id = ?4 AND status = ?5
            "#,
        )
        .bind(target)
        .bind(*at)
        .bind(*duration_secs),

        TicketChange::Cancel { at } => sqlx::query(
            r#"
            UPDATE tickets SET status = ?1, counter_id = NULL, completed_at = ?2
            WHERE id = ?3 AND status = ?4
            "#,
        )
        .bind(target)
        .bind(*at),

        TicketChange::Requeue => sqlx::query(
            r#"
            UPDATE tickets SET status = ?1, counter_id = NULL, called_at = NULL
            WHERE id = ?2 AND status = ?3
            "#,
        )
        .bind(target),
    };

    let result = query.bind(id).bind(expected).execute(&mut *conn).await?;

    if result.rows_affected() == 0 {
        // Either the ticket is gone or it moved on since it was read.
        return Err(match fetch(conn, id).await? {
            None => CoreError::TicketNotFound(id.to_string()),
            Some(current) => CoreError::InvalidTransition {
                ticket_id: id.to_string(),
                from: current.status,
                to: target,
            },
        }
        .into());
    }

    debug!(id = %id, from = %expected, to = %target, "Ticket transitioned");

    fetch(conn, id)
        .await?
        .ok_or_else(|| DbError::Internal(format!("ticket {id} vanished after update")))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbConfig;
    use chrono::Duration;

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn counter_id(db: &Database) -> String {
        db.counters().register("Counter 1", 1).await.unwrap().id
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = setup().await;
        let store = db.tickets();

        let created = store.create(TicketClass::WalkIn, "Battery", "W001").await.unwrap();
        let fetched = store.get(&created.id).await.unwrap();

        assert_eq!(fetched.number, "W001");
        assert_eq!(fetched.status, TicketStatus::Waiting);
        assert_eq!(fetched.class, TicketClass::WalkIn);
        assert_eq!(fetched.category, "Battery");
        assert!(fetched.counter_id.is_none());
    }

    #[tokio::test]
    async fn test_get_unknown_ticket() {
        let db = setup().await;
        let err = db.tickets().get("missing").await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::TicketNotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_active_number_rejected() {
        let db = setup().await;
        let store = db.tickets();

        store.create(TicketClass::WalkIn, "Battery", "W001").await.unwrap();
        let err = store
            .create(TicketClass::WalkIn, "Repair", "W001")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DbError::Domain(CoreError::DuplicateActiveTicket { ref number }) if number == "W001"
        ));
    }

    #[tokio::test]
    async fn test_finished_number_can_be_reused() {
        let db = setup().await;
        let store = db.tickets();

        let first = store.create(TicketClass::WalkIn, "Battery", "W001").await.unwrap();
        store
            .transition(&first.id, TicketStatus::Waiting, &TicketChange::Cancel { at: Utc::now() })
            .await
            .unwrap();

        let again = store.create(TicketClass::WalkIn, "Battery", "W001").await.unwrap();
        assert_ne!(again.id, first.id);
        assert_eq!(store.active_numbers().await.unwrap(), vec!["W001".to_string()]);
    }

    #[tokio::test]
    async fn test_list_by_status_is_fifo_per_class() {
        let db = setup().await;
        let store = db.tickets();

        let w1 = store.create(TicketClass::WalkIn, "Battery", "W001").await.unwrap();
        let a1 = store.create(TicketClass::Appointment, "Repair", "A001").await.unwrap();
        let w2 = store.create(TicketClass::WalkIn, "Battery", "W002").await.unwrap();

        let walk_ins = store
            .list_by_status(TicketStatus::Waiting, Some(TicketClass::WalkIn))
            .await
            .unwrap();
        let ids: Vec<_> = walk_ins.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![w1.id.as_str(), w2.id.as_str()]);

        let all = store.list_by_status(TicketStatus::Waiting, None).await.unwrap();
        let ids: Vec<_> = all.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![w1.id.as_str(), a1.id.as_str(), w2.id.as_str()]);
    }

    #[tokio::test]
    async fn test_same_timestamp_keeps_insertion_order() {
        let db = setup().await;
        let now = Utc::now();

        let mut lease = db.write().await.unwrap();
        let mut tx = lease.begin().await.unwrap();
        let first = tx.create_ticket(TicketClass::WalkIn, "Battery", "W001", now).await.unwrap();
        tx.create_ticket(TicketClass::WalkIn, "Battery", "W002", now).await.unwrap();
        let head = tx.oldest_waiting(TicketClass::WalkIn).await.unwrap().unwrap();
        tx.commit().await.unwrap();

        assert_eq!(head.id, first.id);
    }

    #[tokio::test]
    async fn test_call_then_complete() {
        let db = setup().await;
        let store = db.tickets();
        let counter = counter_id(&db).await;
        let ticket = store.create(TicketClass::WalkIn, "Battery", "W001").await.unwrap();

        let serving = store
            .transition(
                &ticket.id,
                TicketStatus::Waiting,
                &TicketChange::Call { counter_id: counter.clone(), at: Utc::now() },
            )
            .await
            .unwrap();
        assert_eq!(serving.status, TicketStatus::Serving);
        assert_eq!(serving.counter_id.as_deref(), Some(counter.as_str()));
        assert!(serving.called_at.is_some());

        let current = store.current_for_counter(&counter).await.unwrap().unwrap();
        assert_eq!(current.id, ticket.id);

        let done = store
            .transition(
                &ticket.id,
                TicketStatus::Serving,
                &TicketChange::Complete { at: Utc::now(), duration_secs: Some(42) },
            )
            .await
            .unwrap();
        assert_eq!(done.status, TicketStatus::Completed);
        assert_eq!(done.service_duration, Some(42));
        assert!(done.counter_id.is_none());
        assert!(done.completed_at.is_some());
        assert!(store.current_for_counter(&counter).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_expected_status_is_rejected_unchanged() {
        let db = setup().await;
        let store = db.tickets();
        let ticket = store.create(TicketClass::WalkIn, "Battery", "W001").await.unwrap();

        // Caller believes the ticket is serving; it is still waiting.
        let err = store
            .transition(
                &ticket.id,
                TicketStatus::Serving,
                &TicketChange::Complete { at: Utc::now(), duration_secs: Some(5) },
            )
            .await
            .unwrap_err();

        match err {
            DbError::Domain(CoreError::InvalidTransition { from, to, .. }) => {
                assert_eq!(from, TicketStatus::Waiting);
                assert_eq!(to, TicketStatus::Completed);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let unchanged = store.get(&ticket.id).await.unwrap();
        assert_eq!(unchanged.status, TicketStatus::Waiting);
        assert!(unchanged.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_forbidden_change_rejected_before_update() {
        let db = setup().await;
        let store = db.tickets();
        let ticket = store.create(TicketClass::WalkIn, "Battery", "W001").await.unwrap();
        store
            .transition(&ticket.id, TicketStatus::Waiting, &TicketChange::Cancel { at: Utc::now() })
            .await
            .unwrap();

        let err = store
            .transition(&ticket.id, TicketStatus::Cancelled, &TicketChange::Cancel { at: Utc::now() })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_transition_unknown_ticket() {
        let db = setup().await;
        let err = db
            .tickets()
            .transition("missing", TicketStatus::Waiting, &TicketChange::Cancel { at: Utc::now() })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::TicketNotFound(_))));
    }

    #[tokio::test]
    async fn test_requeue_clears_call() {
        let db = setup().await;
        let store = db.tickets();
        let counter = counter_id(&db).await;
        let ticket = store.create(TicketClass::Appointment, "Repair", "A001").await.unwrap();
        store
            .transition(
                &ticket.id,
                TicketStatus::Waiting,
                &TicketChange::Call { counter_id: counter, at: Utc::now() },
            )
            .await
            .unwrap();

        let back = store
            .transition(&ticket.id, TicketStatus::Serving, &TicketChange::Requeue)
            .await
            .unwrap();
        assert_eq!(back.status, TicketStatus::Waiting);
        assert!(back.counter_id.is_none());
        assert!(back.called_at.is_none());
    }

    #[tokio::test]
    async fn test_stale_queries() {
        let db = setup().await;
        let counter = counter_id(&db).await;
        let long_ago = Utc::now() - Duration::hours(12);

        let mut lease = db.write().await.unwrap();
        let mut tx = lease.begin().await.unwrap();
        let old = tx.create_ticket(TicketClass::WalkIn, "Battery", "W001", long_ago).await.unwrap();
        tx.create_ticket(TicketClass::WalkIn, "Battery", "W002", Utc::now()).await.unwrap();
        let called = tx
            .create_ticket(TicketClass::WalkIn, "Battery", "W003", Utc::now())
            .await
            .unwrap();
        tx.transition(
            &called.id,
            TicketStatus::Waiting,
            &TicketChange::Call { counter_id: counter, at: long_ago },
        )
        .await
        .unwrap();

        let cutoff = Utc::now() - Duration::hours(11);
        let stale = tx.stale_waiting(cutoff).await.unwrap();
        let stuck = tx.stuck_serving(cutoff).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old.id);
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].id, called.id);
    }

    #[tokio::test]
    async fn test_rolled_back_transaction_leaves_nothing() {
        let db = setup().await;
        {
            let mut lease = db.write().await.unwrap();
            let mut tx = lease.begin().await.unwrap();
            tx.create_ticket(TicketClass::WalkIn, "Battery", "W001", Utc::now())
                .await
                .unwrap();
            tx.rollback().await.unwrap();
        }
        assert!(db.tickets().active_numbers().await.unwrap().is_empty());
    }
}
