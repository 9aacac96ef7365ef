//! # Counter Registry
//!
//! Service positions and which ticket each one is serving.
//!
//! A counter's `current_ticket_id` and the ticket's `counter_id` always
//! change together inside one [`StoreTx`](crate::StoreTx); this module only
//! touches the counter side.

use sqlx::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;

use beacon_core::validation::{validate_counter_label, validate_counter_number};
use beacon_core::{CoreError, Counter};

use crate::error::{DbError, DbResult};
use crate::pool::Database;

const COUNTER_COLUMNS: &str = "id, label, number, is_active, current_ticket_id";

// =============================================================================
// Counter Registry
// =============================================================================

/// Repository for counter database operations.
#[derive(Debug, Clone)]
pub struct CounterRegistry {
    db: Database,
}

impl CounterRegistry {
    pub(crate) fn new(db: Database) -> Self {
        CounterRegistry { db }
    }

    /// Gets a counter by ID. `CounterNotFound` if unknown.
    pub async fn get(&self, id: &str) -> DbResult<Counter> {
        self.find(id)
            .await?
            .ok_or_else(|| CoreError::CounterNotFound(id.to_string()).into())
    }

    /// Gets a counter by ID, if it exists.
    pub async fn find(&self, id: &str) -> DbResult<Option<Counter>> {
        let mut conn = self.db.reader().acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Active counters ordered by display number.
    pub async fn list_active(&self) -> DbResult<Vec<Counter>> {
        let sql = format!(
            "SELECT {COUNTER_COLUMNS} FROM counters WHERE is_active = 1 ORDER BY number ASC"
        );
        let counters = sqlx::query_as::<_, Counter>(&sql)
            .fetch_all(self.db.reader())
            .await?;
        Ok(counters)
    }

    /// Binds a ticket to an idle counter.
    ///
    /// ## Errors
    /// - `CounterNotFound` if `counter_id` is unknown
    /// - `CounterBusy` if the counter already holds a ticket
    pub async fn assign_ticket(&self, counter_id: &str, ticket_id: &str) -> DbResult<()> {
        let mut lease = self.db.write().await?;
        let mut tx = lease.begin().await?;
        tx.assign_ticket(counter_id, ticket_id).await?;
        tx.commit().await
    }

    /// Frees a counter. A no-op on an idle counter.
    pub async fn clear_ticket(&self, counter_id: &str) -> DbResult<()> {
        let mut lease = self.db.write().await?;
        let mut tx = lease.begin().await?;
        tx.clear_ticket(counter_id).await?;
        tx.commit().await
    }

    /// Registers a counter, or updates and reactivates the one with the
    /// same display number. Idempotent.
    pub async fn register(&self, label: &str, number: i64) -> DbResult<Counter> {
        let label = validate_counter_label(label)?;
        validate_counter_number(number)?;

        let mut lease = self.db.write().await?;
        let mut tx = lease.begin().await?;
        let counter = upsert(tx.conn(), &label, number).await?;
        tx.commit().await?;

        info!(counter = number, id = %counter.id, label = %counter.label, "Counter registered");
        Ok(counter)
    }

    /// Activates or deactivates a counter. Inactive counters cannot call.
    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<Counter> {
        let mut lease = self.db.write().await?;
        let mut tx = lease.begin().await?;

        let result = sqlx::query("UPDATE counters SET is_active = ?1 WHERE id = ?2")
            .bind(active)
            .bind(id)
            .execute(&mut *tx.conn())
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::CounterNotFound(id.to_string()).into());
        }

        let counter = fetch(tx.conn(), id)
            .await?
            .ok_or_else(|| CoreError::CounterNotFound(id.to_string()))?;
        tx.commit().await?;

        debug!(id = %id, active, "Counter activity changed");
        Ok(counter)
    }
}

// =============================================================================
// Queries
// =============================================================================

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Counter>> {
    let sql = format!("SELECT {COUNTER_COLUMNS} FROM counters WHERE id = ?1");
    let counter = sqlx::query_as::<_, Counter>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(counter)
}

pub(crate) async fn upsert(
    conn: &mut SqliteConnection,
    label: &str,
    number: i64,
) -> DbResult<Counter> {
    sqlx::query(
        r#"
        INSERT INTO counters (id, label, number, is_active)
        VALUES (?1, ?2, ?3, 1)
        ON CONFLICT(number) DO UPDATE SET label = excluded.label, is_active = 1
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(label)
    .bind(number)
    .execute(&mut *conn)
    .await?;

    let sql = format!("SELECT {COUNTER_COLUMNS} FROM counters WHERE number = ?1");
    let counter = sqlx::query_as::<_, Counter>(&sql)
        .bind(number)
        .fetch_one(&mut *conn)
        .await?;
    Ok(counter)
}

pub(crate) async fn assign(
    conn: &mut SqliteConnection,
    counter_id: &str,
    ticket_id: &str,
) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE counters SET current_ticket_id = ?1 WHERE id = ?2 AND current_ticket_id IS NULL",
    )
    .bind(ticket_id)
    .bind(counter_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(match fetch(conn, counter_id).await? {
            None => CoreError::CounterNotFound(counter_id.to_string()).into(),
            Some(Counter {
                current_ticket_id: Some(held),
                ..
            }) => CoreError::CounterBusy {
                counter_id: counter_id.to_string(),
                ticket_id: held,
            }
            .into(),
            Some(_) => DbError::Internal(format!("counter {counter_id} rejected assignment")),
        });
    }

    debug!(counter_id = %counter_id, ticket_id = %ticket_id, "Ticket assigned to counter");
    Ok(())
}

pub(crate) async fn clear(conn: &mut SqliteConnection, counter_id: &str) -> DbResult<()> {
    let result = sqlx::query("UPDATE counters SET current_ticket_id = NULL WHERE id = ?1")
        .bind(counter_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::CounterNotFound(counter_id.to_string()).into());
    }
    Ok(())
}

pub(crate) async fn release(
    conn: &mut SqliteConnection,
    ticket_id: &str,
) -> DbResult<Option<Counter>> {
    let sql = format!("SELECT {COUNTER_COLUMNS} FROM counters WHERE current_ticket_id = ?1");
    let holders = sqlx::query_as::<_, Counter>(&sql)
        .bind(ticket_id)
        .fetch_all(&mut *conn)
        .await?;

    if holders.is_empty() {
        return Ok(None);
    }

    sqlx::query("UPDATE counters SET current_ticket_id = NULL WHERE current_ticket_id = ?1")
        .bind(ticket_id)
        .execute(&mut *conn)
        .await?;

    Ok(holders.into_iter().next().map(|mut counter| {
        counter.current_ticket_id = None;
        counter
    }))
}

pub(crate) async fn dangling(conn: &mut SqliteConnection) -> DbResult<Vec<Counter>> {
    let counters = sqlx::query_as::<_, Counter>(
        r#"
        SELECT c.id, c.label, c.number, c.is_active, c.current_ticket_id
        FROM counters c
        LEFT JOIN tickets t ON t.id = c.current_ticket_id
        WHERE c.current_ticket_id IS NOT NULL
          AND (t.id IS NULL
               OR t.status <> 'serving'
               OR t.counter_id IS NULL
               OR t.counter_id <> c.id)
        ORDER BY c.number ASC
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(counters)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbConfig;
    use beacon_core::TicketClass;

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_register_and_list_in_number_order() {
        let db = setup().await;
        let registry = db.counters();

        registry.register("Counter 3", 3).await.unwrap();
        registry.register("Counter 1", 1).await.unwrap();
        registry.register("Counter 2", 2).await.unwrap();

        let numbers: Vec<i64> = registry
            .list_active()
            .await
            .unwrap()
            .iter()
            .map(|c| c.number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_register_is_idempotent_and_reactivates() {
        let db = setup().await;
        let registry = db.counters();

        let first = registry.register("Counter 1", 1).await.unwrap();
        registry.set_active(&first.id, false).await.unwrap();
        assert!(registry.list_active().await.unwrap().is_empty());

        let again = registry.register("Front Desk", 1).await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.label, "Front Desk");
        assert!(again.is_active);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let db = setup().await;
        let err = db.counters().register("Counter 0", 0).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_get_unknown_counter() {
        let db = setup().await;
        let err = db.counters().get("missing").await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::CounterNotFound(_))));
    }

    #[tokio::test]
    async fn test_assign_busy_counter() {
        let db = setup().await;
        let counter = db.counters().register("Counter 1", 1).await.unwrap();
        let t1 = db.tickets().create(TicketClass::WalkIn, "Battery", "W001").await.unwrap();
        let t2 = db.tickets().create(TicketClass::WalkIn, "Battery", "W002").await.unwrap();

        db.counters().assign_ticket(&counter.id, &t1.id).await.unwrap();
        let err = db.counters().assign_ticket(&counter.id, &t2.id).await.unwrap_err();

        match err {
            DbError::Domain(CoreError::CounterBusy { ticket_id, .. }) => assert_eq!(ticket_id, t1.id),
            other => panic!("unexpected error: {other:?}"),
        }

        db.counters().clear_ticket(&counter.id).await.unwrap();
        assert!(db.counters().get(&counter.id).await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn test_release_and_dangling() {
        let db = setup().await;
        let counter = db.counters().register("Counter 1", 1).await.unwrap();
        let ticket = db.tickets().create(TicketClass::WalkIn, "Battery", "W001").await.unwrap();

        // Counter points at a ticket that is still waiting: dangling.
        db.counters().assign_ticket(&counter.id, &ticket.id).await.unwrap();

        let mut lease = db.write().await.unwrap();
        let mut tx = lease.begin().await.unwrap();
        let dangling = tx.dangling_counters().await.unwrap();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].id, counter.id);

        let released = tx.release_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(released.id, counter.id);
        assert!(released.current_ticket_id.is_none());
        assert!(tx.dangling_counters().await.unwrap().is_empty());
        assert!(tx.release_ticket(&ticket.id).await.unwrap().is_none());
        tx.commit().await.unwrap();
    }
}
