//! # Database Pool Management
//!
//! Connection pools and configuration for SQLite.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pools                          │
//! │                                                                         │
//! │  Database::new(DbConfig)                                               │
//! │       │                                                                 │
//! │       ├──► writer: SqlitePool (exactly 1 connection)                   │
//! │       │      every mutation runs in one transaction here               │
//! │       │      holding it = holding the write lease                      │
//! │       │                                                                 │
//! │       └──► reader: SqlitePool (max_connections)                        │
//! │              listings, lookups, health checks                          │
//! │              WAL: readers never block the writer                       │
//! │                                                                         │
//! │  In-memory databases live inside one connection, so reader and         │
//! │  writer share a single pool there.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lease Rule
//! Never read through [`Database::reader`] while holding a [`WriteLease`] in
//! the same task. With an in-memory database both come from the same single
//! connection and the read would wait forever.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::counter::CounterRegistry;
use crate::repository::ticket::TicketStore;
use crate::tx::WriteLease;

const MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/beacon/beacon.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file, or `:memory:`.
    pub database_path: PathBuf,

    /// Maximum number of reader connections.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of reader connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// How long to wait for a pooled connection.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a reader connection.
    /// Default: 10 minutes. `None` keeps connections forever.
    pub idle_timeout: Option<Duration>,

    /// How long SQLite waits on a locked database before failing.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of reader connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of reader connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the SQLite busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// Each `Database::new` call gets its own isolated database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(MEMORY_PATH),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            // The database disappears with its last connection.
            idle_timeout: None,
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Whether this points at an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.database_path == Path::new(MEMORY_PATH)
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cheap to clone; clones share the same pools.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::new("./beacon.db")).await?;
///
/// let waiting = db.tickets().list_by_status(TicketStatus::Waiting, None).await?;
///
/// let mut lease = db.write().await?;
/// let mut tx = lease.begin().await?;
/// let ticket = tx.create_ticket(TicketClass::WalkIn, "Battery", "W001", Utc::now()).await?;
/// tx.commit().await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// Single-connection pool for every mutation.
    writer: SqlitePool,

    /// Pool for reads outside write transactions.
    reader: SqlitePool,
}

impl Database {
    /// Opens the database.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads
    ///    - NORMAL synchronous (balance of safety/speed)
    ///    - Foreign keys enabled
    ///    - Busy timeout
    /// 3. Opens the writer pool and runs migrations (if enabled)
    /// 4. Opens the reader pool
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let db = if config.is_in_memory() {
            Self::open_in_memory(&config).await?
        } else {
            Self::open_file(&config).await?
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    async fn open_in_memory(config: &DbConfig) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        debug!("In-memory database pool created");

        Ok(Database {
            writer: pool.clone(),
            reader: pool,
        })
    }

    async fn open_file(config: &DbConfig) -> DbResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            // Readers don't block the writer, the writer doesn't block readers
            .journal_mode(SqliteJournalMode::Wal)
            // May lose the last transaction on power loss, never corrupts
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        debug!("Connection options configured");

        // SQLite allows one writer at a time; make that explicit.
        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(None)
            .connect_with(options.clone())
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        let reader = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pools created"
        );

        Ok(Database { writer, reader })
    }

    /// Applies pending migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.writer).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Pool for reads outside write transactions.
    pub fn reader(&self) -> &SqlitePool {
        &self.reader
    }

    /// Acquires the write lease (the single writer connection).
    ///
    /// Waits while another task holds it. Release by dropping the lease.
    pub async fn write(&self) -> DbResult<WriteLease> {
        let conn = self.writer.acquire().await?;
        Ok(WriteLease::new(conn))
    }

    /// Returns the ticket store.
    pub fn tickets(&self) -> TicketStore {
        TicketStore::new(self.clone())
    }

    /// Returns the counter registry.
    pub fn counters(&self) -> CounterRegistry {
        CounterRegistry::new(self.clone())
    }

    /// Closes both pools. Repository calls fail afterwards.
    pub async fn close(&self) {
        info!("Closing database connection pools");
        self.reader.close().await;
        self.writer.close().await;
    }

    /// Checks if the database answers queries.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(&self.reader)
            .await
            .is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
