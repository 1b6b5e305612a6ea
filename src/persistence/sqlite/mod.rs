//! This module provides a `SharedStore` backed by a SQLite database file.
//!
//! Every worker on a host opens the same file. The write primitives are
//! single upsert statements, which SQLite serializes, so conditional-create
//! and increment-with-expiry stay atomic across processes.

use std::{str::FromStr, time::Duration};

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

mod shared_store;

use crate::persistence::error::StoreError;

/// SQL statements for the `shared_state` table. Expiry columns hold unix
/// milliseconds.
mod state_sql {
    /// Inserts a record, or replaces one whose expiry has passed.
    pub const CONDITIONAL_CREATE: &str = "INSERT INTO shared_state (key, value, expires_at) \
         VALUES (?1, 1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = 1, expires_at = excluded.expires_at \
         WHERE shared_state.expires_at <= ?3";

    /// Increments a live counter or starts a new window for an expired one.
    pub const INCREMENT_WITH_EXPIRY: &str = "INSERT INTO shared_state (key, value, expires_at) \
         VALUES (?1, 1, ?2) \
         ON CONFLICT(key) DO UPDATE SET \
           value = CASE WHEN shared_state.expires_at <= ?3 THEN 1 ELSE shared_state.value + 1 END, \
           expires_at = CASE WHEN shared_state.expires_at <= ?3 THEN excluded.expires_at \
                        ELSE shared_state.expires_at END \
         RETURNING value";

    /// Reads a live counter.
    pub const SELECT_LIVE_VALUE: &str =
        "SELECT value FROM shared_state WHERE key = ?1 AND expires_at > ?2";

    /// Deletes every expired record.
    pub const DELETE_EXPIRED: &str = "DELETE FROM shared_state WHERE expires_at <= ?1";
}

/// A `SharedStore` implementation on SQLite.
pub struct SqliteStore {
    /// The SQLite connection pool used for store operations.
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (and creates if missing) the database at `database_url`.
    /// In-memory databases are limited to one connection so that every
    /// caller sees the same data.
    #[tracing::instrument(level = "info")]
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        tracing::debug!(database_url, "Attempting to connect to SQLite store.");
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::InvalidInput(e.to_string()))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let in_memory = database_url.contains(":memory:");
        let options =
            if in_memory { options } else { options.journal_mode(SqliteJournalMode::Wal) };
        let max_connections = if in_memory { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::Unavailable(format!("Failed to connect to database: {}", e))
            })?;
        tracing::info!(database_url, "Successfully connected to SQLite store.");
        Ok(Self { pool })
    }

    /// Runs the embedded schema migrations.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        tracing::debug!("Running store migrations.");
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run store migrations.");
            StoreError::MigrationError(e.to_string())
        })?;
        tracing::info!("Store migrations completed successfully.");
        Ok(())
    }

    /// Deletes expired records and returns how many were removed.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = now_millis();
        let result = self
            .execute_query_with_error_handling(
                "purge expired records",
                sqlx::query(state_sql::DELETE_EXPIRED).bind(now).execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected())
    }

    /// Closes the connection pool gracefully.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn close(&self) {
        tracing::debug!("Closing SQLite connection pool.");
        self.pool.close().await;
        tracing::info!("SQLite connection pool closed successfully.");
    }

    /// Helper to execute store queries with consistent error handling
    async fn execute_query_with_error_handling<F, T>(
        &self,
        operation: &str,
        query_fn: F,
    ) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        query_fn.await.map_err(|e| {
            tracing::error!(error = %e, operation = %operation, "Store operation failed.");
            match e {
                sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed => StoreError::Unavailable(e.to_string()),
                _ => StoreError::OperationFailed(e.to_string()),
            }
        })
    }
}

/// Current wall-clock time in unix milliseconds.
fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Converts a time-to-live into an absolute expiry in unix milliseconds.
fn expiry_millis(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}
