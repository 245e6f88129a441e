//! Database layer (SQLite via sqlx).
//!
//! One [`Db`] handle wraps the connection pool; typed operations are
//! grouped by entity:
//! - connections & OAuth state ([`connections`])
//! - workout / recovery caches ([`cache`])
//! - consumed journal entities ([`journal`])

pub mod cache;
pub mod connections;
pub mod journal;

use crate::error::AppError;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Database handle shared across the application.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Connect to the database and run pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        // In-memory SQLite databases are per-connection; a larger pool
        // would give every connection its own empty database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect: {}", e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Database(format!("Migration failed: {}", e)))?;

        tracing::info!(url = database_url, "Database connected");

        Ok(Self { pool })
    }

    /// In-memory database for tests.
    pub async fn connect_in_memory() -> Result<Self, AppError> {
        Self::connect("sqlite::memory:").await
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
