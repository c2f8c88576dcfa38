//! SQLite pool setup shared by the message store and the user directory.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

pub const MEMORY_URL: &str = "sqlite::memory:";

/// Open a connection pool for `url`.
///
/// An in-memory database lives inside a single connection, so the pool is
/// pinned to one connection that is never recycled.
pub async fn connect(url: &str) -> Result<SqlitePool> {
    if url == MEMORY_URL {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await
            .context("Failed to open in-memory database")?;
        return Ok(pool);
    }

    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("Invalid database URL {}", url))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {}", url))?;

    info!("[DB] Connected to {}", url);
    Ok(pool)
}
