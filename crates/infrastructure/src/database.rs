//! SQLite pool and migrations

use outpost_core::{OutpostError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub type DatabasePool = SqlitePool;

/// Open (creating if needed) the SQLite database and run migrations.
///
/// WAL keeps the single-writer/many-readers model the core assumes.
pub async fn create_pool(db_path: &Path) -> Result<DatabasePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))
        .map_err(|e| OutpostError::NotConfigured {
            what: "database".to_string(),
            message: format!("invalid database path: {}", e),
        })?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| OutpostError::DatabaseError {
            message: format!("migration failed: {}", e),
        })?;

    info!(path = %db_path.display(), "database ready");
    Ok(pool)
}

/// In-memory pool for tests.
pub async fn create_test_pool() -> Result<DatabasePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| OutpostError::DatabaseError {
            message: format!("migration failed: {}", e),
        })?;
    Ok(pool)
}
