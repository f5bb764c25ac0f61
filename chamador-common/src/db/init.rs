//! Database initialization
//!
//! Creates the database on first run and applies the (idempotent) schema.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets the SSE readers proceed while the admin side writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// Single connection: every `sqlite::memory:` connection is its own database.
pub async fn init_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables (safe to call repeatedly)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_calls_table(pool).await?;
    create_config_docs_table(pool).await?;
    create_announce_trigger_table(pool).await?;
    create_active_calls_table(pool).await?;
    Ok(())
}

async fn create_calls_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS calls (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            room TEXT NOT NULL DEFAULT '',
            created_at_ms INTEGER NOT NULL,
            is_test INTEGER NOT NULL DEFAULT 0,
            is_recall INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_calls_created ON calls(created_at_ms DESC)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_config_docs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS config_docs (
            id TEXT PRIMARY KEY,
            body TEXT NOT NULL,
            updated_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_announce_trigger_table(pool: &SqlitePool) -> Result<()> {
    // Single-row table: the trigger is overwritten, never appended
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS announce_trigger (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            name TEXT NOT NULL DEFAULT '',
            room TEXT NOT NULL DEFAULT '',
            idle INTEGER,
            nonce TEXT NOT NULL,
            triggered_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_active_calls_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS active_calls (
            room TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            since_ms INTEGER NOT NULL,
            ack INTEGER NOT NULL DEFAULT 0,
            ping_nonce TEXT NOT NULL,
            last_announced_at_ms INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
