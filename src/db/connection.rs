// SQLite connection pool and schema initialization

use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite, SqlitePool,
};
use std::str::FromStr;
use tracing::info;
use crate::db::INIT_SCHEMA;

pub async fn connect(database_url: &str) -> Result<Pool<Sqlite>, sqlx::Error> {
    // Create database if it doesn't exist
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        Sqlite::create_database(database_url).await?;
    }

    let options = SqliteConnectOptions::from_str(database_url)?.foreign_keys(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    // Enable WAL mode for better concurrency
    sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;

    sqlx::raw_sql(INIT_SCHEMA).execute(&pool).await?;
    info!("Ledger schema ready at {}", database_url);

    Ok(pool)
}

/// Single-connection in-memory ledger. Every pooled connection would otherwise
/// open its own empty database.
pub async fn in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    sqlx::raw_sql(INIT_SCHEMA).execute(&pool).await?;

    Ok(pool)
}
