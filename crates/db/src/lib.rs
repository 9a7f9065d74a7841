//! Durable store for users and submissions.
//!
//! Backed by SQLite through `sqlx`. The pool holds exactly one connection,
//! which makes it the single serialisation point for every read and write:
//! a compare-and-set status update can never interleave with another
//! statement. Writes are committed with `synchronous = FULL`, so a returned
//! call has reached disk.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};

pub mod models;
pub mod repositories;

pub type DbPool = sqlx::SqlitePool;

/// How long a statement waits on a locked database file before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a connection pool from a database URL such as `sqlite://cam2.db`
/// or `sqlite::memory:`.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?;
    connect(options).await
}

/// Create a connection pool for a database file at `path`.
pub async fn create_pool_at(path: impl AsRef<Path>) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new().filename(path);
    connect(options).await
}

async fn connect(options: SqliteConnectOptions) -> Result<DbPool, sqlx::Error> {
    let options = options
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(BUSY_TIMEOUT);

    // A single long-lived connection: it serialises all access and keeps
    // in-memory databases alive for the lifetime of the pool.
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

/// Verify that the database answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded schema migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
