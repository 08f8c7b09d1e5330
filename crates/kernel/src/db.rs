//! Database connection pool management.
//!
//! Every connection gets the `NATURAL_CI` collation and the `REGEXP`
//! function registered, both of which compiled queries rely on.

use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::collation::{NATURAL_CI, natural_cmp};
use crate::config::Config;

/// Schema for the library tables.
pub const SCHEMA: &str = include_str!("schema.sql");

fn connect_options(url: &str) -> Result<SqliteConnectOptions> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("invalid database URL '{url}'"))?
        .create_if_missing(true)
        .foreign_keys(true)
        .collation(NATURAL_CI, natural_cmp)
        .with_regexp();
    Ok(options)
}

/// Create a SQLite connection pool.
pub async fn create_pool(config: &Config) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect_with(connect_options(&config.database_url)?)
        .await
        .context("failed to connect to SQLite")?;

    Ok(pool)
}

/// Create a pool over a private in-memory database.
///
/// The pool holds exactly one connection that is never recycled, since the
/// database disappears with its last connection.
pub async fn create_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(connect_options("sqlite::memory:")?)
        .await
        .context("failed to open in-memory database")?;

    Ok(pool)
}

/// Create the library tables if they do not exist.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .context("failed to apply schema")?;
    Ok(())
}

/// Check if the database connection is healthy.
pub async fn check_health(pool: &SqlitePool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}
