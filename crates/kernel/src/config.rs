//! Configuration loaded from environment variables.

use std::env;

use anyhow::{Context, Result};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL (default: sqlite://marquee.db).
    pub database_url: String,

    /// Maximum database connections in pool (default: 5).
    pub database_max_connections: u32,

    /// Settings for the query engine.
    pub query: QueryConfig,
}

/// Settings shared by the compiler and the repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryConfig {
    /// Ids per hydration fetch (default: 1000).
    pub batch_size: usize,

    /// Page size used when none (or a non-positive one) is given (default: 25).
    pub default_per_page: u32,

    /// Largest page size honoured; bigger requests are capped (default: 1000).
    pub max_per_page: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            default_per_page: 25,
            max_per_page: 1000,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a valid number")),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://marquee.db".to_string());

        let database_max_connections = parse_var("DATABASE_MAX_CONNECTIONS", 5)?;

        let defaults = QueryConfig::default();
        let batch_size: usize = parse_var("QUERY_BATCH_SIZE", defaults.batch_size)?;
        if batch_size == 0 {
            anyhow::bail!("QUERY_BATCH_SIZE must be greater than zero");
        }

        let query = QueryConfig {
            batch_size,
            default_per_page: parse_var("QUERY_DEFAULT_PER_PAGE", defaults.default_per_page)?,
            max_per_page: parse_var("QUERY_MAX_PER_PAGE", defaults.max_per_page)?,
        };

        Ok(Self {
            database_url,
            database_max_connections,
            query,
        })
    }
}
