#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Every test gets its own private in-memory database with the real kernel
//! schema, collation and `REGEXP` function, so tests never share rows.

#![allow(dead_code)]

use sqlx::SqlitePool;

use marquee_kernel::config::QueryConfig;
use marquee_kernel::db;
use marquee_kernel::query::{Entity, Repository};
use marquee_test_utils::{link_tags, test_tag};

/// Fresh in-memory database with the schema applied.
pub async fn test_pool() -> SqlitePool {
    let pool = db::create_memory_pool()
        .await
        .expect("failed to open in-memory database");
    db::apply_schema(&pool)
        .await
        .expect("failed to apply schema");
    pool
}

/// Repository over `pool` with the default query settings.
pub fn repository<E: Entity>(pool: &SqlitePool) -> Repository<E> {
    Repository::new(pool.clone(), QueryConfig::default())
}

/// Tags `a -> b -> c` plus an unrelated `d`.
#[derive(Debug, Clone, Copy)]
pub struct TagChain {
    pub a: i64,
    pub b: i64,
    pub c: i64,
    pub d: i64,
}

pub async fn tag_chain(pool: &SqlitePool) -> TagChain {
    let a = test_tag("Outdoor").insert(pool).await.unwrap();
    let b = test_tag("Beach").with_parent(a).insert(pool).await.unwrap();
    let c = test_tag("Sunset")
        .with_parent(b)
        .insert(pool)
        .await
        .unwrap();
    let d = test_tag("Studio Lights").insert(pool).await.unwrap();
    TagChain { a, b, c, d }
}

/// Add an edge that closes `c -> a`, turning the chain into a cycle.
pub async fn close_cycle(pool: &SqlitePool, chain: TagChain) {
    link_tags(pool, chain.c, chain.a).await.unwrap();
}
