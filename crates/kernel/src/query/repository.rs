//! Find, count and query operations for one entity type.
//!
//! Every operation runs in three phases: validation of the filter tree and
//! sort (no statement is issued if it fails), hierarchy expansion against
//! the database, then plan compilation and execution. The pool-backed
//! methods open a read transaction so the count and the id list come from
//! one snapshot; the `*_in` functions run on a connection or transaction
//! the caller already holds.

use std::future::Future;
use std::marker::PhantomData;

use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tokio_util::sync::CancellationToken;

use super::compiler::{Criteria, FilterNode};
use super::criterion::{Depth, Expansion};
use super::entity::{Entity, Filter};
use super::hierarchy::HierarchyResolver;
use super::hydrate::hydrate;
use super::plan::{QueryPlan, compile_plan, fetch_count, fetch_ids};
use super::sort::{FindFilter, validate_sort};
use crate::config::QueryConfig;
use crate::error::{QueryError, QueryResult};
use crate::models::RowFetcher;

/// Ids of one page of matches plus the total match count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FindResult {
    pub ids: Vec<i64>,
    pub total: i64,
}

/// Query operations over entity `E`.
pub struct Repository<E> {
    pool: SqlitePool,
    config: QueryConfig,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            config: self.config,
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(pool: SqlitePool, config: QueryConfig) -> Self {
        Self {
            pool,
            config,
            _entity: PhantomData,
        }
    }

    async fn begin(&self) -> QueryResult<sqlx::Transaction<'static, sqlx::Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(QueryError::execution("failed to begin read transaction"))
    }

    /// Matching ids for one page, and the total.
    pub async fn find(&self, filter: &Filter<E>, find: &FindFilter) -> QueryResult<FindResult> {
        let mut tx = self.begin().await?;
        let result = find_in::<E>(&mut *tx, filter, find, &self.config).await?;
        tx.commit()
            .await
            .map_err(QueryError::execution("failed to commit read transaction"))?;
        Ok(result)
    }

    /// Total matches only.
    pub async fn count(&self, filter: &Filter<E>, find: &FindFilter) -> QueryResult<i64> {
        let mut tx = self.begin().await?;
        let total = count_in::<E>(&mut *tx, filter, find, &self.config).await?;
        tx.commit()
            .await
            .map_err(QueryError::execution("failed to commit read transaction"))?;
        Ok(total)
    }

    /// Matching rows for one page, in sort order, and the total.
    pub async fn query(
        &self,
        filter: &Filter<E>,
        find: &FindFilter,
    ) -> QueryResult<(Vec<E::Row>, i64)> {
        let mut tx = self.begin().await?;
        let result = query_in::<E>(&mut *tx, filter, find, &self.config).await?;
        tx.commit()
            .await
            .map_err(QueryError::execution("failed to commit read transaction"))?;
        Ok(result)
    }

    pub async fn find_with_cancel(
        &self,
        filter: &Filter<E>,
        find: &FindFilter,
        token: &CancellationToken,
    ) -> QueryResult<FindResult> {
        with_cancel(token, self.find(filter, find)).await
    }

    pub async fn count_with_cancel(
        &self,
        filter: &Filter<E>,
        find: &FindFilter,
        token: &CancellationToken,
    ) -> QueryResult<i64> {
        with_cancel(token, self.count(filter, find)).await
    }

    pub async fn query_with_cancel(
        &self,
        filter: &Filter<E>,
        find: &FindFilter,
        token: &CancellationToken,
    ) -> QueryResult<(Vec<E::Row>, i64)> {
        with_cancel(token, self.query(filter, find)).await
    }
}

/// Race `operation` against `token`. Dropping the operation drops its
/// transaction, which rolls back.
async fn with_cancel<T>(
    token: &CancellationToken,
    operation: impl Future<Output = QueryResult<T>>,
) -> QueryResult<T> {
    tokio::select! {
        biased;
        () = token.cancelled() => {
            tracing::debug!("query cancelled");
            Err(QueryError::Cancelled)
        }
        result = operation => result,
    }
}

/// Fill in the expansion of every hierarchical criterion with a depth.
pub async fn expand_hierarchies<C: Criteria>(
    conn: &mut SqliteConnection,
    filter: &mut FilterNode<C>,
) -> QueryResult<()> {
    let mut resolver = HierarchyResolver::new(conn);

    for (relation, criterion) in filter.hierarchical_mut() {
        let Some((hierarchy, direction)) = relation.hierarchy else {
            continue;
        };
        let depth = criterion.depth();
        if depth == Depth::None {
            criterion.expansion = None;
            continue;
        }

        let pairs = resolver
            .closure_pairs(hierarchy, direction, &criterion.value, depth)
            .await?;
        let mut excluded: Vec<i64> = resolver
            .closure_pairs(hierarchy, direction, &criterion.excludes, depth)
            .await?
            .into_iter()
            .map(|(_, item)| item)
            .collect();
        excluded.sort_unstable();
        excluded.dedup();

        tracing::debug!(
            relation = relation.name,
            roots = criterion.value.len(),
            expanded = pairs.len(),
            "expanded hierarchical criterion"
        );
        criterion.expansion = Some(Expansion { pairs, excluded });
    }
    Ok(())
}

async fn prepare<E: Entity>(
    conn: &mut SqliteConnection,
    filter: &Filter<E>,
    find: &FindFilter,
    config: &QueryConfig,
) -> QueryResult<QueryPlan> {
    filter.validate()?;
    validate_sort(E::sort_spec(), find.sort.as_deref())?;

    let mut filter = filter.clone();
    expand_hierarchies(conn, &mut filter).await?;
    Ok(compile_plan::<E>(&filter, find, config)?)
}

/// [`Repository::find`] on a caller-held connection.
pub async fn find_in<E: Entity>(
    conn: &mut SqliteConnection,
    filter: &Filter<E>,
    find: &FindFilter,
    config: &QueryConfig,
) -> QueryResult<FindResult> {
    let plan = prepare::<E>(conn, filter, find, config).await?;
    let total = fetch_count(conn, &plan).await?;
    let ids = fetch_ids(conn, &plan).await?;
    tracing::debug!(entity = E::NAME, total, ids = ids.len(), "find complete");
    Ok(FindResult { ids, total })
}

/// [`Repository::count`] on a caller-held connection.
pub async fn count_in<E: Entity>(
    conn: &mut SqliteConnection,
    filter: &Filter<E>,
    find: &FindFilter,
    config: &QueryConfig,
) -> QueryResult<i64> {
    let plan = prepare::<E>(conn, filter, find, config).await?;
    let total = fetch_count(conn, &plan).await?;
    tracing::debug!(entity = E::NAME, total, "count complete");
    Ok(total)
}

/// [`Repository::query`] on a caller-held connection.
pub async fn query_in<E: Entity>(
    conn: &mut SqliteConnection,
    filter: &Filter<E>,
    find: &FindFilter,
    config: &QueryConfig,
) -> QueryResult<(Vec<E::Row>, i64)> {
    let FindResult { ids, total } = find_in::<E>(conn, filter, find, config).await?;
    let mut fetcher = RowFetcher::<E::Row>::new(conn, E::TABLE, E::NAME);
    let rows = hydrate(&mut fetcher, &ids, config.batch_size).await?;
    Ok((rows, total))
}
