//! Row models and the id-batch fetcher used for hydration.

pub mod group;
pub mod performer;
pub mod scene;
pub mod scene_marker;
pub mod studio;
pub mod tag;

use std::marker::PhantomData;

use async_trait::async_trait;
use sea_query::{Alias, Asterisk, Expr, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqliteConnection};

use crate::error::{QueryError, QueryResult};
use crate::query::hydrate::{FetchByIds, Identified};
use crate::query::plan::bind_values;

pub use group::Group;
pub use performer::Performer;
pub use scene::Scene;
pub use scene_marker::SceneMarker;
pub use studio::Studio;
pub use tag::Tag;

/// Loads whole rows of one table by primary key.
pub struct RowFetcher<'c, R> {
    conn: &'c mut SqliteConnection,
    table: &'static str,
    entity: &'static str,
    _row: PhantomData<fn() -> R>,
}

impl<'c, R> RowFetcher<'c, R> {
    pub fn new(conn: &'c mut SqliteConnection, table: &'static str, entity: &'static str) -> Self {
        Self {
            conn,
            table,
            entity,
            _row: PhantomData,
        }
    }
}

#[async_trait]
impl<'c, R> FetchByIds for RowFetcher<'c, R>
where
    R: Identified + for<'r> FromRow<'r, SqliteRow> + Clone + Send + Unpin + 'static,
{
    type Item = R;

    fn entity(&self) -> &'static str {
        self.entity
    }

    async fn fetch_by_ids(&mut self, ids: &[i64]) -> QueryResult<Vec<R>> {
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(Alias::new(self.table))
            .and_where(Expr::col(Alias::new("id")).is_in(ids.iter().copied()))
            .build(SqliteQueryBuilder);

        tracing::debug!(%sql, ids = ids.len(), "fetching rows by id");
        sqlx::query_as_with::<_, R, _>(&sql, bind_values(values)?)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(QueryError::execution("failed to fetch rows by id"))
    }
}
