//! Batched hydration of ordered id lists.
//!
//! Ids are fetched in fixed-size batches, one after another, and the rows
//! are put back into id-list order. A row missing from its batch fails the
//! whole call.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{QueryError, QueryResult};

/// Rows with an integer primary key.
pub trait Identified {
    fn id(&self) -> i64;
}

/// Fetches full rows for a set of ids, in any order.
#[async_trait]
pub trait FetchByIds: Send {
    type Item: Identified + Clone + Send;

    /// Entity name for error reporting.
    fn entity(&self) -> &'static str;

    async fn fetch_by_ids(&mut self, ids: &[i64]) -> QueryResult<Vec<Self::Item>>;
}

/// Fetch rows for `ids` in batches of `batch_size`, preserving id order.
pub async fn hydrate<F: FetchByIds>(
    fetcher: &mut F,
    ids: &[i64],
    batch_size: usize,
) -> QueryResult<Vec<F::Item>> {
    let mut out = Vec::with_capacity(ids.len());

    for batch in ids.chunks(batch_size.max(1)) {
        let rows = fetcher.fetch_by_ids(batch).await?;
        let by_id: HashMap<i64, F::Item> = rows.into_iter().map(|row| (row.id(), row)).collect();

        for id in batch {
            let row = by_id.get(id).cloned().ok_or_else(|| QueryError::NotFound {
                entity: fetcher.entity(),
                id: *id,
            })?;
            out.push(row);
        }
    }

    tracing::debug!(entity = fetcher.entity(), rows = out.len(), "hydrated rows");
    Ok(out)
}
