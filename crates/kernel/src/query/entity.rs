//! Per-entity query metadata.

use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::FromRow;
use sqlx::sqlite::SqliteRow;

use super::clause::Join;
use super::compiler::{Criteria, FilterNode};
use super::hydrate::Identified;
use super::sort::SortSpec;

/// A filterable entity type: its table, criteria, sort allow-list and row
/// model.
pub trait Entity: Send + Sync + 'static {
    /// Name used in logs, errors and on the command line.
    const NAME: &'static str;
    const TABLE: &'static str;

    type Criteria: Criteria + Serialize + DeserializeOwned;
    type Row: Identified + for<'r> FromRow<'r, SqliteRow> + Clone + Send + Unpin + 'static;

    fn sort_spec() -> &'static SortSpec;

    /// Qualified columns searched by free text.
    fn search_columns() -> &'static [&'static str];

    /// Joins the search columns need.
    fn search_joins() -> Vec<Join> {
        Vec::new()
    }
}

/// Filter tree for an entity.
pub type Filter<E> = FilterNode<<E as Entity>::Criteria>;
