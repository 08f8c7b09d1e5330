//! Ancestor/descendant resolution over self-referential relations.
//!
//! Closures are computed with a recursive CTE: the base case is the seed
//! set, each step follows one edge from the current frontier. `UNION`
//! discards rows already produced and the depth column caps the walk at
//! [`MAX_HIERARCHY_DEPTH`], so a cyclic relation still terminates.

use sea_query::{Alias, Expr, Query, SqliteQueryBuilder};
use sqlx::SqliteConnection;

use super::clause::placeholders;
use super::criterion::Depth;
use super::plan::bind_values;
use crate::error::{QueryError, QueryResult};

/// Deepest level followed when the depth is unlimited.
pub const MAX_HIERARCHY_DEPTH: u32 = 100;

/// A directed edge table over one entity type.
///
/// The edge table may be the entity table itself (studios point at their
/// parent through `parent_id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HierarchicalRelation {
    pub entity_table: &'static str,
    pub edge_table: &'static str,
    pub parent_column: &'static str,
    pub child_column: &'static str,
}

/// Which way to walk the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Descendants,
    Ancestors,
}

pub static STUDIO_HIERARCHY: HierarchicalRelation = HierarchicalRelation {
    entity_table: "studios",
    edge_table: "studios",
    parent_column: "parent_id",
    child_column: "id",
};

pub static TAG_HIERARCHY: HierarchicalRelation = HierarchicalRelation {
    entity_table: "tags",
    edge_table: "tags_relations",
    parent_column: "parent_id",
    child_column: "child_id",
};

pub static GROUP_HIERARCHY: HierarchicalRelation = HierarchicalRelation {
    entity_table: "groups",
    edge_table: "groups_relations",
    parent_column: "containing_id",
    child_column: "sub_id",
};

impl HierarchicalRelation {
    /// (column joined to the frontier, column yielding the next hop).
    fn columns(&self, direction: Direction) -> (&'static str, &'static str) {
        match direction {
            Direction::Descendants => (self.parent_column, self.child_column),
            Direction::Ancestors => (self.child_column, self.parent_column),
        }
    }

    /// Recursive closure query over `seeds` seed placeholders. Binds the
    /// seeds, then the depth limit, then any candidates.
    pub fn closure_sql(
        &self,
        direction: Direction,
        seeds: usize,
        candidates: Option<usize>,
    ) -> String {
        let (from, next) = self.columns(direction);
        let filter = match candidates {
            Some(n) => format!(" WHERE item_id IN ({})", placeholders(n)),
            None => String::new(),
        };
        format!(
            "WITH RECURSIVE closure(root_id, item_id, depth) AS (\
             SELECT id, id, 0 FROM {entity} WHERE id IN ({seeds}) \
             UNION \
             SELECT c.root_id, e.{next}, c.depth + 1 FROM {edges} AS e \
             INNER JOIN closure AS c ON e.{from} = c.item_id \
             WHERE c.depth < ? AND e.{next} IS NOT NULL\
             ) SELECT DISTINCT root_id, item_id FROM closure{filter} ORDER BY root_id, item_id",
            entity = self.entity_table,
            edges = self.edge_table,
            seeds = placeholders(seeds),
        )
    }
}

fn depth_limit(depth: Depth) -> i64 {
    match depth {
        Depth::None => 0,
        Depth::Levels(n) => i64::from(n.min(MAX_HIERARCHY_DEPTH)),
        Depth::Unlimited => i64::from(MAX_HIERARCHY_DEPTH),
    }
}

/// Membership queries over a hierarchical relation, run on a borrowed
/// connection or transaction.
pub struct HierarchyResolver<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> HierarchyResolver<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// The candidates that are direct children (or direct parents, walking
    /// up) of `containing_id`.
    pub async fn direct_subset(
        &mut self,
        relation: &HierarchicalRelation,
        direction: Direction,
        containing_id: i64,
        candidates: &[i64],
    ) -> QueryResult<Vec<i64>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let (from, next) = relation.columns(direction);
        let edge = Alias::new("e");
        let (sql, values) = Query::select()
            .distinct()
            .column((edge.clone(), Alias::new(next)))
            .from_as(Alias::new(relation.edge_table), edge.clone())
            .and_where(Expr::col((edge.clone(), Alias::new(from))).eq(containing_id))
            .and_where(Expr::col((edge, Alias::new(next))).is_in(candidates.iter().copied()))
            .order_by(Alias::new(next), sea_query::Order::Asc)
            .build(SqliteQueryBuilder);

        tracing::debug!(%sql, "resolving direct relations");
        sqlx::query_scalar_with::<_, i64, _>(&sql, bind_values(values)?)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(QueryError::execution("failed to resolve direct relations"))
    }

    /// Every `(seed, reachable id)` pair within `depth` levels, each seed
    /// paired with itself. Seeds missing from the entity table yield nothing.
    pub async fn closure_pairs(
        &mut self,
        relation: &HierarchicalRelation,
        direction: Direction,
        seeds: &[i64],
        depth: Depth,
    ) -> QueryResult<Vec<(i64, i64)>> {
        self.run_closure(relation, direction, seeds, None, depth).await
    }

    /// Ids among `candidates` reachable from any seed (seeds included).
    pub async fn closure_within(
        &mut self,
        relation: &HierarchicalRelation,
        direction: Direction,
        seeds: &[i64],
        candidates: &[i64],
        depth: Depth,
    ) -> QueryResult<Vec<i64>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let pairs = self
            .run_closure(relation, direction, seeds, Some(candidates), depth)
            .await?;
        let mut ids: Vec<i64> = pairs.into_iter().map(|(_, item)| item).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn run_closure(
        &mut self,
        relation: &HierarchicalRelation,
        direction: Direction,
        seeds: &[i64],
        candidates: Option<&[i64]>,
        depth: Depth,
    ) -> QueryResult<Vec<(i64, i64)>> {
        if seeds.is_empty() {
            return Ok(Vec::new());
        }
        let sql = relation.closure_sql(direction, seeds.len(), candidates.map(<[i64]>::len));
        tracing::debug!(%sql, seeds = seeds.len(), ?direction, "resolving hierarchy closure");

        let mut query = sqlx::query_as::<_, (i64, i64)>(&sql);
        for id in seeds {
            query = query.bind(*id);
        }
        query = query.bind(depth_limit(depth));
        for id in candidates.unwrap_or_default() {
            query = query.bind(*id);
        }
        query
            .fetch_all(&mut *self.conn)
            .await
            .map_err(QueryError::execution("failed to resolve hierarchy closure"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn descendant_closure_walks_parent_to_child() {
        let sql = TAG_HIERARCHY.closure_sql(Direction::Descendants, 2, None);
        assert!(sql.starts_with("WITH RECURSIVE closure(root_id, item_id, depth)"));
        assert!(sql.contains("SELECT id, id, 0 FROM tags WHERE id IN (?, ?)"), "{sql}");
        assert!(sql.contains("e.child_id, c.depth + 1 FROM tags_relations AS e"), "{sql}");
        assert!(sql.contains("ON e.parent_id = c.item_id"), "{sql}");
        assert!(sql.contains(" UNION SELECT"), "closure must use set union: {sql}");
        assert!(!sql.contains("UNION ALL"), "{sql}");
    }

    #[test]
    fn ancestor_closure_walks_child_to_parent() {
        let sql = STUDIO_HIERARCHY.closure_sql(Direction::Ancestors, 1, Some(3));
        assert!(sql.contains("e.parent_id, c.depth + 1 FROM studios AS e"), "{sql}");
        assert!(sql.contains("ON e.id = c.item_id"), "{sql}");
        assert!(sql.contains("e.parent_id IS NOT NULL"), "{sql}");
        assert!(sql.contains("WHERE item_id IN (?, ?, ?)"), "{sql}");
    }

    #[test]
    fn depth_limits() {
        assert_eq!(depth_limit(Depth::None), 0);
        assert_eq!(depth_limit(Depth::Levels(2)), 2);
        assert_eq!(depth_limit(Depth::Levels(5000)), i64::from(MAX_HIERARCHY_DEPTH));
        assert_eq!(depth_limit(Depth::Unlimited), i64::from(MAX_HIERARCHY_DEPTH));
    }
}
