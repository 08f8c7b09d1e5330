//! Relationship criteria: matching entities by the ids they are related to.
//!
//! A logical relation may be stored as a foreign key on the base table, as a
//! many-to-many join table, or both at once (a marker's primary tag plus its
//! additional tags). Every source is folded into one derived "matches" row
//! set of `(owner_id, root_id)`, where `root_id` is the requested id that the
//! related row satisfies. `Includes`/`IncludesAll` LEFT JOIN that set and
//! count distinct roots per entity; `Excludes` removes every owner in it.

use std::collections::BTreeMap;

use sea_query::{Alias, Expr, JoinType, Query, SelectStatement, UnionType};

use super::clause::{Clause, Join};
use super::criterion::{HierarchicalCriterion, Modifier, MultiCriterion};
use super::hierarchy::{Direction, HierarchicalRelation};
use crate::error::ValidationError;

/// One place a relation is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationSource {
    /// A nullable foreign key column on the base table.
    ForeignKey { column: &'static str },
    /// A table of `(owner_fk, related_fk)` rows.
    JoinTable {
        table: &'static str,
        owner_fk: &'static str,
        related_fk: &'static str,
    },
    /// Two hops: a link table from the owner, then a column on the row the
    /// link points at (a performer's studios through their scenes).
    Through {
        link_table: &'static str,
        owner_fk: &'static str,
        link_fk: &'static str,
        target_table: &'static str,
        target_fk: &'static str,
        related_column: &'static str,
    },
}

impl RelationSource {
    /// `FROM` body for a row set of `(owner, related)` pairs with the owner
    /// and related column expressions. `None` for a foreign key, which is
    /// read straight off the base row. Table aliases end in `suffix`.
    fn from_clause(&self, suffix: &str) -> Option<(String, String, String)> {
        match self {
            RelationSource::ForeignKey { .. } => None,
            RelationSource::JoinTable {
                table,
                owner_fk,
                related_fk,
            } => Some((
                format!("{table} AS s{suffix}"),
                format!("s{suffix}.{owner_fk}"),
                format!("s{suffix}.{related_fk}"),
            )),
            RelationSource::Through {
                link_table,
                owner_fk,
                link_fk,
                target_table,
                target_fk,
                related_column,
            } => Some((
                format!(
                    "{link_table} AS s{suffix} INNER JOIN {target_table} AS t{suffix} \
                     ON t{suffix}.{target_fk} = s{suffix}.{link_fk}"
                ),
                format!("s{suffix}.{owner_fk}"),
                format!("t{suffix}.{related_column}"),
            )),
        }
    }
}

/// A logical relation from a base entity to related ids.
#[derive(Debug, Clone, Copy)]
pub struct Relation {
    /// Stem for join aliases.
    pub name: &'static str,
    /// Base-table column that join tables point at (usually `id`).
    pub owner_column: &'static str,
    pub sources: &'static [RelationSource],
    /// Hierarchy the related ids can be expanded through.
    pub hierarchy: Option<(&'static HierarchicalRelation, Direction)>,
}

impl Relation {
    /// A relation owned by the base row's `id`.
    pub const fn new(name: &'static str, sources: &'static [RelationSource]) -> Self {
        Self {
            name,
            owner_column: "id",
            sources,
            hierarchy: None,
        }
    }

    pub const fn with_hierarchy(
        mut self,
        hierarchy: &'static HierarchicalRelation,
        direction: Direction,
    ) -> Self {
        self.hierarchy = Some((hierarchy, direction));
        self
    }

    pub const fn owned_by(mut self, owner_column: &'static str) -> Self {
        self.owner_column = owner_column;
        self
    }
}

/// Requested roots paired with every id that satisfies them.
#[derive(Debug, Clone)]
struct MatchSet {
    roots: Vec<i64>,
    pairs: Vec<(i64, i64)>,
}

impl MatchSet {
    fn identity(ids: &[i64]) -> Self {
        let mut roots = ids.to_vec();
        roots.sort_unstable();
        roots.dedup();
        let pairs = roots.iter().map(|id| (*id, *id)).collect();
        Self { roots, pairs }
    }

    fn expanded(ids: &[i64], pairs: &[(i64, i64)]) -> Self {
        let mut set = Self::identity(ids);
        set.pairs = pairs.to_vec();
        set
    }

    fn is_identity(&self) -> bool {
        self.pairs.iter().all(|(root, item)| root == item)
    }

    fn items(&self) -> Vec<i64> {
        let mut items: Vec<i64> = self.pairs.iter().map(|(_, item)| *item).collect();
        items.sort_unstable();
        items.dedup();
        items
    }

    /// Items grouped by the root they satisfy.
    fn by_root(&self) -> BTreeMap<i64, Vec<i64>> {
        let mut grouped: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        for (root, item) in &self.pairs {
            grouped.entry(*root).or_default().push(*item);
        }
        grouped
    }
}

/// What a compiled relationship criterion contributes to its level.
#[derive(Debug, Clone, Default)]
pub struct RelationFragment {
    pub joins: Vec<Join>,
    pub wheres: Vec<Clause>,
    pub havings: Vec<Clause>,
}

fn source_select(
    base_table: &'static str,
    owner_column: &'static str,
    source: &RelationSource,
    root: Option<i64>,
    items: &[i64],
) -> SelectStatement {
    let src = Alias::new("src");
    let mut query = Query::select();

    let related = match source {
        RelationSource::ForeignKey { column } => {
            query.from_as(Alias::new(base_table), src.clone()).expr_as(
                Expr::col((src.clone(), Alias::new(owner_column))),
                Alias::new("owner_id"),
            );
            Expr::col((src.clone(), Alias::new(*column)))
        }
        RelationSource::JoinTable {
            table,
            owner_fk,
            related_fk,
        } => {
            query.from_as(Alias::new(*table), src.clone()).expr_as(
                Expr::col((src.clone(), Alias::new(*owner_fk))),
                Alias::new("owner_id"),
            );
            Expr::col((src.clone(), Alias::new(*related_fk)))
        }
        RelationSource::Through {
            link_table,
            owner_fk,
            link_fk,
            target_table,
            target_fk,
            related_column,
        } => {
            let target = Alias::new("tgt");
            query
                .from_as(Alias::new(*link_table), src.clone())
                .join_as(
                    JoinType::InnerJoin,
                    Alias::new(*target_table),
                    target.clone(),
                    Expr::col((target.clone(), Alias::new(*target_fk)))
                        .equals((src.clone(), Alias::new(*link_fk))),
                )
                .expr_as(
                    Expr::col((src.clone(), Alias::new(*owner_fk))),
                    Alias::new("owner_id"),
                );
            Expr::col((target, Alias::new(*related_column)))
        }
    };

    match root {
        Some(root) => query.expr_as(Expr::val(root), Alias::new("root_id")),
        None => query.expr_as(related.clone(), Alias::new("root_id")),
    };
    query.and_where(related.is_in(items.iter().copied()));
    query
}

/// `SELECT owner_id, root_id` over every source of the relation.
fn matches_select(
    base_table: &'static str,
    relation: &Relation,
    set: &MatchSet,
) -> Option<SelectStatement> {
    let mut selects = Vec::new();
    for source in relation.sources {
        if set.is_identity() {
            selects.push(source_select(
                base_table,
                relation.owner_column,
                source,
                None,
                &set.roots,
            ));
        } else {
            for (root, items) in set.by_root() {
                selects.push(source_select(
                    base_table,
                    relation.owner_column,
                    source,
                    Some(root),
                    &items,
                ));
            }
        }
    }

    let mut selects = selects.into_iter();
    let mut first = selects.next()?;
    for select in selects {
        first.union(UnionType::All, select);
    }
    Some(first)
}

/// Owners related to any of `items` through any source.
fn owners_select(
    base_table: &'static str,
    relation: &Relation,
    items: &[i64],
) -> Option<SelectStatement> {
    let matches = matches_select(base_table, relation, &MatchSet::identity(items))?;
    let mut query = Query::select();
    query
        .column(Alias::new("owner_id"))
        .from_subquery(matches, Alias::new("m"));
    Some(query)
}

fn exclusion(base_table: &'static str, relation: &Relation, items: &[i64]) -> Option<Clause> {
    if items.is_empty() {
        return None;
    }
    let owners = owners_select(base_table, relation, items)?;
    let lhs = format!("{base_table}.{}", relation.owner_column);
    Some(Clause::in_subquery(&lhs, true, &owners))
}

/// Condition that `value` was not produced by `source` for `owner`.
fn not_from_source(
    base_table: &'static str,
    owner: &str,
    source: &RelationSource,
    suffix: &str,
    value: &str,
) -> String {
    match (source, source.from_clause(suffix)) {
        (_, Some((from, owner_col, related))) => format!(
            "{value} NOT IN (SELECT {related} FROM {from} \
             WHERE {owner_col} = {owner} AND {related} IS NOT NULL)"
        ),
        (RelationSource::ForeignKey { column }, None) => {
            format!("{value} IS NOT {base_table}.{column}")
        }
        (_, None) => "1 = 1".to_string(),
    }
}

/// Number of distinct related ids across every source.
///
/// Each source counts only the ids no earlier source produced, so an id
/// stored in two places (a primary tag repeated as an additional tag) is
/// counted once.
pub fn relation_count_expr(base_table: &'static str, relation: &Relation) -> String {
    let owner = format!("{base_table}.{}", relation.owner_column);
    let terms: Vec<String> = relation
        .sources
        .iter()
        .enumerate()
        .map(|(index, source)| {
            let earlier = |value: &str| -> Vec<String> {
                relation.sources[..index]
                    .iter()
                    .enumerate()
                    .map(|(i, prior)| {
                        not_from_source(base_table, &owner, prior, &i.to_string(), value)
                    })
                    .collect()
            };
            match (source, source.from_clause("")) {
                (_, Some((from, owner_col, related))) => {
                    let mut conditions = vec![format!("{owner_col} = {owner}")];
                    conditions.extend(earlier(&related));
                    format!(
                        "(SELECT COUNT(DISTINCT {related}) FROM {from} WHERE {})",
                        conditions.join(" AND ")
                    )
                }
                (RelationSource::ForeignKey { column }, None) => {
                    let value = format!("{base_table}.{column}");
                    let mut conditions = vec![format!("{value} IS NOT NULL")];
                    conditions.extend(earlier(&value));
                    format!("(CASE WHEN {} THEN 1 ELSE 0 END)", conditions.join(" AND "))
                }
                (_, None) => "0".to_string(),
            }
        })
        .collect();
    match terms.len() {
        1 => terms.into_iter().collect(),
        _ => format!("({})", terms.join(" + ")),
    }
}

fn null_check(base_table: &'static str, relation: &Relation, negated: bool) -> Clause {
    let owner = format!("{base_table}.{}", relation.owner_column);
    let parts: Vec<Clause> = relation
        .sources
        .iter()
        .map(|source| match (source, source.from_clause("")) {
            (_, Some((from, owner_col, related))) => {
                let op = if negated { "IN" } else { "NOT IN" };
                Clause::raw(format!(
                    "{owner} {op} (SELECT {owner_col} FROM {from} WHERE {related} IS NOT NULL)"
                ))
            }
            (RelationSource::ForeignKey { column }, None) => {
                let op = if negated { "IS NOT NULL" } else { "IS NULL" };
                Clause::raw(format!("{base_table}.{column} {op}"))
            }
            (_, None) => Clause::raw(if negated { "1 = 0" } else { "1 = 1" }),
        })
        .collect();
    let combined = if negated {
        Clause::or_all(parts)
    } else {
        Clause::and_all(parts)
    };
    combined.unwrap_or_else(|| Clause::raw("1 = 1"))
}

/// Compile a relationship criterion.
///
/// `alias` must be unique within the statement; it names the derived join
/// used for `Includes`/`IncludesAll`/`Equals`.
fn compile(
    field: &'static str,
    base_table: &'static str,
    relation: &Relation,
    modifier: Modifier,
    set: &MatchSet,
    excluded: &[i64],
    alias: &str,
) -> Result<RelationFragment, ValidationError> {
    let mut fragment = RelationFragment::default();

    match modifier {
        Modifier::IsNull => fragment.wheres.push(null_check(base_table, relation, false)),
        Modifier::NotNull => fragment.wheres.push(null_check(base_table, relation, true)),
        Modifier::Includes | Modifier::IncludesAll | Modifier::Equals => {
            let matches = matches_select(base_table, relation, set);
            if let Some(matches) = matches.filter(|_| !set.roots.is_empty()) {
                let required = if modifier == Modifier::Includes {
                    1
                } else {
                    set.roots.len()
                };
                fragment.joins.push(Join::derived(
                    matches,
                    alias,
                    Clause::raw(format!(
                        "{alias}.owner_id = {base_table}.{}",
                        relation.owner_column
                    )),
                ));
                fragment.havings.push(Clause::new(
                    format!("COUNT(DISTINCT {alias}.root_id) >= ?"),
                    vec![i64::try_from(required).unwrap_or(i64::MAX).into()],
                ));
                if modifier == Modifier::Equals {
                    fragment.wheres.push(Clause::new(
                        format!("{} = ?", relation_count_expr(base_table, relation)),
                        vec![i64::try_from(set.roots.len()).unwrap_or(i64::MAX).into()],
                    ));
                }
            }
        }
        Modifier::Excludes => {
            if let Some(clause) = exclusion(base_table, relation, &set.items()) {
                fragment.wheres.push(clause);
            }
        }
        other => {
            return Err(ValidationError::UnsupportedModifier {
                field,
                modifier: other,
            });
        }
    }

    if let Some(clause) = exclusion(base_table, relation, excluded) {
        fragment.wheres.push(clause);
    }

    Ok(fragment)
}

/// Compile a flat multi-id criterion.
pub fn multi_fragment(
    field: &'static str,
    base_table: &'static str,
    relation: &Relation,
    criterion: &MultiCriterion,
    alias: &str,
) -> Result<RelationFragment, ValidationError> {
    compile(
        field,
        base_table,
        relation,
        criterion.modifier,
        &MatchSet::identity(&criterion.value),
        &criterion.excludes,
        alias,
    )
}

/// Compile a hierarchical criterion, using its expansion when one was
/// resolved and the requested ids alone otherwise.
pub fn hierarchical_fragment(
    field: &'static str,
    base_table: &'static str,
    relation: &Relation,
    criterion: &HierarchicalCriterion,
    alias: &str,
) -> Result<RelationFragment, ValidationError> {
    let (set, excluded) = match &criterion.expansion {
        Some(expansion) => (
            MatchSet::expanded(&criterion.value, &expansion.pairs),
            expansion.excluded.clone(),
        ),
        None => (
            MatchSet::identity(&criterion.value),
            criterion.excludes.clone(),
        ),
    };
    compile(
        field,
        base_table,
        relation,
        criterion.modifier,
        &set,
        &excluded,
        alias,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::criterion::Expansion;
    use sea_query::SqliteQueryBuilder;

    static SCENE_TAGS: Relation = Relation::new(
        "tags",
        &[RelationSource::JoinTable {
            table: "scenes_tags",
            owner_fk: "scene_id",
            related_fk: "tag_id",
        }],
    );

    static MARKER_TAGS: Relation = Relation::new(
        "tags",
        &[
            RelationSource::ForeignKey {
                column: "primary_tag_id",
            },
            RelationSource::JoinTable {
                table: "scene_markers_tags",
                owner_fk: "scene_marker_id",
                related_fk: "tag_id",
            },
        ],
    );

    fn derived_sql(join: &Join) -> String {
        match &join.source {
            crate::query::clause::JoinSource::Derived(q) => q.to_string(SqliteQueryBuilder),
            crate::query::clause::JoinSource::Table(t) => (*t).to_string(),
        }
    }

    #[test]
    fn includes_all_counts_every_requested_id() {
        let c = MultiCriterion::new(Modifier::IncludesAll, vec![10, 20, 30, 20]);
        let f = multi_fragment("tags", "scenes", &SCENE_TAGS, &c, "tags_1").unwrap();
        assert_eq!(f.joins.len(), 1);
        assert_eq!(f.joins[0].on.sql, "tags_1.owner_id = scenes.id");
        assert_eq!(f.havings[0].sql, "COUNT(DISTINCT tags_1.root_id) >= ?");
        assert_eq!(f.havings[0].args, vec![sea_query::Value::from(3i64)]);
        let sql = derived_sql(&f.joins[0]);
        assert!(sql.contains(r#"FROM "scenes_tags" AS "src""#), "{sql}");
        assert!(sql.contains(r#""src"."tag_id" IN (10, 20, 30)"#), "{sql}");
    }

    #[test]
    fn includes_requires_one_match() {
        let c = MultiCriterion::new(Modifier::Includes, vec![10, 20]);
        let f = multi_fragment("tags", "scenes", &SCENE_TAGS, &c, "tags_1").unwrap();
        assert_eq!(f.havings[0].args, vec![sea_query::Value::from(1i64)]);
        assert!(f.wheres.is_empty());
    }

    #[test]
    fn both_sources_are_unioned() {
        let c = MultiCriterion::new(Modifier::Includes, vec![7]);
        let f = multi_fragment("tags", "scene_markers", &MARKER_TAGS, &c, "tags_1").unwrap();
        let sql = derived_sql(&f.joins[0]);
        assert!(sql.contains(r#"FROM "scene_markers" AS "src""#), "{sql}");
        assert!(sql.contains("UNION ALL"), "{sql}");
        assert!(sql.contains(r#"FROM "scene_markers_tags" AS "src""#), "{sql}");
    }

    #[test]
    fn excludes_covers_every_source_without_joins() {
        let c = MultiCriterion::new(Modifier::Excludes, vec![10]);
        let f = multi_fragment("tags", "scene_markers", &MARKER_TAGS, &c, "tags_1").unwrap();
        assert!(f.joins.is_empty());
        assert!(f.havings.is_empty());
        let clause = &f.wheres[0];
        assert!(clause.sql.starts_with("scene_markers.id NOT IN (SELECT"), "{}", clause.sql);
        assert!(clause.sql.contains("primary_tag_id"), "{}", clause.sql);
        assert!(clause.sql.contains("scene_markers_tags"), "{}", clause.sql);
        assert_eq!(clause.args.len(), 2);
    }

    #[test]
    fn empty_value_list_adds_nothing() {
        let c = MultiCriterion::new(Modifier::IncludesAll, Vec::new());
        let f = multi_fragment("tags", "scenes", &SCENE_TAGS, &c, "tags_1").unwrap();
        assert!(f.joins.is_empty() && f.wheres.is_empty() && f.havings.is_empty());
    }

    #[test]
    fn expanded_roots_keep_their_identity() {
        let mut c = HierarchicalCriterion::new(Modifier::IncludesAll, vec![1, 5]).with_depth(-1);
        c.expansion = Some(Expansion {
            pairs: vec![(1, 1), (1, 2), (1, 3), (5, 5)],
            excluded: Vec::new(),
        });
        let f = hierarchical_fragment("tags", "scenes", &SCENE_TAGS, &c, "tags_1").unwrap();
        assert_eq!(f.havings[0].args, vec![sea_query::Value::from(2i64)]);
        let sql = derived_sql(&f.joins[0]);
        assert!(sql.contains(r#"1 AS "root_id""#), "{sql}");
        assert!(sql.contains(r#"IN (1, 2, 3)"#), "{sql}");
        assert!(sql.contains(r#"5 AS "root_id""#), "{sql}");
    }

    #[test]
    fn null_checks_cover_each_source() {
        let c = MultiCriterion::new(Modifier::IsNull, Vec::new());
        let f = multi_fragment("tags", "scene_markers", &MARKER_TAGS, &c, "tags_1").unwrap();
        assert_eq!(
            f.wheres[0].sql,
            "(scene_markers.primary_tag_id IS NULL) AND \
             (scene_markers.id NOT IN (SELECT s.scene_marker_id FROM scene_markers_tags AS s \
             WHERE s.tag_id IS NOT NULL))"
        );
    }

    #[test]
    fn two_hop_source_joins_the_target() {
        static PERFORMER_STUDIOS: Relation = Relation::new(
            "studios",
            &[RelationSource::Through {
                link_table: "performers_scenes",
                owner_fk: "performer_id",
                link_fk: "scene_id",
                target_table: "scenes",
                target_fk: "id",
                related_column: "studio_id",
            }],
        );
        let c = MultiCriterion::new(Modifier::Includes, vec![4]);
        let f =
            multi_fragment("studios", "performers", &PERFORMER_STUDIOS, &c, "studios_1").unwrap();
        let sql = derived_sql(&f.joins[0]);
        assert!(
            sql.contains(r#"INNER JOIN "scenes" AS "tgt" ON "tgt"."id" = "src"."scene_id""#),
            "{sql}"
        );
        assert!(sql.contains(r#""tgt"."studio_id" IN (4)"#), "{sql}");
        assert_eq!(
            relation_count_expr("performers", &PERFORMER_STUDIOS),
            "(SELECT COUNT(DISTINCT t.studio_id) FROM performers_scenes AS s \
             INNER JOIN scenes AS t ON t.id = s.scene_id WHERE s.performer_id = performers.id)"
        );
    }

    #[test]
    fn count_expression_sums_sources() {
        assert_eq!(
            relation_count_expr("scenes", &SCENE_TAGS),
            "(SELECT COUNT(DISTINCT s.tag_id) FROM scenes_tags AS s WHERE s.scene_id = scenes.id)"
        );
    }

    #[test]
    fn count_expression_skips_ids_an_earlier_source_produced() {
        assert_eq!(
            relation_count_expr("scene_markers", &MARKER_TAGS),
            "((CASE WHEN scene_markers.primary_tag_id IS NOT NULL THEN 1 ELSE 0 END) + \
             (SELECT COUNT(DISTINCT s.tag_id) FROM scene_markers_tags AS s \
             WHERE s.scene_marker_id = scene_markers.id \
             AND s.tag_id IS NOT scene_markers.primary_tag_id))"
        );

        static TAG_MARKERS: Relation = Relation::new(
            "markers",
            &[
                RelationSource::JoinTable {
                    table: "scene_markers",
                    owner_fk: "primary_tag_id",
                    related_fk: "id",
                },
                RelationSource::JoinTable {
                    table: "scene_markers_tags",
                    owner_fk: "tag_id",
                    related_fk: "scene_marker_id",
                },
            ],
        );
        let expr = relation_count_expr("tags", &TAG_MARKERS);
        assert!(
            expr.contains(
                "AND s.scene_marker_id NOT IN (SELECT s0.id FROM scene_markers AS s0 \
                 WHERE s0.primary_tag_id = tags.id AND s0.id IS NOT NULL)"
            ),
            "{expr}"
        );
    }
}
