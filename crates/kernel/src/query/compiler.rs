//! Compilation of a boolean filter tree into WHERE/HAVING predicates.
//!
//! Each node's own criteria form one conjunctive level. `and` children are
//! conjoined with it, `or` children are OR-ed with it as a whole group and
//! `not` children are negated before being conjoined. Relationship criteria
//! produce HAVING terms; when such a level takes part in an OR or NOT, its
//! row-level terms are lifted into HAVING so both sides are evaluated per
//! grouped entity.

use serde::{Deserialize, Serialize};

use super::clause::{Clause, Join};
use super::criterion::{
    CustomFieldCriterion, DateCriterion, EnumCriterion, FloatCriterion, HierarchicalCriterion,
    IntCriterion, Modifier, MultiCriterion, StringCriterion, TimestampCriterion, Validate,
    bool_clause, date_clause, enum_clause, float_clause, int_clause, string_clause,
    timestamp_clause,
};
use super::relation::{
    Relation, RelationFragment, hierarchical_fragment, multi_fragment, relation_count_expr,
};
use crate::error::ValidationError;

/// A filter tree node: this entity's criteria plus at most one combinator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterNode<C> {
    #[serde(flatten)]
    pub criteria: C,
    #[serde(default, alias = "AND", skip_serializing_if = "Option::is_none")]
    pub and: Option<Box<FilterNode<C>>>,
    #[serde(default, alias = "OR", skip_serializing_if = "Option::is_none")]
    pub or: Option<Box<FilterNode<C>>>,
    #[serde(default, alias = "NOT", skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<FilterNode<C>>>,
}

impl<C: Criteria> FilterNode<C> {
    pub fn new(criteria: C) -> Self {
        Self {
            criteria,
            and: None,
            or: None,
            not: None,
        }
    }

    fn check_single_operator(&self) -> Result<(), ValidationError> {
        let set = [self.and.is_some(), self.or.is_some(), self.not.is_some()]
            .into_iter()
            .filter(|s| *s)
            .count();
        if set > 1 {
            return Err(ValidationError::AmbiguousOperator);
        }
        Ok(())
    }

    pub fn with_and(mut self, child: FilterNode<C>) -> Result<Self, ValidationError> {
        self.and = Some(Box::new(child));
        self.check_single_operator()?;
        Ok(self)
    }

    pub fn with_or(mut self, child: FilterNode<C>) -> Result<Self, ValidationError> {
        self.or = Some(Box::new(child));
        self.check_single_operator()?;
        Ok(self)
    }

    pub fn with_not(mut self, child: FilterNode<C>) -> Result<Self, ValidationError> {
        self.not = Some(Box::new(child));
        self.check_single_operator()?;
        Ok(self)
    }

    /// The single child, if any.
    fn children(&self) -> impl Iterator<Item = &FilterNode<C>> {
        [&self.and, &self.or, &self.not]
            .into_iter()
            .filter_map(|child| child.as_deref())
    }

    /// Validate every node and criterion in the tree.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.check_single_operator()?;
        self.criteria.validate()?;
        self.children().try_for_each(FilterNode::validate)
    }

    /// Every hierarchical criterion in the tree, for expansion.
    pub fn hierarchical_mut(&mut self) -> Vec<(&'static Relation, &mut HierarchicalCriterion)> {
        let mut found = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            found.extend(node.criteria.hierarchical_mut());
            for child in [&mut node.and, &mut node.or, &mut node.not].into_iter().flatten() {
                stack.push(child.as_mut());
            }
        }
        found
    }
}

/// Per-entity criteria set.
pub trait Criteria: Default + Clone + Send + Sync + 'static {
    /// Validate each present criterion.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Hierarchical criteria paired with the relation they expand through.
    fn hierarchical_mut(&mut self) -> Vec<(&'static Relation, &mut HierarchicalCriterion)> {
        Vec::new()
    }

    /// Add this level's predicates.
    fn compile(&self, level: &mut Level<'_>) -> Result<(), ValidationError>;
}

/// Validate an optional criterion under its field name.
pub fn check<V: Validate>(field: &'static str, criterion: &V) -> Result<(), ValidationError> {
    criterion.validate(field)
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// A compiled boolean expression split by evaluation phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    /// Row-level part (WHERE).
    pub filter: Option<Clause>,
    /// Group-level part (HAVING).
    pub having: Option<Clause>,
}

fn and_opt(a: Option<Clause>, b: Option<Clause>) -> Option<Clause> {
    Clause::and_all(a.into_iter().chain(b).collect())
}

impl Predicate {
    pub fn is_empty(&self) -> bool {
        self.filter.is_none() && self.having.is_none()
    }

    pub fn and(self, other: Predicate) -> Predicate {
        Predicate {
            filter: and_opt(self.filter, other.filter),
            having: and_opt(self.having, other.having),
        }
    }

    /// The whole predicate as one group-level clause.
    fn grouped(self) -> Option<Clause> {
        and_opt(self.filter.map(Clause::any_row), self.having)
    }

    pub fn or(self, other: Predicate) -> Predicate {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        if self.having.is_none() && other.having.is_none() {
            return Predicate {
                filter: Clause::or_all(self.filter.into_iter().chain(other.filter).collect()),
                having: None,
            };
        }
        Predicate {
            filter: None,
            having: Clause::or_all(self.grouped().into_iter().chain(other.grouped()).collect()),
        }
    }

    pub fn negate(self) -> Predicate {
        match self.having {
            None => Predicate {
                filter: self.filter.map(Clause::negate),
                having: None,
            },
            Some(_) => Predicate {
                filter: None,
                having: self.grouped().map(Clause::negate),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Levels
// ---------------------------------------------------------------------------

/// A table of strings owned by the base entity (aliases, URLs).
#[derive(Debug, Clone, Copy)]
pub struct StringList {
    pub table: &'static str,
    pub owner_fk: &'static str,
    pub column: &'static str,
}

/// Free-form `(owner, field, value)` attributes.
#[derive(Debug, Clone, Copy)]
pub struct CustomFields {
    pub table: &'static str,
    pub owner_fk: &'static str,
}

/// Builder for one level of the filter tree.
///
/// Joins go to the statement-wide list shared by every level; WHERE and
/// HAVING terms stay local and are combined by the tree walk.
pub struct Level<'a> {
    table: &'static str,
    joins: &'a mut Vec<Join>,
    next_alias: &'a mut usize,
    wheres: Vec<Clause>,
    havings: Vec<Clause>,
}

impl<'a> Level<'a> {
    fn new(table: &'static str, joins: &'a mut Vec<Join>, next_alias: &'a mut usize) -> Self {
        Self {
            table,
            joins,
            next_alias,
            wheres: Vec::new(),
            havings: Vec::new(),
        }
    }

    fn finish(self) -> Predicate {
        Predicate {
            filter: Clause::and_all(self.wheres),
            having: Clause::and_all(self.havings),
        }
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    fn column(&self, column: &str) -> String {
        format!("{}.{column}", self.table)
    }

    fn alias(&mut self, stem: &str) -> String {
        *self.next_alias += 1;
        format!("{stem}_{}", self.next_alias)
    }

    pub fn push_where(&mut self, clause: Clause) {
        self.wheres.push(clause);
    }

    pub fn join(&mut self, join: Join) {
        self.joins.push(join);
    }

    fn extend(&mut self, fragment: RelationFragment) {
        self.joins.extend(fragment.joins);
        self.wheres.extend(fragment.wheres);
        self.havings.extend(fragment.havings);
    }

    pub fn string(
        &mut self,
        field: &'static str,
        column: &str,
        criterion: &Option<StringCriterion>,
    ) -> Result<(), ValidationError> {
        if let Some(c) = criterion {
            let column = self.column(column);
            if let Some(clause) = string_clause(field, &column, c)? {
                self.wheres.push(clause);
            }
        }
        Ok(())
    }

    /// String criterion over an expression that is not a base-table column,
    /// such as a column of a joined parent row.
    pub fn string_expr(
        &mut self,
        field: &'static str,
        expr: &str,
        criterion: &Option<StringCriterion>,
    ) -> Result<(), ValidationError> {
        if let Some(c) = criterion {
            if let Some(clause) = string_clause(field, expr, c)? {
                self.wheres.push(clause);
            }
        }
        Ok(())
    }

    pub fn int(
        &mut self,
        field: &'static str,
        column: &str,
        criterion: &Option<IntCriterion>,
    ) -> Result<(), ValidationError> {
        if let Some(c) = criterion {
            let column = self.column(column);
            self.wheres.push(int_clause(field, &column, c)?);
        }
        Ok(())
    }

    pub fn float(
        &mut self,
        field: &'static str,
        column: &str,
        criterion: &Option<FloatCriterion>,
    ) -> Result<(), ValidationError> {
        if let Some(c) = criterion {
            let column = self.column(column);
            self.wheres.push(float_clause(field, &column, c)?);
        }
        Ok(())
    }

    pub fn date(
        &mut self,
        field: &'static str,
        column: &str,
        criterion: &Option<DateCriterion>,
    ) -> Result<(), ValidationError> {
        if let Some(c) = criterion {
            let column = self.column(column);
            self.wheres.push(date_clause(field, &column, c)?);
        }
        Ok(())
    }

    /// Date criterion over an arbitrary expression.
    pub fn date_expr(
        &mut self,
        field: &'static str,
        expr: &str,
        criterion: &Option<DateCriterion>,
    ) -> Result<(), ValidationError> {
        if let Some(c) = criterion {
            self.wheres.push(date_clause(field, expr, c)?);
        }
        Ok(())
    }

    pub fn timestamp(
        &mut self,
        field: &'static str,
        column: &str,
        criterion: &Option<TimestampCriterion>,
    ) -> Result<(), ValidationError> {
        if let Some(c) = criterion {
            let column = self.column(column);
            self.wheres.push(timestamp_clause(field, &column, c)?);
        }
        Ok(())
    }

    pub fn timestamp_expr(
        &mut self,
        field: &'static str,
        expr: &str,
        criterion: &Option<TimestampCriterion>,
    ) -> Result<(), ValidationError> {
        if let Some(c) = criterion {
            self.wheres.push(timestamp_clause(field, expr, c)?);
        }
        Ok(())
    }

    pub fn flag(&mut self, column: &str, value: Option<bool>) {
        if let Some(v) = value {
            let column = self.column(column);
            self.wheres.push(bool_clause(&column, v));
        }
    }

    pub fn enumeration(
        &mut self,
        field: &'static str,
        column: &str,
        criterion: &Option<EnumCriterion>,
    ) -> Result<(), ValidationError> {
        if let Some(c) = criterion {
            let column = self.column(column);
            if let Some(clause) = enum_clause(field, &column, c)? {
                self.wheres.push(clause);
            }
        }
        Ok(())
    }

    /// Integer criterion over the number of related rows.
    pub fn count(
        &mut self,
        field: &'static str,
        relation: &Relation,
        criterion: &Option<IntCriterion>,
    ) -> Result<(), ValidationError> {
        if let Some(c) = criterion {
            let expr = relation_count_expr(self.table, relation);
            self.wheres.push(int_clause(field, &expr, c)?);
        }
        Ok(())
    }

    pub fn multi(
        &mut self,
        field: &'static str,
        relation: &Relation,
        criterion: &Option<MultiCriterion>,
    ) -> Result<(), ValidationError> {
        if let Some(c) = criterion {
            let alias = self.alias(relation.name);
            let fragment = multi_fragment(field, self.table, relation, c, &alias)?;
            self.extend(fragment);
        }
        Ok(())
    }

    pub fn hierarchical(
        &mut self,
        field: &'static str,
        relation: &Relation,
        criterion: &Option<HierarchicalCriterion>,
    ) -> Result<(), ValidationError> {
        if let Some(c) = criterion {
            let alias = self.alias(relation.name);
            let fragment = hierarchical_fragment(field, self.table, relation, c, &alias)?;
            self.extend(fragment);
        }
        Ok(())
    }

    /// String criterion matched against any entry of a string list.
    /// `IsNull` means the list is empty.
    pub fn string_list(
        &mut self,
        field: &'static str,
        list: StringList,
        criterion: &Option<StringCriterion>,
    ) -> Result<(), ValidationError> {
        let Some(c) = criterion else {
            return Ok(());
        };
        let owner = self.column("id");
        let StringList {
            table,
            owner_fk,
            column,
        } = list;
        let clause = match c.modifier {
            Modifier::IsNull => {
                Clause::raw(format!("{owner} NOT IN (SELECT {owner_fk} FROM {table})"))
            }
            Modifier::NotNull => {
                Clause::raw(format!("{owner} IN (SELECT {owner_fk} FROM {table})"))
            }
            _ => {
                let Some(inner) = string_clause(field, &format!("l.{column}"), c)? else {
                    return Ok(());
                };
                Clause::new(
                    format!(
                        "{owner} IN (SELECT l.{owner_fk} FROM {table} AS l WHERE {})",
                        inner.sql
                    ),
                    inner.args,
                )
            }
        };
        self.wheres.push(clause);
        Ok(())
    }

    /// Custom attribute criteria; each gets its own join on the field name.
    pub fn custom_fields(
        &mut self,
        field: &'static str,
        fields: CustomFields,
        criteria: &[CustomFieldCriterion],
    ) -> Result<(), ValidationError> {
        for c in criteria {
            let alias = self.alias("custom_field");
            let value = format!("{alias}.value");
            let arg = |i: usize| {
                c.arg(i).ok_or(ValidationError::MissingValue {
                    field,
                    modifier: c.modifier,
                })
            };
            let clause = match c.modifier {
                Modifier::IsNull => Clause::raw(format!("{value} IS NULL")),
                Modifier::NotNull => Clause::raw(format!("{value} IS NOT NULL")),
                Modifier::Equals => Clause::new(format!("{value} = ?"), vec![arg(0)?]),
                Modifier::NotEquals => {
                    Clause::new(format!("({value} IS NULL OR {value} != ?)"), vec![arg(0)?])
                }
                Modifier::GreaterThan => Clause::new(format!("{value} > ?"), vec![arg(0)?]),
                Modifier::LessThan => Clause::new(format!("{value} < ?"), vec![arg(0)?]),
                Modifier::Between => Clause::new(
                    format!("{value} BETWEEN ? AND ?"),
                    vec![arg(0)?, arg(1)?],
                ),
                Modifier::NotBetween => Clause::new(
                    format!("({value} IS NULL OR {value} NOT BETWEEN ? AND ?)"),
                    vec![arg(0)?, arg(1)?],
                ),
                Modifier::Includes | Modifier::Excludes | Modifier::MatchesRegex
                | Modifier::NotMatchesRegex => {
                    let text = c
                        .value
                        .first()
                        .and_then(serde_json::Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| {
                            c.value.first().map(ToString::to_string).unwrap_or_default()
                        });
                    let criterion = StringCriterion::new(c.modifier, text);
                    match string_clause(field, &value, &criterion)? {
                        Some(clause) => clause,
                        None => continue,
                    }
                }
                other => {
                    return Err(ValidationError::UnsupportedModifier {
                        field,
                        modifier: other,
                    });
                }
            };
            let on = Clause::new(
                format!(
                    "{alias}.{} = {}.id AND {alias}.field = ?",
                    fields.owner_fk, self.table
                ),
                vec![c.field.clone().into()],
            );
            self.joins.push(Join::table(fields.table, alias, on).single());
            self.wheres.push(clause);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tree compilation
// ---------------------------------------------------------------------------

/// Compiles filter trees for one base table.
pub struct FilterCompiler {
    table: &'static str,
    joins: Vec<Join>,
    next_alias: usize,
}

impl FilterCompiler {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            joins: Vec::new(),
            next_alias: 0,
        }
    }

    /// Compile a tree. Call [`FilterNode::validate`] first; this only
    /// reports errors found while building clauses.
    pub fn compile<C: Criteria>(
        &mut self,
        node: &FilterNode<C>,
    ) -> Result<Predicate, ValidationError> {
        node.check_single_operator()?;

        let mut level = Level::new(self.table, &mut self.joins, &mut self.next_alias);
        node.criteria.compile(&mut level)?;
        let mut predicate = level.finish();

        if let Some(and) = &node.and {
            predicate = predicate.and(self.compile(and)?);
        }
        if let Some(or) = &node.or {
            predicate = predicate.or(self.compile(or)?);
        }
        if let Some(not) = &node.not {
            predicate = predicate.and(self.compile(not)?.negate());
        }
        Ok(predicate)
    }

    /// Joins collected so far, in the order they were added.
    pub fn into_joins(self) -> Vec<Join> {
        self.joins
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::relation::RelationSource;

    static TAGS: Relation = Relation::new(
        "tags",
        &[RelationSource::JoinTable {
            table: "things_tags",
            owner_fk: "thing_id",
            related_fk: "tag_id",
        }],
    );

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct ThingCriteria {
        name: Option<StringCriterion>,
        rating: Option<IntCriterion>,
        tags: Option<MultiCriterion>,
    }

    impl Criteria for ThingCriteria {
        fn validate(&self) -> Result<(), ValidationError> {
            check("name", &self.name)?;
            check("rating", &self.rating)?;
            check("tags", &self.tags)
        }

        fn compile(&self, level: &mut Level<'_>) -> Result<(), ValidationError> {
            level.string("name", "name", &self.name)?;
            level.int("rating", "rating", &self.rating)?;
            level.multi("tags", &TAGS, &self.tags)
        }
    }

    fn name(value: &str) -> FilterNode<ThingCriteria> {
        FilterNode::new(ThingCriteria {
            name: Some(StringCriterion::new(Modifier::Equals, value)),
            ..Default::default()
        })
    }

    fn compile(node: &FilterNode<ThingCriteria>) -> (Predicate, Vec<Join>) {
        let mut compiler = FilterCompiler::new("things");
        let predicate = compiler.compile(node).unwrap();
        (predicate, compiler.into_joins())
    }

    #[test]
    fn two_operators_are_ambiguous() {
        let node = name("a").with_and(name("b")).unwrap();
        assert_eq!(node.clone().with_or(name("c")), Err(ValidationError::AmbiguousOperator));
        assert_eq!(node.with_not(name("c")), Err(ValidationError::AmbiguousOperator));
    }

    #[test]
    fn deserialized_trees_are_validated() {
        let node: FilterNode<ThingCriteria> = serde_json::from_value(serde_json::json!({
            "name": {"value": "a", "modifier": "EQUALS"},
            "AND": {"rating": {"value": 3, "modifier": "GREATER_THAN"}},
            "or": {"rating": {"value": 1, "modifier": "LESS_THAN"}}
        }))
        .unwrap();
        assert!(node.and.is_some() && node.or.is_some());
        assert_eq!(node.validate(), Err(ValidationError::AmbiguousOperator));
    }

    #[test]
    fn nested_validation_reaches_children() {
        let bad = FilterNode::new(ThingCriteria {
            rating: Some(IntCriterion::new(Modifier::Between, 1)),
            ..Default::default()
        });
        let node = name("a").with_not(bad).unwrap();
        assert!(matches!(
            node.validate(),
            Err(ValidationError::MissingRangeValue { field: "rating", .. })
        ));
    }

    #[test]
    fn or_combines_whole_groups() {
        let mut left = name("Jane");
        left.criteria.rating = Some(IntCriterion::new(Modifier::GreaterThan, 3));
        let node = left.with_or(name("Joan")).unwrap();
        let (predicate, joins) = compile(&node);
        assert!(joins.is_empty());
        assert!(predicate.having.is_none());
        let filter = predicate.filter.unwrap();
        assert_eq!(
            filter.sql,
            "((things.name LIKE ?) AND (things.rating > ?)) OR (things.name LIKE ?)"
        );
        assert_eq!(filter.args.len(), 3);
    }

    #[test]
    fn not_negates_the_child_group() {
        let node = name("a").with_not(name("b")).unwrap();
        let (predicate, _) = compile(&node);
        assert_eq!(
            predicate.filter.unwrap().sql,
            "(things.name LIKE ?) AND (NOT (things.name LIKE ?))"
        );
    }

    #[test]
    fn empty_level_with_or_uses_the_child() {
        let node = FilterNode::new(ThingCriteria::default())
            .with_or(name("b"))
            .unwrap();
        let (predicate, _) = compile(&node);
        assert_eq!(predicate.filter.unwrap().sql, "things.name LIKE ?");
    }

    #[test]
    fn relationship_under_or_is_lifted_to_having() {
        let tagged = FilterNode::new(ThingCriteria {
            tags: Some(MultiCriterion::new(Modifier::Includes, vec![1])),
            ..Default::default()
        });
        let node = name("a").with_or(tagged).unwrap();
        let (predicate, joins) = compile(&node);
        assert_eq!(joins.len(), 1);
        assert!(predicate.filter.is_none());
        assert_eq!(
            predicate.having.unwrap().sql,
            "(MAX(CASE WHEN (things.name LIKE ?) THEN 1 ELSE 0 END) = 1) OR \
             (COUNT(DISTINCT tags_1.root_id) >= ?)"
        );
    }

    #[test]
    fn negated_relationship_stays_in_having() {
        let tagged = FilterNode::new(ThingCriteria {
            tags: Some(MultiCriterion::new(Modifier::Includes, vec![1])),
            ..Default::default()
        });
        let node = FilterNode::new(ThingCriteria::default()).with_not(tagged).unwrap();
        let (predicate, _) = compile(&node);
        assert_eq!(
            predicate.having.unwrap().sql,
            "NOT (COUNT(DISTINCT tags_1.root_id) >= ?)"
        );
    }

    #[test]
    fn custom_fields_join_per_criterion() {
        let mut joins = Vec::new();
        let mut next = 0;
        let mut level = Level::new("performers", &mut joins, &mut next);
        level
            .custom_fields(
                "custom_fields",
                CustomFields {
                    table: "performer_custom_fields",
                    owner_fk: "performer_id",
                },
                &[
                    CustomFieldCriterion::new("eyes", Modifier::Equals, vec!["blue".into()]),
                    CustomFieldCriterion::new("height", Modifier::GreaterThan, vec![170.into()]),
                ],
            )
            .unwrap();
        let predicate = level.finish();
        assert_eq!(joins.len(), 2);
        assert!(!joins[0].fan_out);
        assert_eq!(
            joins[1].on.sql,
            "custom_field_2.performer_id = performers.id AND custom_field_2.field = ?"
        );
        assert_eq!(
            predicate.filter.unwrap().sql,
            "(custom_field_1.value = ?) AND (custom_field_2.value > ?)"
        );
    }

    #[test]
    fn string_list_matches_any_entry() {
        let mut joins = Vec::new();
        let mut next = 0;
        let mut level = Level::new("studios", &mut joins, &mut next);
        let list = StringList {
            table: "studio_aliases",
            owner_fk: "studio_id",
            column: "alias",
        };
        level
            .string_list(
                "aliases",
                list,
                &Some(StringCriterion::new(Modifier::Equals, "acme")),
            )
            .unwrap();
        level
            .string_list("aliases", list, &Some(StringCriterion::new(Modifier::IsNull, "")))
            .unwrap();
        let predicate = level.finish();
        assert_eq!(
            predicate.filter.unwrap().sql,
            "(studios.id IN (SELECT l.studio_id FROM studio_aliases AS l \
             WHERE l.alias LIKE ?)) AND (studios.id NOT IN (SELECT studio_id FROM studio_aliases))"
        );
    }
}
