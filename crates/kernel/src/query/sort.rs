//! Sort keys, direction and pagination.
//!
//! Sort keys come from the caller as free text and are only ever turned
//! into SQL through an entity's [`SortSpec`]; a key that is neither listed
//! there nor a `random_<seed>` key is rejected before compilation.

use serde::{Deserialize, Serialize};

use super::clause::Clause;
use super::relation::{Relation, relation_count_expr};
use crate::collation::NATURAL_CI;
use crate::config::QueryConfig;
use crate::error::ValidationError;

/// `per_page` value meaning "return every match".
pub const PER_PAGE_ALL: i32 = -1;

/// Upper bound applied to random seeds.
const MAX_RANDOM_SEED: u64 = 100_000_000;

/// Modulus of the seeded ordering hash (2^31 - 1).
const RANDOM_MODULUS: i64 = 2_147_483_647;

/// Paging, sorting and free-text search for a find call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindFilter {
    pub q: Option<String>,
    pub sort: Option<String>,
    /// `ASC` or `DESC`; anything else sorts ascending.
    pub direction: Option<String>,
    pub page: Option<i32>,
    pub per_page: Option<i32>,
}

impl FindFilter {
    pub fn sorted_by(sort: impl Into<String>) -> Self {
        Self {
            sort: Some(sort.into()),
            ..Self::default()
        }
    }

    pub fn paged(page: i32, per_page: i32) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
            ..Self::default()
        }
    }

    pub fn with_direction(mut self, direction: impl Into<String>) -> Self {
        self.direction = Some(direction.into());
        self
    }

    pub fn with_query(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }
}

/// How a sort key orders rows.
#[derive(Debug, Clone, Copy)]
pub enum SortKind {
    /// Plain column comparison.
    Column,
    /// Case-insensitive natural ordering.
    Natural,
    /// Number of related rows.
    Count(&'static Relation),
}

/// Sort allow-list and defaults for one entity.
#[derive(Debug)]
pub struct SortSpec {
    pub default: &'static str,
    /// Permitted keys; for column kinds the key is also the column name.
    pub keys: &'static [(&'static str, SortKind)],
    /// Columns appended after the requested key, always ascending.
    pub tiebreak: &'static [(&'static str, SortKind)],
}

impl SortSpec {
    fn lookup(&self, key: &str) -> Option<(&'static str, SortKind)> {
        self.keys.iter().find(|(name, _)| *name == key).copied()
    }
}

/// A validated sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    Named(&'static str),
    Random(u64),
}

/// Check a requested sort against the allow-list.
pub fn validate_sort(
    spec: &SortSpec,
    requested: Option<&str>,
) -> Result<SortKey, ValidationError> {
    let key = requested.map(str::trim).filter(|k| !k.is_empty());
    let Some(key) = key else {
        return Ok(SortKey::Named(spec.default));
    };
    if let Some((name, _)) = spec.lookup(key) {
        return Ok(SortKey::Named(name));
    }
    if key == "random" {
        return Ok(SortKey::Random(fresh_seed()));
    }
    if let Some(seed) = key.strip_prefix("random_") {
        if !seed.is_empty() && seed.bytes().all(|b| b.is_ascii_digit()) {
            let seed = seed.parse::<u64>().unwrap_or_else(|_| fresh_seed());
            return Ok(SortKey::Random(seed % MAX_RANDOM_SEED));
        }
    }
    Err(ValidationError::InvalidSort(key.to_string()))
}

fn fresh_seed() -> u64 {
    rand::random::<u64>() % MAX_RANDOM_SEED
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub expr: Clause,
    pub descending: bool,
}

/// Compiled ORDER BY terms.
#[derive(Debug, Clone, Default)]
pub struct CompiledSort {
    pub terms: Vec<OrderTerm>,
}

fn is_descending(direction: Option<&str>) -> bool {
    direction == Some("DESC")
}

/// `((n*n % m) * 52959209 + n * 1047483763) % m` with `n = (id + seed) % m`.
///
/// Every intermediate product stays below 2^63.
fn random_term(table: &str, seed: u64) -> Clause {
    let n = format!("(({table}.id + ?) % {RANDOM_MODULUS})");
    let seed = i64::try_from(seed).unwrap_or_default();
    Clause::new(
        format!(
            "((({n} * {n}) % {RANDOM_MODULUS}) * 52959209 + {n} * 1047483763) % {RANDOM_MODULUS}"
        ),
        vec![seed.into(), seed.into(), seed.into()],
    )
}

fn column_term(table: &str, column: &str, kind: SortKind) -> Clause {
    match kind {
        SortKind::Natural => Clause::raw(format!("{table}.{column} COLLATE {NATURAL_CI}")),
        _ => Clause::raw(format!("{table}.{column}")),
    }
}

/// Compile a validated sort key into ORDER BY terms.
pub fn compile_sort(
    spec: &SortSpec,
    table: &'static str,
    key: &SortKey,
    direction: Option<&str>,
) -> CompiledSort {
    let descending = is_descending(direction);
    let mut compiled = CompiledSort::default();

    match key {
        SortKey::Random(seed) => compiled.terms.push(OrderTerm {
            expr: random_term(table, *seed),
            descending,
        }),
        SortKey::Named(name) => match spec.lookup(name) {
            Some((_, SortKind::Count(relation))) => compiled.terms.push(OrderTerm {
                expr: Clause::raw(relation_count_expr(table, relation)),
                descending,
            }),
            Some((column, kind)) => compiled.terms.push(OrderTerm {
                expr: column_term(table, column, kind),
                descending,
            }),
            None => {}
        },
    }

    for (column, kind) in spec.tiebreak {
        let expr = column_term(table, column, *kind);
        if compiled.terms.iter().any(|t| t.expr == expr) {
            continue;
        }
        compiled.terms.push(OrderTerm {
            expr,
            descending: false,
        });
    }

    compiled
}

/// LIMIT/OFFSET for one page; `None` means unpaginated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

/// Resolve page and page size against the configured defaults.
pub fn paginate(find: &FindFilter, config: &QueryConfig) -> Option<Page> {
    let per_page = match find.per_page {
        Some(PER_PAGE_ALL) => return None,
        Some(n) if n > 0 => {
            let requested = n.unsigned_abs();
            if requested > config.max_per_page {
                tracing::warn!(
                    requested,
                    max = config.max_per_page,
                    "per_page exceeds maximum; capping"
                );
                config.max_per_page
            } else {
                requested
            }
        }
        _ => config.default_per_page,
    };

    let page = match find.page {
        None => 1,
        Some(p) if p <= 0 => return None,
        Some(p) => p.unsigned_abs(),
    };

    let limit = u64::from(per_page);
    Some(Page {
        limit,
        offset: u64::from(page - 1) * limit,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::relation::RelationSource;

    static TAGS: Relation = Relation::new(
        "tags",
        &[RelationSource::JoinTable {
            table: "scenes_tags",
            owner_fk: "scene_id",
            related_fk: "tag_id",
        }],
    );

    static SPEC: SortSpec = SortSpec {
        default: "title",
        keys: &[
            ("title", SortKind::Natural),
            ("date", SortKind::Column),
            ("id", SortKind::Column),
            ("tags_count", SortKind::Count(&TAGS)),
        ],
        tiebreak: &[("title", SortKind::Natural), ("id", SortKind::Column)],
    };

    #[test]
    fn unknown_keys_are_rejected() {
        for key in ["name; DROP TABLE scenes", "random_", "random_x1", "TITLE"] {
            assert_eq!(
                validate_sort(&SPEC, Some(key)),
                Err(ValidationError::InvalidSort(key.to_string())),
                "{key}"
            );
        }
    }

    #[test]
    fn missing_sort_uses_default() {
        assert_eq!(validate_sort(&SPEC, None), Ok(SortKey::Named("title")));
        assert_eq!(validate_sort(&SPEC, Some("  ")), Ok(SortKey::Named("title")));
    }

    #[test]
    fn random_seeds_are_parsed_and_capped() {
        assert_eq!(validate_sort(&SPEC, Some("random_42")), Ok(SortKey::Random(42)));
        assert_eq!(
            validate_sort(&SPEC, Some("random_1234567890")),
            Ok(SortKey::Random(34_567_890))
        );
        assert!(matches!(
            validate_sort(&SPEC, Some("random_99999999999999999999999")),
            Ok(SortKey::Random(s)) if s < MAX_RANDOM_SEED
        ));
        assert!(matches!(validate_sort(&SPEC, Some("random")), Ok(SortKey::Random(_))));
    }

    #[test]
    fn direction_is_case_sensitive() {
        assert!(is_descending(Some("DESC")));
        assert!(!is_descending(Some("desc")));
        assert!(!is_descending(Some("sideways")));
        assert!(!is_descending(None));
    }

    #[test]
    fn natural_columns_use_the_collation_and_get_a_tiebreak() {
        let sort = compile_sort(&SPEC, "scenes", &SortKey::Named("date"), Some("DESC"));
        let sql: Vec<_> = sort
            .terms
            .iter()
            .map(|t| (t.expr.sql.as_str(), t.descending))
            .collect();
        assert_eq!(
            sql,
            vec![
                ("scenes.date", true),
                ("scenes.title COLLATE NATURAL_CI", false),
                ("scenes.id", false),
            ]
        );
    }

    #[test]
    fn tiebreak_is_not_repeated() {
        let sort = compile_sort(&SPEC, "scenes", &SortKey::Named("title"), None);
        assert_eq!(sort.terms.len(), 2);
    }

    #[test]
    fn count_sort_orders_by_a_correlated_count() {
        let sort = compile_sort(&SPEC, "scenes", &SortKey::Named("tags_count"), Some("DESC"));
        assert_eq!(
            sort.terms[0].expr.sql,
            "(SELECT COUNT(DISTINCT s.tag_id) FROM scenes_tags AS s WHERE s.scene_id = scenes.id)"
        );
        assert!(sort.terms[0].descending);
        assert_eq!(sort.terms.len(), 3);
    }

    #[test]
    fn random_order_binds_the_seed() {
        let sort = compile_sort(&SPEC, "scenes", &SortKey::Random(42), None);
        let term = &sort.terms[0].expr;
        assert!(term.sql.contains("((scenes.id + ?) % 2147483647)"), "{}", term.sql);
        assert!(term.sql.contains("52959209"));
        assert!(term.sql.contains("1047483763"));
        assert_eq!(term.args, vec![sea_query::Value::from(42i64); 3]);
    }

    #[test]
    fn pagination() {
        let config = QueryConfig::default();
        assert_eq!(
            paginate(&FindFilter::paged(1, 2), &config),
            Some(Page { limit: 2, offset: 0 })
        );
        assert_eq!(
            paginate(&FindFilter::paged(3, 10), &config),
            Some(Page { limit: 10, offset: 20 })
        );
        assert_eq!(paginate(&FindFilter::paged(1, PER_PAGE_ALL), &config), None);
        assert_eq!(paginate(&FindFilter::paged(0, 10), &config), None);
        assert_eq!(
            paginate(&FindFilter::default(), &config),
            Some(Page { limit: 25, offset: 0 })
        );
        assert_eq!(
            paginate(&FindFilter::paged(1, -7), &config),
            Some(Page { limit: 25, offset: 0 })
        );
        assert_eq!(
            paginate(&FindFilter::paged(2, 50_000), &config),
            Some(Page { limit: 1000, offset: 1000 })
        );
    }
}
