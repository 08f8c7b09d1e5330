//! SQL fragments with their bound arguments.
//!
//! A [`Clause`] is a predicate in SQLite syntax using `?` placeholders, paired
//! with the values for those placeholders in order. Fragments are immutable
//! values; composing two clauses produces a new one.

use sea_query::{Expr, SelectStatement, SimpleExpr, SqliteQueryBuilder, Value};

/// A predicate fragment and its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Clause {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    /// A fragment without arguments.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    /// Join clauses with AND. Returns `None` for an empty list.
    pub fn and_all(clauses: Vec<Clause>) -> Option<Clause> {
        Self::join_with(clauses, " AND ")
    }

    /// Join clauses with OR. Returns `None` for an empty list.
    pub fn or_all(clauses: Vec<Clause>) -> Option<Clause> {
        Self::join_with(clauses, " OR ")
    }

    fn join_with(clauses: Vec<Clause>, separator: &str) -> Option<Clause> {
        match clauses.len() {
            0 => None,
            1 => clauses.into_iter().next(),
            _ => {
                let mut parts = Vec::with_capacity(clauses.len());
                let mut args = Vec::new();
                for clause in clauses {
                    parts.push(format!("({})", clause.sql));
                    args.extend(clause.args);
                }
                Some(Clause::new(parts.join(separator), args))
            }
        }
    }

    /// Logical negation of the whole fragment.
    pub fn negate(self) -> Clause {
        Clause::new(format!("NOT ({})", self.sql), self.args)
    }

    /// `MAX(CASE WHEN (sql) THEN 1 ELSE 0 END) = 1`: true for a group when any
    /// of its rows satisfies the fragment.
    pub fn any_row(self) -> Clause {
        Clause::new(
            format!("MAX(CASE WHEN ({}) THEN 1 ELSE 0 END) = 1", self.sql),
            self.args,
        )
    }

    /// Wrap a rendered subquery: `{lhs} IN (subquery)` or `NOT IN`.
    pub fn in_subquery(lhs: &str, negated: bool, subquery: &SelectStatement) -> Clause {
        let (sql, values) = subquery.build(SqliteQueryBuilder);
        let op = if negated { "NOT IN" } else { "IN" };
        Clause::new(format!("{lhs} {op} ({sql})"), values.0)
    }

    /// Convert into a sea-query expression carrying the bound values.
    pub fn into_expr(self) -> SimpleExpr {
        if self.args.is_empty() {
            Expr::cust(self.sql)
        } else {
            Expr::cust_with_values(self.sql, self.args)
        }
    }
}

/// `?, ?, ?` for `n` placeholders.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Bound values for a list of ids.
pub fn id_values(ids: &[i64]) -> Vec<Value> {
    ids.iter().map(|id| Value::from(*id)).collect()
}

/// Where a joined table or derived row set comes from.
#[derive(Debug, Clone)]
pub enum JoinSource {
    Table(&'static str),
    Derived(SelectStatement),
}

/// A LEFT JOIN required by some criterion, sort or search column.
#[derive(Debug, Clone)]
pub struct Join {
    pub source: JoinSource,
    pub alias: String,
    pub on: Clause,
    /// Whether the join can yield more than one row per base row.
    pub fan_out: bool,
}

impl Join {
    pub fn table(table: &'static str, alias: impl Into<String>, on: Clause) -> Self {
        Self {
            source: JoinSource::Table(table),
            alias: alias.into(),
            on,
            fan_out: true,
        }
    }

    pub fn derived(query: SelectStatement, alias: impl Into<String>, on: Clause) -> Self {
        Self {
            source: JoinSource::Derived(query),
            alias: alias.into(),
            on,
            fan_out: true,
        }
    }

    /// Mark a join that matches at most one row (e.g. a foreign key lookup).
    pub fn single(mut self) -> Self {
        self.fan_out = false;
        self
    }

    /// Deduplication key: source, alias and condition.
    pub fn key(&self) -> String {
        let source = match &self.source {
            JoinSource::Table(table) => (*table).to_string(),
            JoinSource::Derived(query) => query.to_string(SqliteQueryBuilder),
        };
        format!("{source}|{}|{}|{:?}", self.alias, self.on.sql, self.on.args)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn and_all_parenthesises_each_part() {
        let clause = Clause::and_all(vec![
            Clause::new("a = ?", vec![1i64.into()]),
            Clause::new("b = ? OR c = ?", vec![2i64.into(), 3i64.into()]),
        ])
        .unwrap();
        assert_eq!(clause.sql, "(a = ?) AND (b = ? OR c = ?)");
        assert_eq!(clause.args.len(), 3);
    }

    #[test]
    fn single_clause_is_not_wrapped() {
        let clause = Clause::or_all(vec![Clause::raw("a IS NULL")]).unwrap();
        assert_eq!(clause.sql, "a IS NULL");
    }

    #[test]
    fn empty_list_yields_none() {
        assert!(Clause::and_all(Vec::new()).is_none());
        assert!(Clause::or_all(Vec::new()).is_none());
    }

    #[test]
    fn negate_keeps_args() {
        let clause = Clause::new("x LIKE ?", vec!["%a%".into()]).negate();
        assert_eq!(clause.sql, "NOT (x LIKE ?)");
        assert_eq!(clause.args, vec![Value::from("%a%")]);
    }

    #[test]
    fn placeholders_match_count() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(0), "");
    }

    #[test]
    fn identical_joins_share_a_key() {
        let a = Join::table("studio_aliases", "studio_aliases", Clause::raw("x = y"));
        let b = Join::table("studio_aliases", "studio_aliases", Clause::raw("x = y"));
        let c = Join::table("studio_aliases", "other", Clause::raw("x = y"));
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }
}
