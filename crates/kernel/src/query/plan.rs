//! Query plan assembly and execution.
//!
//! A [`QueryPlan`] collects joins, predicates, ordering and paging for one
//! find call and renders two statements from them: the ordered, paged id
//! query and the unpaged count query.

use std::collections::HashSet;

use sea_query::{
    Alias, Expr, JoinType, Order, Query, SelectStatement, SqliteQueryBuilder, Value, Values,
};
use sqlx::sqlite::SqliteArguments;
use sqlx::{Arguments, SqliteConnection};

use super::clause::{Clause, Join, JoinSource};
use super::compiler::{FilterCompiler, FilterNode};
use super::entity::Entity;
use super::search::query_clause;
use super::sort::{FindFilter, OrderTerm, Page, compile_sort, paginate, validate_sort};
use crate::config::QueryConfig;
use crate::error::{QueryError, QueryResult, ValidationError};

/// Everything needed to render the id and count statements.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    table: &'static str,
    joins: Vec<Join>,
    join_keys: HashSet<String>,
    wheres: Vec<Clause>,
    havings: Vec<Clause>,
    group_by: bool,
    order: Vec<OrderTerm>,
    page: Option<Page>,
}

impl QueryPlan {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            joins: Vec::new(),
            join_keys: HashSet::new(),
            wheres: Vec::new(),
            havings: Vec::new(),
            group_by: false,
            order: Vec::new(),
            page: None,
        }
    }

    /// Add a join unless an identical one is already present.
    pub fn add_join(&mut self, join: Join) {
        if self.join_keys.insert(join.key()) {
            self.group_by |= join.fan_out;
            self.joins.push(join);
        }
    }

    pub fn add_where(&mut self, clause: Clause) {
        self.wheres.push(clause);
    }

    pub fn add_having(&mut self, clause: Clause) {
        self.group_by = true;
        self.havings.push(clause);
    }

    pub fn set_order(&mut self, terms: Vec<OrderTerm>) {
        self.order = terms;
    }

    pub fn set_page(&mut self, page: Option<Page>) {
        self.page = page;
    }

    pub fn page(&self) -> Option<Page> {
        self.page
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    fn apply_join(query: &mut SelectStatement, join: &Join) {
        let on = join.on.clone().into_expr();
        match &join.source {
            JoinSource::Table(table) => {
                query.join_as(
                    JoinType::LeftJoin,
                    Alias::new(*table),
                    Alias::new(join.alias.as_str()),
                    on,
                );
            }
            JoinSource::Derived(derived) => {
                query.join_subquery(
                    JoinType::LeftJoin,
                    derived.clone(),
                    Alias::new(join.alias.as_str()),
                    on,
                );
            }
        }
    }

    /// `SELECT table.id` with joins, WHERE, GROUP BY and HAVING.
    fn base_select(&self) -> SelectStatement {
        let table = Alias::new(self.table);
        let mut query = Query::select();
        query
            .column((table.clone(), Alias::new("id")))
            .from(table.clone());

        for join in &self.joins {
            Self::apply_join(&mut query, join);
        }

        if let Some(filter) = Clause::and_all(self.wheres.clone()) {
            query.and_where(filter.into_expr());
        }

        if self.group_by {
            query.group_by_col((table, Alias::new("id")));
        }
        if let Some(having) = Clause::and_all(self.havings.clone()) {
            query.and_having(having.into_expr());
        }
        query
    }

    /// Ordered, paged id statement. Grouping by id makes the ids distinct.
    pub fn ids_statement(&self) -> SelectStatement {
        let mut query = self.base_select();
        for term in &self.order {
            let order = if term.descending { Order::Desc } else { Order::Asc };
            query.order_by_expr(term.expr.clone().into_expr(), order);
        }
        if let Some(page) = self.page {
            query.limit(page.limit).offset(page.offset);
        }
        query
    }

    /// Total matches, independent of ordering and paging.
    pub fn count_statement(&self) -> SelectStatement {
        let mut query = Query::select();
        query
            .expr(Expr::cust("COUNT(*)"))
            .from_subquery(self.base_select(), Alias::new("temp"));
        query
    }
}

/// Bind sea-query values as SQLite arguments, in order.
pub fn bind_values<'q>(values: Values) -> QueryResult<SqliteArguments<'q>> {
    let mut args = SqliteArguments::default();
    for value in values.0 {
        let added = match value {
            Value::Bool(v) => args.add(v),
            Value::TinyInt(v) => args.add(v.map(i64::from)),
            Value::SmallInt(v) => args.add(v.map(i64::from)),
            Value::Int(v) => args.add(v.map(i64::from)),
            Value::BigInt(v) => args.add(v),
            Value::TinyUnsigned(v) => args.add(v.map(i64::from)),
            Value::SmallUnsigned(v) => args.add(v.map(i64::from)),
            Value::Unsigned(v) => args.add(v.map(i64::from)),
            Value::BigUnsigned(v) => args.add(v.map(|n| i64::try_from(n).unwrap_or(i64::MAX))),
            Value::Float(v) => args.add(v.map(f64::from)),
            Value::Double(v) => args.add(v),
            Value::String(v) => args.add(v.map(|s| *s)),
            Value::Char(v) => args.add(v.map(|c| c.to_string())),
            Value::Bytes(v) => args.add(v.map(|b| *b)),
            #[allow(unreachable_patterns)]
            other => args.add(Some(format!("{other:?}"))),
        };
        added.map_err(|e| QueryError::Execution {
            context: "failed to bind query argument",
            source: sqlx::Error::Encode(e),
        })?;
    }
    Ok(args)
}

/// Validate the filter and sort, then compile both into a plan.
///
/// Hierarchical criteria are compiled with whatever expansion they carry;
/// the repository fills expansions in before calling this.
pub fn compile_plan<E: Entity>(
    filter: &FilterNode<E::Criteria>,
    find: &FindFilter,
    config: &QueryConfig,
) -> Result<QueryPlan, ValidationError> {
    filter.validate()?;
    let sort_key = validate_sort(E::sort_spec(), find.sort.as_deref())?;

    let mut compiler = FilterCompiler::new(E::TABLE);
    let predicate = compiler.compile(filter)?;

    let mut plan = QueryPlan::new(E::TABLE);
    for join in compiler.into_joins() {
        plan.add_join(join);
    }

    if let Some(q) = find.q.as_deref() {
        if let Some(clause) = query_clause(E::search_columns(), q) {
            for join in E::search_joins() {
                plan.add_join(join);
            }
            plan.add_where(clause);
        }
    }

    if let Some(filter) = predicate.filter {
        plan.add_where(filter);
    }
    if let Some(having) = predicate.having {
        plan.add_having(having);
    }

    let sort = compile_sort(E::sort_spec(), E::TABLE, &sort_key, find.direction.as_deref());
    plan.set_order(sort.terms);
    plan.set_page(paginate(find, config));

    Ok(plan)
}

/// Run the id statement.
pub async fn fetch_ids(conn: &mut SqliteConnection, plan: &QueryPlan) -> QueryResult<Vec<i64>> {
    let (sql, values) = plan.ids_statement().build(SqliteQueryBuilder);
    tracing::debug!(%sql, args = values.0.len(), "executing id query");
    sqlx::query_scalar_with::<_, i64, _>(&sql, bind_values(values)?)
        .fetch_all(&mut *conn)
        .await
        .map_err(QueryError::execution("failed to execute id query"))
}

/// Run the count statement.
pub async fn fetch_count(conn: &mut SqliteConnection, plan: &QueryPlan) -> QueryResult<i64> {
    let (sql, values) = plan.count_statement().build(SqliteQueryBuilder);
    tracing::debug!(%sql, args = values.0.len(), "executing count query");
    sqlx::query_scalar_with::<_, i64, _>(&sql, bind_values(values)?)
        .fetch_one(&mut *conn)
        .await
        .map_err(QueryError::execution("failed to execute count query"))
}
