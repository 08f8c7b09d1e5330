//! Free-text matching over one or more columns.
//!
//! Text wrapped in double quotes is matched as one exact substring;
//! anything else is split on whitespace into words.

use sea_query::Value;

use super::clause::Clause;

/// Escape LIKE wildcards so user text matches literally.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('!', "!!")
        .replace('%', "!%")
        .replace('_', "!_")
}

/// Terms of a search string: the quoted phrase, or the whitespace-separated
/// words. Empty input yields no terms.
pub fn search_terms(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    let unquoted = trimmed.trim_matches('"');
    if unquoted.len() != trimmed.len() {
        if unquoted.is_empty() {
            return Vec::new();
        }
        return vec![unquoted.to_string()];
    }
    trimmed.split_whitespace().map(str::to_string).collect()
}

fn like(column: &str, term: &str, negated: bool) -> Clause {
    let op = if negated { "NOT LIKE" } else { "LIKE" };
    Clause::new(
        format!("{column} {op} ? ESCAPE '!'"),
        vec![Value::from(format!("%{}%", escape_like_wildcards(term)))],
    )
}

/// Free-text search (`q`): every term must match at least one column.
pub fn query_clause(columns: &[&str], text: &str) -> Option<Clause> {
    let per_term = search_terms(text)
        .iter()
        .filter_map(|term| {
            Clause::or_all(columns.iter().map(|c| like(c, term, false)).collect())
        })
        .collect();
    Clause::and_all(per_term)
}

/// String `Includes`: any term matching any column. With `negated`, no term
/// may match any column.
pub fn string_search_clause(columns: &[&str], text: &str, negated: bool) -> Option<Clause> {
    let likes: Vec<Clause> = search_terms(text)
        .iter()
        .flat_map(|term| columns.iter().map(move |c| like(c, term, negated)))
        .collect();
    if negated {
        Clause::and_all(likes)
    } else {
        Clause::or_all(likes)
    }
}
