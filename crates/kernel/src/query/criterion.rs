//! Criterion model: typed leaf predicates and their validation.
//!
//! Every criterion carries a [`Modifier`] plus zero, one or two values.
//! Validation runs over the whole filter tree before any statement is
//! executed; the clause builders in this module are pure and only ever see
//! criteria that already passed validation.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use sea_query::Value;
use serde::{Deserialize, Serialize};

use super::clause::Clause;
use super::search::string_search_clause;
use crate::error::ValidationError;

/// Canonical stored form of timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Canonical stored form of dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// How a criterion's value is compared against the column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modifier {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    IsNull,
    NotNull,
    Includes,
    IncludesAll,
    Excludes,
    MatchesRegex,
    NotMatchesRegex,
    Between,
    NotBetween,
}

impl Modifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "EQUALS",
            Self::NotEquals => "NOT_EQUALS",
            Self::GreaterThan => "GREATER_THAN",
            Self::LessThan => "LESS_THAN",
            Self::IsNull => "IS_NULL",
            Self::NotNull => "NOT_NULL",
            Self::Includes => "INCLUDES",
            Self::IncludesAll => "INCLUDES_ALL",
            Self::Excludes => "EXCLUDES",
            Self::MatchesRegex => "MATCHES_REGEX",
            Self::NotMatchesRegex => "NOT_MATCHES_REGEX",
            Self::Between => "BETWEEN",
            Self::NotBetween => "NOT_BETWEEN",
        }
    }

    pub fn is_range(self) -> bool {
        matches!(self, Self::Between | Self::NotBetween)
    }

    pub fn is_null_check(self) -> bool {
        matches!(self, Self::IsNull | Self::NotNull)
    }

    pub fn is_regex(self) -> bool {
        matches!(self, Self::MatchesRegex | Self::NotMatchesRegex)
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation of a single criterion, given the field name it was supplied
/// under (used in error messages).
pub trait Validate {
    fn validate(&self, field: &'static str) -> Result<(), ValidationError>;
}

impl<T: Validate> Validate for Option<T> {
    fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        match self {
            Some(criterion) => criterion.validate(field),
            None => Ok(()),
        }
    }
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        self.iter().try_for_each(|criterion| criterion.validate(field))
    }
}

fn unsupported(field: &'static str, modifier: Modifier) -> ValidationError {
    ValidationError::UnsupportedModifier { field, modifier }
}

fn check_regex(field: &'static str, pattern: &str) -> Result<(), ValidationError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ValidationError::InvalidRegex {
            field,
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringCriterion {
    #[serde(default)]
    pub value: String,
    pub modifier: Modifier,
}

impl StringCriterion {
    pub fn new(modifier: Modifier, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            modifier,
        }
    }
}

impl Validate for StringCriterion {
    fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        match self.modifier {
            Modifier::Equals
            | Modifier::NotEquals
            | Modifier::Includes
            | Modifier::Excludes
            | Modifier::IsNull
            | Modifier::NotNull => Ok(()),
            Modifier::MatchesRegex | Modifier::NotMatchesRegex => {
                check_regex(field, &self.value)
            }
            other => Err(unsupported(field, other)),
        }
    }
}

/// Predicate for a string criterion over `column`.
///
/// Returns `Ok(None)` when the criterion imposes no restriction (an
/// `Includes` with nothing to search for).
pub fn string_clause(
    field: &'static str,
    column: &str,
    criterion: &StringCriterion,
) -> Result<Option<Clause>, ValidationError> {
    let value = Value::from(criterion.value.clone());
    let clause = match criterion.modifier {
        Modifier::Equals => Clause::new(format!("{column} LIKE ?"), vec![value]),
        Modifier::NotEquals => Clause::new(format!("{column} NOT LIKE ?"), vec![value]),
        Modifier::Includes => return Ok(string_search_clause(&[column], &criterion.value, false)),
        Modifier::Excludes => return Ok(string_search_clause(&[column], &criterion.value, true)),
        Modifier::MatchesRegex => Clause::new(
            format!("({column} IS NOT NULL AND {column} REGEXP ?)"),
            vec![value],
        ),
        Modifier::NotMatchesRegex => Clause::new(
            format!("({column} IS NULL OR {column} NOT REGEXP ?)"),
            vec![value],
        ),
        Modifier::IsNull => Clause::raw(format!("({column} IS NULL OR TRIM({column}) = '')")),
        Modifier::NotNull => {
            Clause::raw(format!("({column} IS NOT NULL AND TRIM({column}) != '')"))
        }
        other => return Err(unsupported(field, other)),
    };
    Ok(Some(clause))
}

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntCriterion {
    #[serde(default)]
    pub value: i64,
    #[serde(default)]
    pub value2: Option<i64>,
    pub modifier: Modifier,
}

impl IntCriterion {
    pub fn new(modifier: Modifier, value: i64) -> Self {
        Self {
            value,
            value2: None,
            modifier,
        }
    }

    pub fn between(value: i64, value2: i64) -> Self {
        Self {
            value,
            value2: Some(value2),
            modifier: Modifier::Between,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatCriterion {
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub value2: Option<f64>,
    pub modifier: Modifier,
}

fn validate_comparison(
    field: &'static str,
    modifier: Modifier,
    has_value2: bool,
) -> Result<(), ValidationError> {
    match modifier {
        Modifier::Equals
        | Modifier::NotEquals
        | Modifier::GreaterThan
        | Modifier::LessThan
        | Modifier::IsNull
        | Modifier::NotNull => Ok(()),
        Modifier::Between | Modifier::NotBetween if has_value2 => Ok(()),
        Modifier::Between | Modifier::NotBetween => {
            Err(ValidationError::MissingRangeValue { field, modifier })
        }
        other => Err(unsupported(field, other)),
    }
}

impl Validate for IntCriterion {
    fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        validate_comparison(field, self.modifier, self.value2.is_some())
    }
}

impl Validate for FloatCriterion {
    fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        validate_comparison(field, self.modifier, self.value2.is_some())
    }
}

/// Shared comparison for numbers, dates and timestamps.
fn comparison_clause(
    field: &'static str,
    lhs: &str,
    modifier: Modifier,
    value: Value,
    value2: Option<Value>,
) -> Result<Clause, ValidationError> {
    let clause = match modifier {
        Modifier::Equals => Clause::new(format!("{lhs} = ?"), vec![value]),
        Modifier::NotEquals => Clause::new(format!("{lhs} != ?"), vec![value]),
        Modifier::GreaterThan => Clause::new(format!("{lhs} > ?"), vec![value]),
        Modifier::LessThan => Clause::new(format!("{lhs} < ?"), vec![value]),
        Modifier::IsNull => Clause::raw(format!("{lhs} IS NULL")),
        Modifier::NotNull => Clause::raw(format!("{lhs} IS NOT NULL")),
        Modifier::Between | Modifier::NotBetween => {
            let Some(upper) = value2 else {
                return Err(ValidationError::MissingRangeValue { field, modifier });
            };
            let op = if modifier == Modifier::Between {
                "BETWEEN"
            } else {
                "NOT BETWEEN"
            };
            Clause::new(format!("{lhs} {op} ? AND ?"), vec![value, upper])
        }
        other => return Err(unsupported(field, other)),
    };
    Ok(clause)
}

/// Predicate for an integer criterion over any integer-valued expression.
pub fn int_clause(
    field: &'static str,
    lhs: &str,
    criterion: &IntCriterion,
) -> Result<Clause, ValidationError> {
    comparison_clause(
        field,
        lhs,
        criterion.modifier,
        criterion.value.into(),
        criterion.value2.map(Value::from),
    )
}

pub fn float_clause(
    field: &'static str,
    lhs: &str,
    criterion: &FloatCriterion,
) -> Result<Clause, ValidationError> {
    comparison_clause(
        field,
        lhs,
        criterion.modifier,
        criterion.value.into(),
        criterion.value2.map(Value::from),
    )
}

// ---------------------------------------------------------------------------
// Dates and timestamps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateCriterion {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub value2: Option<String>,
    pub modifier: Modifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampCriterion {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub value2: Option<String>,
    pub modifier: Modifier,
}

fn parse_date(field: &'static str, value: &str) -> Result<String, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map(|d| d.format(DATE_FORMAT).to_string())
        .map_err(|_| ValidationError::InvalidDate {
            field,
            value: value.to_string(),
        })
}

/// Parse a timestamp literal into the stored form.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS]` and bare dates (midnight).
pub fn parse_timestamp(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.naive_utc().format(TIMESTAMP_FORMAT).to_string());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", TIMESTAMP_FORMAT] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt.format(TIMESTAMP_FORMAT).to_string());
        }
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
        .ok_or_else(|| ValidationError::InvalidDate {
            field,
            value: value.to_string(),
        })
}

/// Parse both literals of a date-like criterion. Null checks carry none.
fn parse_pair(
    field: &'static str,
    modifier: Modifier,
    value: &str,
    value2: Option<&str>,
    parse: fn(&'static str, &str) -> Result<String, ValidationError>,
) -> Result<(String, Option<String>), ValidationError> {
    validate_comparison(field, modifier, value2.is_some())?;
    if modifier.is_null_check() {
        return Ok((String::new(), None));
    }
    let lower = parse(field, value)?;
    let upper = match value2 {
        Some(v) if modifier.is_range() => Some(parse(field, v)?),
        _ => None,
    };
    Ok((lower, upper))
}

impl Validate for DateCriterion {
    fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        parse_pair(
            field,
            self.modifier,
            &self.value,
            self.value2.as_deref(),
            parse_date,
        )
        .map(|_| ())
    }
}

impl Validate for TimestampCriterion {
    fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        parse_pair(
            field,
            self.modifier,
            &self.value,
            self.value2.as_deref(),
            parse_timestamp,
        )
        .map(|_| ())
    }
}

pub fn date_clause(
    field: &'static str,
    column: &str,
    criterion: &DateCriterion,
) -> Result<Clause, ValidationError> {
    let (lower, upper) = parse_pair(
        field,
        criterion.modifier,
        &criterion.value,
        criterion.value2.as_deref(),
        parse_date,
    )?;
    comparison_clause(
        field,
        column,
        criterion.modifier,
        lower.into(),
        upper.map(Value::from),
    )
}

pub fn timestamp_clause(
    field: &'static str,
    column: &str,
    criterion: &TimestampCriterion,
) -> Result<Clause, ValidationError> {
    let (lower, upper) = parse_pair(
        field,
        criterion.modifier,
        &criterion.value,
        criterion.value2.as_deref(),
        parse_timestamp,
    )?;
    comparison_clause(
        field,
        column,
        criterion.modifier,
        lower.into(),
        upper.map(Value::from),
    )
}

/// Plain boolean column match.
pub fn bool_clause(column: &str, value: bool) -> Clause {
    Clause::new(format!("{column} = ?"), vec![value.into()])
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// A set of enum names matched against a text column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumCriterion {
    #[serde(default)]
    pub value: Vec<String>,
    pub modifier: Modifier,
}

impl Validate for EnumCriterion {
    fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        match self.modifier {
            Modifier::Includes
            | Modifier::Excludes
            | Modifier::Equals
            | Modifier::NotEquals
            | Modifier::IsNull
            | Modifier::NotNull => Ok(()),
            other => Err(unsupported(field, other)),
        }
    }
}

pub fn enum_clause(
    field: &'static str,
    column: &str,
    criterion: &EnumCriterion,
) -> Result<Option<Clause>, ValidationError> {
    let values: Vec<Value> = criterion.value.iter().cloned().map(Value::from).collect();
    let list = super::clause::placeholders(values.len());
    let clause = match criterion.modifier {
        Modifier::IsNull => Clause::raw(format!("({column} IS NULL OR {column} = '')")),
        Modifier::NotNull => Clause::raw(format!("({column} IS NOT NULL AND {column} != '')")),
        _ if values.is_empty() => return Ok(None),
        Modifier::Includes | Modifier::Equals => {
            Clause::new(format!("{column} IN ({list})"), values)
        }
        Modifier::Excludes | Modifier::NotEquals => Clause::new(
            format!("({column} IS NULL OR {column} NOT IN ({list}))"),
            values,
        ),
        other => return Err(unsupported(field, other)),
    };
    Ok(Some(clause))
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// A set of related ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiCriterion {
    #[serde(default)]
    pub value: Vec<i64>,
    #[serde(default)]
    pub excludes: Vec<i64>,
    pub modifier: Modifier,
}

impl MultiCriterion {
    pub fn new(modifier: Modifier, value: Vec<i64>) -> Self {
        Self {
            value,
            excludes: Vec::new(),
            modifier,
        }
    }
}

fn validate_relationship(field: &'static str, modifier: Modifier) -> Result<(), ValidationError> {
    match modifier {
        Modifier::Includes
        | Modifier::IncludesAll
        | Modifier::Excludes
        | Modifier::Equals
        | Modifier::IsNull
        | Modifier::NotNull => Ok(()),
        other => Err(unsupported(field, other)),
    }
}

impl Validate for MultiCriterion {
    fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        validate_relationship(field, self.modifier)
    }
}

/// How far to follow a hierarchy when matching related ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// Only the ids given.
    None,
    /// Follow at most this many levels.
    Levels(u32),
    Unlimited,
}

impl Depth {
    pub fn from_input(depth: Option<i32>) -> Self {
        match depth {
            None | Some(0) => Self::None,
            Some(n) if n < 0 => Self::Unlimited,
            Some(n) => Self::Levels(n.unsigned_abs()),
        }
    }
}

/// Related ids expanded through a hierarchy before compilation: each entry
/// pairs a requested root with one id reachable from it (the root included).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    pub pairs: Vec<(i64, i64)>,
    pub excluded: Vec<i64>,
}

/// A relationship criterion whose ids may be expanded to their
/// descendants (or ancestors) in a hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchicalCriterion {
    #[serde(default)]
    pub value: Vec<i64>,
    #[serde(default)]
    pub excludes: Vec<i64>,
    pub modifier: Modifier,
    #[serde(default)]
    pub depth: Option<i32>,
    #[serde(skip)]
    pub expansion: Option<Expansion>,
}

impl HierarchicalCriterion {
    pub fn new(modifier: Modifier, value: Vec<i64>) -> Self {
        Self {
            value,
            excludes: Vec::new(),
            modifier,
            depth: None,
            expansion: None,
        }
    }

    pub fn with_depth(mut self, depth: i32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn depth(&self) -> Depth {
        Depth::from_input(self.depth)
    }
}

impl Validate for HierarchicalCriterion {
    fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        validate_relationship(field, self.modifier)?;
        if self.modifier == Modifier::Equals && self.depth() != Depth::None {
            return Err(unsupported(field, self.modifier));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Custom fields
// ---------------------------------------------------------------------------

/// A criterion over a free-form `field -> value` attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldCriterion {
    pub field: String,
    pub modifier: Modifier,
    #[serde(default)]
    pub value: Vec<serde_json::Value>,
}

impl CustomFieldCriterion {
    pub fn new(
        field: impl Into<String>,
        modifier: Modifier,
        value: Vec<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            modifier,
            value,
        }
    }

    /// Bound value for the `index`th entry.
    pub fn arg(&self, index: usize) -> Option<Value> {
        self.value.get(index).map(json_to_value)
    }
}

fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Bool(b) => Value::from(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::from(i),
            None => Value::from(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Value::from(s.clone()),
        other => Value::from(other.to_string()),
    }
}

impl Validate for CustomFieldCriterion {
    fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        let needed = match self.modifier {
            Modifier::IsNull | Modifier::NotNull => 0,
            Modifier::Between | Modifier::NotBetween => 2,
            Modifier::Equals
            | Modifier::NotEquals
            | Modifier::Includes
            | Modifier::Excludes
            | Modifier::GreaterThan
            | Modifier::LessThan
            | Modifier::MatchesRegex
            | Modifier::NotMatchesRegex => 1,
            other => return Err(unsupported(field, other)),
        };
        if self.value.len() < needed {
            return Err(if needed == 2 {
                ValidationError::MissingRangeValue {
                    field,
                    modifier: self.modifier,
                }
            } else {
                ValidationError::MissingValue {
                    field,
                    modifier: self.modifier,
                }
            });
        }
        if self.modifier.is_regex() {
            let pattern = self
                .value
                .first()
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            check_regex(field, pattern)?;
        }
        Ok(())
    }
}
