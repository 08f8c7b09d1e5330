//! Query error types.

use thiserror::Error;

use crate::query::criterion::Modifier;

/// Problems with a filter, sort or page request.
///
/// Always raised before any statement reaches the database.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("ambiguous boolean operator: only one of and/or/not may be set")]
    AmbiguousOperator,

    #[error("invalid sort: {0}")]
    InvalidSort(String),

    #[error("{field}: modifier {modifier} requires a second value")]
    MissingRangeValue {
        field: &'static str,
        modifier: Modifier,
    },

    #[error("{field}: modifier {modifier} requires a value")]
    MissingValue {
        field: &'static str,
        modifier: Modifier,
    },

    #[error("{field}: invalid regular expression {pattern:?}: {reason}")]
    InvalidRegex {
        field: &'static str,
        pattern: String,
        reason: String,
    },

    #[error("{field}: modifier {modifier} is not supported")]
    UnsupportedModifier {
        field: &'static str,
        modifier: Modifier,
    },

    #[error("{field}: invalid date {value:?}")]
    InvalidDate { field: &'static str, value: String },

    #[error("unknown entity type: {0}")]
    UnknownEntity(String),
}

/// Errors returned by find, count and query operations.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{context}")]
    Execution {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("query cancelled")]
    Cancelled,
}

impl QueryError {
    /// Wrap a storage failure with the operation that produced it.
    pub fn execution(context: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Execution { context, source }
    }
}

/// Result type alias using QueryError.
pub type QueryResult<T> = Result<T, QueryError>;
