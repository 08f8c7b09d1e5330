//! Performer model.

use serde::Serialize;

use crate::query::hydrate::Identified;

/// Performer record. Dates are stored as `YYYY-MM-DD` text.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Performer {
    pub id: i64,
    pub name: String,
    pub disambiguation: Option<String>,
    pub details: Option<String>,
    pub gender: Option<String>,
    pub country: Option<String>,
    pub birthdate: Option<String>,
    pub death_date: Option<String>,
    pub height: Option<i64>,
    pub weight: Option<i64>,
    pub rating: Option<i64>,
    pub favorite: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Identified for Performer {
    fn id(&self) -> i64 {
        self.id
    }
}
