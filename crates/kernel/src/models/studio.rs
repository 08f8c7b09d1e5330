//! Studio model.

use serde::Serialize;

use crate::query::hydrate::Identified;

/// Studio record.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Studio {
    pub id: i64,
    pub name: String,
    pub url: Option<String>,
    pub details: Option<String>,
    pub parent_id: Option<i64>,
    pub rating: Option<i64>,
    pub favorite: bool,
    pub ignore_auto_tag: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Identified for Studio {
    fn id(&self) -> i64 {
        self.id
    }
}
