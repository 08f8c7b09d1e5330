//! Group model.

use serde::Serialize;

use crate::query::hydrate::Identified;

/// Group record.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub aliases: Option<String>,
    pub director: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub rating: Option<i64>,
    pub duration: Option<i64>,
    pub studio_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Identified for Group {
    fn id(&self) -> i64 {
        self.id
    }
}
