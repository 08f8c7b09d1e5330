//! Tag model.

use serde::Serialize;

use crate::query::hydrate::Identified;

/// Tag record.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub favorite: bool,
    pub ignore_auto_tag: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Identified for Tag {
    fn id(&self) -> i64 {
        self.id
    }
}
