//! Scene model.

use serde::Serialize;

use crate::query::hydrate::Identified;

/// Scene record.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Scene {
    pub id: i64,
    pub title: Option<String>,
    pub code: Option<String>,
    pub details: Option<String>,
    pub director: Option<String>,
    pub date: Option<String>,
    pub rating: Option<i64>,
    pub organized: bool,
    /// Seconds.
    pub duration: Option<f64>,
    pub studio_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Identified for Scene {
    fn id(&self) -> i64 {
        self.id
    }
}
