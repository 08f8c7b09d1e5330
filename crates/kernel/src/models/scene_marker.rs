//! Scene marker model.

use serde::Serialize;

use crate::query::hydrate::Identified;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SceneMarker {
    pub id: i64,
    pub title: String,
    pub seconds: f64,
    pub primary_tag_id: i64,
    pub scene_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Identified for SceneMarker {
    fn id(&self) -> i64 {
        self.id
    }
}
