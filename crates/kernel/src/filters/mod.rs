//! Filter definitions for each entity: criteria, relations, search columns
//! and sort allow-lists.

pub mod group;
pub mod performer;
pub mod scene;
pub mod scene_marker;
pub mod studio;
pub mod tag;

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

pub use group::{GroupCriteria, GroupFilter, Groups};
pub use performer::{PerformerCriteria, PerformerFilter, Performers};
pub use scene::{SceneCriteria, SceneFilter, Scenes};
pub use scene_marker::{SceneMarkerCriteria, SceneMarkerFilter, SceneMarkers};
pub use studio::{StudioCriteria, StudioFilter, Studios};
pub use tag::{TagCriteria, TagFilter, Tags};

/// Entity types that can be queried by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Studios,
    Tags,
    Performers,
    Scenes,
    Groups,
    SceneMarkers,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Studios,
        EntityKind::Tags,
        EntityKind::Performers,
        EntityKind::Scenes,
        EntityKind::Groups,
        EntityKind::SceneMarkers,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Studios => "studios",
            EntityKind::Tags => "tags",
            EntityKind::Performers => "performers",
            EntityKind::Scenes => "scenes",
            EntityKind::Groups => "groups",
            EntityKind::SceneMarkers => "scene-markers",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownEntity(s.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn entity_names_parse() {
        assert_eq!("scenes".parse::<EntityKind>().unwrap(), EntityKind::Scenes);
        assert_eq!(
            "scene_markers".parse::<EntityKind>().unwrap(),
            EntityKind::SceneMarkers
        );
        assert_eq!(
            "files".parse::<EntityKind>(),
            Err(ValidationError::UnknownEntity("files".to_string()))
        );
    }
}
