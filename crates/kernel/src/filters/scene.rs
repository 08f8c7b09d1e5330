//! Scene filters.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::Scene;
use crate::query::compiler::{Criteria, FilterNode, Level, check};
use crate::query::criterion::{
    DateCriterion, FloatCriterion, HierarchicalCriterion, IntCriterion, MultiCriterion,
    StringCriterion, TimestampCriterion,
};
use crate::query::entity::Entity;
use crate::query::hierarchy::{Direction, GROUP_HIERARCHY, STUDIO_HIERARCHY, TAG_HIERARCHY};
use crate::query::relation::{Relation, RelationSource};
use crate::query::sort::{SortKind, SortSpec};

static STUDIOS: Relation = Relation::new(
    "studios",
    &[RelationSource::ForeignKey {
        column: "studio_id",
    }],
)
.with_hierarchy(&STUDIO_HIERARCHY, Direction::Descendants);

static TAGS: Relation = Relation::new(
    "tags",
    &[RelationSource::JoinTable {
        table: "scenes_tags",
        owner_fk: "scene_id",
        related_fk: "tag_id",
    }],
)
.with_hierarchy(&TAG_HIERARCHY, Direction::Descendants);

static PERFORMERS: Relation = Relation::new(
    "performers",
    &[RelationSource::JoinTable {
        table: "performers_scenes",
        owner_fk: "scene_id",
        related_fk: "performer_id",
    }],
);

static GROUPS: Relation = Relation::new(
    "groups",
    &[RelationSource::JoinTable {
        table: "groups_scenes",
        owner_fk: "scene_id",
        related_fk: "group_id",
    }],
)
.with_hierarchy(&GROUP_HIERARCHY, Direction::Descendants);

static SORT: SortSpec = SortSpec {
    default: "title",
    keys: &[
        ("title", SortKind::Natural),
        ("id", SortKind::Column),
        ("date", SortKind::Column),
        ("rating", SortKind::Column),
        ("duration", SortKind::Column),
        ("created_at", SortKind::Column),
        ("updated_at", SortKind::Column),
        ("performers_count", SortKind::Count(&PERFORMERS)),
        ("tags_count", SortKind::Count(&TAGS)),
    ],
    tiebreak: &[("title", SortKind::Natural), ("id", SortKind::Column)],
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneCriteria {
    pub title: Option<StringCriterion>,
    pub code: Option<StringCriterion>,
    pub details: Option<StringCriterion>,
    pub director: Option<StringCriterion>,
    pub date: Option<DateCriterion>,
    pub rating: Option<IntCriterion>,
    pub organized: Option<bool>,
    pub duration: Option<FloatCriterion>,
    pub studios: Option<HierarchicalCriterion>,
    pub tags: Option<HierarchicalCriterion>,
    pub performers: Option<MultiCriterion>,
    pub groups: Option<HierarchicalCriterion>,
    pub performer_count: Option<IntCriterion>,
    pub tag_count: Option<IntCriterion>,
    pub created_at: Option<TimestampCriterion>,
    pub updated_at: Option<TimestampCriterion>,
}

impl Criteria for SceneCriteria {
    fn validate(&self) -> Result<(), ValidationError> {
        check("title", &self.title)?;
        check("code", &self.code)?;
        check("details", &self.details)?;
        check("director", &self.director)?;
        check("date", &self.date)?;
        check("rating", &self.rating)?;
        check("duration", &self.duration)?;
        check("studios", &self.studios)?;
        check("tags", &self.tags)?;
        check("performers", &self.performers)?;
        check("groups", &self.groups)?;
        check("performer_count", &self.performer_count)?;
        check("tag_count", &self.tag_count)?;
        check("created_at", &self.created_at)?;
        check("updated_at", &self.updated_at)
    }

    fn hierarchical_mut(&mut self) -> Vec<(&'static Relation, &mut HierarchicalCriterion)> {
        let mut found = Vec::new();
        if let Some(c) = self.studios.as_mut() {
            found.push((&STUDIOS, c));
        }
        if let Some(c) = self.tags.as_mut() {
            found.push((&TAGS, c));
        }
        if let Some(c) = self.groups.as_mut() {
            found.push((&GROUPS, c));
        }
        found
    }

    fn compile(&self, level: &mut Level<'_>) -> Result<(), ValidationError> {
        level.string("title", "title", &self.title)?;
        level.string("code", "code", &self.code)?;
        level.string("details", "details", &self.details)?;
        level.string("director", "director", &self.director)?;
        level.date("date", "date", &self.date)?;
        level.int("rating", "rating", &self.rating)?;
        level.flag("organized", self.organized);
        level.float("duration", "duration", &self.duration)?;
        level.hierarchical("studios", &STUDIOS, &self.studios)?;
        level.hierarchical("tags", &TAGS, &self.tags)?;
        level.multi("performers", &PERFORMERS, &self.performers)?;
        level.hierarchical("groups", &GROUPS, &self.groups)?;
        level.count("performer_count", &PERFORMERS, &self.performer_count)?;
        level.count("tag_count", &TAGS, &self.tag_count)?;
        level.timestamp("created_at", "created_at", &self.created_at)?;
        level.timestamp("updated_at", "updated_at", &self.updated_at)
    }
}

pub type SceneFilter = FilterNode<SceneCriteria>;

/// The `scenes` table.
pub struct Scenes;

impl Entity for Scenes {
    const NAME: &'static str = "scenes";
    const TABLE: &'static str = "scenes";

    type Criteria = SceneCriteria;
    type Row = Scene;

    fn sort_spec() -> &'static SortSpec {
        &SORT
    }

    fn search_columns() -> &'static [&'static str] {
        &["scenes.title", "scenes.code", "scenes.details"]
    }
}
