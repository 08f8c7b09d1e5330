//! Scene marker filters.
//!
//! A marker's tags are its primary tag plus the rows of
//! `scene_markers_tags`. Scene-level criteria go through the marker's
//! `scene_id`.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::SceneMarker;
use crate::query::clause::{Clause, Join};
use crate::query::compiler::{Criteria, FilterNode, Level, check};
use crate::query::criterion::{
    DateCriterion, FloatCriterion, HierarchicalCriterion, MultiCriterion, StringCriterion,
    TimestampCriterion,
};
use crate::query::entity::Entity;
use crate::query::hierarchy::{Direction, TAG_HIERARCHY};
use crate::query::relation::{Relation, RelationSource};
use crate::query::sort::{SortKind, SortSpec};

static TAGS: Relation = Relation::new(
    "tags",
    &[
        RelationSource::ForeignKey {
            column: "primary_tag_id",
        },
        RelationSource::JoinTable {
            table: "scene_markers_tags",
            owner_fk: "scene_marker_id",
            related_fk: "tag_id",
        },
    ],
)
.with_hierarchy(&TAG_HIERARCHY, Direction::Descendants);

static SCENE_TAGS: Relation = Relation::new(
    "scene_tags",
    &[RelationSource::JoinTable {
        table: "scenes_tags",
        owner_fk: "scene_id",
        related_fk: "tag_id",
    }],
)
.owned_by("scene_id")
.with_hierarchy(&TAG_HIERARCHY, Direction::Descendants);

static PERFORMERS: Relation = Relation::new(
    "performers",
    &[RelationSource::JoinTable {
        table: "performers_scenes",
        owner_fk: "scene_id",
        related_fk: "performer_id",
    }],
)
.owned_by("scene_id");

static SCENES: Relation = Relation::new(
    "scenes",
    &[RelationSource::ForeignKey {
        column: "scene_id",
    }],
);

const SCENE_DATE: &str = "(SELECT s.date FROM scenes AS s WHERE s.id = scene_markers.scene_id)";
const SCENE_CREATED_AT: &str =
    "(SELECT s.created_at FROM scenes AS s WHERE s.id = scene_markers.scene_id)";

static SORT: SortSpec = SortSpec {
    default: "title",
    keys: &[
        ("title", SortKind::Natural),
        ("id", SortKind::Column),
        ("seconds", SortKind::Column),
        ("scene_id", SortKind::Column),
        ("created_at", SortKind::Column),
        ("updated_at", SortKind::Column),
    ],
    tiebreak: &[
        ("scene_id", SortKind::Column),
        ("seconds", SortKind::Column),
        ("id", SortKind::Column),
    ],
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneMarkerCriteria {
    pub title: Option<StringCriterion>,
    pub seconds: Option<FloatCriterion>,
    pub tags: Option<HierarchicalCriterion>,
    pub scene_tags: Option<HierarchicalCriterion>,
    pub performers: Option<MultiCriterion>,
    pub scenes: Option<MultiCriterion>,
    pub scene_date: Option<DateCriterion>,
    pub scene_created_at: Option<TimestampCriterion>,
    pub created_at: Option<TimestampCriterion>,
    pub updated_at: Option<TimestampCriterion>,
}

impl Criteria for SceneMarkerCriteria {
    fn validate(&self) -> Result<(), ValidationError> {
        check("title", &self.title)?;
        check("seconds", &self.seconds)?;
        check("tags", &self.tags)?;
        check("scene_tags", &self.scene_tags)?;
        check("performers", &self.performers)?;
        check("scenes", &self.scenes)?;
        check("scene_date", &self.scene_date)?;
        check("scene_created_at", &self.scene_created_at)?;
        check("created_at", &self.created_at)?;
        check("updated_at", &self.updated_at)
    }

    fn hierarchical_mut(&mut self) -> Vec<(&'static Relation, &mut HierarchicalCriterion)> {
        let mut found = Vec::new();
        if let Some(c) = self.tags.as_mut() {
            found.push((&TAGS, c));
        }
        if let Some(c) = self.scene_tags.as_mut() {
            found.push((&SCENE_TAGS, c));
        }
        found
    }

    fn compile(&self, level: &mut Level<'_>) -> Result<(), ValidationError> {
        level.string("title", "title", &self.title)?;
        level.float("seconds", "seconds", &self.seconds)?;
        level.hierarchical("tags", &TAGS, &self.tags)?;
        level.hierarchical("scene_tags", &SCENE_TAGS, &self.scene_tags)?;
        level.multi("performers", &PERFORMERS, &self.performers)?;
        level.multi("scenes", &SCENES, &self.scenes)?;
        level.date_expr("scene_date", SCENE_DATE, &self.scene_date)?;
        level.timestamp_expr("scene_created_at", SCENE_CREATED_AT, &self.scene_created_at)?;
        level.timestamp("created_at", "created_at", &self.created_at)?;
        level.timestamp("updated_at", "updated_at", &self.updated_at)
    }
}

pub type SceneMarkerFilter = FilterNode<SceneMarkerCriteria>;

/// The `scene_markers` table.
pub struct SceneMarkers;

impl Entity for SceneMarkers {
    const NAME: &'static str = "scene markers";
    const TABLE: &'static str = "scene_markers";

    type Criteria = SceneMarkerCriteria;
    type Row = SceneMarker;

    fn sort_spec() -> &'static SortSpec {
        &SORT
    }

    fn search_columns() -> &'static [&'static str] {
        &["scene_markers.title", "marker_scene.title"]
    }

    fn search_joins() -> Vec<Join> {
        vec![
            Join::table(
                "scenes",
                "marker_scene",
                Clause::raw("marker_scene.id = scene_markers.scene_id"),
            )
            .single(),
        ]
    }
}
