//! Group filters.
//!
//! Groups nest through `groups_relations`: a `containing_groups` criterion
//! with a depth also matches groups nested further down, and `sub_groups`
//! matches groups further up.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::Group;
use crate::query::compiler::{Criteria, FilterNode, Level, check};
use crate::query::criterion::{
    DateCriterion, HierarchicalCriterion, IntCriterion, MultiCriterion, StringCriterion,
    TimestampCriterion,
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
        table: "groups_tags",
        owner_fk: "group_id",
        related_fk: "tag_id",
    }],
)
.with_hierarchy(&TAG_HIERARCHY, Direction::Descendants);

static SCENES: Relation = Relation::new(
    "scenes",
    &[RelationSource::JoinTable {
        table: "groups_scenes",
        owner_fk: "group_id",
        related_fk: "scene_id",
    }],
);

/// Performers in any of the group's scenes.
static PERFORMERS: Relation = Relation::new(
    "performers",
    &[RelationSource::Through {
        link_table: "groups_scenes",
        owner_fk: "group_id",
        link_fk: "scene_id",
        target_table: "performers_scenes",
        target_fk: "scene_id",
        related_column: "performer_id",
    }],
);

static CONTAINING: Relation = Relation::new(
    "containing_groups",
    &[RelationSource::JoinTable {
        table: "groups_relations",
        owner_fk: "sub_id",
        related_fk: "containing_id",
    }],
)
.with_hierarchy(&GROUP_HIERARCHY, Direction::Descendants);

static SUB_GROUPS: Relation = Relation::new(
    "sub_groups",
    &[RelationSource::JoinTable {
        table: "groups_relations",
        owner_fk: "containing_id",
        related_fk: "sub_id",
    }],
)
.with_hierarchy(&GROUP_HIERARCHY, Direction::Ancestors);

static SORT: SortSpec = SortSpec {
    default: "name",
    keys: &[
        ("name", SortKind::Natural),
        ("id", SortKind::Column),
        ("date", SortKind::Column),
        ("rating", SortKind::Column),
        ("duration", SortKind::Column),
        ("created_at", SortKind::Column),
        ("updated_at", SortKind::Column),
        ("scenes_count", SortKind::Count(&SCENES)),
        ("tags_count", SortKind::Count(&TAGS)),
        ("sub_groups_count", SortKind::Count(&SUB_GROUPS)),
    ],
    tiebreak: &[("name", SortKind::Natural), ("id", SortKind::Column)],
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupCriteria {
    pub name: Option<StringCriterion>,
    pub director: Option<StringCriterion>,
    pub synopsis: Option<StringCriterion>,
    pub rating: Option<IntCriterion>,
    pub duration: Option<IntCriterion>,
    pub date: Option<DateCriterion>,
    pub studios: Option<HierarchicalCriterion>,
    pub tags: Option<HierarchicalCriterion>,
    pub performers: Option<MultiCriterion>,
    pub containing_groups: Option<HierarchicalCriterion>,
    pub sub_groups: Option<HierarchicalCriterion>,
    pub containing_group_count: Option<IntCriterion>,
    pub sub_group_count: Option<IntCriterion>,
    pub scene_count: Option<IntCriterion>,
    pub tag_count: Option<IntCriterion>,
    pub created_at: Option<TimestampCriterion>,
    pub updated_at: Option<TimestampCriterion>,
}

impl Criteria for GroupCriteria {
    fn validate(&self) -> Result<(), ValidationError> {
        check("name", &self.name)?;
        check("director", &self.director)?;
        check("synopsis", &self.synopsis)?;
        check("rating", &self.rating)?;
        check("duration", &self.duration)?;
        check("date", &self.date)?;
        check("studios", &self.studios)?;
        check("tags", &self.tags)?;
        check("performers", &self.performers)?;
        check("containing_groups", &self.containing_groups)?;
        check("sub_groups", &self.sub_groups)?;
        check("containing_group_count", &self.containing_group_count)?;
        check("sub_group_count", &self.sub_group_count)?;
        check("scene_count", &self.scene_count)?;
        check("tag_count", &self.tag_count)?;
        check("created_at", &self.created_at)?;
        check("updated_at", &self.updated_at)
    }

    fn hierarchical_mut(&mut self) -> Vec<(&'static Relation, &mut HierarchicalCriterion)> {
        [
            (&STUDIOS, self.studios.as_mut()),
            (&TAGS, self.tags.as_mut()),
            (&CONTAINING, self.containing_groups.as_mut()),
            (&SUB_GROUPS, self.sub_groups.as_mut()),
        ]
        .into_iter()
        .filter_map(|(relation, c)| c.map(|c| (relation, c)))
        .collect()
    }

    fn compile(&self, level: &mut Level<'_>) -> Result<(), ValidationError> {
        level.string("name", "name", &self.name)?;
        level.string("director", "director", &self.director)?;
        level.string("synopsis", "description", &self.synopsis)?;
        level.int("rating", "rating", &self.rating)?;
        level.int("duration", "duration", &self.duration)?;
        level.date("date", "date", &self.date)?;
        level.hierarchical("studios", &STUDIOS, &self.studios)?;
        level.hierarchical("tags", &TAGS, &self.tags)?;
        level.multi("performers", &PERFORMERS, &self.performers)?;
        level.hierarchical("containing_groups", &CONTAINING, &self.containing_groups)?;
        level.hierarchical("sub_groups", &SUB_GROUPS, &self.sub_groups)?;
        level.count("containing_group_count", &CONTAINING, &self.containing_group_count)?;
        level.count("sub_group_count", &SUB_GROUPS, &self.sub_group_count)?;
        level.count("scene_count", &SCENES, &self.scene_count)?;
        level.count("tag_count", &TAGS, &self.tag_count)?;
        level.timestamp("created_at", "created_at", &self.created_at)?;
        level.timestamp("updated_at", "updated_at", &self.updated_at)
    }
}

pub type GroupFilter = FilterNode<GroupCriteria>;

/// The `groups` table.
pub struct Groups;

impl Entity for Groups {
    const NAME: &'static str = "groups";
    const TABLE: &'static str = "groups";

    type Criteria = GroupCriteria;
    type Row = Group;

    fn sort_spec() -> &'static SortSpec {
        &SORT
    }

    fn search_columns() -> &'static [&'static str] {
        &["groups.name", "groups.aliases", "groups.director"]
    }
}
