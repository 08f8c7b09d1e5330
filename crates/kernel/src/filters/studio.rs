//! Studio filters.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::Studio;
use crate::query::clause::{Clause, Join};
use crate::query::compiler::{Criteria, FilterNode, Level, StringList, check};
use crate::query::criterion::{
    HierarchicalCriterion, IntCriterion, MultiCriterion, StringCriterion, TimestampCriterion,
};
use crate::query::entity::Entity;
use crate::query::hierarchy::{Direction, TAG_HIERARCHY};
use crate::query::relation::{Relation, RelationSource};
use crate::query::sort::{SortKind, SortSpec};

static PARENTS: Relation = Relation::new(
    "parents",
    &[RelationSource::ForeignKey {
        column: "parent_id",
    }],
);

static CHILDREN: Relation = Relation::new(
    "children",
    &[RelationSource::JoinTable {
        table: "studios",
        owner_fk: "parent_id",
        related_fk: "id",
    }],
);

static TAGS: Relation = Relation::new(
    "tags",
    &[RelationSource::JoinTable {
        table: "studios_tags",
        owner_fk: "studio_id",
        related_fk: "tag_id",
    }],
)
.with_hierarchy(&TAG_HIERARCHY, Direction::Descendants);

static SCENES: Relation = Relation::new(
    "scenes",
    &[RelationSource::JoinTable {
        table: "scenes",
        owner_fk: "studio_id",
        related_fk: "id",
    }],
);

const ALIASES: StringList = StringList {
    table: "studio_aliases",
    owner_fk: "studio_id",
    column: "alias",
};

static SORT: SortSpec = SortSpec {
    default: "name",
    keys: &[
        ("name", SortKind::Natural),
        ("id", SortKind::Column),
        ("rating", SortKind::Column),
        ("created_at", SortKind::Column),
        ("updated_at", SortKind::Column),
        ("scenes_count", SortKind::Count(&SCENES)),
        ("children_count", SortKind::Count(&CHILDREN)),
        ("tags_count", SortKind::Count(&TAGS)),
    ],
    tiebreak: &[("name", SortKind::Natural), ("id", SortKind::Column)],
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioCriteria {
    pub name: Option<StringCriterion>,
    pub details: Option<StringCriterion>,
    pub url: Option<StringCriterion>,
    pub aliases: Option<StringCriterion>,
    pub favorite: Option<bool>,
    pub ignore_auto_tag: Option<bool>,
    pub rating: Option<IntCriterion>,
    pub parents: Option<MultiCriterion>,
    pub tags: Option<HierarchicalCriterion>,
    pub scene_count: Option<IntCriterion>,
    pub child_count: Option<IntCriterion>,
    pub tag_count: Option<IntCriterion>,
    pub created_at: Option<TimestampCriterion>,
    pub updated_at: Option<TimestampCriterion>,
}

impl Criteria for StudioCriteria {
    fn validate(&self) -> Result<(), ValidationError> {
        check("name", &self.name)?;
        check("details", &self.details)?;
        check("url", &self.url)?;
        check("aliases", &self.aliases)?;
        check("rating", &self.rating)?;
        check("parents", &self.parents)?;
        check("tags", &self.tags)?;
        check("scene_count", &self.scene_count)?;
        check("child_count", &self.child_count)?;
        check("tag_count", &self.tag_count)?;
        check("created_at", &self.created_at)?;
        check("updated_at", &self.updated_at)
    }

    fn hierarchical_mut(&mut self) -> Vec<(&'static Relation, &mut HierarchicalCriterion)> {
        self.tags.as_mut().map(|c| (&TAGS, c)).into_iter().collect()
    }

    fn compile(&self, level: &mut Level<'_>) -> Result<(), ValidationError> {
        level.string("name", "name", &self.name)?;
        level.string("details", "details", &self.details)?;
        level.string("url", "url", &self.url)?;
        level.string_list("aliases", ALIASES, &self.aliases)?;
        level.flag("favorite", self.favorite);
        level.flag("ignore_auto_tag", self.ignore_auto_tag);
        level.int("rating", "rating", &self.rating)?;
        level.multi("parents", &PARENTS, &self.parents)?;
        level.hierarchical("tags", &TAGS, &self.tags)?;
        level.count("scene_count", &SCENES, &self.scene_count)?;
        level.count("child_count", &CHILDREN, &self.child_count)?;
        level.count("tag_count", &TAGS, &self.tag_count)?;
        level.timestamp("created_at", "created_at", &self.created_at)?;
        level.timestamp("updated_at", "updated_at", &self.updated_at)
    }
}

pub type StudioFilter = FilterNode<StudioCriteria>;

/// The `studios` table.
pub struct Studios;

impl Entity for Studios {
    const NAME: &'static str = "studios";
    const TABLE: &'static str = "studios";

    type Criteria = StudioCriteria;
    type Row = Studio;

    fn sort_spec() -> &'static SortSpec {
        &SORT
    }

    fn search_columns() -> &'static [&'static str] {
        &["studios.name", "studio_aliases.alias"]
    }

    fn search_joins() -> Vec<Join> {
        vec![Join::table(
            "studio_aliases",
            "studio_aliases",
            Clause::raw("studio_aliases.studio_id = studios.id"),
        )]
    }
}
