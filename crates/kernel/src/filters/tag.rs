//! Tag filters.
//!
//! Tags form a DAG through `tags_relations`. A `parents` criterion with a
//! depth matches tags below the given ones; `children` matches tags above.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::Tag;
use crate::query::clause::{Clause, Join};
use crate::query::compiler::{Criteria, FilterNode, Level, StringList, check};
use crate::query::criterion::{
    HierarchicalCriterion, IntCriterion, StringCriterion, TimestampCriterion,
};
use crate::query::entity::Entity;
use crate::query::hierarchy::{Direction, TAG_HIERARCHY};
use crate::query::relation::{Relation, RelationSource};
use crate::query::sort::{SortKind, SortSpec};

static PARENTS: Relation = Relation::new(
    "parents",
    &[RelationSource::JoinTable {
        table: "tags_relations",
        owner_fk: "child_id",
        related_fk: "parent_id",
    }],
)
.with_hierarchy(&TAG_HIERARCHY, Direction::Descendants);

static CHILDREN: Relation = Relation::new(
    "children",
    &[RelationSource::JoinTable {
        table: "tags_relations",
        owner_fk: "parent_id",
        related_fk: "child_id",
    }],
)
.with_hierarchy(&TAG_HIERARCHY, Direction::Ancestors);

static SCENES: Relation = Relation::new(
    "scenes",
    &[RelationSource::JoinTable {
        table: "scenes_tags",
        owner_fk: "tag_id",
        related_fk: "scene_id",
    }],
);

static PERFORMERS: Relation = Relation::new(
    "performers",
    &[RelationSource::JoinTable {
        table: "performers_tags",
        owner_fk: "tag_id",
        related_fk: "performer_id",
    }],
);

static MARKERS: Relation = Relation::new(
    "markers",
    &[
        RelationSource::JoinTable {
            table: "scene_markers",
            owner_fk: "primary_tag_id",
            related_fk: "id",
        },
        RelationSource::JoinTable {
            table: "scene_markers_tags",
            owner_fk: "tag_id",
            related_fk: "scene_marker_id",
        },
    ],
);

const ALIASES: StringList = StringList {
    table: "tag_aliases",
    owner_fk: "tag_id",
    column: "alias",
};

static SORT: SortSpec = SortSpec {
    default: "name",
    keys: &[
        ("name", SortKind::Natural),
        ("id", SortKind::Column),
        ("created_at", SortKind::Column),
        ("updated_at", SortKind::Column),
        ("scenes_count", SortKind::Count(&SCENES)),
        ("performers_count", SortKind::Count(&PERFORMERS)),
        ("scene_markers_count", SortKind::Count(&MARKERS)),
    ],
    tiebreak: &[("name", SortKind::Natural), ("id", SortKind::Column)],
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagCriteria {
    pub name: Option<StringCriterion>,
    pub description: Option<StringCriterion>,
    pub aliases: Option<StringCriterion>,
    pub favorite: Option<bool>,
    pub ignore_auto_tag: Option<bool>,
    pub parents: Option<HierarchicalCriterion>,
    pub children: Option<HierarchicalCriterion>,
    pub parent_count: Option<IntCriterion>,
    pub child_count: Option<IntCriterion>,
    pub scene_count: Option<IntCriterion>,
    pub performer_count: Option<IntCriterion>,
    pub marker_count: Option<IntCriterion>,
    pub created_at: Option<TimestampCriterion>,
    pub updated_at: Option<TimestampCriterion>,
}

impl Criteria for TagCriteria {
    fn validate(&self) -> Result<(), ValidationError> {
        check("name", &self.name)?;
        check("description", &self.description)?;
        check("aliases", &self.aliases)?;
        check("parents", &self.parents)?;
        check("children", &self.children)?;
        check("parent_count", &self.parent_count)?;
        check("child_count", &self.child_count)?;
        check("scene_count", &self.scene_count)?;
        check("performer_count", &self.performer_count)?;
        check("marker_count", &self.marker_count)?;
        check("created_at", &self.created_at)?;
        check("updated_at", &self.updated_at)
    }

    fn hierarchical_mut(&mut self) -> Vec<(&'static Relation, &mut HierarchicalCriterion)> {
        let mut found = Vec::new();
        if let Some(c) = self.parents.as_mut() {
            found.push((&PARENTS, c));
        }
        if let Some(c) = self.children.as_mut() {
            found.push((&CHILDREN, c));
        }
        found
    }

    fn compile(&self, level: &mut Level<'_>) -> Result<(), ValidationError> {
        level.string("name", "name", &self.name)?;
        level.string("description", "description", &self.description)?;
        level.string_list("aliases", ALIASES, &self.aliases)?;
        level.flag("favorite", self.favorite);
        level.flag("ignore_auto_tag", self.ignore_auto_tag);
        level.hierarchical("parents", &PARENTS, &self.parents)?;
        level.hierarchical("children", &CHILDREN, &self.children)?;
        level.count("parent_count", &PARENTS, &self.parent_count)?;
        level.count("child_count", &CHILDREN, &self.child_count)?;
        level.count("scene_count", &SCENES, &self.scene_count)?;
        level.count("performer_count", &PERFORMERS, &self.performer_count)?;
        level.count("marker_count", &MARKERS, &self.marker_count)?;
        level.timestamp("created_at", "created_at", &self.created_at)?;
        level.timestamp("updated_at", "updated_at", &self.updated_at)
    }
}

pub type TagFilter = FilterNode<TagCriteria>;

/// The `tags` table.
pub struct Tags;

impl Entity for Tags {
    const NAME: &'static str = "tags";
    const TABLE: &'static str = "tags";

    type Criteria = TagCriteria;
    type Row = Tag;

    fn sort_spec() -> &'static SortSpec {
        &SORT
    }

    fn search_columns() -> &'static [&'static str] {
        &["tags.name", "tag_aliases.alias"]
    }

    fn search_joins() -> Vec<Join> {
        vec![Join::table(
            "tag_aliases",
            "tag_aliases",
            Clause::raw("tag_aliases.tag_id = tags.id"),
        )]
    }
}
