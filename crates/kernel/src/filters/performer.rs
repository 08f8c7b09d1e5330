//! Performer filters.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::Performer;
use crate::query::clause::{Clause, Join};
use crate::query::compiler::{CustomFields, Criteria, FilterNode, Level, StringList, check};
use crate::query::criterion::{
    CustomFieldCriterion, DateCriterion, EnumCriterion, HierarchicalCriterion, IntCriterion,
    MultiCriterion, StringCriterion, TimestampCriterion,
};
use crate::query::entity::Entity;
use crate::query::hierarchy::{Direction, STUDIO_HIERARCHY, TAG_HIERARCHY};
use crate::query::relation::{Relation, RelationSource};
use crate::query::sort::{SortKind, SortSpec};

static TAGS: Relation = Relation::new(
    "tags",
    &[RelationSource::JoinTable {
        table: "performers_tags",
        owner_fk: "performer_id",
        related_fk: "tag_id",
    }],
)
.with_hierarchy(&TAG_HIERARCHY, Direction::Descendants);

static SCENES: Relation = Relation::new(
    "scenes",
    &[RelationSource::JoinTable {
        table: "performers_scenes",
        owner_fk: "performer_id",
        related_fk: "scene_id",
    }],
);

/// Studios of the scenes a performer appears in.
static STUDIOS: Relation = Relation::new(
    "studios",
    &[RelationSource::Through {
        link_table: "performers_scenes",
        owner_fk: "performer_id",
        link_fk: "scene_id",
        target_table: "scenes",
        target_fk: "id",
        related_column: "studio_id",
    }],
)
.with_hierarchy(&STUDIO_HIERARCHY, Direction::Descendants);

/// Performers sharing a scene.
static COSTARS: Relation = Relation::new(
    "performers",
    &[RelationSource::Through {
        link_table: "performers_scenes",
        owner_fk: "performer_id",
        link_fk: "scene_id",
        target_table: "performers_scenes",
        target_fk: "scene_id",
        related_column: "performer_id",
    }],
);

const ALIASES: StringList = StringList {
    table: "performer_aliases",
    owner_fk: "performer_id",
    column: "alias",
};

const CUSTOM_FIELDS: CustomFields = CustomFields {
    table: "performer_custom_fields",
    owner_fk: "performer_id",
};

static SORT: SortSpec = SortSpec {
    default: "name",
    keys: &[
        ("name", SortKind::Natural),
        ("id", SortKind::Column),
        ("birthdate", SortKind::Column),
        ("height", SortKind::Column),
        ("weight", SortKind::Column),
        ("rating", SortKind::Column),
        ("created_at", SortKind::Column),
        ("updated_at", SortKind::Column),
        ("scenes_count", SortKind::Count(&SCENES)),
        ("tags_count", SortKind::Count(&TAGS)),
    ],
    tiebreak: &[("name", SortKind::Natural), ("id", SortKind::Column)],
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformerCriteria {
    pub name: Option<StringCriterion>,
    pub disambiguation: Option<StringCriterion>,
    pub details: Option<StringCriterion>,
    pub gender: Option<EnumCriterion>,
    pub country: Option<StringCriterion>,
    pub height_cm: Option<IntCriterion>,
    pub weight: Option<IntCriterion>,
    pub rating: Option<IntCriterion>,
    pub favorite: Option<bool>,
    pub birthdate: Option<DateCriterion>,
    pub death_date: Option<DateCriterion>,
    pub aliases: Option<StringCriterion>,
    pub tags: Option<HierarchicalCriterion>,
    pub studios: Option<HierarchicalCriterion>,
    pub performers: Option<MultiCriterion>,
    pub tag_count: Option<IntCriterion>,
    pub scene_count: Option<IntCriterion>,
    pub custom_fields: Vec<CustomFieldCriterion>,
    pub created_at: Option<TimestampCriterion>,
    pub updated_at: Option<TimestampCriterion>,
}

impl Criteria for PerformerCriteria {
    fn validate(&self) -> Result<(), ValidationError> {
        check("name", &self.name)?;
        check("disambiguation", &self.disambiguation)?;
        check("details", &self.details)?;
        check("gender", &self.gender)?;
        check("country", &self.country)?;
        check("height_cm", &self.height_cm)?;
        check("weight", &self.weight)?;
        check("rating", &self.rating)?;
        check("birthdate", &self.birthdate)?;
        check("death_date", &self.death_date)?;
        check("aliases", &self.aliases)?;
        check("tags", &self.tags)?;
        check("studios", &self.studios)?;
        check("performers", &self.performers)?;
        check("tag_count", &self.tag_count)?;
        check("scene_count", &self.scene_count)?;
        check("custom_fields", &self.custom_fields)?;
        check("created_at", &self.created_at)?;
        check("updated_at", &self.updated_at)
    }

    fn hierarchical_mut(&mut self) -> Vec<(&'static Relation, &mut HierarchicalCriterion)> {
        let mut found = Vec::new();
        if let Some(c) = self.tags.as_mut() {
            found.push((&TAGS, c));
        }
        if let Some(c) = self.studios.as_mut() {
            found.push((&STUDIOS, c));
        }
        found
    }

    fn compile(&self, level: &mut Level<'_>) -> Result<(), ValidationError> {
        level.string("name", "name", &self.name)?;
        level.string("disambiguation", "disambiguation", &self.disambiguation)?;
        level.string("details", "details", &self.details)?;
        level.enumeration("gender", "gender", &self.gender)?;
        level.string("country", "country", &self.country)?;
        level.int("height_cm", "height", &self.height_cm)?;
        level.int("weight", "weight", &self.weight)?;
        level.int("rating", "rating", &self.rating)?;
        level.flag("favorite", self.favorite);
        level.date("birthdate", "birthdate", &self.birthdate)?;
        level.date("death_date", "death_date", &self.death_date)?;
        level.string_list("aliases", ALIASES, &self.aliases)?;
        level.hierarchical("tags", &TAGS, &self.tags)?;
        level.hierarchical("studios", &STUDIOS, &self.studios)?;
        level.multi("performers", &COSTARS, &self.performers)?;
        level.count("tag_count", &TAGS, &self.tag_count)?;
        level.count("scene_count", &SCENES, &self.scene_count)?;
        level.custom_fields("custom_fields", CUSTOM_FIELDS, &self.custom_fields)?;
        level.timestamp("created_at", "created_at", &self.created_at)?;
        level.timestamp("updated_at", "updated_at", &self.updated_at)
    }
}

pub type PerformerFilter = FilterNode<PerformerCriteria>;

/// The `performers` table.
pub struct Performers;

impl Entity for Performers {
    const NAME: &'static str = "performers";
    const TABLE: &'static str = "performers";

    type Criteria = PerformerCriteria;
    type Row = Performer;

    fn sort_spec() -> &'static SortSpec {
        &SORT
    }

    fn search_columns() -> &'static [&'static str] {
        &[
            "performers.name",
            "performers.disambiguation",
            "performer_aliases.alias",
        ]
    }

    fn search_joins() -> Vec<Join> {
        vec![Join::table(
            "performer_aliases",
            "performer_aliases",
            Clause::raw("performer_aliases.performer_id = performers.id"),
        )]
    }
}
