//! Marquee test utilities.
//!
//! Fixture builders that insert library rows (and their link rows) into a
//! database that already carries the kernel schema, plus a few assertion
//! helpers for rendered SQL and JSON output.

use serde_json::Value as JsonValue;
use sqlx::SqlitePool;

type Result<T> = std::result::Result<T, sqlx::Error>;

async fn link(pool: &SqlitePool, sql: &str, a: i64, b: i64) -> Result<()> {
    sqlx::query(sql).bind(a).bind(b).execute(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Create a tag builder.
pub fn test_tag(name: &str) -> TestTag {
    TestTag {
        name: name.to_string(),
        description: None,
        favorite: false,
        parents: Vec::new(),
        aliases: Vec::new(),
    }
}

#[derive(Debug, Clone)]
pub struct TestTag {
    pub name: String,
    pub description: Option<String>,
    pub favorite: bool,
    pub parents: Vec<i64>,
    pub aliases: Vec<String>,
}

impl TestTag {
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn favorite(mut self) -> Self {
        self.favorite = true;
        self
    }

    /// Make this tag a child of `parent`.
    pub fn with_parent(mut self, parent: i64) -> Self {
        self.parents.push(parent);
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub async fn insert(&self, pool: &SqlitePool) -> Result<i64> {
        let id = sqlx::query("INSERT INTO tags (name, description, favorite) VALUES (?, ?, ?)")
            .bind(&self.name)
            .bind(&self.description)
            .bind(self.favorite)
            .execute(pool)
            .await?
            .last_insert_rowid();
        for parent in &self.parents {
            link_tags(pool, *parent, id).await?;
        }
        for alias in &self.aliases {
            sqlx::query("INSERT INTO tag_aliases (tag_id, alias) VALUES (?, ?)")
                .bind(id)
                .bind(alias)
                .execute(pool)
                .await?;
        }
        Ok(id)
    }
}

/// Add a parent/child edge to the tag hierarchy.
pub async fn link_tags(pool: &SqlitePool, parent: i64, child: i64) -> Result<()> {
    link(
        pool,
        "INSERT INTO tags_relations (parent_id, child_id) VALUES (?, ?)",
        parent,
        child,
    )
    .await
}

// ---------------------------------------------------------------------------
// Studios
// ---------------------------------------------------------------------------

/// Create a studio builder.
pub fn test_studio(name: &str) -> TestStudio {
    TestStudio {
        name: name.to_string(),
        parent: None,
        rating: None,
        tags: Vec::new(),
        aliases: Vec::new(),
    }
}

#[derive(Debug, Clone)]
pub struct TestStudio {
    pub name: String,
    pub parent: Option<i64>,
    pub rating: Option<i64>,
    pub tags: Vec<i64>,
    pub aliases: Vec<String>,
}

impl TestStudio {
    pub fn with_parent(mut self, parent: i64) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_rating(mut self, rating: i64) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_tags(mut self, tags: &[i64]) -> Self {
        self.tags.extend_from_slice(tags);
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub async fn insert(&self, pool: &SqlitePool) -> Result<i64> {
        let id = sqlx::query("INSERT INTO studios (name, parent_id, rating) VALUES (?, ?, ?)")
            .bind(&self.name)
            .bind(self.parent)
            .bind(self.rating)
            .execute(pool)
            .await?
            .last_insert_rowid();
        for tag in &self.tags {
            link(
                pool,
                "INSERT INTO studios_tags (studio_id, tag_id) VALUES (?, ?)",
                id,
                *tag,
            )
            .await?;
        }
        for alias in &self.aliases {
            sqlx::query("INSERT INTO studio_aliases (studio_id, alias) VALUES (?, ?)")
                .bind(id)
                .bind(alias)
                .execute(pool)
                .await?;
        }
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Performers
// ---------------------------------------------------------------------------

/// Create a performer builder.
pub fn test_performer(name: &str) -> TestPerformer {
    TestPerformer {
        name: name.to_string(),
        gender: None,
        height: None,
        birthdate: None,
        tags: Vec::new(),
        aliases: Vec::new(),
        custom_fields: Vec::new(),
    }
}

#[derive(Debug, Clone)]
pub struct TestPerformer {
    pub name: String,
    pub gender: Option<String>,
    pub height: Option<i64>,
    pub birthdate: Option<String>,
    pub tags: Vec<i64>,
    pub aliases: Vec<String>,
    pub custom_fields: Vec<(String, JsonValue)>,
}

impl TestPerformer {
    pub fn with_gender(mut self, gender: &str) -> Self {
        self.gender = Some(gender.to_string());
        self
    }

    pub fn with_height(mut self, height: i64) -> Self {
        self.height = Some(height);
        self
    }

    /// Birthdate as `YYYY-MM-DD`.
    pub fn with_birthdate(mut self, date: &str) -> Self {
        self.birthdate = Some(date.to_string());
        self
    }

    pub fn with_tags(mut self, tags: &[i64]) -> Self {
        self.tags.extend_from_slice(tags);
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn with_custom_field(mut self, field: &str, value: JsonValue) -> Self {
        self.custom_fields.push((field.to_string(), value));
        self
    }

    pub async fn insert(&self, pool: &SqlitePool) -> Result<i64> {
        let id = sqlx::query(
            "INSERT INTO performers (name, gender, height, birthdate) VALUES (?, ?, ?, ?)",
        )
        .bind(&self.name)
        .bind(&self.gender)
        .bind(self.height)
        .bind(&self.birthdate)
        .execute(pool)
        .await?
        .last_insert_rowid();
        for tag in &self.tags {
            link(
                pool,
                "INSERT INTO performers_tags (performer_id, tag_id) VALUES (?, ?)",
                id,
                *tag,
            )
            .await?;
        }
        for alias in &self.aliases {
            sqlx::query("INSERT INTO performer_aliases (performer_id, alias) VALUES (?, ?)")
                .bind(id)
                .bind(alias)
                .execute(pool)
                .await?;
        }
        for (field, value) in &self.custom_fields {
            let query = sqlx::query(
                "INSERT INTO performer_custom_fields (performer_id, field, value) VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(field);
            let query = match value {
                JsonValue::Number(n) if n.is_i64() => query.bind(n.as_i64()),
                JsonValue::Number(n) => query.bind(n.as_f64()),
                JsonValue::Bool(b) => query.bind(*b),
                JsonValue::String(s) => query.bind(s.clone()),
                other => query.bind(other.to_string()),
            };
            query.execute(pool).await?;
        }
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Scenes
// ---------------------------------------------------------------------------

/// Create a scene builder.
pub fn test_scene(title: &str) -> TestScene {
    TestScene {
        title: title.to_string(),
        date: None,
        rating: None,
        organized: false,
        duration: None,
        studio: None,
        tags: Vec::new(),
        performers: Vec::new(),
    }
}

#[derive(Debug, Clone)]
pub struct TestScene {
    pub title: String,
    pub date: Option<String>,
    pub rating: Option<i64>,
    pub organized: bool,
    pub duration: Option<f64>,
    pub studio: Option<i64>,
    pub tags: Vec<i64>,
    pub performers: Vec<i64>,
}

impl TestScene {
    /// Date as `YYYY-MM-DD`.
    pub fn with_date(mut self, date: &str) -> Self {
        self.date = Some(date.to_string());
        self
    }

    pub fn with_rating(mut self, rating: i64) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn organized(mut self) -> Self {
        self.organized = true;
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_studio(mut self, studio: i64) -> Self {
        self.studio = Some(studio);
        self
    }

    pub fn with_tags(mut self, tags: &[i64]) -> Self {
        self.tags.extend_from_slice(tags);
        self
    }

    pub fn with_performers(mut self, performers: &[i64]) -> Self {
        self.performers.extend_from_slice(performers);
        self
    }

    pub async fn insert(&self, pool: &SqlitePool) -> Result<i64> {
        let id = sqlx::query(
            "INSERT INTO scenes (title, date, rating, organized, duration, studio_id) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&self.title)
        .bind(&self.date)
        .bind(self.rating)
        .bind(self.organized)
        .bind(self.duration)
        .bind(self.studio)
        .execute(pool)
        .await?
        .last_insert_rowid();
        for tag in &self.tags {
            link(
                pool,
                "INSERT INTO scenes_tags (scene_id, tag_id) VALUES (?, ?)",
                id,
                *tag,
            )
            .await?;
        }
        for performer in &self.performers {
            link(
                pool,
                "INSERT INTO performers_scenes (scene_id, performer_id) VALUES (?, ?)",
                id,
                *performer,
            )
            .await?;
        }
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// Create a group builder.
pub fn test_group(name: &str) -> TestGroup {
    TestGroup {
        name: name.to_string(),
        studio: None,
        tags: Vec::new(),
        scenes: Vec::new(),
        containing: Vec::new(),
    }
}

#[derive(Debug, Clone)]
pub struct TestGroup {
    pub name: String,
    pub studio: Option<i64>,
    pub tags: Vec<i64>,
    pub scenes: Vec<i64>,
    pub containing: Vec<i64>,
}

impl TestGroup {
    pub fn with_studio(mut self, studio: i64) -> Self {
        self.studio = Some(studio);
        self
    }

    pub fn with_tags(mut self, tags: &[i64]) -> Self {
        self.tags.extend_from_slice(tags);
        self
    }

    pub fn with_scenes(mut self, scenes: &[i64]) -> Self {
        self.scenes.extend_from_slice(scenes);
        self
    }

    /// Nest this group inside `group`.
    pub fn contained_in(mut self, group: i64) -> Self {
        self.containing.push(group);
        self
    }

    pub async fn insert(&self, pool: &SqlitePool) -> Result<i64> {
        let id = sqlx::query("INSERT INTO groups (name, studio_id) VALUES (?, ?)")
            .bind(&self.name)
            .bind(self.studio)
            .execute(pool)
            .await?
            .last_insert_rowid();
        for tag in &self.tags {
            link(
                pool,
                "INSERT INTO groups_tags (group_id, tag_id) VALUES (?, ?)",
                id,
                *tag,
            )
            .await?;
        }
        for scene in &self.scenes {
            link(
                pool,
                "INSERT INTO groups_scenes (group_id, scene_id) VALUES (?, ?)",
                id,
                *scene,
            )
            .await?;
        }
        for containing in &self.containing {
            link(
                pool,
                "INSERT INTO groups_relations (containing_id, sub_id) VALUES (?, ?)",
                *containing,
                id,
            )
            .await?;
        }
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Scene markers
// ---------------------------------------------------------------------------

/// Create a marker builder on `scene` with a primary tag.
pub fn test_marker(scene: i64, primary_tag: i64) -> TestMarker {
    TestMarker {
        title: String::new(),
        seconds: 0.0,
        scene,
        primary_tag,
        tags: Vec::new(),
    }
}

#[derive(Debug, Clone)]
pub struct TestMarker {
    pub title: String,
    pub seconds: f64,
    pub scene: i64,
    pub primary_tag: i64,
    pub tags: Vec<i64>,
}

impl TestMarker {
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn at(mut self, seconds: f64) -> Self {
        self.seconds = seconds;
        self
    }

    /// Secondary tags, stored in `scene_markers_tags`.
    pub fn with_tags(mut self, tags: &[i64]) -> Self {
        self.tags.extend_from_slice(tags);
        self
    }

    pub async fn insert(&self, pool: &SqlitePool) -> Result<i64> {
        let id = sqlx::query(
            "INSERT INTO scene_markers (title, seconds, primary_tag_id, scene_id) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&self.title)
        .bind(self.seconds)
        .bind(self.primary_tag)
        .bind(self.scene)
        .execute(pool)
        .await?
        .last_insert_rowid();
        for tag in &self.tags {
            link(
                pool,
                "INSERT INTO scene_markers_tags (scene_marker_id, tag_id) VALUES (?, ?)",
                id,
                *tag,
            )
            .await?;
        }
        Ok(id)
    }
}

/// Assertion helpers for rendered SQL and JSON output.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string to NOT contain '{needle}'\nActual: {haystack}"
        );
    }
}
