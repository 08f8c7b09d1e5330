#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Hierarchy tests.
//!
//! Closure queries over tag, studio and group hierarchies, and hierarchical
//! criteria expanded with a depth before compilation.

mod common;

use marquee_kernel::error::{QueryError, ValidationError};
use marquee_kernel::filters::{
    GroupCriteria, GroupFilter, Groups, SceneCriteria, SceneFilter, Scenes, TagCriteria,
    TagFilter, Tags,
};
use marquee_kernel::query::criterion::{Depth, HierarchicalCriterion};
use marquee_kernel::query::hierarchy::{Direction, HierarchyResolver, TAG_HIERARCHY};
use marquee_kernel::query::repository::expand_hierarchies;
use marquee_kernel::query::{FindFilter, Modifier};
use marquee_test_utils::{test_group, test_scene, test_studio};

use common::{TagChain, close_cycle, repository, tag_chain, test_pool};

fn scene_tags(modifier: Modifier, tags: Vec<i64>, depth: i32) -> SceneFilter {
    SceneFilter::new(SceneCriteria {
        tags: Some(HierarchicalCriterion::new(modifier, tags).with_depth(depth)),
        ..Default::default()
    })
}

async fn sorted_scene_ids(pool: &sqlx::SqlitePool, filter: &SceneFilter) -> Vec<i64> {
    let mut ids = repository::<Scenes>(pool)
        .find(filter, &FindFilter::default())
        .await
        .unwrap()
        .ids;
    ids.sort_unstable();
    ids
}

/// One scene per tag of the chain, titled after the tag.
async fn scene_per_tag(pool: &sqlx::SqlitePool, chain: TagChain) -> [i64; 4] {
    let mut ids = [0; 4];
    for (slot, (title, tag)) in ids.iter_mut().zip([
        ("A", chain.a),
        ("B", chain.b),
        ("C", chain.c),
        ("D", chain.d),
    ]) {
        *slot = test_scene(title)
            .with_tags(&[tag])
            .insert(pool)
            .await
            .unwrap();
    }
    ids
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_closure_within_candidates() {
    let pool = test_pool().await;
    let t = tag_chain(&pool).await;
    let mut conn = pool.acquire().await.unwrap();
    let mut resolver = HierarchyResolver::new(&mut conn);

    let ids = resolver
        .closure_within(
            &TAG_HIERARCHY,
            Direction::Descendants,
            &[t.a],
            &[t.b, t.c, t.d],
            Depth::Unlimited,
        )
        .await
        .unwrap();
    assert_eq!(ids, vec![t.b, t.c]);

    let ids = resolver
        .closure_within(
            &TAG_HIERARCHY,
            Direction::Descendants,
            &[t.a],
            &[t.b, t.c, t.d],
            Depth::Levels(1),
        )
        .await
        .unwrap();
    assert_eq!(ids, vec![t.b]);

    let ids = resolver
        .closure_within(&TAG_HIERARCHY, Direction::Ancestors, &[t.c], &[t.a, t.d], Depth::Unlimited)
        .await
        .unwrap();
    assert_eq!(ids, vec![t.a]);
}

#[tokio::test]
async fn test_direct_subset() {
    let pool = test_pool().await;
    let t = tag_chain(&pool).await;
    let mut conn = pool.acquire().await.unwrap();
    let mut resolver = HierarchyResolver::new(&mut conn);

    let children = resolver
        .direct_subset(&TAG_HIERARCHY, Direction::Descendants, t.a, &[t.b, t.c, t.d])
        .await
        .unwrap();
    assert_eq!(children, vec![t.b]);

    let parents = resolver
        .direct_subset(&TAG_HIERARCHY, Direction::Ancestors, t.c, &[t.a, t.b])
        .await
        .unwrap();
    assert_eq!(parents, vec![t.b]);

    let none = resolver
        .direct_subset(&TAG_HIERARCHY, Direction::Descendants, t.a, &[])
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_closure_pairs_keep_roots() {
    let pool = test_pool().await;
    let t = tag_chain(&pool).await;
    let mut conn = pool.acquire().await.unwrap();
    let mut resolver = HierarchyResolver::new(&mut conn);

    let pairs = resolver
        .closure_pairs(&TAG_HIERARCHY, Direction::Descendants, &[t.b, t.d], Depth::Unlimited)
        .await
        .unwrap();
    assert_eq!(pairs, vec![(t.b, t.b), (t.b, t.c), (t.d, t.d)]);

    let missing = resolver
        .closure_pairs(&TAG_HIERARCHY, Direction::Descendants, &[9999], Depth::Unlimited)
        .await
        .unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn test_cycle_terminates() {
    let pool = test_pool().await;
    let t = tag_chain(&pool).await;
    close_cycle(&pool, t).await;
    let mut conn = pool.acquire().await.unwrap();
    let mut resolver = HierarchyResolver::new(&mut conn);

    let ids = resolver
        .closure_within(
            &TAG_HIERARCHY,
            Direction::Descendants,
            &[t.b],
            &[t.a, t.b, t.c, t.d],
            Depth::Unlimited,
        )
        .await
        .unwrap();
    assert_eq!(ids, vec![t.a, t.b, t.c]);
}

#[tokio::test]
async fn test_expand_hierarchies_fills_nested_criteria() {
    let pool = test_pool().await;
    let t = tag_chain(&pool).await;
    let mut conn = pool.acquire().await.unwrap();

    let mut filter = scene_tags(Modifier::Includes, vec![t.d], 0)
        .with_or(scene_tags(Modifier::Includes, vec![t.a], 1))
        .unwrap();
    expand_hierarchies(&mut conn, &mut filter).await.unwrap();

    let top = filter.criteria.tags.as_ref().unwrap();
    assert!(top.expansion.is_none());
    let nested = filter.or.as_ref().unwrap().criteria.tags.as_ref().unwrap();
    let expansion = nested.expansion.as_ref().unwrap();
    assert_eq!(expansion.pairs, vec![(t.a, t.a), (t.a, t.b)]);
}

// ---------------------------------------------------------------------------
// Hierarchical criteria
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_depth_controls_expansion() {
    let pool = test_pool().await;
    let t = tag_chain(&pool).await;
    let [a, b, c, _] = scene_per_tag(&pool, t).await;

    let ids = sorted_scene_ids(&pool, &scene_tags(Modifier::Includes, vec![t.a], 0)).await;
    assert_eq!(ids, vec![a]);

    let ids = sorted_scene_ids(&pool, &scene_tags(Modifier::Includes, vec![t.a], 1)).await;
    assert_eq!(ids, vec![a, b]);

    let ids = sorted_scene_ids(&pool, &scene_tags(Modifier::Includes, vec![t.a], -1)).await;
    assert_eq!(ids, vec![a, b, c]);
}

#[tokio::test]
async fn test_includes_all_counts_roots_not_descendants() {
    let pool = test_pool().await;
    let t = tag_chain(&pool).await;
    let both = test_scene("Both")
        .with_tags(&[t.c, t.d])
        .insert(&pool)
        .await
        .unwrap();
    test_scene("Sunset only")
        .with_tags(&[t.c])
        .insert(&pool)
        .await
        .unwrap();
    test_scene("Two descendants")
        .with_tags(&[t.b, t.c])
        .insert(&pool)
        .await
        .unwrap();

    let ids = sorted_scene_ids(&pool, &scene_tags(Modifier::IncludesAll, vec![t.a, t.d], -1)).await;
    assert_eq!(ids, vec![both]);
}

#[tokio::test]
async fn test_excludes_expands_too() {
    let pool = test_pool().await;
    let t = tag_chain(&pool).await;
    let [a, _, _, d] = scene_per_tag(&pool, t).await;

    let ids = sorted_scene_ids(&pool, &scene_tags(Modifier::Excludes, vec![t.b], -1)).await;
    assert_eq!(ids, vec![a, d]);
}

#[tokio::test]
async fn test_expansion_survives_cycles() {
    let pool = test_pool().await;
    let t = tag_chain(&pool).await;
    close_cycle(&pool, t).await;
    let [a, b, c, _] = scene_per_tag(&pool, t).await;

    let ids = sorted_scene_ids(&pool, &scene_tags(Modifier::Includes, vec![t.c], -1)).await;
    assert_eq!(ids, vec![a, b, c]);
}

#[tokio::test]
async fn test_equals_with_depth_is_rejected() {
    let pool = test_pool().await;
    let t = tag_chain(&pool).await;
    let err = repository::<Scenes>(&pool)
        .find(&scene_tags(Modifier::Equals, vec![t.a], 2), &FindFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::Validation(ValidationError::UnsupportedModifier { field: "tags", .. })
    ));
}

#[tokio::test]
async fn test_tag_parents_and_children() {
    let pool = test_pool().await;
    let t = tag_chain(&pool).await;
    let repo = repository::<Tags>(&pool);

    let below_a = TagFilter::new(TagCriteria {
        parents: Some(HierarchicalCriterion::new(Modifier::Includes, vec![t.a]).with_depth(-1)),
        ..Default::default()
    });
    let result = repo.find(&below_a, &FindFilter::default()).await.unwrap();
    assert_eq!(result.ids, vec![t.b, t.c]);

    let above_c = TagFilter::new(TagCriteria {
        children: Some(HierarchicalCriterion::new(Modifier::Includes, vec![t.c]).with_depth(-1)),
        ..Default::default()
    });
    let result = repo.find(&above_c, &FindFilter::default()).await.unwrap();
    assert_eq!(result.ids, vec![t.b, t.a]);

    let roots = TagFilter::new(TagCriteria {
        parents: Some(HierarchicalCriterion::new(Modifier::IsNull, vec![])),
        ..Default::default()
    });
    let result = repo.find(&roots, &FindFilter::default()).await.unwrap();
    assert_eq!(result.ids, vec![t.a, t.d]);
}

#[tokio::test]
async fn test_studio_descendants() {
    let pool = test_pool().await;
    let network = test_studio("Network").insert(&pool).await.unwrap();
    let label = test_studio("Label")
        .with_parent(network)
        .insert(&pool)
        .await
        .unwrap();
    let other = test_studio("Other").insert(&pool).await.unwrap();
    let direct = test_scene("Direct")
        .with_studio(network)
        .insert(&pool)
        .await
        .unwrap();
    let nested = test_scene("Nested")
        .with_studio(label)
        .insert(&pool)
        .await
        .unwrap();
    test_scene("Elsewhere")
        .with_studio(other)
        .insert(&pool)
        .await
        .unwrap();

    let filter = SceneFilter::new(SceneCriteria {
        studios: Some(HierarchicalCriterion::new(Modifier::Includes, vec![network]).with_depth(-1)),
        ..Default::default()
    });
    let ids = sorted_scene_ids(&pool, &filter).await;
    assert_eq!(ids, vec![direct, nested]);
}

#[tokio::test]
async fn test_group_containment() {
    let pool = test_pool().await;
    let top = test_group("Top").insert(&pool).await.unwrap();
    let middle = test_group("Middle")
        .contained_in(top)
        .insert(&pool)
        .await
        .unwrap();
    let bottom = test_group("Bottom")
        .contained_in(middle)
        .insert(&pool)
        .await
        .unwrap();
    let repo = repository::<Groups>(&pool);

    let inside_top = GroupFilter::new(GroupCriteria {
        containing_groups: Some(
            HierarchicalCriterion::new(Modifier::Includes, vec![top]).with_depth(-1),
        ),
        ..Default::default()
    });
    let result = repo
        .find(&inside_top, &FindFilter::default())
        .await
        .unwrap();
    assert_eq!(result.ids, vec![bottom, middle]);

    let holding_bottom = GroupFilter::new(GroupCriteria {
        sub_groups: Some(
            HierarchicalCriterion::new(Modifier::Includes, vec![bottom]).with_depth(1),
        ),
        ..Default::default()
    });
    let result = repo
        .find(&holding_bottom, &FindFilter::default())
        .await
        .unwrap();
    assert_eq!(result.ids, vec![middle, top]);
}
