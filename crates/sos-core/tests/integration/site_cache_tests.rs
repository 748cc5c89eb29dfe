//! Integration tests for SiteCache lookups, loading and parent backfill.

use std::sync::Arc;

use futures::future;
use sos_core::SiteCache;
use sos_core::models::{DEFAULT_ACCURACY, SiteAreaEntity};

use crate::integration::common::{MockSiteSource, site_entity};

fn cache(source: &MockSiteSource, window_size: usize) -> SiteCache<MockSiteSource> {
    SiteCache::new(source.clone(), 2, window_size)
}

#[tokio::test]
async fn test_site_id_zero_is_never_queried() {
    let source = MockSiteSource::new(vec![site_entity(1)]);
    let cache = cache(&source, 100);

    let sites = cache.get_batch_sites(&[0, 0]).await.unwrap();

    assert!(sites.is_empty());
    assert_eq!(source.site_queries(), 0);
}

#[tokio::test]
async fn test_cached_sites_issue_no_queries() {
    let source = MockSiteSource::new(vec![site_entity(1), site_entity(2)]);
    let cache = cache(&source, 100);

    let first = cache.get_batch_sites(&[1, 2]).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(source.site_queries(), 1);

    let second = cache.get_batch_sites(&[2, 1, 0]).await.unwrap();
    assert_eq!(second.len(), 2);
    assert_eq!(source.site_queries(), 1, "Cached sites must not be queried");
    assert!(Arc::ptr_eq(&first[&1], &second[&1]));
}

#[tokio::test]
async fn test_only_missing_ids_are_loaded() {
    let source = MockSiteSource::new(vec![site_entity(1), site_entity(2), site_entity(3)]);
    let cache = cache(&source, 100);
    cache.get_batch_sites(&[1]).await.unwrap();

    let sites = cache.get_batch_sites(&[1, 2, 3, 3]).await.unwrap();

    assert_eq!(sites.len(), 3);
    assert_eq!(source.requested_ids(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_unknown_site_is_absent_from_result() {
    let source = MockSiteSource::new(vec![site_entity(1)]);
    let cache = cache(&source, 100);

    let sites = cache.get_batch_sites(&[1, 99]).await.unwrap();

    assert!(sites.contains_key(&1));
    assert!(!sites.contains_key(&99));
    assert!(!cache.is_loaded(99));
}

#[tokio::test]
async fn test_large_batches_are_queried_in_windows() {
    let source = MockSiteSource::new((1..=7).map(site_entity).collect());
    let cache = cache(&source, 3);

    let sites = cache
        .get_batch_sites(&(1..=7).collect::<Vec<_>>())
        .await
        .unwrap();

    assert_eq!(sites.len(), 7);
    assert_eq!(source.site_queries(), 3);
    assert_eq!(cache.len(), 7);
}

#[tokio::test]
async fn test_frequently_used_sites_prime_the_cache_once() {
    let source = MockSiteSource::new(vec![site_entity(1), site_entity(2)]).with_frequent(vec![1, 2]);
    let cache = cache(&source, 100);

    assert_eq!(cache.cache_frequently_used_sites().await.unwrap(), 2);
    assert_eq!(cache.cache_frequently_used_sites().await.unwrap(), 0);
    assert_eq!(source.site_queries(), 1);

    cache.get_batch_sites(&[1, 2]).await.unwrap();
    assert_eq!(source.site_queries(), 1);
}

#[tokio::test]
async fn test_parent_name_is_backfilled_from_same_batch() {
    let mut child = site_entity(2);
    child.parent_site_id = Some(1);
    let source = MockSiteSource::new(vec![site_entity(1), child]);
    let cache = cache(&source, 100);

    let sites = cache.get_batch_sites(&[1, 2]).await.unwrap();

    assert_eq!(sites[&2].parent_site_name.as_deref(), Some("Site 1"));
}

#[tokio::test]
async fn test_parent_name_is_backfilled_from_cache() {
    let mut child = site_entity(3);
    child.parent_site_id = Some(1);
    let source = MockSiteSource::new(vec![site_entity(1), child]);
    let cache = cache(&source, 100);
    cache.get_batch_sites(&[1]).await.unwrap();

    let sites = cache.get_batch_sites(&[3]).await.unwrap();

    assert_eq!(sites[&3].parent_site_name.as_deref(), Some("Site 1"));
}

#[tokio::test]
async fn test_site_casting_applies_areas_and_accuracy() {
    let mut entity = site_entity(1);
    entity.accuracy = -5;
    let areas = vec![
        SiteAreaEntity {
            site_id: 1,
            area_dataset_id: 21,
            feature_id: "3".into(),
            name: "Uppsala".into(),
        },
        SiteAreaEntity {
            site_id: 1,
            area_dataset_id: 1,
            feature_id: "380".into(),
            name: "Uppsala kommun".into(),
        },
    ];
    let source = MockSiteSource::new(vec![entity]).with_areas(areas);
    let cache = cache(&source, 100);

    let site = cache.get_batch_sites(&[1]).await.unwrap().remove(&1).unwrap();

    assert_eq!(site.accuracy, DEFAULT_ACCURACY);
    assert_eq!(site.county.as_ref().map(|a| a.name.as_str()), Some("Uppsala"));
    assert_eq!(
        site.municipality.as_ref().map(|a| a.feature_id.as_str()),
        Some("380")
    );
    assert!(site.point.is_some());
    assert!(!site.has_geometry);
}

#[tokio::test]
async fn test_concurrent_lookups_share_one_site_instance() {
    let source = MockSiteSource::new((1..=20).map(site_entity).collect());
    let cache = Arc::new(cache(&source, 5));

    let results = future::try_join_all((0..8).map(|_| {
        let cache = Arc::clone(&cache);
        async move { cache.get_batch_sites(&(1..=20).collect::<Vec<_>>()).await }
    }))
    .await
    .unwrap();

    assert_eq!(cache.len(), 20);
    for result in &results {
        assert_eq!(result.len(), 20);
        assert!(Arc::ptr_eq(&result[&7], &cache.get(7).unwrap()));
    }
}
