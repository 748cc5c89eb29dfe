//! Integration tests for the Artportalen source repositories.
//!
//! These tests verify the queries against a real PostgreSQL database holding
//! a mirrored source schema. Each test runs in an isolated container.

use sos_core::chunking::IdChunk;
use sos_core::config::Replica;
use sos_core::metadata::MetadataTable;
use sos_core::models::{ExternalSystem, ExternalSystemMapping, MappingValue, Vocabulary, VocabularyId};
use sos_core::traits::{
    ChecklistSource, MetadataSource, SightingEnrichmentSource, SightingSource, SiteSource,
    VocabularySource,
};
use sos_db::{
    ChecklistRepository, EnrichmentRepository, MetadataRepository, SightingRepository,
    SiteRepository, VocabularyRepository,
};

use crate::integration::common::{
    date, execute, insert_sighting, insert_sightings, insert_site, mark_sighting, second_database,
    setup_test_db,
};

fn ids<T>(rows: &[T], id: impl Fn(&T) -> i32) -> Vec<i32> {
    rows.iter().map(id).collect()
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_chunks_respect_open_and_closed_bounds() {
    let (pool, _container) = setup_test_db().await;
    insert_sightings(&pool, 1..=25, None).await;
    let repo = SightingRepository::single(pool);

    let span = repo.get_id_span(Replica::Backup).await.unwrap();
    assert_eq!(span, Some((1, 25)));

    let open = repo
        .get_chunk(Replica::Backup, IdChunk::new(1, 11))
        .await
        .unwrap();
    assert_eq!(ids(&open, |s| s.id), (1..=10).collect::<Vec<_>>());

    let closed = repo
        .get_chunk(Replica::Backup, IdChunk::closed(21, 25))
        .await
        .unwrap();
    assert_eq!(ids(&closed, |s| s.id), vec![21, 22, 23, 24, 25]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_deleted_and_rejected_sightings_are_not_harvested() {
    let (pool, _container) = setup_test_db().await;
    insert_sightings(&pool, 1..=6, None).await;
    mark_sighting(&pool, 3, "deleted_date", 10).await;
    mark_sighting(&pool, 4, "rejected_date", 10).await;
    let repo = SightingRepository::single(pool);

    let chunk = repo
        .get_chunk(Replica::Live, IdChunk::closed(1, 6))
        .await
        .unwrap();
    assert_eq!(ids(&chunk, |s| s.id), vec![1, 2, 5, 6]);

    let by_ids = repo.get_by_ids(Replica::Live, &[2, 3, 4]).await.unwrap();
    assert_eq!(ids(&by_ids, |s| s.id), vec![2]);

    assert_eq!(repo.get_deleted_ids(Replica::Live, date(5)).await.unwrap(), vec![3]);
    assert_eq!(repo.get_rejected_ids(Replica::Live, date(5)).await.unwrap(), vec![4]);
    assert!(repo.get_deleted_ids(Replica::Live, date(11)).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_modified_ids_oldest_edit_first() {
    let (pool, _container) = setup_test_db().await;
    for (id, edit_day) in [(1, 9), (2, 3), (3, 7), (4, 5), (5, 2)] {
        insert_sighting(&pool, id, None, edit_day).await;
    }
    let repo = SightingRepository::single(pool);

    let modified = repo
        .get_modified_ids(Replica::Live, date(4), 10)
        .await
        .unwrap();
    assert_eq!(modified, vec![4, 3, 1]);

    let limited = repo
        .get_modified_ids(Replica::Live, date(4), 2)
        .await
        .unwrap();
    assert_eq!(limited, vec![4, 3]);

    let latest = repo.get_last_modified_date(Replica::Live).await.unwrap();
    assert_eq!(latest, Some(date(9)));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_modified_ids_resume_within_shared_edit_date() {
    let (pool, _container) = setup_test_db().await;
    for id in 1..=3 {
        insert_sighting(&pool, id, None, 6).await;
    }
    let repo = SightingRepository::single(pool);

    let first = repo
        .get_modified_ids(Replica::Live, date(1), 2)
        .await
        .unwrap();
    assert_eq!(first, vec![1, 2]);

    // The next run's watermark is the edit date of the rows already taken
    let next = repo
        .get_modified_ids(Replica::Live, date(6), 10)
        .await
        .unwrap();
    assert!(next.contains(&3), "row 3 was skipped: {next:?}");
    assert_eq!(next, vec![1, 2, 3]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_queries_go_to_the_named_replica() {
    let (live, container) = setup_test_db().await;
    let backup = second_database(&container, &live, "artportalen_backup").await;
    insert_sightings(&live, 1..=3, None).await;
    let repo = SightingRepository::new(live, backup);

    assert_eq!(repo.get_id_span(Replica::Live).await.unwrap(), Some((1, 3)));
    assert_eq!(repo.get_id_span(Replica::Backup).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_checklists_and_their_taxa() {
    let (pool, _container) = setup_test_db().await;
    execute(
        &pool,
        r#"INSERT INTO checklist (id, name, start_date, end_date, register_date, edit_date)
           SELECT g, 'List ' || g, NOW(), NOW(), NOW(), NOW() FROM generate_series(5, 9) g"#,
    )
    .await;
    execute(
        &pool,
        "INSERT INTO checklist_taxon VALUES (5, 100, TRUE), (5, 101, FALSE), (6, 100, TRUE)",
    )
    .await;
    let repo = ChecklistRepository::new(pool);

    assert_eq!(repo.get_id_span().await.unwrap(), Some((5, 9)));
    let chunk = repo.get_chunk(IdChunk::new(5, 7)).await.unwrap();
    assert_eq!(ids(&chunk, |c| c.id), vec![5, 6]);
    assert_eq!(chunk[0].name.as_deref(), Some("List 5"));

    let taxa = repo.get_checklist_taxa(&[5]).await.unwrap();
    assert_eq!(taxa.len(), 2);
    assert!(taxa.iter().any(|t| t.taxon_id == 101 && !t.found));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_sites_with_parent_areas_and_geometry() {
    let (pool, _container) = setup_test_db().await;
    insert_site(&pool, 1, Some("Tåkern"), None).await;
    insert_site(&pool, 2, Some("Tåkern, norra delen"), Some(1)).await;
    insert_site(&pool, 3, None, Some(99)).await;
    execute(
        &pool,
        "INSERT INTO site_area VALUES (2, 21, '05', 'Östergötland'), (2, 1, '0562', 'Mjölby')",
    )
    .await;
    execute(
        &pool,
        "INSERT INTO site_geometry VALUES (2, 'POLYGON((0 0, 10 0, 10 10, 0 10, 0 0))')",
    )
    .await;
    let repo = SiteRepository::new(pool);

    let mut sites = repo.get_by_ids(&[2, 3]).await.unwrap();
    sites.sort_by_key(|s| s.id);
    assert_eq!(sites.len(), 2);
    assert_eq!(sites[0].parent_site_name.as_deref(), Some("Tåkern"));
    assert_eq!(sites[1].parent_site_id, Some(99));
    assert_eq!(sites[1].parent_site_name, None);

    let areas = repo.get_areas_by_ids(&[2, 3]).await.unwrap();
    assert_eq!(areas.len(), 2);

    let geometries = repo.get_geometries_by_ids(&[2, 3]).await.unwrap();
    assert_eq!(geometries.len(), 1);
    assert!(geometries[0].geometry_wkt.starts_with("POLYGON"));

    assert!(repo.get_by_ids(&[]).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_frequently_used_sites() {
    let (pool, _container) = setup_test_db().await;
    insert_sightings(&pool, 1..=3, Some(2)).await;
    insert_sightings(&pool, 4..=4, Some(3)).await;
    insert_sightings(&pool, 5..=7, Some(0)).await;
    let repo = SiteRepository::new(pool).with_frequent_threshold(2);

    assert_eq!(repo.get_frequently_used_ids().await.unwrap(), vec![2]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_enrichment_queries() {
    let (pool, _container) = setup_test_db().await;
    execute(&pool, "INSERT INTO sighting_project VALUES (1, 5), (2, 5)").await;
    execute(
        &pool,
        "INSERT INTO project_parameter VALUES (7, 5, 'Antal bon', NULL, 'st', 'integer')",
    )
    .await;
    execute(&pool, "INSERT INTO project_parameter_value VALUES (1, 7, '12')").await;
    execute(
        &pool,
        r#"INSERT INTO sighting_relation (id, sighting_id, user_id, sighting_relation_type_id, sort)
           VALUES (1, 1, 40, 2, 2), (2, 1, 41, 2, 1), (3, 2, 40, 1, 0)"#,
    )
    .await;
    execute(
        &pool,
        "INSERT INTO media (id, sighting_id, file_uri) VALUES (1, 1, 'https://example.org/1.jpg')",
    )
    .await;
    let repo = EnrichmentRepository::new(pool);

    let projects = repo.get_sighting_projects(&[1]).await.unwrap();
    assert_eq!(projects.len(), 1);

    let parameters = repo.get_project_parameters(&[1, 2]).await.unwrap();
    assert_eq!(parameters.len(), 1);
    assert_eq!(parameters[0].project_id, 5);
    assert_eq!(parameters[0].project_parameter_id, 7);
    assert_eq!(parameters[0].value.as_deref(), Some("12"));

    let relations = repo.get_sighting_relations(&[1]).await.unwrap();
    assert_eq!(ids(&relations, |r| r.user_id), vec![41, 40]);

    assert_eq!(repo.get_media(&[1, 2]).await.unwrap().len(), 1);
    assert!(repo.get_species_collection_items(&[1]).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_code_tables_are_read_by_name() {
    let (pool, _container) = setup_test_db().await;
    execute(
        &pool,
        r#"INSERT INTO metadata_translation VALUES
           ('activity', 14, NULL, 'sv-SE', 'Bobygge'),
           ('activity', 14, NULL, 'en-GB', 'Nest building'),
           ('gender', 1, NULL, 'sv-SE', 'hane')"#,
    )
    .await;
    execute(
        &pool,
        "INSERT INTO person VALUES (1, 40, 'Carl', 'Linnaeus', NULL)",
    )
    .await;
    let repo = MetadataRepository::new(pool);

    let activities = repo.get_metadata(MetadataTable::Activity).await.unwrap();
    assert_eq!(activities.len(), 2);
    assert!(activities.iter().all(|m| m.id == 14));

    assert_eq!(repo.get_metadata(MetadataTable::Gender).await.unwrap().len(), 1);
    assert!(repo.get_metadata(MetadataTable::Unit).await.unwrap().is_empty());

    let persons = repo.get_persons().await.unwrap();
    assert_eq!(persons[0].user_id, Some(40));
    assert!(repo.get_taxa().await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_vocabulary_upsert_replaces_document() {
    let (pool, _container) = setup_test_db().await;
    let repo = VocabularyRepository::new(pool);

    let mut vocabulary = Vocabulary {
        id: VocabularyId::Activity,
        name: "activity".to_string(),
        values: Vec::new(),
        external_system_mappings: vec![ExternalSystemMapping {
            external_system: ExternalSystem::Artportalen,
            values: vec![MappingValue {
                value: 15,
                sos_id: 7,
            }],
        }],
    };
    repo.upsert(&vocabulary).await.unwrap();
    vocabulary.name = "Activity".to_string();
    repo.upsert(&vocabulary).await.unwrap();

    let all = repo.get_all().await.unwrap();
    assert_eq!(all, vec![vocabulary]);
}
