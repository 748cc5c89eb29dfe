//! End-to-end runs of the harvesters and the processor on the PostgreSQL
//! repositories.

use sos_core::config::{HarvestConfig, ProcessConfig};
use sos_core::models::{VerbatimObservation, sighting_occurrence_id};
use sos_core::traits::{ObservationIndex, VerbatimStore};
use sos_core::{
    ArtportalenSources, HarvestMode, ObservationHarvester, ObservationProcessor, RunStatus,
};
use sos_db::{
    EnrichmentRepository, MetadataRepository, ObservationRepository, SightingRepository,
    SiteRepository, VerbatimRepository, VocabularyRepository,
};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::integration::common::{insert_sighting, insert_sightings, insert_site, insert_taxon, setup_test_db};

type PgHarvester = ObservationHarvester<
    SightingRepository,
    SiteRepository,
    EnrichmentRepository,
    MetadataRepository,
    VerbatimRepository,
    ObservationRepository,
>;

fn harvester(pool: &PgPool) -> PgHarvester {
    let sources = ArtportalenSources {
        sightings: SightingRepository::single(pool.clone()),
        sites: SiteRepository::new(pool.clone()),
        enrichment: EnrichmentRepository::new(pool.clone()),
        metadata: MetadataRepository::new(pool.clone()),
    };
    let config = HarvestConfig::default()
        .with_chunk_size(10)
        .with_incremental_chunk_size(10)
        .with_threads(2);
    ObservationHarvester::with_config(
        sources,
        VerbatimRepository::new(pool.clone()),
        ObservationRepository::new(pool.clone()),
        config,
        1,
    )
}

fn processor(
    pool: &PgPool,
) -> ObservationProcessor<VerbatimRepository, ObservationRepository, MetadataRepository, VocabularyRepository>
{
    let config = ProcessConfig {
        batch_size: 10,
        no_of_threads: 2,
        ..ProcessConfig::default()
    };
    ObservationProcessor::with_config(
        VerbatimRepository::new(pool.clone()),
        ObservationRepository::new(pool.clone()),
        MetadataRepository::new(pool.clone()),
        VocabularyRepository::new(pool.clone()),
        config,
    )
}

async fn seed(pool: &PgPool) {
    insert_taxon(pool, 100).await;
    insert_site(pool, 1, Some("Tåkern"), None).await;
    insert_sightings(pool, 1..=25, Some(1)).await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_full_harvest_and_processing() {
    let (pool, _container) = setup_test_db().await;
    seed(&pool).await;

    let info = harvester(&pool)
        .harvest(HarvestMode::Full, CancellationToken::new())
        .await;
    assert_eq!(info.status, RunStatus::Success, "{:?}", info.notes);
    assert_eq!(info.count, 25);

    let verbatim = VerbatimRepository::new(pool.clone());
    assert_eq!(
        verbatim
            .count::<VerbatimObservation>(HarvestMode::Full)
            .await
            .unwrap(),
        25
    );

    let processed = processor(&pool)
        .process(HarvestMode::Full, CancellationToken::new())
        .await;
    assert_eq!(processed.status, RunStatus::Success, "{:?}", processed.notes);
    assert_eq!(processed.count, 25);

    let index = ObservationRepository::new(pool.clone());
    assert_eq!(index.count(false).await.unwrap(), 25);
    assert_eq!(index.count(true).await.unwrap(), 0);

    let observation = index
        .get(&sighting_occurrence_id(7), false)
        .await
        .unwrap()
        .expect("observation 7 should be indexed");
    assert_eq!(observation.taxon.id, 100);
    assert!(observation.location.is_some());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_observation_index_deletes() {
    let (pool, _container) = setup_test_db().await;
    seed(&pool).await;
    harvester(&pool)
        .harvest(HarvestMode::Full, CancellationToken::new())
        .await;
    processor(&pool)
        .process(HarvestMode::Full, CancellationToken::new())
        .await;
    let index = ObservationRepository::new(pool.clone());

    let removed = index
        .delete_by_occurrence_ids(&[sighting_occurrence_id(1), sighting_occurrence_id(2)], false)
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(
        index
            .delete_by_occurrence_ids(&[sighting_occurrence_id(1)], true)
            .await
            .unwrap(),
        0
    );

    assert!(index.get_latest_modified_date(1).await.unwrap().is_some());
    assert_eq!(index.delete_provider_data(1, false).await.unwrap(), 23);
    assert!(index.get_latest_modified_date(1).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_incremental_harvest_picks_up_edits_from_watermark() {
    let (pool, _container) = setup_test_db().await;
    insert_taxon(&pool, 100).await;
    insert_site(&pool, 1, Some("Tåkern"), None).await;
    insert_sightings(&pool, 1..=24, Some(1)).await;
    insert_sighting(&pool, 25, Some(1), 5).await;
    let harvester = harvester(&pool);
    harvester
        .harvest(HarvestMode::Full, CancellationToken::new())
        .await;
    processor(&pool)
        .process(HarvestMode::Full, CancellationToken::new())
        .await;

    insert_sighting(&pool, 30, Some(1), 20).await;
    insert_sighting(&pool, 31, Some(1), 21).await;

    let info = harvester
        .harvest(HarvestMode::IncrementalActive, CancellationToken::new())
        .await;
    assert_eq!(info.status, RunStatus::Success, "{:?}", info.notes);
    // Sighting 25 shares the watermark's edit date and is taken again
    assert_eq!(info.count, 3);

    let verbatim = VerbatimRepository::new(pool.clone());
    let stored: Vec<VerbatimObservation> = verbatim
        .get_batch(HarvestMode::IncrementalActive, i32::MIN, 10)
        .await
        .unwrap();
    assert_eq!(
        stored.iter().map(|v| v.sighting_id).collect::<Vec<_>>(),
        vec![25, 30, 31]
    );
}
