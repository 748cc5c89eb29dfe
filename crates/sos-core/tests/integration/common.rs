//! Test utilities and mock implementations for integration tests.
//!
//! Provides in-memory implementations of the core traits. Every mock counts
//! its queries, and the mocks that write share a [`CallLog`] so tests can
//! assert the order of side effects across collaborators.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use sos_core::chunking::IdChunk;
use sos_core::metadata::MetadataTable;
use sos_core::models::{
    ChecklistEntity, ChecklistTaxonEntity, MediaEntity, MetadataEntity, Observation,
    OrganizationEntity, PersonEntity, ProjectEntity, ProjectParameterEntity, SightingEntity,
    SightingProjectEntity, SightingRelationEntity, SiteAreaEntity, SiteEntity,
    SiteGeometryEntity, SpeciesCollectionItemEntity, TaxonEntity, VerbatimRecord, Vocabulary,
};
use sos_core::traits::{
    ChecklistSource, HarvestInfoStore, MetadataSource, ObservationIndex,
    SightingEnrichmentSource, SightingSource, SiteSource, VerbatimStore, VocabularySource,
};
use sos_core::{AppError, ArtportalenSources, HarvestConfig, HarvestInfo, HarvestMode, Replica};

// =============================================================================
// CallLog
// =============================================================================

/// Ordered record of side effects, shared between mocks.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Index of the first entry starting with `prefix`.
    pub fn first(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.starts_with(prefix))
    }

    /// Index of the last entry starting with `prefix`.
    pub fn last(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().rposition(|e| e.starts_with(prefix))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub const TAXON_ID: i32 = 100;

pub fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 8, 0, 0).unwrap()
}

/// A plain sighting of [`TAXON_ID`].
pub fn sighting(id: i32, site_id: Option<i32>) -> SightingEntity {
    SightingEntity {
        id,
        taxon_id: Some(TAXON_ID),
        site_id,
        start_date: date(2024, 5, 1),
        end_date: date(2024, 5, 1),
        activity_id: None,
        biotope_id: None,
        biotope_description: None,
        gender_id: None,
        stage_id: None,
        substrate_id: None,
        substrate_description: None,
        unit_id: None,
        validation_status_id: None,
        discovery_method_id: None,
        determination_method_id: None,
        quantity: Some(1),
        quantity_of_substrate: None,
        length: None,
        weight: None,
        min_depth: None,
        max_depth: None,
        min_height: None,
        max_height: None,
        comment: None,
        label: None,
        not_present: false,
        not_recovered: false,
        unsure_determination: false,
        unspontaneous: false,
        protected_by_system: false,
        hidden_by_provider: None,
        owner_organization_id: None,
        rights_holder: None,
        sighting_type_id: 0,
        checklist_id: None,
        register_date: date(2024, 5, 2),
        edit_date: date(2024, 5, 2),
    }
}

/// Sightings with ids `ids`, all at `site_id`.
pub fn sightings(ids: impl IntoIterator<Item = i32>, site_id: Option<i32>) -> Vec<SightingEntity> {
    ids.into_iter().map(|id| sighting(id, site_id)).collect()
}

/// A site in central Sweden with no diffusion.
pub fn site_entity(id: i32) -> SiteEntity {
    SiteEntity {
        id,
        name: Some(format!("Site {id}")),
        presentation_name: None,
        external_id: None,
        accuracy: 50,
        x_coord: 1_800_000.0,
        y_coord: 8_300_000.0,
        diffused_x_coord: Some(1_805_000.0),
        diffused_y_coord: Some(8_305_000.0),
        diffusion_id: 0,
        parent_site_id: None,
        parent_site_name: None,
        is_public: true,
    }
}

pub fn taxon(id: i32, protection_level: i32) -> TaxonEntity {
    TaxonEntity {
        id,
        scientific_name: "Parus major".to_string(),
        vernacular_name: Some("talgoxe".to_string()),
        organism_group: Some("Fåglar".to_string()),
        protection_level,
        disturbance_radius: 0,
    }
}

pub fn person(id: i32, user_id: i32, first: &str, last: &str) -> PersonEntity {
    PersonEntity {
        id,
        user_id: Some(user_id),
        first_name: first.to_string(),
        last_name: last.to_string(),
        alias: None,
    }
}

/// Small chunks and two threads, so tests exercise several batches.
pub fn test_config() -> HarvestConfig {
    HarvestConfig::default()
        .with_chunk_size(10)
        .with_incremental_chunk_size(10)
        .with_threads(2)
}

pub type MockSources =
    ArtportalenSources<MockSightingSource, MockSiteSource, MockEnrichmentSource, MockMetadataSource>;

pub fn sources(sightings: MockSightingSource, sites: MockSiteSource) -> MockSources {
    ArtportalenSources {
        sightings,
        sites,
        enrichment: MockEnrichmentSource::default(),
        metadata: MockMetadataSource::with_taxa(vec![taxon(TAXON_ID, 1)]),
    }
}

// =============================================================================
// MockSightingSource
// =============================================================================

#[derive(Clone, Default)]
pub struct MockSightingSource {
    sightings: Arc<Vec<SightingEntity>>,
    span: Option<(i32, i32)>,
    modified_ids: Vec<i32>,
    deleted_ids: Vec<i32>,
    rejected_ids: Vec<i32>,
    failing_chunk_start: Option<i32>,
    delay: Option<Duration>,
    pub chunk_calls: Arc<AtomicUsize>,
    pub by_id_calls: Arc<AtomicUsize>,
    pub requested_chunks: Arc<Mutex<Vec<IdChunk>>>,
    pub replicas: Arc<Mutex<Vec<Replica>>>,
    /// `since` of every modified, deleted and rejected id query, by query name.
    pub since: Arc<Mutex<Vec<(&'static str, DateTime<Utc>)>>>,
    pub log: CallLog,
}

impl MockSightingSource {
    pub fn new(sightings: Vec<SightingEntity>) -> Self {
        Self {
            sightings: Arc::new(sightings),
            ..Self::default()
        }
    }

    /// Reports `span` instead of the span of the stored sightings.
    pub fn with_span(mut self, min_id: i32, max_id: i32) -> Self {
        self.span = Some((min_id, max_id));
        self
    }

    pub fn with_modified_ids(mut self, ids: Vec<i32>) -> Self {
        self.modified_ids = ids;
        self
    }

    pub fn with_deleted_ids(mut self, deleted: Vec<i32>, rejected: Vec<i32>) -> Self {
        self.deleted_ids = deleted;
        self.rejected_ids = rejected;
        self
    }

    /// Makes the chunk starting at `start` fail.
    pub fn failing_chunk(mut self, start: i32) -> Self {
        self.failing_chunk_start = Some(start);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn chunk_calls(&self) -> usize {
        self.chunk_calls.load(Ordering::SeqCst)
    }

    /// The `since` passed to the query named `query`, if it was issued.
    pub fn since_of(&self, query: &str) -> Option<DateTime<Utc>> {
        self.since
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| *name == query)
            .map(|(_, since)| *since)
    }
}

impl SightingSource for MockSightingSource {
    async fn get_id_span(&self, replica: Replica) -> Result<Option<(i32, i32)>, AppError> {
        self.replicas.lock().unwrap().push(replica);
        if self.span.is_some() {
            return Ok(self.span);
        }
        let min = self.sightings.iter().map(|s| s.id).min();
        let max = self.sightings.iter().map(|s| s.id).max();
        Ok(min.zip(max))
    }

    async fn get_chunk(
        &self,
        _replica: Replica,
        chunk: IdChunk,
    ) -> Result<Vec<SightingEntity>, AppError> {
        self.chunk_calls.fetch_add(1, Ordering::SeqCst);
        self.requested_chunks.lock().unwrap().push(chunk);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_chunk_start == Some(chunk.start) {
            return Err(AppError::SourceError(format!("chunk {chunk} unavailable")));
        }
        self.log.push(format!("get_chunk:{}", chunk.start));
        Ok(self
            .sightings
            .iter()
            .filter(|s| chunk.contains(s.id))
            .cloned()
            .collect())
    }

    async fn get_by_ids(
        &self,
        replica: Replica,
        ids: &[i32],
    ) -> Result<Vec<SightingEntity>, AppError> {
        self.by_id_calls.fetch_add(1, Ordering::SeqCst);
        self.replicas.lock().unwrap().push(replica);
        self.log.push("get_by_ids");
        Ok(self
            .sightings
            .iter()
            .filter(|s| ids.contains(&s.id))
            .cloned()
            .collect())
    }

    async fn get_modified_ids(
        &self,
        _replica: Replica,
        since: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<i32>, AppError> {
        self.since.lock().unwrap().push(("modified", since));
        // Ignores the limit so the harvester's own cap is exercised.
        Ok(self.modified_ids.clone())
    }

    async fn get_deleted_ids(
        &self,
        _replica: Replica,
        since: DateTime<Utc>,
    ) -> Result<Vec<i32>, AppError> {
        self.since.lock().unwrap().push(("deleted", since));
        Ok(self.deleted_ids.clone())
    }

    async fn get_rejected_ids(
        &self,
        _replica: Replica,
        since: DateTime<Utc>,
    ) -> Result<Vec<i32>, AppError> {
        self.since.lock().unwrap().push(("rejected", since));
        Ok(self.rejected_ids.clone())
    }

    async fn get_last_modified_date(
        &self,
        _replica: Replica,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self.sightings.iter().map(|s| s.edit_date).max())
    }
}

// =============================================================================
// MockChecklistSource
// =============================================================================

#[derive(Clone, Default)]
pub struct MockChecklistSource {
    pub checklists: Arc<Vec<ChecklistEntity>>,
    pub taxa: Arc<Vec<ChecklistTaxonEntity>>,
    pub chunk_calls: Arc<AtomicUsize>,
}

impl MockChecklistSource {
    pub fn new(checklists: Vec<ChecklistEntity>, taxa: Vec<ChecklistTaxonEntity>) -> Self {
        Self {
            checklists: Arc::new(checklists),
            taxa: Arc::new(taxa),
            ..Self::default()
        }
    }
}

impl ChecklistSource for MockChecklistSource {
    async fn get_id_span(&self) -> Result<Option<(i32, i32)>, AppError> {
        let min = self.checklists.iter().map(|c| c.id).min();
        let max = self.checklists.iter().map(|c| c.id).max();
        Ok(min.zip(max))
    }

    async fn get_chunk(&self, chunk: IdChunk) -> Result<Vec<ChecklistEntity>, AppError> {
        self.chunk_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .checklists
            .iter()
            .filter(|c| chunk.contains(c.id))
            .cloned()
            .collect())
    }

    async fn get_checklist_taxa(
        &self,
        checklist_ids: &[i32],
    ) -> Result<Vec<ChecklistTaxonEntity>, AppError> {
        Ok(self
            .taxa
            .iter()
            .filter(|t| checklist_ids.contains(&t.checklist_id))
            .cloned()
            .collect())
    }
}

// =============================================================================
// MockSiteSource
// =============================================================================

#[derive(Clone, Default)]
pub struct MockSiteSource {
    sites: Arc<Vec<SiteEntity>>,
    areas: Arc<Vec<SiteAreaEntity>>,
    geometries: Arc<Vec<SiteGeometryEntity>>,
    frequent: Vec<i32>,
    /// Number of site row queries issued.
    pub site_queries: Arc<AtomicUsize>,
    /// Every id passed to a site row query.
    pub requested_ids: Arc<Mutex<Vec<i32>>>,
}

impl MockSiteSource {
    pub fn new(sites: Vec<SiteEntity>) -> Self {
        Self {
            sites: Arc::new(sites),
            ..Self::default()
        }
    }

    pub fn with_areas(mut self, areas: Vec<SiteAreaEntity>) -> Self {
        self.areas = Arc::new(areas);
        self
    }

    pub fn with_geometries(mut self, geometries: Vec<SiteGeometryEntity>) -> Self {
        self.geometries = Arc::new(geometries);
        self
    }

    pub fn with_frequent(mut self, ids: Vec<i32>) -> Self {
        self.frequent = ids;
        self
    }

    pub fn site_queries(&self) -> usize {
        self.site_queries.load(Ordering::SeqCst)
    }

    pub fn requested_ids(&self) -> Vec<i32> {
        self.requested_ids.lock().unwrap().clone()
    }
}

impl SiteSource for MockSiteSource {
    async fn get_by_ids(&self, ids: &[i32]) -> Result<Vec<SiteEntity>, AppError> {
        self.site_queries.fetch_add(1, Ordering::SeqCst);
        self.requested_ids.lock().unwrap().extend_from_slice(ids);
        Ok(self
            .sites
            .iter()
            .filter(|s| ids.contains(&s.id))
            .cloned()
            .collect())
    }

    async fn get_areas_by_ids(&self, ids: &[i32]) -> Result<Vec<SiteAreaEntity>, AppError> {
        Ok(self
            .areas
            .iter()
            .filter(|a| ids.contains(&a.site_id))
            .cloned()
            .collect())
    }

    async fn get_geometries_by_ids(
        &self,
        ids: &[i32],
    ) -> Result<Vec<SiteGeometryEntity>, AppError> {
        Ok(self
            .geometries
            .iter()
            .filter(|g| ids.contains(&g.site_id))
            .cloned()
            .collect())
    }

    async fn get_frequently_used_ids(&self) -> Result<Vec<i32>, AppError> {
        Ok(self.frequent.clone())
    }
}

// =============================================================================
// MockEnrichmentSource
// =============================================================================

#[derive(Clone, Default)]
pub struct MockEnrichmentSource {
    pub projects: Arc<Vec<SightingProjectEntity>>,
    pub parameters: Arc<Vec<ProjectParameterEntity>>,
    pub relations: Arc<Vec<SightingRelationEntity>>,
    pub collection_items: Arc<Vec<SpeciesCollectionItemEntity>>,
    pub media: Arc<Vec<MediaEntity>>,
    pub queries: Arc<AtomicUsize>,
}

impl MockEnrichmentSource {
    fn select<T: Clone>(&self, rows: &[T], ids: &[i32], sighting_id: impl Fn(&T) -> i32) -> Vec<T> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        rows.iter()
            .filter(|row| ids.contains(&sighting_id(row)))
            .cloned()
            .collect()
    }
}

impl SightingEnrichmentSource for MockEnrichmentSource {
    async fn get_sighting_projects(
        &self,
        sighting_ids: &[i32],
    ) -> Result<Vec<SightingProjectEntity>, AppError> {
        Ok(self.select(&self.projects, sighting_ids, |r| r.sighting_id))
    }

    async fn get_project_parameters(
        &self,
        sighting_ids: &[i32],
    ) -> Result<Vec<ProjectParameterEntity>, AppError> {
        Ok(self.select(&self.parameters, sighting_ids, |r| r.sighting_id))
    }

    async fn get_sighting_relations(
        &self,
        sighting_ids: &[i32],
    ) -> Result<Vec<SightingRelationEntity>, AppError> {
        Ok(self.select(&self.relations, sighting_ids, |r| r.sighting_id))
    }

    async fn get_species_collection_items(
        &self,
        sighting_ids: &[i32],
    ) -> Result<Vec<SpeciesCollectionItemEntity>, AppError> {
        Ok(self.select(&self.collection_items, sighting_ids, |r| r.sighting_id))
    }

    async fn get_media(&self, sighting_ids: &[i32]) -> Result<Vec<MediaEntity>, AppError> {
        Ok(self.select(&self.media, sighting_ids, |r| r.sighting_id))
    }
}

// =============================================================================
// MockMetadataSource
// =============================================================================

#[derive(Clone, Default)]
pub struct MockMetadataSource {
    pub codes: Arc<HashMap<MetadataTable, Vec<MetadataEntity>>>,
    pub organizations: Arc<Vec<OrganizationEntity>>,
    pub taxa: Arc<Vec<TaxonEntity>>,
    pub persons: Arc<Vec<PersonEntity>>,
    pub projects: Arc<Vec<ProjectEntity>>,
    /// Number of taxon table reads, one per static metadata load.
    pub taxa_loads: Arc<AtomicUsize>,
    /// Number of person table reads, one per dynamic metadata load.
    pub person_loads: Arc<AtomicUsize>,
}

impl MockMetadataSource {
    pub fn with_taxa(taxa: Vec<TaxonEntity>) -> Self {
        Self {
            taxa: Arc::new(taxa),
            ..Self::default()
        }
    }

    pub fn taxa_loads(&self) -> usize {
        self.taxa_loads.load(Ordering::SeqCst)
    }

    pub fn person_loads(&self) -> usize {
        self.person_loads.load(Ordering::SeqCst)
    }
}

impl MetadataSource for MockMetadataSource {
    async fn get_metadata(&self, table: MetadataTable) -> Result<Vec<MetadataEntity>, AppError> {
        Ok(self.codes.get(&table).cloned().unwrap_or_default())
    }

    async fn get_organizations(&self) -> Result<Vec<OrganizationEntity>, AppError> {
        Ok(self.organizations.to_vec())
    }

    async fn get_taxa(&self) -> Result<Vec<TaxonEntity>, AppError> {
        self.taxa_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.taxa.to_vec())
    }

    async fn get_persons(&self) -> Result<Vec<PersonEntity>, AppError> {
        self.person_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.persons.to_vec())
    }

    async fn get_projects(&self) -> Result<Vec<ProjectEntity>, AppError> {
        Ok(self.projects.to_vec())
    }
}

// =============================================================================
// MockVocabularySource
// =============================================================================

#[derive(Clone, Default)]
pub struct MockVocabularySource {
    pub vocabularies: Arc<Vec<Vocabulary>>,
}

impl VocabularySource for MockVocabularySource {
    async fn get_all(&self) -> Result<Vec<Vocabulary>, AppError> {
        Ok(self.vocabularies.to_vec())
    }
}

// =============================================================================
// MockVerbatimStore
// =============================================================================

/// Verbatim collections held as JSON, keyed by collection name and mode.
#[derive(Clone, Default)]
pub struct MockVerbatimStore {
    collections: Arc<Mutex<HashMap<String, BTreeMap<i32, serde_json::Value>>>>,
    pub log: CallLog,
}

impl MockVerbatimStore {
    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    fn key<T: VerbatimRecord>(mode: HarvestMode) -> String {
        format!("{}_{}", T::COLLECTION, mode.as_str())
    }

    pub fn has_collection<T: VerbatimRecord>(&self, mode: HarvestMode) -> bool {
        self.collections
            .lock()
            .unwrap()
            .contains_key(&Self::key::<T>(mode))
    }

    /// Records of a collection in id order.
    pub fn records<T: VerbatimRecord>(&self, mode: HarvestMode) -> Vec<T> {
        self.collections
            .lock()
            .unwrap()
            .get(&Self::key::<T>(mode))
            .map(|c| {
                c.values()
                    .map(|v| serde_json::from_value(v.clone()).unwrap())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Stores records without going through the trait.
    pub fn seed<T: VerbatimRecord>(&self, mode: HarvestMode, records: &[T]) {
        let mut collections = self.collections.lock().unwrap();
        let collection = collections.entry(Self::key::<T>(mode)).or_default();
        for record in records {
            collection.insert(record.record_id(), serde_json::to_value(record).unwrap());
        }
    }
}

impl VerbatimStore for MockVerbatimStore {
    async fn delete_collection<T: VerbatimRecord>(&self, mode: HarvestMode) -> Result<(), AppError> {
        self.log.push(format!("delete_collection:{}", T::COLLECTION));
        self.collections
            .lock()
            .unwrap()
            .remove(&Self::key::<T>(mode));
        Ok(())
    }

    async fn add_collection<T: VerbatimRecord>(&self, mode: HarvestMode) -> Result<(), AppError> {
        self.log.push(format!("add_collection:{}", T::COLLECTION));
        self.collections
            .lock()
            .unwrap()
            .insert(Self::key::<T>(mode), BTreeMap::new());
        Ok(())
    }

    async fn add_many<T: VerbatimRecord>(
        &self,
        mode: HarvestMode,
        records: &[T],
    ) -> Result<usize, AppError> {
        let values = records
            .iter()
            .map(|r| Ok((r.record_id(), serde_json::to_value(r)?)))
            .collect::<Result<Vec<_>, AppError>>()?;
        self.log.push(format!("add_many:{}", T::COLLECTION));
        let mut collections = self.collections.lock().unwrap();
        let collection = collections.entry(Self::key::<T>(mode)).or_default();
        collection.extend(values);
        Ok(records.len())
    }

    async fn get_batch<T: VerbatimRecord>(
        &self,
        mode: HarvestMode,
        after_id: i32,
        limit: usize,
    ) -> Result<Vec<T>, AppError> {
        let values: Vec<serde_json::Value> = self
            .collections
            .lock()
            .unwrap()
            .get(&Self::key::<T>(mode))
            .map(|c| {
                c.range(after_id.saturating_add(1)..)
                    .take(limit)
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .unwrap_or_default();
        values
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(AppError::from))
            .collect()
    }

    async fn count<T: VerbatimRecord>(&self, mode: HarvestMode) -> Result<u64, AppError> {
        Ok(self
            .collections
            .lock()
            .unwrap()
            .get(&Self::key::<T>(mode))
            .map_or(0, |c| c.len() as u64))
    }
}

// =============================================================================
// MockObservationIndex
// =============================================================================

#[derive(Clone, Default)]
pub struct MockObservationIndex {
    public: Arc<Mutex<BTreeMap<String, Observation>>>,
    protected: Arc<Mutex<BTreeMap<String, Observation>>>,
    latest_modified: Option<DateTime<Utc>>,
    pub log: CallLog,
}

impl MockObservationIndex {
    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Reports `date` as the latest indexed modification.
    pub fn with_latest_modified(mut self, date: DateTime<Utc>) -> Self {
        self.latest_modified = Some(date);
        self
    }

    fn half(&self, protected: bool) -> &Arc<Mutex<BTreeMap<String, Observation>>> {
        if protected { &self.protected } else { &self.public }
    }

    fn label(protected: bool) -> &'static str {
        if protected { "protected" } else { "public" }
    }

    pub fn observations(&self, protected: bool) -> Vec<Observation> {
        self.half(protected).lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, occurrence_id: &str, protected: bool) -> Option<Observation> {
        self.half(protected)
            .lock()
            .unwrap()
            .get(occurrence_id)
            .cloned()
    }

    /// Stores observations without going through the trait.
    pub fn seed(&self, observations: Vec<Observation>, protected: bool) {
        let mut half = self.half(protected).lock().unwrap();
        for observation in observations {
            half.insert(observation.occurrence_id().to_string(), observation);
        }
    }
}

impl ObservationIndex for MockObservationIndex {
    async fn delete_by_occurrence_ids(
        &self,
        occurrence_ids: &[String],
        protected: bool,
    ) -> Result<u64, AppError> {
        self.log
            .push(format!("delete_ids:{}", Self::label(protected)));
        let mut half = self.half(protected).lock().unwrap();
        Ok(occurrence_ids
            .iter()
            .filter(|id| half.remove(id.as_str()).is_some())
            .count() as u64)
    }

    async fn delete_provider_data(
        &self,
        data_provider_id: i32,
        protected: bool,
    ) -> Result<u64, AppError> {
        self.log
            .push(format!("delete_provider:{}", Self::label(protected)));
        let mut half = self.half(protected).lock().unwrap();
        let before = half.len();
        half.retain(|_, o| o.data_provider_id != data_provider_id);
        Ok((before - half.len()) as u64)
    }

    async fn add_many(
        &self,
        observations: &[Observation],
        protected: bool,
    ) -> Result<usize, AppError> {
        self.log.push(format!("add:{}", Self::label(protected)));
        let mut half = self.half(protected).lock().unwrap();
        for observation in observations {
            half.insert(observation.occurrence_id().to_string(), observation.clone());
        }
        Ok(observations.len())
    }

    async fn get_latest_modified_date(
        &self,
        _data_provider_id: i32,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self.latest_modified)
    }
}

// =============================================================================
// MockHarvestInfoStore
// =============================================================================

#[derive(Clone, Default)]
pub struct MockHarvestInfoStore {
    pub saved: Arc<Mutex<Vec<HarvestInfo>>>,
    failing: bool,
}

impl MockHarvestInfoStore {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn saved(&self) -> Vec<HarvestInfo> {
        self.saved.lock().unwrap().clone()
    }
}

impl HarvestInfoStore for MockHarvestInfoStore {
    async fn save(&self, info: &HarvestInfo) -> Result<(), AppError> {
        if self.failing {
            return Err(AppError::StoreError("harvest info unavailable".to_string()));
        }
        self.saved.lock().unwrap().push(info.clone());
        Ok(())
    }

    async fn get_latest(&self, id: &str) -> Result<Option<HarvestInfo>, AppError> {
        Ok(self
            .saved
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.id == id)
            .max_by_key(|i| i.start)
            .cloned())
    }
}
