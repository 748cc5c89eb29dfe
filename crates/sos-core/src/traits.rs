//! Trait definitions for the collaborators of the harvest pipeline.
//!
//! The core never talks to a database directly. Every source query and every
//! write goes through one of these traits, so the harvesters can run against
//! PostgreSQL in production (`sos-db`) and against in-memory mocks in tests.
//!
//! # Example
//!
//! ```
//! use sos_core::traits::SightingSource;
//! use sos_core::{AppError, Replica};
//!
//! async fn span_width<S: SightingSource>(source: &S) -> Result<i32, AppError> {
//!     let span = source.get_id_span(Replica::Live).await?;
//!     Ok(span.map(|(min, max)| max - min).unwrap_or(0))
//! }
//! ```

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::AppError;
use crate::chunking::IdChunk;
use crate::config::Replica;
use crate::harvest_info::{HarvestInfo, HarvestMode};
use crate::metadata::MetadataTable;
use crate::models::{
    ChecklistEntity, ChecklistTaxonEntity, MediaEntity, MetadataEntity, Observation,
    OrganizationEntity, PersonEntity, ProjectEntity, ProjectParameterEntity, SightingEntity,
    SightingProjectEntity, SightingRelationEntity, SiteAreaEntity, SiteEntity,
    SiteGeometryEntity, SpeciesCollectionItemEntity, TaxonEntity, VerbatimRecord, Vocabulary,
};

/// Read access to Artportalen sightings.
///
/// Every call names the replica it is sent to. Full harvests read the hot
/// standby, incremental harvests read the primary.
pub trait SightingSource: Send + Sync + Clone {
    /// Smallest and largest sighting id, or `None` when there are no sightings.
    fn get_id_span(
        &self,
        replica: Replica,
    ) -> impl Future<Output = Result<Option<(i32, i32)>, AppError>> + Send;

    /// Sightings whose id falls in `chunk`.
    fn get_chunk(
        &self,
        replica: Replica,
        chunk: IdChunk,
    ) -> impl Future<Output = Result<Vec<SightingEntity>, AppError>> + Send;

    /// Sightings with the given ids.
    fn get_by_ids(
        &self,
        replica: Replica,
        ids: &[i32],
    ) -> impl Future<Output = Result<Vec<SightingEntity>, AppError>> + Send;

    /// Ids of sightings edited at or after `since`, oldest edit first, at most
    /// `limit`. Sightings sharing the watermark's edit time are returned again
    /// so a limit that cut through them loses none.
    fn get_modified_ids(
        &self,
        replica: Replica,
        since: DateTime<Utc>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<i32>, AppError>> + Send;

    /// Ids of sightings deleted after `since`.
    fn get_deleted_ids(
        &self,
        replica: Replica,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<i32>, AppError>> + Send;

    /// Ids of sightings rejected by validators after `since`.
    fn get_rejected_ids(
        &self,
        replica: Replica,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<i32>, AppError>> + Send;

    /// Latest edit date in the source.
    fn get_last_modified_date(
        &self,
        replica: Replica,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>, AppError>> + Send;
}

/// Read access to Artportalen checklists.
pub trait ChecklistSource: Send + Sync + Clone {
    fn get_id_span(&self) -> impl Future<Output = Result<Option<(i32, i32)>, AppError>> + Send;

    fn get_chunk(
        &self,
        chunk: IdChunk,
    ) -> impl Future<Output = Result<Vec<ChecklistEntity>, AppError>> + Send;

    /// Taxa listed on the given checklists.
    fn get_checklist_taxa(
        &self,
        checklist_ids: &[i32],
    ) -> impl Future<Output = Result<Vec<ChecklistTaxonEntity>, AppError>> + Send;
}

/// Site rows, their area memberships and geometries.
///
/// Geometries are a separate query because joining them onto site rows is
/// considerably slower.
pub trait SiteSource: Send + Sync + Clone {
    fn get_by_ids(
        &self,
        ids: &[i32],
    ) -> impl Future<Output = Result<Vec<SiteEntity>, AppError>> + Send;

    fn get_areas_by_ids(
        &self,
        ids: &[i32],
    ) -> impl Future<Output = Result<Vec<SiteAreaEntity>, AppError>> + Send;

    fn get_geometries_by_ids(
        &self,
        ids: &[i32],
    ) -> impl Future<Output = Result<Vec<SiteGeometryEntity>, AppError>> + Send;

    /// Ids of sites referenced by many sightings, used to prime the cache.
    fn get_frequently_used_ids(&self) -> impl Future<Output = Result<Vec<i32>, AppError>> + Send;
}

/// Batched enrichment queries for a set of sightings.
pub trait SightingEnrichmentSource: Send + Sync + Clone {
    fn get_sighting_projects(
        &self,
        sighting_ids: &[i32],
    ) -> impl Future<Output = Result<Vec<SightingProjectEntity>, AppError>> + Send;

    fn get_project_parameters(
        &self,
        sighting_ids: &[i32],
    ) -> impl Future<Output = Result<Vec<ProjectParameterEntity>, AppError>> + Send;

    fn get_sighting_relations(
        &self,
        sighting_ids: &[i32],
    ) -> impl Future<Output = Result<Vec<SightingRelationEntity>, AppError>> + Send;

    fn get_species_collection_items(
        &self,
        sighting_ids: &[i32],
    ) -> impl Future<Output = Result<Vec<SpeciesCollectionItemEntity>, AppError>> + Send;

    fn get_media(
        &self,
        sighting_ids: &[i32],
    ) -> impl Future<Output = Result<Vec<MediaEntity>, AppError>> + Send;
}

/// Read-all queries for the reference tables.
pub trait MetadataSource: Send + Sync + Clone {
    /// Every translated row of one code table.
    fn get_metadata(
        &self,
        table: MetadataTable,
    ) -> impl Future<Output = Result<Vec<MetadataEntity>, AppError>> + Send;

    fn get_organizations(
        &self,
    ) -> impl Future<Output = Result<Vec<OrganizationEntity>, AppError>> + Send;

    fn get_taxa(&self) -> impl Future<Output = Result<Vec<TaxonEntity>, AppError>> + Send;

    fn get_persons(&self) -> impl Future<Output = Result<Vec<PersonEntity>, AppError>> + Send;

    fn get_projects(&self) -> impl Future<Output = Result<Vec<ProjectEntity>, AppError>> + Send;
}

pub trait VocabularySource: Send + Sync + Clone {
    fn get_all(&self) -> impl Future<Output = Result<Vec<Vocabulary>, AppError>> + Send;
}

/// Destination for verbatim records. One collection per record type and mode.
pub trait VerbatimStore: Send + Sync + Clone {
    /// Drops the collection. Dropping a missing collection is not an error.
    fn delete_collection<T: VerbatimRecord>(
        &self,
        mode: HarvestMode,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Creates an empty collection.
    fn add_collection<T: VerbatimRecord>(
        &self,
        mode: HarvestMode,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Writes records, replacing any with the same id. Returns the number written.
    fn add_many<T: VerbatimRecord>(
        &self,
        mode: HarvestMode,
        records: &[T],
    ) -> impl Future<Output = Result<usize, AppError>> + Send;

    /// Records with an id greater than `after_id`, ordered by id.
    fn get_batch<T: VerbatimRecord>(
        &self,
        mode: HarvestMode,
        after_id: i32,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<T>, AppError>> + Send;

    fn count<T: VerbatimRecord>(
        &self,
        mode: HarvestMode,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// The searchable observation index, split into a public and a protected half.
pub trait ObservationIndex: Send + Sync + Clone {
    /// Removes documents by occurrence id. Returns the number removed.
    fn delete_by_occurrence_ids(
        &self,
        occurrence_ids: &[String],
        protected: bool,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Removes every document of a data provider.
    fn delete_provider_data(
        &self,
        data_provider_id: i32,
        protected: bool,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Inserts or replaces observations keyed by occurrence id.
    fn add_many(
        &self,
        observations: &[Observation],
        protected: bool,
    ) -> impl Future<Output = Result<usize, AppError>> + Send;

    /// Latest `modified` date indexed for a provider, across both halves.
    fn get_latest_modified_date(
        &self,
        data_provider_id: i32,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>, AppError>> + Send;
}

/// Persistence of run results.
pub trait HarvestInfoStore: Send + Sync + Clone {
    fn save(&self, info: &HarvestInfo) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Most recent record for a harvest id.
    fn get_latest(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<HarvestInfo>, AppError>> + Send;
}
