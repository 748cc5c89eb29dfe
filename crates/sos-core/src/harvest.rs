//! Batch harvesting of Artportalen sightings and checklists.
//!
//! # Architecture
//!
//! The harvesters are generic over the collaborator traits in
//! [`crate::traits`], so the same code runs against PostgreSQL (`sos-db`) and
//! against in-memory mocks.
//!
//! # Full harvest
//!
//! The source id span is split into fixed-size chunks. Chunks are dispatched
//! through `buffer_unordered(no_of_threads)`: at most `no_of_threads` chunks
//! are fetched, cast and stored at a time, and every dispatched chunk runs to
//! completion even when a sibling fails. The verbatim collection is dropped
//! and recreated before the first chunk is stored.
//!
//! # Incremental harvest
//!
//! Reads the latest modified date already in the observation index, removes
//! documents of recently deleted or rejected sightings from both index
//! halves, then harvests the ids modified since that date, at most
//! `catch_up_limit` of them. Without a watermark the run falls back to
//! harvesting the whole span.
//!
//! # Cancellation
//!
//! The cancellation token is checked before the verbatim collection is
//! dropped or any index document is removed, and before each chunk is
//! dispatched. Chunks in flight finish. A cancelled run reports `Canceled`, or `CanceledSuccess`
//! when every dispatched chunk succeeded.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::AppError;
use crate::chunking::{IdChunk, cap_span_from_end, cap_span_from_start, chunk_ids, plan_id_chunks};
use crate::config::HarvestConfig;
use crate::harvest_info::{
    BatchOutcome, HarvestInfo, HarvestMode, HarvestTally, NOTHING_TO_HARVEST, RunStatus,
};
use crate::metadata::{DynamicMetadata, ReferenceMetadata, StaticMetadata};
use crate::models::{VerbatimChecklist, VerbatimObservation, sighting_occurrence_id};
use crate::progress::{HarvestEvent, ProgressReporter, SilentReporter};
use crate::site_cache::SiteCache;
use crate::traits::{
    ChecklistSource, MetadataSource, ObservationIndex, SightingEnrichmentSource, SightingSource,
    SiteSource, VerbatimStore,
};
use crate::verbatim_factory::{ChecklistTransformFactory, VerbatimTransformFactory};

/// Harvest id under which observation runs are recorded.
pub const OBSERVATION_HARVEST_ID: &str = "artportalen_observations";

/// Harvest id under which checklist runs are recorded.
pub const CHECKLIST_HARVEST_ID: &str = "artportalen_checklists";

/// The Artportalen source queries an observation harvest needs.
#[derive(Debug, Clone)]
pub struct ArtportalenSources<Sg, Si, En, Me> {
    pub sightings: Sg,
    pub sites: Si,
    pub enrichment: En,
    pub metadata: Me,
}

/// Status and count a harvest stage produced, before timestamps are added.
#[derive(Debug)]
struct RunOutcome {
    status: RunStatus,
    count: i64,
    note: Option<String>,
}

impl RunOutcome {
    fn nothing_to_harvest() -> Self {
        Self {
            status: RunStatus::Failed,
            count: NOTHING_TO_HARVEST,
            note: Some("Nothing to harvest".to_string()),
        }
    }

    fn from_tally(tally: HarvestTally, cancelled: bool) -> Self {
        let note = tally.first_error.as_ref().map(|e| {
            format!(
                "{} batch(es) failed, first error: {}",
                tally.failed_batches.len(),
                e
            )
        });
        Self {
            status: tally.status(cancelled),
            count: tally.count as i64,
            note,
        }
    }

    fn into_info(self, info: HarvestInfo) -> HarvestInfo {
        let info = info.finish(self.status, self.count, Utc::now());
        match self.note {
            Some(note) => info.with_note(note),
            None => info,
        }
    }
}

/// Fails with [`AppError::Cancelled`] once `cancel_token` is cancelled.
///
/// Called before a stage deletes anything, so a cancelled run leaves the
/// stores as they were.
pub(crate) fn checkpoint(cancel_token: &CancellationToken) -> Result<(), AppError> {
    if cancel_token.is_cancelled() {
        Err(AppError::Cancelled)
    } else {
        Ok(())
    }
}

/// Locks `mutex`, recovering the guard if a previous holder panicked.
///
/// Only used for caches that are assigned whole, so a poisoned value is
/// still complete.
fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Cache lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Turns a stage result into the final record. Errors never escape a run.
fn conclude<R: ProgressReporter>(
    info: HarvestInfo,
    result: Result<RunOutcome, AppError>,
    reporter: &R,
) -> HarvestInfo {
    let info = match result {
        Ok(outcome) => outcome.into_info(info),
        Err(e) if e.is_cancelled() => {
            reporter.report(HarvestEvent::Cancelled {
                harvest: info.id.as_str(),
                completed: 0,
                total: 0,
            });
            info.finish(RunStatus::Canceled, 0, Utc::now())
        }
        Err(e) => {
            error!(harvest = info.id.as_str(), error = %e, "Harvest failed");
            info.finish(RunStatus::Failed, 0, Utc::now())
                .with_note(e.to_string())
        }
    };
    reporter.report(HarvestEvent::Completed { info: &info });
    info
}

/// Runs `work` over `items` with at most `concurrency` items in flight.
///
/// Stops dispatching once `cancel_token` is cancelled. Every dispatched item
/// is awaited, and its failure is wrapped as [`AppError::BatchFailed`].
/// `total` is the expected number of items, used for progress only.
/// Returns the folded tally and whether dispatching stopped early.
pub(crate) async fn run_batches<T, S, F, Fut, R>(
    harvest: &str,
    items: S,
    total: usize,
    concurrency: usize,
    cancel_token: &CancellationToken,
    reporter: &R,
    work: F,
) -> (HarvestTally, bool)
where
    S: Stream<Item = T>,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<usize, AppError>>,
    R: ProgressReporter,
{
    reporter.report(HarvestEvent::ChunksPlanned {
        harvest,
        chunks: total,
    });

    let stopped = AtomicBool::new(false);
    let completed = AtomicUsize::new(0);

    let tally = items
        .enumerate()
        .take_while(|_| {
            let proceed = !cancel_token.is_cancelled();
            if !proceed {
                stopped.store(true, Ordering::Relaxed);
            }
            future::ready(proceed)
        })
        .map(|(batch_index, item)| {
            let batch = work(item);
            async move {
                let result = batch.await.map_err(|e| {
                    error!(
                        batch_index,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Harvest batch failed"
                    );
                    AppError::BatchFailed {
                        batch_index,
                        message: e.to_string(),
                    }
                });
                BatchOutcome {
                    batch_index,
                    result,
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .inspect(|outcome| {
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            match &outcome.result {
                Ok(count) => reporter.report(HarvestEvent::ChunkCompleted {
                    batch_index: outcome.batch_index,
                    count: *count,
                    completed: done,
                    total,
                }),
                Err(e) => {
                    let message = e.to_string();
                    reporter.report(HarvestEvent::ChunkFailed {
                        batch_index: outcome.batch_index,
                        error: &message,
                    });
                }
            }
        })
        .fold(HarvestTally::new(), |tally, outcome| {
            future::ready(tally.record(outcome))
        })
        .await;

    let cancelled = stopped.load(Ordering::Relaxed);
    if cancelled {
        reporter.report(HarvestEvent::Cancelled {
            harvest,
            completed: completed.load(Ordering::Relaxed),
            total,
        });
    }
    (tally, cancelled)
}

/// Harvests sightings into the verbatim store.
pub struct ObservationHarvester<Sg, Si, En, Me, V, I>
where
    Sg: SightingSource,
    Si: SiteSource,
    En: SightingEnrichmentSource,
    Me: MetadataSource,
    V: VerbatimStore,
    I: ObservationIndex,
{
    sources: ArtportalenSources<Sg, Si, En, Me>,
    verbatim_store: V,
    index: I,
    config: HarvestConfig,
    data_provider_id: i32,
    static_metadata: Mutex<Option<Arc<StaticMetadata>>>,
}

impl<Sg, Si, En, Me, V, I> ObservationHarvester<Sg, Si, En, Me, V, I>
where
    Sg: SightingSource,
    Si: SiteSource,
    En: SightingEnrichmentSource,
    Me: MetadataSource,
    V: VerbatimStore,
    I: ObservationIndex,
{
    /// Creates a harvester with default configuration.
    pub fn new(sources: ArtportalenSources<Sg, Si, En, Me>, verbatim_store: V, index: I) -> Self {
        Self::with_config(sources, verbatim_store, index, HarvestConfig::default(), 1)
    }

    pub fn with_config(
        sources: ArtportalenSources<Sg, Si, En, Me>,
        verbatim_store: V,
        index: I,
        config: HarvestConfig,
        data_provider_id: i32,
    ) -> Self {
        Self {
            sources,
            verbatim_store,
            index,
            config,
            data_provider_id,
            static_metadata: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Harvests sightings in `mode`. Always returns a result record.
    pub async fn harvest(&self, mode: HarvestMode, cancel_token: CancellationToken) -> HarvestInfo {
        self.harvest_with_progress(mode, cancel_token, &SilentReporter)
            .await
    }

    pub async fn harvest_with_progress<R: ProgressReporter>(
        &self,
        mode: HarvestMode,
        cancel_token: CancellationToken,
        reporter: &R,
    ) -> HarvestInfo {
        let info = HarvestInfo::new(OBSERVATION_HARVEST_ID, Utc::now());
        reporter.report(HarvestEvent::Started {
            harvest: OBSERVATION_HARVEST_ID,
            mode,
        });

        let result = if mode.is_incremental() {
            self.harvest_incremental(mode, &cancel_token, reporter)
                .await
        } else {
            self.harvest_span(mode, &cancel_token, reporter).await
        };
        conclude(info, result, reporter)
    }

    /// Loads reference metadata for a run.
    ///
    /// The static half is reused across incremental runs and reloaded on
    /// full runs. The dynamic half is always reloaded.
    async fn load_metadata(&self, reload_static: bool) -> Result<ReferenceMetadata, AppError> {
        let cached = if reload_static {
            None
        } else {
            self.cached_static_metadata().clone()
        };

        let statics = match cached {
            Some(statics) => statics,
            None => {
                let statics = Arc::new(StaticMetadata::load(&self.sources.metadata).await?);
                *self.cached_static_metadata() = Some(Arc::clone(&statics));
                statics
            }
        };
        let dynamics = Arc::new(DynamicMetadata::load(&self.sources.metadata).await?);
        Ok(ReferenceMetadata::new(statics, dynamics))
    }

    fn cached_static_metadata(&self) -> MutexGuard<'_, Option<Arc<StaticMetadata>>> {
        lock_recovering(&self.static_metadata)
    }

    async fn transform_factory(
        &self,
        metadata: ReferenceMetadata,
    ) -> Result<VerbatimTransformFactory<En, Si>, AppError> {
        let site_cache = Arc::new(SiteCache::new(
            self.sources.sites.clone(),
            self.config.no_of_threads,
            self.config.site_window_size,
        ));
        site_cache.cache_frequently_used_sites().await?;
        Ok(VerbatimTransformFactory::new(
            self.sources.enrichment.clone(),
            site_cache,
            metadata,
        ))
    }

    async fn recreate_collection(&self, mode: HarvestMode) -> Result<(), AppError> {
        self.verbatim_store
            .delete_collection::<VerbatimObservation>(mode)
            .await?;
        self.verbatim_store
            .add_collection::<VerbatimObservation>(mode)
            .await
    }

    /// Harvests the whole id span into the collection of `mode`.
    async fn harvest_span<R: ProgressReporter>(
        &self,
        mode: HarvestMode,
        cancel_token: &CancellationToken,
        reporter: &R,
    ) -> Result<RunOutcome, AppError> {
        let replica = self.config.replica_for(mode.is_incremental());
        let metadata = self.load_metadata(mode == HarvestMode::Full).await?;

        let Some((min_id, max_id)) = self.sources.sightings.get_id_span(replica).await? else {
            info!(replica = %replica, "No sightings in source");
            return Ok(RunOutcome::nothing_to_harvest());
        };
        let (min_id, max_id) = cap_span_from_end(
            min_id,
            max_id,
            self.config.max_number_of_sightings_harvested,
        );
        if min_id >= max_id {
            info!(min_id, max_id, "Nothing to harvest");
            return Ok(RunOutcome::nothing_to_harvest());
        }

        let chunks = plan_id_chunks(min_id, max_id, self.config.chunk_size);
        let total = chunks.len();
        info!(
            mode = mode.as_str(),
            replica = %replica,
            min_id,
            max_id,
            chunks = total,
            "Harvesting sightings"
        );

        checkpoint(cancel_token)?;
        self.recreate_collection(mode).await?;
        let factory = self.transform_factory(metadata).await?;

        let (tally, cancelled) = run_batches(
            OBSERVATION_HARVEST_ID,
            stream::iter(chunks),
            total,
            self.config.no_of_threads,
            cancel_token,
            reporter,
            |chunk: IdChunk| {
                let factory = &factory;
                async move {
                    let entities = self.sources.sightings.get_chunk(replica, chunk).await?;
                    let verbatims = factory.cast_entities_to_verbatims(&entities).await?;
                    self.verbatim_store.add_many(mode, &verbatims).await
                }
            },
        )
        .await;

        Ok(RunOutcome::from_tally(tally, cancelled))
    }

    async fn harvest_incremental<R: ProgressReporter>(
        &self,
        mode: HarvestMode,
        cancel_token: &CancellationToken,
        reporter: &R,
    ) -> Result<RunOutcome, AppError> {
        let Some(watermark) = self
            .index
            .get_latest_modified_date(self.data_provider_id)
            .await?
        else {
            warn!(
                mode = mode.as_str(),
                "No processed observations found, falling back to a full span harvest"
            );
            return self.harvest_span(mode, cancel_token, reporter).await;
        };

        let replica = self.config.incremental_replica;
        let metadata = self.load_metadata(false).await?;

        checkpoint(cancel_token)?;
        self.remove_deleted(mode, reporter).await?;

        let limit = self.config.catch_up_limit;
        let mut ids = self
            .sources
            .sightings
            .get_modified_ids(replica, watermark, limit)
            .await?;
        if ids.len() > limit {
            info!(
                fetched = ids.len(),
                limit,
                "Modified sightings exceed catch-up limit, deferring the rest"
            );
            ids.truncate(limit);
        }
        if ids.is_empty() {
            info!(%watermark, "No modified sightings");
            return Ok(RunOutcome {
                status: RunStatus::Success,
                count: 0,
                note: None,
            });
        }

        info!(
            mode = mode.as_str(),
            %watermark,
            modified = ids.len(),
            "Harvesting modified sightings"
        );

        checkpoint(cancel_token)?;
        self.recreate_collection(mode).await?;
        let factory = self.transform_factory(metadata).await?;
        let chunks = chunk_ids(&ids, self.config.incremental_chunk_size);
        let total = chunks.len();

        let (tally, cancelled) = run_batches(
            OBSERVATION_HARVEST_ID,
            stream::iter(chunks),
            total,
            self.config.no_of_threads,
            cancel_token,
            reporter,
            |chunk: Vec<i32>| {
                let factory = &factory;
                async move {
                    let entities = self.sources.sightings.get_by_ids(replica, &chunk).await?;
                    let verbatims = factory.cast_entities_to_verbatims(&entities).await?;
                    self.verbatim_store.add_many(mode, &verbatims).await
                }
            },
        )
        .await;

        Ok(RunOutcome::from_tally(tally, cancelled))
    }

    /// Removes processed documents of sightings deleted or rejected within
    /// the mode's lookback window, from both index halves.
    async fn remove_deleted<R: ProgressReporter>(
        &self,
        mode: HarvestMode,
        reporter: &R,
    ) -> Result<(), AppError> {
        let Some(lookback) = mode.deletion_lookback() else {
            return Ok(());
        };
        let replica = self.config.incremental_replica;
        let since = Utc::now() - lookback;

        let (deleted, rejected) = tokio::try_join!(
            self.sources.sightings.get_deleted_ids(replica, since),
            self.sources.sightings.get_rejected_ids(replica, since),
        )?;

        let mut ids: Vec<i32> = deleted.into_iter().chain(rejected).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(());
        }

        let occurrence_ids: Vec<String> = ids.into_iter().map(sighting_occurrence_id).collect();
        let (public, protected) = tokio::try_join!(
            self.index.delete_by_occurrence_ids(&occurrence_ids, false),
            self.index.delete_by_occurrence_ids(&occurrence_ids, true),
        )?;
        reporter.report(HarvestEvent::DeletionsApplied {
            count: public + protected,
        });
        Ok(())
    }
}

/// Harvests checklists into the verbatim store. Full mode only.
pub struct ChecklistHarvester<C, Si, Me, V>
where
    C: ChecklistSource,
    Si: SiteSource,
    Me: MetadataSource,
    V: VerbatimStore,
{
    checklists: C,
    sites: Si,
    metadata: Me,
    verbatim_store: V,
    config: HarvestConfig,
}

impl<C, Si, Me, V> ChecklistHarvester<C, Si, Me, V>
where
    C: ChecklistSource,
    Si: SiteSource,
    Me: MetadataSource,
    V: VerbatimStore,
{
    pub fn new(checklists: C, sites: Si, metadata: Me, verbatim_store: V) -> Self {
        Self::with_config(
            checklists,
            sites,
            metadata,
            verbatim_store,
            HarvestConfig::default(),
        )
    }

    pub fn with_config(
        checklists: C,
        sites: Si,
        metadata: Me,
        verbatim_store: V,
        config: HarvestConfig,
    ) -> Self {
        Self {
            checklists,
            sites,
            metadata,
            verbatim_store,
            config,
        }
    }

    pub async fn harvest(&self, cancel_token: CancellationToken) -> HarvestInfo {
        self.harvest_with_progress(cancel_token, &SilentReporter)
            .await
    }

    pub async fn harvest_with_progress<R: ProgressReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &R,
    ) -> HarvestInfo {
        let info = HarvestInfo::new(CHECKLIST_HARVEST_ID, Utc::now());
        reporter.report(HarvestEvent::Started {
            harvest: CHECKLIST_HARVEST_ID,
            mode: HarvestMode::Full,
        });
        let result = self.harvest_span(&cancel_token, reporter).await;
        conclude(info, result, reporter)
    }

    async fn harvest_span<R: ProgressReporter>(
        &self,
        cancel_token: &CancellationToken,
        reporter: &R,
    ) -> Result<RunOutcome, AppError> {
        let mode = HarvestMode::Full;
        let metadata = ReferenceMetadata::load(&self.metadata).await?;

        let Some((min_id, max_id)) = self.checklists.get_id_span().await? else {
            info!("No checklists in source");
            return Ok(RunOutcome::nothing_to_harvest());
        };
        let (min_id, max_id) = cap_span_from_start(
            min_id,
            max_id,
            self.config.max_number_of_checklists_harvested,
        );
        if min_id >= max_id {
            return Ok(RunOutcome::nothing_to_harvest());
        }
        let chunks = plan_id_chunks(min_id, max_id, self.config.chunk_size);
        let total = chunks.len();
        info!(min_id, max_id, chunks = total, "Harvesting checklists");

        checkpoint(cancel_token)?;
        self.verbatim_store
            .delete_collection::<VerbatimChecklist>(mode)
            .await?;
        self.verbatim_store
            .add_collection::<VerbatimChecklist>(mode)
            .await?;

        let site_cache = Arc::new(SiteCache::new(
            self.sites.clone(),
            self.config.no_of_threads,
            self.config.site_window_size,
        ));
        let factory =
            ChecklistTransformFactory::new(self.checklists.clone(), site_cache, metadata);

        let (tally, cancelled) = run_batches(
            CHECKLIST_HARVEST_ID,
            stream::iter(chunks),
            total,
            self.config.no_of_threads,
            cancel_token,
            reporter,
            |chunk: IdChunk| {
                let factory = &factory;
                async move {
                    let entities = self.checklists.get_chunk(chunk).await?;
                    let verbatims = factory.cast_entities_to_verbatims(&entities).await?;
                    self.verbatim_store.add_many(mode, &verbatims).await
                }
            },
        )
        .await;

        Ok(RunOutcome::from_tally(tally, cancelled))
    }
}
