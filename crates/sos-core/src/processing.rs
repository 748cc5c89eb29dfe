//! Processing of verbatim sightings into the observation index.
//!
//! Verbatim records are read page by page in id order. Each page is cast by
//! [`ObservationFactory`] and split between the two index halves:
//!
//! - Sensitive observations go to the protected index with their true
//!   position. When the site supports diffusion, a diffused copy also goes
//!   to the public index.
//! - Other observations go to the public index, diffused when the site asks
//!   for it.
//!
//! A full run clears the provider's documents once the first page is cast
//! and ready to write, so a run cancelled before that leaves the index
//! untouched. An incremental run
//! removes each page's occurrence ids from both halves before writing, so an
//! observation whose sensitivity changed does not linger in the other half.

use std::sync::Arc;

use chrono::Utc;
use futures::stream;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::AppError;
use crate::config::ProcessConfig;
use crate::harvest::{checkpoint, run_batches};
use crate::harvest_info::{HarvestInfo, HarvestMode, RunStatus};
use crate::metadata::StaticMetadata;
use crate::models::{Observation, Site, VerbatimObservation};
use crate::observation_factory::ObservationFactory;
use crate::progress::{HarvestEvent, ProgressReporter, SilentReporter};
use crate::traits::{MetadataSource, ObservationIndex, VerbatimStore, VocabularySource};
use crate::vocabulary::VocabularyResolver;

/// Harvest id under which processing runs are recorded.
pub const PROCESSING_ID: &str = "artportalen_processing";

/// Observations of one page, split by index half.
#[derive(Debug, Default)]
pub struct ProcessedPage {
    pub public: Vec<Observation>,
    pub protected: Vec<Observation>,
}

/// Casts a page of verbatim sightings and assigns each result to an index half.
pub fn process_page(
    factory: &ObservationFactory,
    verbatims: &[VerbatimObservation],
    diffuse_if_supported: bool,
) -> ProcessedPage {
    let mut page = ProcessedPage::default();
    for verbatim in verbatims {
        let observation = factory.create_processed_observation(verbatim, false);
        let diffused = diffuse_if_supported
            && verbatim
                .site
                .as_ref()
                .is_some_and(Site::supports_diffusion);
        match (observation.sensitive, diffused) {
            (true, true) => {
                page.protected.push(observation);
                page.public
                    .push(factory.create_processed_observation(verbatim, true));
            }
            (true, false) => page.protected.push(observation),
            (false, true) => page
                .public
                .push(factory.create_processed_observation(verbatim, true)),
            (false, false) => page.public.push(observation),
        }
    }
    page
}

pub struct ObservationProcessor<V, I, Me, Vo>
where
    V: VerbatimStore,
    I: ObservationIndex,
    Me: MetadataSource,
    Vo: VocabularySource,
{
    verbatim_store: V,
    index: I,
    metadata: Me,
    vocabularies: Vo,
    config: ProcessConfig,
}

impl<V, I, Me, Vo> ObservationProcessor<V, I, Me, Vo>
where
    V: VerbatimStore,
    I: ObservationIndex,
    Me: MetadataSource,
    Vo: VocabularySource,
{
    pub fn new(verbatim_store: V, index: I, metadata: Me, vocabularies: Vo) -> Self {
        Self::with_config(
            verbatim_store,
            index,
            metadata,
            vocabularies,
            ProcessConfig::default(),
        )
    }

    pub fn with_config(
        verbatim_store: V,
        index: I,
        metadata: Me,
        vocabularies: Vo,
        config: ProcessConfig,
    ) -> Self {
        Self {
            verbatim_store,
            index,
            metadata,
            vocabularies,
            config,
        }
    }

    pub async fn process(&self, mode: HarvestMode, cancel_token: CancellationToken) -> HarvestInfo {
        self.process_with_progress(mode, cancel_token, &SilentReporter)
            .await
    }

    pub async fn process_with_progress<R: ProgressReporter>(
        &self,
        mode: HarvestMode,
        cancel_token: CancellationToken,
        reporter: &R,
    ) -> HarvestInfo {
        let info = HarvestInfo::new(PROCESSING_ID, Utc::now());
        reporter.report(HarvestEvent::Started {
            harvest: PROCESSING_ID,
            mode,
        });

        let info = match self.run(mode, &cancel_token, reporter).await {
            Ok((status, count)) => info.finish(status, count, Utc::now()),
            Err(e) if e.is_cancelled() => {
                reporter.report(HarvestEvent::Cancelled {
                    harvest: PROCESSING_ID,
                    completed: 0,
                    total: 0,
                });
                info.finish(RunStatus::Canceled, 0, Utc::now())
            }
            Err(e) => {
                tracing::error!(error = %e, "Processing failed");
                info.finish(RunStatus::Failed, 0, Utc::now())
                    .with_note(e.to_string())
            }
        };
        reporter.report(HarvestEvent::Completed { info: &info });
        info
    }

    async fn run<R: ProgressReporter>(
        &self,
        mode: HarvestMode,
        cancel_token: &CancellationToken,
        reporter: &R,
    ) -> Result<(RunStatus, i64), AppError> {
        let (statics, vocabulary, verbatim_count) = tokio::try_join!(
            StaticMetadata::load(&self.metadata),
            VocabularyResolver::load(&self.vocabularies),
            self.verbatim_store.count::<VerbatimObservation>(mode),
        )?;
        let factory = ObservationFactory::new(
            Arc::new(vocabulary),
            Arc::new(statics),
            self.config.data_provider_id,
        );

        checkpoint(cancel_token)?;
        let cleared = OnceCell::new();

        let batch_size = self.config.batch_size.max(1);
        let total = (verbatim_count as usize).div_ceil(batch_size);
        info!(
            mode = mode.as_str(),
            verbatims = verbatim_count,
            pages = total,
            "Processing verbatim observations"
        );

        let store = self.verbatim_store.clone();
        let pages = stream::unfold(Some(i32::MIN), move |cursor| {
            let store = store.clone();
            async move {
                let Some(after_id) = cursor else {
                    return None;
                };
                match store
                    .get_batch::<VerbatimObservation>(mode, after_id, batch_size)
                    .await
                {
                    Ok(page) if page.is_empty() => None,
                    Ok(page) => {
                        let next = page.last().map(|v| v.sighting_id);
                        Some((Ok(page), next))
                    }
                    Err(e) => Some((Err(e), None)),
                }
            }
        });

        let (tally, cancelled) = run_batches(
            PROCESSING_ID,
            pages,
            total,
            self.config.no_of_threads,
            cancel_token,
            reporter,
            |page: Result<Vec<VerbatimObservation>, AppError>| {
                let factory = &factory;
                let cleared = &cleared;
                async move {
                    let page = page?;
                    self.write_page(factory, cleared, mode, &page).await
                }
            },
        )
        .await;

        Ok((tally.status(cancelled), tally.count as i64))
    }

    async fn write_page(
        &self,
        factory: &ObservationFactory,
        cleared: &OnceCell<()>,
        mode: HarvestMode,
        verbatims: &[VerbatimObservation],
    ) -> Result<usize, AppError> {
        let processed = process_page(factory, verbatims, self.config.diffuse_if_supported);

        if mode == HarvestMode::Full {
            cleared
                .get_or_try_init(|| self.clear_provider_data())
                .await?;
        } else {
            let ids: Vec<String> = processed
                .public
                .iter()
                .chain(processed.protected.iter())
                .map(|o| o.occurrence_id().to_string())
                .collect();
            tokio::try_join!(
                self.index.delete_by_occurrence_ids(&ids, false),
                self.index.delete_by_occurrence_ids(&ids, true),
            )?;
        }

        tokio::try_join!(
            self.index.add_many(&processed.public, false),
            self.index.add_many(&processed.protected, true),
        )?;
        Ok(verbatims.len())
    }

    /// Removes every document of the data provider from both index halves.
    async fn clear_provider_data(&self) -> Result<(), AppError> {
        let provider = self.config.data_provider_id;
        let (public, protected) = tokio::try_join!(
            self.index.delete_provider_data(provider, false),
            self.index.delete_provider_data(provider, true),
        )?;
        info!(public, protected, "Cleared processed observations");
        Ok(())
    }
}
