//! Scheduled entry points for the harvest stages.
//!
//! A job runs one stage, stores its [`HarvestInfo`], and turns the run
//! status into the result a scheduler acts on:
//!
//! ```text
//! Success                    -> Ok(true)
//! Canceled, CanceledSuccess  -> Ok(false)
//! Failed                     -> Err(AppError::HarvestFailed)
//! ```
//!
//! Failing to store the record is logged and does not change the result.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::AppError;
use crate::harvest::{ChecklistHarvester, ObservationHarvester};
use crate::harvest_info::{HarvestInfo, HarvestMode, RunStatus};
use crate::processing::ObservationProcessor;
use crate::progress::ProgressReporter;
use crate::traits::{
    ChecklistSource, HarvestInfoStore, MetadataSource, ObservationIndex,
    SightingEnrichmentSource, SightingSource, SiteSource, VerbatimStore, VocabularySource,
};

/// Message of the error a failed stage maps to.
pub const HARVEST_FAILED_MESSAGE: &str = "Artportalen harvest failed";

/// Runs harvest stages and records their results.
pub struct HarvestJob<S: HarvestInfoStore> {
    store: S,
}

impl<S: HarvestInfoStore> HarvestJob<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Awaits a stage, stores its record and maps its status.
    pub async fn run<F>(&self, stage: F) -> Result<bool, AppError>
    where
        F: Future<Output = HarvestInfo>,
    {
        let info = stage.await;
        self.persist(&info).await;
        outcome(&info)
    }

    pub async fn run_observations<Sg, Si, En, Me, V, I, R>(
        &self,
        harvester: &ObservationHarvester<Sg, Si, En, Me, V, I>,
        mode: HarvestMode,
        cancel_token: CancellationToken,
        reporter: &R,
    ) -> Result<bool, AppError>
    where
        Sg: SightingSource,
        Si: SiteSource,
        En: SightingEnrichmentSource,
        Me: MetadataSource,
        V: VerbatimStore,
        I: ObservationIndex,
        R: ProgressReporter,
    {
        self.run(harvester.harvest_with_progress(mode, cancel_token, reporter))
            .await
    }

    pub async fn run_checklists<C, Si, Me, V, R>(
        &self,
        harvester: &ChecklistHarvester<C, Si, Me, V>,
        cancel_token: CancellationToken,
        reporter: &R,
    ) -> Result<bool, AppError>
    where
        C: ChecklistSource,
        Si: SiteSource,
        Me: MetadataSource,
        V: VerbatimStore,
        R: ProgressReporter,
    {
        self.run(harvester.harvest_with_progress(cancel_token, reporter))
            .await
    }

    pub async fn run_processing<V, I, Me, Vo, R>(
        &self,
        processor: &ObservationProcessor<V, I, Me, Vo>,
        mode: HarvestMode,
        cancel_token: CancellationToken,
        reporter: &R,
    ) -> Result<bool, AppError>
    where
        V: VerbatimStore,
        I: ObservationIndex,
        Me: MetadataSource,
        Vo: VocabularySource,
        R: ProgressReporter,
    {
        self.run(processor.process_with_progress(mode, cancel_token, reporter))
            .await
    }

    /// Latest stored record of a harvest id.
    pub async fn latest(&self, harvest_id: &str) -> Result<Option<HarvestInfo>, AppError> {
        self.store.get_latest(harvest_id).await
    }

    async fn persist(&self, info: &HarvestInfo) {
        if let Err(e) = self.store.save(info).await {
            warn!(
                harvest = info.id.as_str(),
                error = %e,
                "Failed to store harvest info"
            );
        }
    }
}

/// Maps a finished run to the job result.
pub fn outcome(info: &HarvestInfo) -> Result<bool, AppError> {
    match info.status {
        RunStatus::Success => Ok(true),
        RunStatus::Canceled | RunStatus::CanceledSuccess => {
            info!(
                harvest = info.id.as_str(),
                status = info.status.as_str(),
                count = info.count,
                "Harvest was cancelled"
            );
            Ok(false)
        }
        RunStatus::Failed => Err(AppError::HarvestFailed(HARVEST_FAILED_MESSAGE.to_string())),
    }
}
