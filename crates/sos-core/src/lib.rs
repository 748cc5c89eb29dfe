//! SOS Core - Artportalen harvesting engine.
//!
//! This crate provides the core functionality for harvesting Artportalen
//! sightings into the Species Observation System, including:
//!
//! - **Harvesters**: [`ObservationHarvester`] and [`ChecklistHarvester`] split the
//!   source id span into chunks and harvest them with bounded concurrency
//! - **Caching**: [`SiteCache`] shares site lookups across concurrent batches
//! - **Factories**: [`VerbatimTransformFactory`] joins source rows with reference
//!   data, [`ObservationFactory`] casts verbatim records into processed observations
//! - **Processing**: [`ObservationProcessor`] writes observations to the public
//!   and protected index halves
//! - **Run records**: [`HarvestInfo`] and [`RunStatus`], stored by [`HarvestJob`]
//! - **Progress reporting**: [`ProgressReporter`] trait for decoupled logging/UI
//!
//! # Architecture
//!
//! Business logic is decoupled from I/O through the traits in [`traits`]:
//!
//! - [`SightingSource`], [`SiteSource`], [`MetadataSource`] and friends read the
//!   Artportalen database (e.g., `sos-db` over PostgreSQL)
//! - [`VerbatimStore`] and [`ObservationIndex`] hold harvested and processed documents
//! - [`HarvestInfoStore`] keeps the run history
//!
//! # Example
//!
//! ```ignore
//! use sos_core::{HarvestJob, HarvestMode, ObservationHarvester, TracingReporter};
//! use tokio_util::sync::CancellationToken;
//!
//! let harvester = ObservationHarvester::with_config(sources, verbatim, index, config, 1);
//! let job = HarvestJob::new(info_store);
//! let done = job
//!     .run_observations(&harvester, HarvestMode::Full, CancellationToken::new(), &TracingReporter)
//!     .await?;
//! ```

pub mod chunking;
pub mod config;
pub mod error;
pub mod geometry;
pub mod harvest;
pub mod harvest_info;
pub mod job;
pub mod metadata;
pub mod models;
pub mod observation_factory;
pub mod processing;
pub mod progress;
pub mod site_cache;
pub mod traits;
pub mod verbatim_factory;
pub mod vocabulary;

// Configuration
pub use config::{
    HarvestConfig, ProcessConfig, Replica, SosConfig, default_config_path, load_config,
    parse_config,
};

// Error handling
pub use error::AppError;

// Chunk planning
pub use chunking::{IdChunk, plan_id_chunks};

// Run records
pub use harvest_info::{HarvestInfo, HarvestMode, HarvestTally, NOTHING_TO_HARVEST, RunStatus};

// Reference data
pub use metadata::{DynamicMetadata, ReferenceMetadata, StaticMetadata};
pub use vocabulary::VocabularyResolver;

// Progress reporting
pub use progress::{HarvestEvent, ProgressReporter, SilentReporter, TracingReporter};

// Traits for dependency injection
pub use traits::{
    ChecklistSource, HarvestInfoStore, MetadataSource, ObservationIndex,
    SightingEnrichmentSource, SightingSource, SiteSource, VerbatimStore, VocabularySource,
};

// Services (generic over trait implementations)
pub use harvest::{ArtportalenSources, ChecklistHarvester, ObservationHarvester};
pub use observation_factory::ObservationFactory;
pub use processing::ObservationProcessor;
pub use site_cache::SiteCache;
pub use verbatim_factory::{ChecklistTransformFactory, VerbatimTransformFactory};

// Scheduled entry points
pub use job::HarvestJob;
