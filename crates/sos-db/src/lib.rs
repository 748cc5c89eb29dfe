//! SOS DB - PostgreSQL repository layer for the Artportalen harvester
//!
//! This crate implements the collaborator traits of `sos-core` with sqlx,
//! both for reading the Artportalen source database and for writing the
//! harvested and processed documents.
//!
//! # Overview
//!
//! Source side:
//! - [`SightingRepository`] - Sightings, routed to the live or backup replica
//! - [`ChecklistRepository`] - Checklists and their taxa
//! - [`SiteRepository`] - Sites, area memberships and WKT geometries
//! - [`EnrichmentRepository`] - Projects, parameters, relations, specimens and media
//! - [`MetadataRepository`] - Code tables, organizations, taxa, persons and projects
//! - [`VocabularyRepository`] - Canonical vocabularies
//!
//! Destination side:
//! - [`VerbatimRepository`] - Verbatim collections as JSONB tables
//! - [`ObservationRepository`] - Public and protected observation tables
//! - [`HarvestInfoRepository`] - Run history

mod enrichment_repository;
mod harvest_info_repository;
mod metadata_repository;
mod observation_repository;
mod sighting_repository;
mod site_repository;
mod verbatim_repository;

pub use enrichment_repository::EnrichmentRepository;
pub use harvest_info_repository::HarvestInfoRepository;
pub use metadata_repository::{MetadataRepository, VocabularyRepository};
pub use observation_repository::ObservationRepository;
pub use sighting_repository::{ChecklistRepository, SightingRepository};
pub use site_repository::{FREQUENT_SITE_THRESHOLD, SiteRepository};
pub use verbatim_repository::{VerbatimRepository, collection_table};
