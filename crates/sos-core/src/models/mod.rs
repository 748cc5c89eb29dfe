//! Data types flowing through the pipeline, from source rows to processed
//! observations.

pub mod observation;
pub mod site;
pub mod source;
pub mod verbatim;
pub mod vocabulary;

pub use observation::{
    AccessRights, ArtportalenInternal, DiffusionStatus, Event, ExtendedMeasurementOrFact,
    Identification, Location, Multimedia, Observation, Occurrence, OccurrenceStatus,
    TaxonReference, sighting_occurrence_id,
};
pub use site::{Area, AreaType, DEFAULT_ACCURACY, Site};
pub use source::{
    ChecklistEntity, ChecklistTaxonEntity, MediaEntity, MetadataEntity, OrganizationEntity,
    PersonEntity, ProjectEntity, ProjectParameterEntity, SightingEntity, SightingProjectEntity,
    SightingRelationEntity, SightingRelationType, SiteAreaEntity, SiteEntity, SiteGeometryEntity,
    SpeciesCollectionItemEntity, TaxonEntity,
};
pub use verbatim::{
    PersonSighting, UserInternal, VerbatimChecklist, VerbatimMedia, VerbatimObservation,
    VerbatimProject, VerbatimProjectParameter, VerbatimRecord,
};
pub use vocabulary::{
    ExternalSystem, ExternalSystemMapping, MappingValue, Vocabulary, VocabularyEntry,
    VocabularyId, VocabularyValue,
};
