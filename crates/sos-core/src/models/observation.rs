//! The processed, provider-independent observation document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Polygon};
use crate::models::site::Area;
use crate::models::verbatim::UserInternal;
use crate::models::vocabulary::VocabularyValue;

const OCCURRENCE_ID_PREFIX: &str = "urn:lsid:artportalen.se:sighting:";

/// Occurrence id of the observation processed from a sighting.
///
/// ```
/// use sos_core::models::sighting_occurrence_id;
/// assert_eq!(sighting_occurrence_id(42), "urn:lsid:artportalen.se:sighting:42");
/// ```
pub fn sighting_occurrence_id(sighting_id: i32) -> String {
    format!("{OCCURRENCE_ID_PREFIX}{sighting_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OccurrenceStatus {
    Present,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessRights {
    FreeUsage,
    NotForPublicUsage,
}

impl AccessRights {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FreeUsage => "Free usage",
            Self::NotForPublicUsage => "Not for public usage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffusionStatus {
    NotDiffused,
    DiffusedBySystem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// `urn:lsid:artportalen.se:event:{hash}`, stable for a site and date.
    pub event_id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub verbatim_event_date: String,
    pub habitat: Option<String>,
    pub sampling_protocol: Option<String>,
    pub discovery_method: Option<VocabularyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub location_id: Option<String>,
    pub locality: Option<String>,
    pub decimal_longitude: Option<f64>,
    pub decimal_latitude: Option<f64>,
    pub coordinate_uncertainty_in_meters: Option<i32>,
    pub point: Option<Point>,
    pub point_with_buffer: Option<Polygon>,
    /// Buffer hint in meters from the taxon's disturbance radius.
    pub disturbance_radius: Option<i32>,
    pub county: Option<Area>,
    pub municipality: Option<Area>,
    pub parish: Option<Area>,
    pub province: Option<Area>,
    pub country_region: Option<Area>,
    pub geodetic_datum: String,
    pub verbatim_srs: String,
    pub verbatim_longitude: Option<f64>,
    pub verbatim_latitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Multimedia {
    pub identifier: String,
    pub created: Option<DateTime<Utc>>,
    pub rights_holder: Option<String>,
    pub license: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    /// `urn:lsid:artportalen.se:sighting:{id}`.
    pub occurrence_id: String,
    pub catalog_number: String,
    pub catalog_id: i32,
    pub individual_count: Option<String>,
    pub organism_quantity: Option<String>,
    pub organism_quantity_int: Option<i32>,
    pub organism_quantity_unit: Option<VocabularyValue>,
    pub occurrence_status: OccurrenceStatus,
    pub is_positive_observation: bool,
    pub is_natural_occurrence: bool,
    pub is_never_found_observation: bool,
    pub is_not_rediscovered_observation: bool,
    pub protection_level: i32,
    pub sensitivity_category: i32,
    pub recorded_by: Option<String>,
    pub reported_by: Option<String>,
    pub occurrence_remarks: Option<String>,
    pub url: String,
    pub activity: Option<VocabularyValue>,
    pub biotope: Option<VocabularyValue>,
    pub biotope_description: Option<String>,
    pub sex: Option<VocabularyValue>,
    pub life_stage: Option<VocabularyValue>,
    pub substrate: Option<VocabularyValue>,
    pub substrate_description: Option<String>,
    /// `0` for non-birds, the activity id for birds, or 1 000 000 when a bird
    /// has no activity.
    pub bird_nest_activity_id: i32,
    pub media: Vec<Multimedia>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    pub validated: bool,
    pub verified: bool,
    pub verification_status: Option<VocabularyValue>,
    pub determination_method: Option<VocabularyValue>,
    pub uncertain_identification: bool,
    pub identified_by: Option<String>,
    pub date_identified: Option<String>,
    pub verified_by: Option<String>,
    pub confirmed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonReference {
    /// Canonical taxon id, `-1` when the taxon is not known.
    pub id: i32,
    pub verbatim_id: Option<i32>,
    pub scientific_name: Option<String>,
    pub vernacular_name: Option<String>,
    pub organism_group: Option<String>,
    pub protection_level: i32,
    pub disturbance_radius: i32,
}

/// Artportalen specific fields kept for access control and display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtportalenInternal {
    pub sighting_id: i32,
    pub sighting_type_id: i32,
    pub checklist_id: Option<i32>,
    pub has_images: bool,
    pub observers_internal: Vec<UserInternal>,
    pub report_by_user_id: Option<i32>,
    pub species_collection_item_id: Option<i32>,
    pub species_collection_label: Option<String>,
    pub location_external_id: Option<String>,
    pub location_presentation_name: Option<String>,
    pub parent_location_id: Option<i32>,
    pub parent_location: Option<String>,
    pub diffusion_id: i32,
    pub project_ids: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedMeasurementOrFact {
    pub occurrence_id: String,
    pub measurement_id: Option<String>,
    pub measurement_type: String,
    pub measurement_value: Option<String>,
    pub measurement_unit: Option<String>,
    pub measurement_method: Option<String>,
    pub measurement_remarks: Option<String>,
}

/// Processed observation as stored in the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub data_provider_id: i32,
    pub dataset_id: String,
    pub dataset_name: String,
    pub basis_of_record: String,
    pub collection_code: String,
    pub institution_code: Option<String>,
    pub rights_holder: Option<String>,
    pub access_rights: AccessRights,
    pub modified: DateTime<Utc>,
    pub sensitive: bool,
    pub protected: bool,
    pub diffusion_status: DiffusionStatus,
    pub event: Event,
    pub location: Option<Location>,
    pub occurrence: Occurrence,
    pub identification: Identification,
    pub taxon: TaxonReference,
    pub artportalen_internal: ArtportalenInternal,
    pub measurement_or_facts: Vec<ExtendedMeasurementOrFact>,
}

impl Observation {
    pub fn occurrence_id(&self) -> &str {
        &self.occurrence.occurrence_id
    }
}
