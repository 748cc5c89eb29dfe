//! Casting verbatim sightings into processed observations.
//!
//! The cast is a pure function of one [`VerbatimObservation`], the taxon
//! table and the vocabulary mappings. No state is kept between casts, so the
//! same verbatim record always yields the same observation.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::metadata::{Metadata, SWEDISH, StaticMetadata, Taxon};
use crate::models::{
    AccessRights, ArtportalenInternal, DiffusionStatus, Event, ExtendedMeasurementOrFact,
    Identification, Location, Multimedia, Observation, Occurrence, OccurrenceStatus, Site,
    TaxonReference, VerbatimObservation, VerbatimProject, VocabularyId, sighting_occurrence_id,
};
use crate::vocabulary::VocabularyResolver;

/// Activity id recorded for birds whose sighting has no activity.
pub const BIRD_WITHOUT_ACTIVITY: i32 = 1_000_000;

/// Lowest protection level of a sensitive sighting.
const SENSITIVE_PROTECTION_LEVEL: i32 = 3;

const DATASET_ID: &str = "urn:lsid:swedishlifewatch.se:dataprovider:Artportalen";
const DATASET_NAME: &str = "Artportalen";
const SIGHTING_URL: &str = "https://www.artportalen.se/sighting";

/// Protection level of a sighting.
///
/// `max(3, taxon level)` while the sighting is protected by the system or
/// hidden by the provider, `1` otherwise.
pub fn protection_level(
    taxon_protection_level: i32,
    protected_by_system: bool,
    hidden_by_provider: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> i32 {
    let hidden = hidden_by_provider.is_some_and(|until| until > now);
    if protected_by_system || hidden {
        taxon_protection_level.max(SENSITIVE_PROTECTION_LEVEL)
    } else {
        1
    }
}

/// Event date as written by the observer: one instant, or `start/end`.
pub fn verbatim_event_date(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let start_text = start.to_rfc3339_opts(SecondsFormat::Secs, true);
    if start == end {
        start_text
    } else {
        format!(
            "{}/{}",
            start_text,
            end.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// Stable event id for a site and event date.
///
/// ```
/// use sos_core::observation_factory::event_id;
/// assert_eq!(event_id(12, "2024-05-01T06:00:00Z"), event_id(12, "2024-05-01T06:00:00Z"));
/// assert_ne!(event_id(12, "2024-05-01T06:00:00Z"), event_id(13, "2024-05-01T06:00:00Z"));
/// ```
pub fn event_id(site_id: i32, verbatim_event_date: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{site_id}:{verbatim_event_date}").as_bytes());
    format!(
        "urn:lsid:artportalen.se:event:{}",
        hex::encode(hasher.finalize())
    )
}

/// Sampling protocol of a sighting.
///
/// The discovery method wins. Otherwise the survey method shared by every
/// project, or failing that the survey method URL shared by every project.
/// Projects that disagree yield `None`.
pub fn sampling_protocol(
    discovery_method: Option<&str>,
    projects: &[VerbatimProject],
) -> Option<String> {
    if let Some(method) = discovery_method.filter(|m| !m.is_empty()) {
        return Some(method.to_string());
    }

    fn shared<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Option<&'a str> {
        let mut shared: Option<&str> = None;
        for value in values {
            let value = value.filter(|v| !v.is_empty())?;
            match shared {
                None => shared = Some(value),
                Some(current) if current == value => {}
                Some(_) => return None,
            }
        }
        shared
    }

    shared(projects.iter().map(|p| p.project.survey_method.as_deref()))
        .or_else(|| shared(projects.iter().map(|p| p.project.survey_method_url.as_deref())))
        .map(str::to_string)
}

/// Nest activity id used to rank bird sightings.
///
/// `0` for non-birds, the activity id for birds with an activity, and
/// [`BIRD_WITHOUT_ACTIVITY`] for birds without one.
pub fn bird_nest_activity_id(taxon: Option<&Taxon>, activity_id: Option<i32>) -> i32 {
    match taxon {
        Some(taxon) if taxon.is_bird() => activity_id
            .filter(|id| *id > 0)
            .unwrap_or(BIRD_WITHOUT_ACTIVITY),
        _ => 0,
    }
}

/// Habitat text from the biotope and its free-text description.
fn habitat(biotope: Option<&Metadata>, description: Option<&str>) -> Option<String> {
    let description = description.filter(|d| !d.is_empty());
    match (biotope.and_then(|b| b.translate(SWEDISH)), description) {
        (Some(biotope), Some(description)) => Some(format!("{biotope} # {description}")),
        (Some(biotope), None) => Some(biotope.to_string()),
        (None, description) => description.map(str::to_string),
    }
}

fn survey_method_description(project: &VerbatimProject) -> Option<String> {
    let method = project
        .project
        .survey_method
        .as_deref()
        .filter(|m| !m.is_empty());
    let url = project
        .project
        .survey_method_url
        .as_deref()
        .filter(|u| !u.is_empty());
    match (method, url) {
        (Some(method), Some(url)) => Some(format!("{method} [{url}]")),
        (Some(method), None) => Some(method.to_string()),
        (None, Some(url)) => Some(url.to_string()),
        (None, None) => None,
    }
}

/// Measurement rows from project parameters, length and weight.
pub fn measurement_or_facts(
    occurrence_id: &str,
    verbatim: &VerbatimObservation,
) -> Vec<ExtendedMeasurementOrFact> {
    let mut rows: Vec<ExtendedMeasurementOrFact> = verbatim
        .projects
        .iter()
        .flat_map(|project| {
            let method = survey_method_description(project);
            project
                .parameters
                .iter()
                .filter(|p| p.value.as_deref().is_some_and(|v| !v.trim().is_empty()))
                .map(move |parameter| ExtendedMeasurementOrFact {
                    occurrence_id: occurrence_id.to_string(),
                    measurement_id: Some(parameter.id.to_string()),
                    measurement_type: parameter.name.clone(),
                    measurement_value: parameter.value.clone(),
                    measurement_unit: parameter.unit.clone(),
                    measurement_method: method.clone(),
                    measurement_remarks: parameter.description.clone(),
                })
        })
        .collect();

    let scalar = |kind: &str, value: i32, unit: &str| ExtendedMeasurementOrFact {
        occurrence_id: occurrence_id.to_string(),
        measurement_id: None,
        measurement_type: kind.to_string(),
        measurement_value: Some(value.to_string()),
        measurement_unit: Some(unit.to_string()),
        measurement_method: None,
        measurement_remarks: None,
    };
    if let Some(length) = verbatim.length {
        rows.push(scalar("Length", length, "mm"));
    }
    if let Some(weight) = verbatim.weight {
        rows.push(scalar("Weight", weight, "g"));
    }
    rows
}

fn location(site: &Site, diffused: bool, disturbance_radius: Option<i32>) -> Location {
    let (point, point_with_buffer, uncertainty) = if diffused {
        (
            site.diffused_point,
            site.diffused_point_with_buffer.clone(),
            site.accuracy.max(site.diffusion_id),
        )
    } else {
        (site.point, site.point_with_buffer.clone(), site.accuracy)
    };
    // Raw coordinates would reveal the true position of a diffused sighting.
    let (verbatim_longitude, verbatim_latitude) = if diffused {
        (None, None)
    } else {
        (Some(site.x_coord), Some(site.y_coord))
    };

    Location {
        location_id: Some(format!("urn:lsid:artportalen.se:site:{}", site.id)),
        locality: site.display_name().map(str::to_string),
        decimal_longitude: point.map(|p| p.x),
        decimal_latitude: point.map(|p| p.y),
        coordinate_uncertainty_in_meters: Some(uncertainty),
        point,
        point_with_buffer,
        disturbance_radius,
        county: site.county.clone(),
        municipality: site.municipality.clone(),
        parish: site.parish.clone(),
        province: site.province.clone(),
        country_region: site.country_region.clone(),
        geodetic_datum: "EPSG:4326".to_string(),
        verbatim_srs: "EPSG:3857".to_string(),
        verbatim_longitude,
        verbatim_latitude,
    }
}

/// Casts verbatim sightings into [`Observation`]s.
#[derive(Debug, Clone)]
pub struct ObservationFactory {
    vocabulary: Arc<VocabularyResolver>,
    statics: Arc<StaticMetadata>,
    data_provider_id: i32,
}

impl ObservationFactory {
    pub fn new(
        vocabulary: Arc<VocabularyResolver>,
        statics: Arc<StaticMetadata>,
        data_provider_id: i32,
    ) -> Self {
        Self {
            vocabulary,
            statics,
            data_provider_id,
        }
    }

    /// Casts one verbatim sighting as of now.
    pub fn create_processed_observation(
        &self,
        verbatim: &VerbatimObservation,
        diffuse_if_supported: bool,
    ) -> Observation {
        self.create_processed_observation_at(verbatim, diffuse_if_supported, Utc::now())
    }

    /// Casts one verbatim sighting, judging provider embargoes against `now`.
    pub fn create_processed_observation_at(
        &self,
        verbatim: &VerbatimObservation,
        diffuse_if_supported: bool,
        now: DateTime<Utc>,
    ) -> Observation {
        let vocab = |metadata: Option<&Metadata>, id: VocabularyId| {
            self.vocabulary
                .get_sos_id_from_metadata(metadata, id, None, false)
        };

        let taxon = verbatim.taxon_id.and_then(|id| self.statics.taxa.get(&id));
        let taxon_level = taxon.map_or(0, |t| t.protection_level);
        let hidden = verbatim.is_hidden_by_provider(now);

        let level = protection_level(
            taxon_level,
            verbatim.protected_by_system,
            verbatim.hidden_by_provider,
            now,
        );
        let sensitive = taxon_level > 2
            || level > 2
            || verbatim.protected_by_system
            || hidden;
        let access_rights = if verbatim.protected_by_system || hidden {
            AccessRights::NotForPublicUsage
        } else {
            AccessRights::FreeUsage
        };

        let diffused = diffuse_if_supported
            && verbatim
                .site
                .as_ref()
                .is_some_and(Site::supports_diffusion);
        let disturbance_radius = taxon.map(|t| t.disturbance_radius);

        let occurrence_id = sighting_occurrence_id(verbatim.sighting_id);
        let event_date = verbatim_event_date(verbatim.start_date, verbatim.end_date);
        let site_id = verbatim.site.as_ref().map_or(0, |s| s.id);
        let person = &verbatim.person_sighting;

        let absent = verbatim.not_present || verbatim.not_recovered;
        let quantity = verbatim.quantity.map(|q| q.to_string());

        let event = Event {
            event_id: event_id(site_id, &event_date),
            start_date: verbatim.start_date,
            end_date: verbatim.end_date,
            verbatim_event_date: event_date,
            habitat: habitat(
                verbatim.biotope.as_ref(),
                verbatim.biotope_description.as_deref(),
            ),
            sampling_protocol: sampling_protocol(
                verbatim
                    .discovery_method
                    .as_ref()
                    .and_then(|m| m.translate(SWEDISH)),
                &verbatim.projects,
            ),
            discovery_method: vocab(
                verbatim.discovery_method.as_ref(),
                VocabularyId::DiscoveryMethod,
            ),
        };

        let occurrence = Occurrence {
            occurrence_id: occurrence_id.clone(),
            catalog_number: verbatim.sighting_id.to_string(),
            catalog_id: verbatim.sighting_id,
            individual_count: quantity.clone(),
            organism_quantity: quantity,
            organism_quantity_int: verbatim.quantity,
            organism_quantity_unit: vocab(verbatim.unit.as_ref(), VocabularyId::Unit),
            occurrence_status: if absent {
                OccurrenceStatus::Absent
            } else {
                OccurrenceStatus::Present
            },
            is_positive_observation: !absent,
            is_natural_occurrence: !verbatim.unspontaneous,
            is_never_found_observation: verbatim.not_present,
            is_not_rediscovered_observation: verbatim.not_recovered,
            protection_level: level,
            sensitivity_category: level,
            recorded_by: person.observers.clone(),
            reported_by: person.reported_by.clone(),
            occurrence_remarks: verbatim.comment.clone(),
            url: format!("{SIGHTING_URL}/{}", verbatim.sighting_id),
            activity: vocab(verbatim.activity.as_ref(), VocabularyId::Activity),
            biotope: vocab(verbatim.biotope.as_ref(), VocabularyId::Biotope),
            biotope_description: verbatim.biotope_description.clone(),
            sex: vocab(verbatim.gender.as_ref(), VocabularyId::Sex),
            life_stage: vocab(verbatim.stage.as_ref(), VocabularyId::LifeStage),
            substrate: vocab(verbatim.substrate.as_ref(), VocabularyId::Substrate),
            substrate_description: verbatim.substrate_description.clone(),
            bird_nest_activity_id: bird_nest_activity_id(
                taxon,
                verbatim.activity.as_ref().map(|a| a.id),
            ),
            media: verbatim
                .media
                .iter()
                .map(|m| Multimedia {
                    identifier: m.file_uri.clone(),
                    created: m.upload_date_time,
                    rights_holder: m.rights_holder.clone(),
                    license: m.copyright_text.clone(),
                })
                .collect(),
        };

        let verified = person.verified_by.is_some();
        let identification = Identification {
            validated: verified,
            verified,
            verification_status: vocab(
                verbatim.validation_status.as_ref(),
                VocabularyId::VerificationStatus,
            ),
            determination_method: vocab(
                verbatim.determination_method.as_ref(),
                VocabularyId::DeterminationMethod,
            ),
            uncertain_identification: verbatim.unsure_determination,
            identified_by: person.determined_by.clone(),
            date_identified: person.determination_year.map(|y| y.to_string()),
            verified_by: person.verified_by.clone(),
            confirmed_by: person.confirmed_by.clone(),
        };

        let taxon_reference = match taxon {
            Some(t) => TaxonReference {
                id: t.id,
                verbatim_id: verbatim.taxon_id,
                scientific_name: Some(t.scientific_name.clone()),
                vernacular_name: t.vernacular_name.clone(),
                organism_group: t.organism_group.clone(),
                protection_level: t.protection_level,
                disturbance_radius: t.disturbance_radius,
            },
            None => TaxonReference {
                id: -1,
                verbatim_id: verbatim.taxon_id,
                scientific_name: None,
                vernacular_name: None,
                organism_group: None,
                protection_level: 0,
                disturbance_radius: 0,
            },
        };

        let site = verbatim.site.as_ref();
        let artportalen_internal = ArtportalenInternal {
            sighting_id: verbatim.sighting_id,
            sighting_type_id: verbatim.sighting_type_id,
            checklist_id: verbatim.checklist_id,
            has_images: verbatim.has_images(),
            observers_internal: person.observers_internal.clone(),
            report_by_user_id: person.report_by_user_id,
            species_collection_item_id: person.species_collection_item_id,
            species_collection_label: person.species_collection_label.clone(),
            location_external_id: site.and_then(|s| s.external_id.clone()),
            location_presentation_name: site.and_then(|s| s.presentation_name.clone()),
            parent_location_id: site.and_then(|s| s.parent_site_id),
            parent_location: site.and_then(|s| s.parent_site_name.clone()),
            diffusion_id: site.map_or(0, |s| s.diffusion_id),
            project_ids: verbatim.projects.iter().map(|p| p.project.id).collect(),
        };

        let owner = verbatim.owner_organization.as_ref();
        Observation {
            data_provider_id: self.data_provider_id,
            dataset_id: DATASET_ID.to_string(),
            dataset_name: DATASET_NAME.to_string(),
            basis_of_record: if person.species_collection_item_id.is_some() {
                "PreservedSpecimen".to_string()
            } else {
                "HumanObservation".to_string()
            },
            collection_code: DATASET_NAME.to_string(),
            institution_code: owner.and_then(|o| o.code.clone()),
            rights_holder: verbatim
                .rights_holder
                .clone()
                .or_else(|| owner.map(|o| o.name.clone())),
            access_rights,
            modified: verbatim.edit_date,
            sensitive,
            protected: sensitive,
            diffusion_status: if diffused {
                DiffusionStatus::DiffusedBySystem
            } else {
                DiffusionStatus::NotDiffused
            },
            event,
            location: site.map(|s| location(s, diffused, disturbance_radius)),
            occurrence,
            identification,
            taxon: taxon_reference,
            artportalen_internal,
            measurement_or_facts: measurement_or_facts(&occurrence_id, verbatim),
        }
    }
}
