//! Rows as they are read from the Artportalen source database.
//!
//! These carry foreign-key integers only. Names and translations are
//! resolved later through [`crate::metadata::ReferenceMetadata`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One sighting row. `id` increases monotonically and is used as a range cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SightingEntity {
    pub id: i32,
    pub taxon_id: Option<i32>,
    /// `None` or `0` when the sighting has no site.
    pub site_id: Option<i32>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub activity_id: Option<i32>,
    pub biotope_id: Option<i32>,
    pub biotope_description: Option<String>,
    pub gender_id: Option<i32>,
    pub stage_id: Option<i32>,
    pub substrate_id: Option<i32>,
    pub substrate_description: Option<String>,
    pub unit_id: Option<i32>,
    pub validation_status_id: Option<i32>,
    pub discovery_method_id: Option<i32>,
    pub determination_method_id: Option<i32>,
    pub quantity: Option<i32>,
    pub quantity_of_substrate: Option<i32>,
    pub length: Option<i32>,
    pub weight: Option<i32>,
    pub min_depth: Option<i32>,
    pub max_depth: Option<i32>,
    pub min_height: Option<i32>,
    pub max_height: Option<i32>,
    pub comment: Option<String>,
    pub label: Option<String>,
    pub not_present: bool,
    pub not_recovered: bool,
    pub unsure_determination: bool,
    pub unspontaneous: bool,
    pub protected_by_system: bool,
    /// Provider-requested embargo; the sighting is hidden until this date.
    pub hidden_by_provider: Option<DateTime<Utc>>,
    pub owner_organization_id: Option<i32>,
    pub rights_holder: Option<String>,
    pub sighting_type_id: i32,
    pub checklist_id: Option<i32>,
    pub register_date: DateTime<Utc>,
    pub edit_date: DateTime<Utc>,
}

impl SightingEntity {
    /// Site id if the sighting references a real site.
    pub fn effective_site_id(&self) -> Option<i32> {
        self.site_id.filter(|id| *id != 0)
    }
}

/// One checklist row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ChecklistEntity {
    pub id: i32,
    pub name: Option<String>,
    pub controlling_user_id: Option<i32>,
    pub site_id: Option<i32>,
    pub project_id: Option<i32>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub register_date: DateTime<Utc>,
    pub edit_date: DateTime<Utc>,
}

/// Taxon listed on a checklist, with whether it was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChecklistTaxonEntity {
    pub checklist_id: i32,
    pub taxon_id: i32,
    pub found: bool,
}

/// One site row. Coordinates are Web Mercator (EPSG:3857).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SiteEntity {
    pub id: i32,
    pub name: Option<String>,
    pub presentation_name: Option<String>,
    pub external_id: Option<String>,
    pub accuracy: i32,
    pub x_coord: f64,
    pub y_coord: f64,
    pub diffused_x_coord: Option<f64>,
    pub diffused_y_coord: Option<f64>,
    /// Diffusion factor in meters; `0` means the site is never diffused.
    pub diffusion_id: i32,
    pub parent_site_id: Option<i32>,
    pub parent_site_name: Option<String>,
    pub is_public: bool,
}

/// Membership of a site in an administrative area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SiteAreaEntity {
    pub site_id: i32,
    pub area_dataset_id: i32,
    pub feature_id: String,
    pub name: String,
}

/// Geometry of a site as WKT in Web Mercator (EPSG:3857).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SiteGeometryEntity {
    pub site_id: i32,
    pub geometry_wkt: String,
}

/// A sighting's membership in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SightingProjectEntity {
    pub sighting_id: i32,
    pub project_id: i32,
}

/// A project parameter value recorded for a sighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ProjectParameterEntity {
    pub sighting_id: i32,
    pub project_id: i32,
    pub project_parameter_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub data_type: String,
    pub value: Option<String>,
}

/// Role a user plays on a sighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SightingRelationType {
    Reporter,
    Observer,
    Determiner,
    Verifier,
    Other(i32),
}

impl From<i32> for SightingRelationType {
    fn from(value: i32) -> Self {
        match value {
            1 => Self::Reporter,
            2 => Self::Observer,
            3 => Self::Determiner,
            5 => Self::Verifier,
            other => Self::Other(other),
        }
    }
}

/// Links a user to a sighting in some role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SightingRelationEntity {
    pub id: i32,
    pub sighting_id: i32,
    pub user_id: i32,
    pub sighting_relation_type_id: i32,
    pub sort: i32,
    pub is_public: bool,
    pub discover: bool,
}

impl SightingRelationEntity {
    pub fn relation_type(&self) -> SightingRelationType {
        SightingRelationType::from(self.sighting_relation_type_id)
    }
}

/// A preserved specimen linked to a sighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SpeciesCollectionItemEntity {
    pub id: i32,
    pub sighting_id: i32,
    pub collector_id: Option<i32>,
    pub organization_id: Option<i32>,
    pub description: Option<String>,
    pub determiner_user_id: Option<i32>,
    pub determination_year: Option<i32>,
    pub confirmator_user_id: Option<i32>,
    pub confirmation_year: Option<i32>,
}

/// A media file attached to a sighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MediaEntity {
    pub id: i32,
    pub sighting_id: i32,
    pub file_uri: String,
    pub upload_date_time: Option<DateTime<Utc>>,
    pub rights_holder: Option<String>,
    pub copyright_text: Option<String>,
}

/// One translated row of a code table (activity, biotope, gender, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MetadataEntity {
    pub id: i32,
    pub category_id: Option<i32>,
    pub culture_code: String,
    pub translation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PersonEntity {
    pub id: i32,
    pub user_id: Option<i32>,
    pub first_name: String,
    pub last_name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OrganizationEntity {
    pub id: i32,
    pub name: String,
    pub organization_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ProjectEntity {
    pub id: i32,
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub project_url: Option<String>,
    pub survey_method: Option<String>,
    pub survey_method_url: Option<String>,
    pub is_public: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TaxonEntity {
    pub id: i32,
    pub scientific_name: String,
    pub vernacular_name: Option<String>,
    pub organism_group: Option<String>,
    /// Sensitivity category, 1 (public) to 5 (most protected).
    pub protection_level: i32,
    /// Buffer in meters applied around sensitive sightings.
    pub disturbance_radius: i32,
}
