//! Provider-shaped records written to the verbatim store.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::metadata::{Metadata, Organization, Project};
use crate::models::site::Site;

/// A record type kept in the verbatim store.
pub trait VerbatimRecord: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    /// Collection (table) name, suffixed by mode in the store.
    const COLLECTION: &'static str;

    /// Source id of the record, used as the paging cursor.
    fn record_id(&self) -> i32;
}

/// A user attached to a sighting, with internal ids kept for access control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInternal {
    pub id: i32,
    pub user_id: i32,
    pub user_alias: Option<String>,
    pub discover: bool,
    pub view_access: bool,
}

/// Attribution of a sighting, derived from its relation rows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersonSighting {
    /// Comma separated observer names, in relation sort order.
    pub observers: Option<String>,
    pub observers_internal: Vec<UserInternal>,
    pub reported_by: Option<String>,
    pub report_by_user_id: Option<i32>,
    pub verified_by: Option<String>,
    pub verified_by_internal: Vec<UserInternal>,
    pub determined_by: Option<String>,
    pub determination_year: Option<i32>,
    pub confirmed_by: Option<String>,
    pub confirmation_year: Option<i32>,
    /// Collector or collecting organization of the newest species collection item.
    pub species_collection: Option<String>,
    pub species_collection_item_id: Option<i32>,
    pub species_collection_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerbatimProjectParameter {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub data_type: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerbatimProject {
    #[serde(flatten)]
    pub project: Project,
    pub parameters: Vec<VerbatimProjectParameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerbatimMedia {
    pub id: i32,
    pub file_uri: String,
    pub upload_date_time: Option<DateTime<Utc>>,
    pub rights_holder: Option<String>,
    pub copyright_text: Option<String>,
}

/// A sighting with every code and reference resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerbatimObservation {
    pub sighting_id: i32,
    pub taxon_id: Option<i32>,
    pub site: Option<Site>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub activity: Option<Metadata>,
    pub biotope: Option<Metadata>,
    pub biotope_description: Option<String>,
    pub gender: Option<Metadata>,
    pub stage: Option<Metadata>,
    pub substrate: Option<Metadata>,
    pub substrate_description: Option<String>,
    pub unit: Option<Metadata>,
    pub validation_status: Option<Metadata>,
    pub discovery_method: Option<Metadata>,
    pub determination_method: Option<Metadata>,
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
    pub hidden_by_provider: Option<DateTime<Utc>>,
    pub owner_organization: Option<Organization>,
    pub rights_holder: Option<String>,
    pub sighting_type_id: i32,
    pub checklist_id: Option<i32>,
    pub register_date: DateTime<Utc>,
    pub edit_date: DateTime<Utc>,
    pub projects: Vec<VerbatimProject>,
    pub person_sighting: PersonSighting,
    pub media: Vec<VerbatimMedia>,
    /// True when any relation row marks the sighting as a discovery.
    pub is_discovery: bool,
}

impl VerbatimObservation {
    pub fn has_images(&self) -> bool {
        !self.media.is_empty()
    }

    /// True while the provider's embargo date lies after `now`.
    pub fn is_hidden_by_provider(&self, now: DateTime<Utc>) -> bool {
        self.hidden_by_provider.is_some_and(|until| until > now)
    }
}

impl VerbatimRecord for VerbatimObservation {
    const COLLECTION: &'static str = "artportalen_observation_verbatim";

    fn record_id(&self) -> i32 {
        self.sighting_id
    }
}

/// A checklist with its site, project and listed taxa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerbatimChecklist {
    pub id: i32,
    pub name: Option<String>,
    pub controlling_user_id: Option<i32>,
    pub controlling_user: Option<String>,
    pub site: Option<Site>,
    pub project: Option<Project>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub register_date: DateTime<Utc>,
    pub edit_date: DateTime<Utc>,
    pub taxon_ids: Vec<i32>,
    pub taxon_ids_found: Vec<i32>,
}

impl VerbatimRecord for VerbatimChecklist {
    const COLLECTION: &'static str = "artportalen_checklist_verbatim";

    fn record_id(&self) -> i32 {
        self.id
    }
}
