//! Reference metadata used to resolve integer codes on source rows.
//!
//! The container is split in two halves with different lifecycles:
//!
//! - [`StaticMetadata`]: code tables, organizations and taxa. Loaded on every
//!   full harvest, or the first time an incremental harvest needs it.
//! - [`DynamicMetadata`]: persons and projects. Loaded on every harvest.
//!
//! Both halves are immutable after loading and shared through `Arc`, so a
//! [`ReferenceMetadata`] can only exist once both have been loaded.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;
use crate::models::source::{
    MetadataEntity, OrganizationEntity, PersonEntity, ProjectEntity, TaxonEntity,
};
use crate::traits::MetadataSource;

/// Culture code of the source's primary language.
pub const SWEDISH: &str = "sv-SE";
pub const ENGLISH: &str = "en-GB";

/// Code tables read with a single read-all query each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataTable {
    Activity,
    Biotope,
    Gender,
    Stage,
    Substrate,
    Unit,
    ValidationStatus,
    DiscoveryMethod,
    DeterminationMethod,
}

impl MetadataTable {
    pub const ALL: [MetadataTable; 9] = [
        Self::Activity,
        Self::Biotope,
        Self::Gender,
        Self::Stage,
        Self::Substrate,
        Self::Unit,
        Self::ValidationStatus,
        Self::DiscoveryMethod,
        Self::DeterminationMethod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activity => "activity",
            Self::Biotope => "biotope",
            Self::Gender => "gender",
            Self::Stage => "stage",
            Self::Substrate => "substrate",
            Self::Unit => "unit",
            Self::ValidationStatus => "validation_status",
            Self::DiscoveryMethod => "discovery_method",
            Self::DeterminationMethod => "determination_method",
        }
    }
}

/// A translated code table value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub id: i32,
    pub category_id: Option<i32>,
    /// Culture code to text.
    pub translations: BTreeMap<String, String>,
}

impl Metadata {
    /// Resolves the text in `culture`, falling back to Swedish and then to
    /// any available translation.
    pub fn translate(&self, culture: &str) -> Option<&str> {
        self.translations
            .get(culture)
            .or_else(|| self.translations.get(SWEDISH))
            .or_else(|| self.translations.values().next())
            .map(String::as_str)
    }
}

/// Groups one row per translation into one value per id.
pub fn group_metadata(rows: Vec<MetadataEntity>) -> HashMap<i32, Metadata> {
    let mut grouped: HashMap<i32, Metadata> = HashMap::new();
    for row in rows {
        let entry = grouped.entry(row.id).or_insert_with(|| Metadata {
            id: row.id,
            category_id: row.category_id,
            translations: BTreeMap::new(),
        });
        entry.translations.insert(row.culture_code, row.translation);
    }
    grouped
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: i32,
    pub user_id: Option<i32>,
    pub first_name: String,
    pub last_name: String,
    pub alias: Option<String>,
}

impl Person {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

impl From<PersonEntity> for Person {
    fn from(e: PersonEntity) -> Self {
        Self {
            id: e.id,
            user_id: e.user_id,
            first_name: e.first_name,
            last_name: e.last_name,
            alias: e.alias,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: i32,
    pub name: String,
    pub code: Option<String>,
}

impl From<OrganizationEntity> for Organization {
    fn from(e: OrganizationEntity) -> Self {
        Self {
            id: e.id,
            name: e.name,
            code: e.organization_code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
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

impl From<ProjectEntity> for Project {
    fn from(e: ProjectEntity) -> Self {
        Self {
            id: e.id,
            name: e.name,
            category: e.category,
            description: e.description,
            owner: e.owner,
            project_url: e.project_url,
            survey_method: e.survey_method,
            survey_method_url: e.survey_method_url,
            is_public: e.is_public,
            start_date: e.start_date,
            end_date: e.end_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxon {
    pub id: i32,
    pub scientific_name: String,
    pub vernacular_name: Option<String>,
    pub organism_group: Option<String>,
    pub protection_level: i32,
    pub disturbance_radius: i32,
}

impl Taxon {
    /// Birds are recognised by their organism group name, in Swedish or English.
    pub fn is_bird(&self) -> bool {
        self.organism_group.as_deref().is_some_and(|group| {
            let group = group.to_lowercase();
            group.starts_with("fåg") || group.starts_with("bird")
        })
    }
}

impl From<TaxonEntity> for Taxon {
    fn from(e: TaxonEntity) -> Self {
        Self {
            id: e.id,
            scientific_name: e.scientific_name,
            vernacular_name: e.vernacular_name,
            organism_group: e.organism_group,
            protection_level: e.protection_level,
            disturbance_radius: e.disturbance_radius,
        }
    }
}

/// Code tables, organizations and taxa.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    pub activities: HashMap<i32, Metadata>,
    pub biotopes: HashMap<i32, Metadata>,
    pub genders: HashMap<i32, Metadata>,
    pub stages: HashMap<i32, Metadata>,
    pub substrates: HashMap<i32, Metadata>,
    pub units: HashMap<i32, Metadata>,
    pub validation_statuses: HashMap<i32, Metadata>,
    pub discovery_methods: HashMap<i32, Metadata>,
    pub determination_methods: HashMap<i32, Metadata>,
    pub organizations: HashMap<i32, Organization>,
    pub taxa: HashMap<i32, Taxon>,
}

impl StaticMetadata {
    /// Reads every static table concurrently.
    pub async fn load<M: MetadataSource>(source: &M) -> Result<Self, AppError> {
        let (
            (activities, biotopes, genders, stages, substrates),
            (units, validation_statuses, discovery_methods, determination_methods),
            organizations,
            taxa,
        ) = tokio::try_join!(
            async {
                tokio::try_join!(
                    source.get_metadata(MetadataTable::Activity),
                    source.get_metadata(MetadataTable::Biotope),
                    source.get_metadata(MetadataTable::Gender),
                    source.get_metadata(MetadataTable::Stage),
                    source.get_metadata(MetadataTable::Substrate),
                )
            },
            async {
                tokio::try_join!(
                    source.get_metadata(MetadataTable::Unit),
                    source.get_metadata(MetadataTable::ValidationStatus),
                    source.get_metadata(MetadataTable::DiscoveryMethod),
                    source.get_metadata(MetadataTable::DeterminationMethod),
                )
            },
            source.get_organizations(),
            source.get_taxa(),
        )?;

        let statics = Self {
            activities: group_metadata(activities),
            biotopes: group_metadata(biotopes),
            genders: group_metadata(genders),
            stages: group_metadata(stages),
            substrates: group_metadata(substrates),
            units: group_metadata(units),
            validation_statuses: group_metadata(validation_statuses),
            discovery_methods: group_metadata(discovery_methods),
            determination_methods: group_metadata(determination_methods),
            organizations: organizations
                .into_iter()
                .map(|o| (o.id, Organization::from(o)))
                .collect(),
            taxa: taxa.into_iter().map(|t| (t.id, Taxon::from(t))).collect(),
        };

        debug!(
            taxa = statics.taxa.len(),
            organizations = statics.organizations.len(),
            "Static metadata loaded"
        );
        Ok(statics)
    }

    /// Looks up a code in one of the code tables.
    pub fn code(&self, table: MetadataTable, id: Option<i32>) -> Option<&Metadata> {
        let map = match table {
            MetadataTable::Activity => &self.activities,
            MetadataTable::Biotope => &self.biotopes,
            MetadataTable::Gender => &self.genders,
            MetadataTable::Stage => &self.stages,
            MetadataTable::Substrate => &self.substrates,
            MetadataTable::Unit => &self.units,
            MetadataTable::ValidationStatus => &self.validation_statuses,
            MetadataTable::DiscoveryMethod => &self.discovery_methods,
            MetadataTable::DeterminationMethod => &self.determination_methods,
        };
        id.and_then(|id| map.get(&id))
    }
}

/// Persons and projects.
#[derive(Debug, Clone, Default)]
pub struct DynamicMetadata {
    pub persons_by_id: HashMap<i32, Person>,
    pub persons_by_user_id: HashMap<i32, Person>,
    pub projects: HashMap<i32, Project>,
}

impl DynamicMetadata {
    pub async fn load<M: MetadataSource>(source: &M) -> Result<Self, AppError> {
        let (persons, projects) = tokio::try_join!(source.get_persons(), source.get_projects())?;

        let persons: Vec<Person> = persons.into_iter().map(Person::from).collect();
        let persons_by_user_id = persons
            .iter()
            .filter_map(|p| p.user_id.map(|uid| (uid, p.clone())))
            .collect();
        let persons_by_id = persons.into_iter().map(|p| (p.id, p)).collect();
        let projects = projects
            .into_iter()
            .map(|p| (p.id, Project::from(p)))
            .collect();

        Ok(Self {
            persons_by_id,
            persons_by_user_id,
            projects,
        })
    }
}

/// Both halves of the reference metadata, shared across concurrent batches.
#[derive(Debug, Clone)]
pub struct ReferenceMetadata {
    pub statics: Arc<StaticMetadata>,
    pub dynamics: Arc<DynamicMetadata>,
}

impl ReferenceMetadata {
    pub fn new(statics: Arc<StaticMetadata>, dynamics: Arc<DynamicMetadata>) -> Self {
        Self { statics, dynamics }
    }

    /// Loads both halves from scratch.
    pub async fn load<M: MetadataSource>(source: &M) -> Result<Self, AppError> {
        let (statics, dynamics) =
            tokio::try_join!(StaticMetadata::load(source), DynamicMetadata::load(source))?;
        Ok(Self::new(Arc::new(statics), Arc::new(dynamics)))
    }
}
