//! Casting batches of source rows into verbatim records.
//!
//! Enrichment happens per batch, never per row: the site, project, relation,
//! species collection and media queries for a batch run concurrently, and
//! each returns rows for every sighting of the batch. The rows are then
//! grouped by sighting id and joined in memory.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::error;

use crate::AppError;
use crate::metadata::{DynamicMetadata, MetadataTable, ReferenceMetadata};
use crate::models::{
    ChecklistEntity, MediaEntity, PersonSighting, ProjectParameterEntity, SightingEntity,
    SightingProjectEntity, SightingRelationEntity, SightingRelationType, Site,
    SpeciesCollectionItemEntity, UserInternal, VerbatimChecklist, VerbatimMedia,
    VerbatimObservation, VerbatimProject, VerbatimProjectParameter,
};
use crate::site_cache::SiteCache;
use crate::traits::{ChecklistSource, SightingEnrichmentSource, SiteSource};

/// Casts sighting rows into [`VerbatimObservation`]s.
pub struct VerbatimTransformFactory<E: SightingEnrichmentSource, S: SiteSource> {
    enrichment: E,
    site_cache: Arc<SiteCache<S>>,
    metadata: ReferenceMetadata,
}

impl<E: SightingEnrichmentSource, S: SiteSource> VerbatimTransformFactory<E, S> {
    pub fn new(enrichment: E, site_cache: Arc<SiteCache<S>>, metadata: ReferenceMetadata) -> Self {
        Self {
            enrichment,
            site_cache,
            metadata,
        }
    }

    /// Casts one batch.
    ///
    /// A row that cannot be cast fails the whole batch.
    pub async fn cast_entities_to_verbatims(
        &self,
        entities: &[SightingEntity],
    ) -> Result<Vec<VerbatimObservation>, AppError> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let site_ids: Vec<i32> = entities
            .iter()
            .filter_map(SightingEntity::effective_site_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let sighting_ids: Vec<i32> = entities.iter().map(|e| e.id).collect();

        let (sites, sighting_projects, parameters, relations, collection_items, media) = tokio::try_join!(
            self.site_cache.get_batch_sites(&site_ids),
            self.enrichment.get_sighting_projects(&sighting_ids),
            self.enrichment.get_project_parameters(&sighting_ids),
            self.enrichment.get_sighting_relations(&sighting_ids),
            self.enrichment.get_species_collection_items(&sighting_ids),
            self.enrichment.get_media(&sighting_ids),
        )?;

        let mut projects =
            build_sighting_projects(&sighting_projects, parameters, &self.metadata.dynamics);
        let mut persons =
            build_person_sightings(&relations, &collection_items, &self.metadata);
        let mut media = group_media(media);
        let discoveries: BTreeSet<i32> = relations
            .iter()
            .filter(|r| r.discover)
            .map(|r| r.sighting_id)
            .collect();

        entities
            .iter()
            .map(|entity| {
                let site = entity
                    .effective_site_id()
                    .and_then(|id| sites.get(&id))
                    .map(|site| Site::clone(site));
                let enrichment = SightingEnrichment {
                    site,
                    projects: projects.remove(&entity.id).unwrap_or_default(),
                    person_sighting: persons.remove(&entity.id).unwrap_or_default(),
                    media: media.remove(&entity.id).unwrap_or_default(),
                    is_discovery: discoveries.contains(&entity.id),
                };
                self.cast_entity_to_verbatim(entity, enrichment)
                    .inspect_err(|e| {
                        error!(sighting_id = entity.id, error = %e, "Failed to cast sighting");
                    })
            })
            .collect()
    }

    /// Casts one row with its pre-fetched enrichment.
    pub fn cast_entity_to_verbatim(
        &self,
        entity: &SightingEntity,
        enrichment: SightingEnrichment,
    ) -> Result<VerbatimObservation, AppError> {
        if entity.end_date < entity.start_date {
            return Err(AppError::CastFailed {
                sighting_id: entity.id,
                message: "end date precedes start date".to_string(),
            });
        }
        if entity.taxon_id.is_none() {
            return Err(AppError::CastFailed {
                sighting_id: entity.id,
                message: "sighting has no taxon".to_string(),
            });
        }

        let statics = &self.metadata.statics;
        let code = |table, id| statics.code(table, id).cloned();

        Ok(VerbatimObservation {
            sighting_id: entity.id,
            taxon_id: entity.taxon_id,
            site: enrichment.site,
            start_date: entity.start_date,
            end_date: entity.end_date,
            activity: code(MetadataTable::Activity, entity.activity_id),
            biotope: code(MetadataTable::Biotope, entity.biotope_id),
            biotope_description: entity.biotope_description.clone(),
            gender: code(MetadataTable::Gender, entity.gender_id),
            stage: code(MetadataTable::Stage, entity.stage_id),
            substrate: code(MetadataTable::Substrate, entity.substrate_id),
            substrate_description: entity.substrate_description.clone(),
            unit: code(MetadataTable::Unit, entity.unit_id),
            validation_status: code(MetadataTable::ValidationStatus, entity.validation_status_id),
            discovery_method: code(MetadataTable::DiscoveryMethod, entity.discovery_method_id),
            determination_method: code(
                MetadataTable::DeterminationMethod,
                entity.determination_method_id,
            ),
            quantity: entity.quantity,
            quantity_of_substrate: entity.quantity_of_substrate,
            length: entity.length,
            weight: entity.weight,
            min_depth: entity.min_depth,
            max_depth: entity.max_depth,
            min_height: entity.min_height,
            max_height: entity.max_height,
            comment: entity.comment.clone(),
            label: entity.label.clone(),
            not_present: entity.not_present,
            not_recovered: entity.not_recovered,
            unsure_determination: entity.unsure_determination,
            unspontaneous: entity.unspontaneous,
            protected_by_system: entity.protected_by_system,
            hidden_by_provider: entity.hidden_by_provider,
            owner_organization: entity
                .owner_organization_id
                .and_then(|id| statics.organizations.get(&id))
                .cloned(),
            rights_holder: entity.rights_holder.clone(),
            sighting_type_id: entity.sighting_type_id,
            checklist_id: entity.checklist_id,
            register_date: entity.register_date,
            edit_date: entity.edit_date,
            projects: enrichment.projects,
            person_sighting: enrichment.person_sighting,
            media: enrichment.media,
            is_discovery: enrichment.is_discovery,
        })
    }
}

/// Pre-fetched data joined onto one sighting.
#[derive(Debug, Clone, Default)]
pub struct SightingEnrichment {
    pub site: Option<Site>,
    pub projects: Vec<VerbatimProject>,
    pub person_sighting: PersonSighting,
    pub media: Vec<VerbatimMedia>,
    pub is_discovery: bool,
}

/// Groups project memberships and parameter values per sighting.
///
/// Memberships of projects missing from the reference data are dropped.
pub fn build_sighting_projects(
    sighting_projects: &[SightingProjectEntity],
    parameters: Vec<ProjectParameterEntity>,
    dynamics: &DynamicMetadata,
) -> HashMap<i32, Vec<VerbatimProject>> {
    let mut parameters_by_key: HashMap<(i32, i32), Vec<VerbatimProjectParameter>> =
        HashMap::new();
    for p in parameters {
        parameters_by_key
            .entry((p.sighting_id, p.project_id))
            .or_default()
            .push(VerbatimProjectParameter {
                id: p.project_parameter_id,
                name: p.name,
                description: p.description,
                unit: p.unit,
                data_type: p.data_type,
                value: p.value,
            });
    }

    let mut by_sighting: HashMap<i32, Vec<VerbatimProject>> = HashMap::new();
    for link in sighting_projects {
        let Some(project) = dynamics.projects.get(&link.project_id) else {
            continue;
        };
        let mut parameters = parameters_by_key
            .remove(&(link.sighting_id, link.project_id))
            .unwrap_or_default();
        parameters.sort_by_key(|p| p.id);
        by_sighting
            .entry(link.sighting_id)
            .or_default()
            .push(VerbatimProject {
                project: project.clone(),
                parameters,
            });
    }
    for projects in by_sighting.values_mut() {
        projects.sort_by_key(|p| p.project.id);
    }
    by_sighting
}

/// Derives attribution per sighting from relation rows and species
/// collection items. Issues no queries.
pub fn build_person_sightings(
    relations: &[SightingRelationEntity],
    collection_items: &[SpeciesCollectionItemEntity],
    metadata: &ReferenceMetadata,
) -> HashMap<i32, PersonSighting> {
    let dynamics = &metadata.dynamics;
    let mut relations_by_sighting: HashMap<i32, Vec<&SightingRelationEntity>> = HashMap::new();
    for relation in relations {
        relations_by_sighting
            .entry(relation.sighting_id)
            .or_default()
            .push(relation);
    }

    let name_of = |user_id: i32| {
        dynamics
            .persons_by_user_id
            .get(&user_id)
            .map(|p| p.full_name())
    };
    let internal = |relation: &SightingRelationEntity| {
        dynamics
            .persons_by_user_id
            .get(&relation.user_id)
            .map(|person| UserInternal {
                id: person.id,
                user_id: relation.user_id,
                user_alias: person.alias.clone(),
                discover: relation.discover,
                view_access: relation.is_public,
            })
    };

    let mut result: HashMap<i32, PersonSighting> = HashMap::new();
    for (sighting_id, mut rels) in relations_by_sighting {
        rels.sort_by_key(|r| (r.sort, r.id));
        let of_type = |t: SightingRelationType| {
            rels.iter()
                .copied()
                .filter(move |r| r.relation_type() == t)
        };

        let observer_names: Vec<String> = of_type(SightingRelationType::Observer)
            .filter_map(|r| name_of(r.user_id))
            .collect();
        let verifier_names: Vec<String> = of_type(SightingRelationType::Verifier)
            .filter_map(|r| name_of(r.user_id))
            .collect();
        let reporter = of_type(SightingRelationType::Reporter).next();
        let determiner = of_type(SightingRelationType::Determiner).next();

        let person_sighting = PersonSighting {
            observers: join_names(observer_names),
            observers_internal: of_type(SightingRelationType::Observer)
                .filter_map(internal)
                .collect(),
            reported_by: reporter.and_then(|r| name_of(r.user_id)),
            report_by_user_id: reporter.map(|r| r.user_id),
            verified_by: join_names(verifier_names),
            verified_by_internal: of_type(SightingRelationType::Verifier)
                .filter_map(internal)
                .collect(),
            determined_by: determiner.and_then(|r| name_of(r.user_id)),
            ..PersonSighting::default()
        };
        result.insert(sighting_id, person_sighting);
    }

    let mut newest_items: HashMap<i32, &SpeciesCollectionItemEntity> = HashMap::new();
    for item in collection_items {
        newest_items
            .entry(item.sighting_id)
            .and_modify(|current| {
                if item.id > current.id {
                    *current = item;
                }
            })
            .or_insert(item);
    }

    for (sighting_id, item) in newest_items {
        let person_sighting = result.entry(sighting_id).or_default();
        person_sighting.species_collection = item
            .collector_id
            .and_then(name_of)
            .or_else(|| {
                item.organization_id
                    .and_then(|id| metadata.statics.organizations.get(&id))
                    .map(|o| o.name.clone())
            });
        person_sighting.species_collection_item_id = Some(item.id);
        person_sighting.species_collection_label = item.description.clone();
        if person_sighting.determined_by.is_none() {
            person_sighting.determined_by = item.determiner_user_id.and_then(name_of);
        }
        person_sighting.determination_year = item.determination_year;
        person_sighting.confirmed_by = item.confirmator_user_id.and_then(name_of);
        person_sighting.confirmation_year = item.confirmation_year;
    }

    result
}

fn join_names(names: Vec<String>) -> Option<String> {
    if names.is_empty() {
        None
    } else {
        Some(names.join(", "))
    }
}

fn group_media(media: Vec<MediaEntity>) -> HashMap<i32, Vec<VerbatimMedia>> {
    let mut grouped: HashMap<i32, Vec<VerbatimMedia>> = HashMap::new();
    for m in media {
        grouped.entry(m.sighting_id).or_default().push(VerbatimMedia {
            id: m.id,
            file_uri: m.file_uri,
            upload_date_time: m.upload_date_time,
            rights_holder: m.rights_holder,
            copyright_text: m.copyright_text,
        });
    }
    for items in grouped.values_mut() {
        items.sort_by_key(|m| m.id);
    }
    grouped
}

/// Casts checklist rows into [`VerbatimChecklist`]s.
pub struct ChecklistTransformFactory<C: ChecklistSource, S: SiteSource> {
    source: C,
    site_cache: Arc<SiteCache<S>>,
    metadata: ReferenceMetadata,
}

impl<C: ChecklistSource, S: SiteSource> ChecklistTransformFactory<C, S> {
    pub fn new(source: C, site_cache: Arc<SiteCache<S>>, metadata: ReferenceMetadata) -> Self {
        Self {
            source,
            site_cache,
            metadata,
        }
    }

    pub async fn cast_entities_to_verbatims(
        &self,
        entities: &[ChecklistEntity],
    ) -> Result<Vec<VerbatimChecklist>, AppError> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let site_ids: Vec<i32> = entities
            .iter()
            .filter_map(|e| e.site_id.filter(|id| *id != 0))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let checklist_ids: Vec<i32> = entities.iter().map(|e| e.id).collect();

        let (sites, taxa) = tokio::try_join!(
            self.site_cache.get_batch_sites(&site_ids),
            self.source.get_checklist_taxa(&checklist_ids),
        )?;

        let mut taxa_by_checklist: HashMap<i32, (Vec<i32>, Vec<i32>)> = HashMap::new();
        for taxon in taxa {
            let (all, found) = taxa_by_checklist.entry(taxon.checklist_id).or_default();
            all.push(taxon.taxon_id);
            if taxon.found {
                found.push(taxon.taxon_id);
            }
        }

        let dynamics = &self.metadata.dynamics;
        Ok(entities
            .iter()
            .map(|entity| {
                let (mut taxon_ids, mut taxon_ids_found) =
                    taxa_by_checklist.remove(&entity.id).unwrap_or_default();
                taxon_ids.sort_unstable();
                taxon_ids_found.sort_unstable();
                VerbatimChecklist {
                    id: entity.id,
                    name: entity.name.clone(),
                    controlling_user_id: entity.controlling_user_id,
                    controlling_user: entity
                        .controlling_user_id
                        .and_then(|id| dynamics.persons_by_user_id.get(&id))
                        .map(|p| p.full_name()),
                    site: entity
                        .site_id
                        .and_then(|id| sites.get(&id))
                        .map(|site| Site::clone(site)),
                    project: entity
                        .project_id
                        .and_then(|id| dynamics.projects.get(&id))
                        .cloned(),
                    start_date: entity.start_date,
                    end_date: entity.end_date,
                    register_date: entity.register_date,
                    edit_date: entity.edit_date,
                    taxon_ids,
                    taxon_ids_found,
                }
            })
            .collect())
    }
}
