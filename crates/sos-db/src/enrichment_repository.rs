//! Batched enrichment queries keyed by sighting id.
//!
//! Each query takes the ids of one harvest batch, so a batch costs a fixed
//! number of round trips regardless of its size.

use sqlx::{PgPool, Pool, Postgres};

use sos_core::error::AppError;
use sos_core::models::{
    MediaEntity, ProjectParameterEntity, SightingProjectEntity, SightingRelationEntity,
    SpeciesCollectionItemEntity,
};

#[derive(Clone)]
pub struct EnrichmentRepository {
    pool: Pool<Postgres>,
}

impl EnrichmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl sos_core::traits::SightingEnrichmentSource for EnrichmentRepository {
    async fn get_sighting_projects(
        &self,
        sighting_ids: &[i32],
    ) -> Result<Vec<SightingProjectEntity>, AppError> {
        let rows = sqlx::query_as::<_, SightingProjectEntity>(
            r#"
            SELECT sighting_id, project_id
            FROM sighting_project
            WHERE sighting_id = ANY($1)
            "#,
        )
        .bind(sighting_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }

    async fn get_project_parameters(
        &self,
        sighting_ids: &[i32],
    ) -> Result<Vec<ProjectParameterEntity>, AppError> {
        let rows = sqlx::query_as::<_, ProjectParameterEntity>(
            r#"
            SELECT
                v.sighting_id,
                p.project_id,
                p.id AS project_parameter_id,
                p.name,
                p.description,
                p.unit,
                p.data_type,
                v.value
            FROM project_parameter_value v
            INNER JOIN project_parameter p ON p.id = v.project_parameter_id
            WHERE v.sighting_id = ANY($1)
            ORDER BY v.sighting_id, p.id
            "#,
        )
        .bind(sighting_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }

    async fn get_sighting_relations(
        &self,
        sighting_ids: &[i32],
    ) -> Result<Vec<SightingRelationEntity>, AppError> {
        let rows = sqlx::query_as::<_, SightingRelationEntity>(
            r#"
            SELECT id, sighting_id, user_id, sighting_relation_type_id, sort, is_public, discover
            FROM sighting_relation
            WHERE sighting_id = ANY($1)
            ORDER BY sighting_id, sort
            "#,
        )
        .bind(sighting_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }

    async fn get_species_collection_items(
        &self,
        sighting_ids: &[i32],
    ) -> Result<Vec<SpeciesCollectionItemEntity>, AppError> {
        let rows = sqlx::query_as::<_, SpeciesCollectionItemEntity>(
            r#"
            SELECT
                id, sighting_id, collector_id, organization_id, description,
                determiner_user_id, determination_year, confirmator_user_id, confirmation_year
            FROM species_collection_item
            WHERE sighting_id = ANY($1)
            "#,
        )
        .bind(sighting_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }

    async fn get_media(&self, sighting_ids: &[i32]) -> Result<Vec<MediaEntity>, AppError> {
        let rows = sqlx::query_as::<_, MediaEntity>(
            r#"
            SELECT id, sighting_id, file_uri, upload_date_time, rights_holder, copyright_text
            FROM media
            WHERE sighting_id = ANY($1)
            ORDER BY sighting_id, id
            "#,
        )
        .bind(sighting_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }
}
