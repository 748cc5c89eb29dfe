//! Read-all queries for reference tables and vocabularies.
//!
//! Code tables share one translation table keyed by table name, so every
//! code table is read with the same bound query.

use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};

use sos_core::error::AppError;
use sos_core::metadata::MetadataTable;
use sos_core::models::{
    MetadataEntity, OrganizationEntity, PersonEntity, ProjectEntity, TaxonEntity, Vocabulary,
};

#[derive(Clone)]
pub struct MetadataRepository {
    pool: Pool<Postgres>,
}

impl MetadataRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl sos_core::traits::MetadataSource for MetadataRepository {
    async fn get_metadata(&self, table: MetadataTable) -> Result<Vec<MetadataEntity>, AppError> {
        let rows = sqlx::query_as::<_, MetadataEntity>(
            r#"
            SELECT id, category_id, culture_code, translation
            FROM metadata_translation
            WHERE table_name = $1
            ORDER BY id, culture_code
            "#,
        )
        .bind(table.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }

    async fn get_organizations(&self) -> Result<Vec<OrganizationEntity>, AppError> {
        let rows = sqlx::query_as::<_, OrganizationEntity>(
            "SELECT id, name, organization_code FROM organization ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }

    async fn get_taxa(&self) -> Result<Vec<TaxonEntity>, AppError> {
        let rows = sqlx::query_as::<_, TaxonEntity>(
            r#"
            SELECT id, scientific_name, vernacular_name, organism_group,
                   protection_level, disturbance_radius
            FROM taxon
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }

    async fn get_persons(&self) -> Result<Vec<PersonEntity>, AppError> {
        let rows = sqlx::query_as::<_, PersonEntity>(
            "SELECT id, user_id, first_name, last_name, alias FROM person ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }

    async fn get_projects(&self) -> Result<Vec<ProjectEntity>, AppError> {
        let rows = sqlx::query_as::<_, ProjectEntity>(
            r#"
            SELECT id, name, category, description, owner, project_url, survey_method,
                   survey_method_url, is_public, start_date, end_date
            FROM project
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }
}

/// Vocabularies stored as one JSON document each.
#[derive(Clone)]
pub struct VocabularyRepository {
    pool: Pool<Postgres>,
}

impl VocabularyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a vocabulary document.
    pub async fn upsert(&self, vocabulary: &Vocabulary) -> Result<(), AppError> {
        let key = serde_json::to_value(vocabulary.id)?;
        let key = key.as_str().unwrap_or(&vocabulary.name).to_string();

        sqlx::query(
            r#"
            INSERT INTO vocabulary (id, doc)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc
            "#,
        )
        .bind(key)
        .bind(Json(vocabulary))
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct VocabularyRow {
    doc: Json<Vocabulary>,
}

impl sos_core::traits::VocabularySource for VocabularyRepository {
    async fn get_all(&self) -> Result<Vec<Vocabulary>, AppError> {
        let rows: Vec<VocabularyRow> = sqlx::query_as("SELECT doc FROM vocabulary ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(rows.into_iter().map(|row| row.doc.0).collect())
    }
}
