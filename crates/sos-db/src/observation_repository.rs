//! Processed observations, split into a public and a protected table.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};

use sos_core::error::AppError;
use sos_core::models::Observation;

const PUBLIC_TABLE: &str = "observation_public";
const PROTECTED_TABLE: &str = "observation_protected";

/// Statements creating both observation tables.
const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS observation_public (
        occurrence_id TEXT PRIMARY KEY,
        data_provider_id INTEGER NOT NULL,
        modified TIMESTAMPTZ NOT NULL,
        doc JSONB NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_observation_public_provider ON observation_public(data_provider_id, modified)",
    r#"CREATE TABLE IF NOT EXISTS observation_protected (
        occurrence_id TEXT PRIMARY KEY,
        data_provider_id INTEGER NOT NULL,
        modified TIMESTAMPTZ NOT NULL,
        doc JSONB NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_observation_protected_provider ON observation_protected(data_provider_id, modified)",
];

fn table(protected: bool) -> &'static str {
    if protected {
        PROTECTED_TABLE
    } else {
        PUBLIC_TABLE
    }
}

/// The observation index backed by two PostgreSQL tables.
#[derive(Clone)]
pub struct ObservationRepository {
    pool: Pool<Postgres>,
}

impl ObservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the observation tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(AppError::DatabaseError)?;
        }
        Ok(())
    }

    /// Fetches one observation by occurrence id.
    pub async fn get(
        &self,
        occurrence_id: &str,
        protected: bool,
    ) -> Result<Option<Observation>, AppError> {
        let row: Option<(Json<Observation>,)> = sqlx::query_as(&format!(
            "SELECT doc FROM {} WHERE occurrence_id = $1",
            table(protected)
        ))
        .bind(occurrence_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row.map(|(doc,)| doc.0))
    }

    /// Number of observations in one half of the index.
    pub async fn count(&self, protected: bool) -> Result<i64, AppError> {
        let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table(protected)))
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(row.0)
    }
}

// =============================================================================
// Trait Implementation: ObservationIndex
// =============================================================================

impl sos_core::traits::ObservationIndex for ObservationRepository {
    async fn delete_by_occurrence_ids(
        &self,
        occurrence_ids: &[String],
        protected: bool,
    ) -> Result<u64, AppError> {
        if occurrence_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE occurrence_id = ANY($1)",
            table(protected)
        ))
        .bind(occurrence_ids)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(result.rows_affected())
    }

    async fn delete_provider_data(
        &self,
        data_provider_id: i32,
        protected: bool,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE data_provider_id = $1",
            table(protected)
        ))
        .bind(data_provider_id)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(result.rows_affected())
    }

    async fn add_many(
        &self,
        observations: &[Observation],
        protected: bool,
    ) -> Result<usize, AppError> {
        if observations.is_empty() {
            return Ok(0);
        }

        let mut occurrence_ids = Vec::with_capacity(observations.len());
        let mut providers = Vec::with_capacity(observations.len());
        let mut modified = Vec::with_capacity(observations.len());
        let mut docs = Vec::with_capacity(observations.len());
        for observation in observations {
            occurrence_ids.push(observation.occurrence_id().to_string());
            providers.push(observation.data_provider_id);
            modified.push(observation.modified);
            docs.push(serde_json::to_value(observation)?);
        }

        let result = sqlx::query(&format!(
            "INSERT INTO {} (occurrence_id, data_provider_id, modified, doc) \
             SELECT * FROM UNNEST($1::TEXT[], $2::INTEGER[], $3::TIMESTAMPTZ[], $4::JSONB[]) \
             ON CONFLICT (occurrence_id) DO UPDATE SET \
                data_provider_id = EXCLUDED.data_provider_id, \
                modified = EXCLUDED.modified, \
                doc = EXCLUDED.doc",
            table(protected)
        ))
        .bind(&occurrence_ids)
        .bind(&providers)
        .bind(&modified)
        .bind(&docs)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(result.rows_affected() as usize)
    }

    async fn get_latest_modified_date(
        &self,
        data_provider_id: i32,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let row: (Option<DateTime<Utc>>,) = sqlx::query_as(
            r#"
            SELECT MAX(modified) FROM (
                SELECT modified FROM observation_public WHERE data_provider_id = $1
                UNION ALL
                SELECT modified FROM observation_protected WHERE data_provider_id = $1
            ) AS m
            "#,
        )
        .bind(data_provider_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row.0)
    }
}
