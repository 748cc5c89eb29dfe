//! Verbatim collections stored as JSONB document tables.
//!
//! Each record type and harvest mode gets its own table named
//! `{collection}_{mode}`, e.g. `artportalen_observation_verbatim_full`.
//! Table names are built from compile-time constants only.

use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};
use tracing::debug;

use sos_core::error::AppError;
use sos_core::harvest_info::HarvestMode;
use sos_core::models::VerbatimRecord;

/// Name of the table holding records of type `T` for `mode`.
pub fn collection_table<T: VerbatimRecord>(mode: HarvestMode) -> String {
    format!("{}_{}", T::COLLECTION, mode.as_str())
}

#[derive(Clone)]
pub struct VerbatimRepository {
    pool: Pool<Postgres>,
}

impl VerbatimRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl sos_core::traits::VerbatimStore for VerbatimRepository {
    async fn delete_collection<T: VerbatimRecord>(&self, mode: HarvestMode) -> Result<(), AppError> {
        let table = collection_table::<T>(mode);
        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        debug!(table = table.as_str(), "Dropped verbatim collection");
        Ok(())
    }

    async fn add_collection<T: VerbatimRecord>(&self, mode: HarvestMode) -> Result<(), AppError> {
        let table = collection_table::<T>(mode);
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
                id INTEGER PRIMARY KEY, \
                doc JSONB NOT NULL, \
                stored_at TIMESTAMPTZ NOT NULL DEFAULT NOW()\
            )"
        ))
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        debug!(table = table.as_str(), "Created verbatim collection");
        Ok(())
    }

    async fn add_many<T: VerbatimRecord>(
        &self,
        mode: HarvestMode,
        records: &[T],
    ) -> Result<usize, AppError> {
        if records.is_empty() {
            return Ok(0);
        }

        let ids: Vec<i32> = records.iter().map(VerbatimRecord::record_id).collect();
        let docs = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;

        let result = sqlx::query(&format!(
            "INSERT INTO {} (id, doc) \
             SELECT * FROM UNNEST($1::INTEGER[], $2::JSONB[]) \
             ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc, stored_at = NOW()",
            collection_table::<T>(mode)
        ))
        .bind(&ids)
        .bind(&docs)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(result.rows_affected() as usize)
    }

    async fn get_batch<T: VerbatimRecord>(
        &self,
        mode: HarvestMode,
        after_id: i32,
        limit: usize,
    ) -> Result<Vec<T>, AppError> {
        let rows: Vec<(Json<T>,)> = sqlx::query_as(&format!(
            "SELECT doc FROM {} WHERE id > $1 ORDER BY id LIMIT $2",
            collection_table::<T>(mode)
        ))
        .bind(after_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows.into_iter().map(|(doc,)| doc.0).collect())
    }

    async fn count<T: VerbatimRecord>(&self, mode: HarvestMode) -> Result<u64, AppError> {
        let row: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {}",
            collection_table::<T>(mode)
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row.0.max(0) as u64)
    }
}
