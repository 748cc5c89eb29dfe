//! Run history for harvest and processing stages.
//!
//! Every saved [`HarvestInfo`] becomes its own row, so the table keeps the
//! full history of a harvest id rather than only its latest state.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use sos_core::error::AppError;
use sos_core::harvest_info::HarvestInfo;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS harvest_info (
        run_id UUID PRIMARY KEY,
        harvest_id VARCHAR NOT NULL,
        start_time TIMESTAMPTZ NOT NULL,
        end_time TIMESTAMPTZ,
        status VARCHAR NOT NULL,
        count BIGINT NOT NULL,
        notes TEXT
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_harvest_info_latest ON harvest_info(harvest_id, start_time DESC)",
];

#[derive(Clone)]
pub struct HarvestInfoRepository {
    pool: Pool<Postgres>,
}

impl HarvestInfoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the history table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(AppError::DatabaseError)?;
        }
        Ok(())
    }

    /// Most recent runs of a harvest id, newest first.
    pub async fn history(&self, harvest_id: &str, limit: i64) -> Result<Vec<HarvestInfo>, AppError> {
        let rows: Vec<HarvestInfoRow> = sqlx::query_as(
            r#"
            SELECT harvest_id, start_time, end_time, status, count, notes
            FROM harvest_info
            WHERE harvest_id = $1
            ORDER BY start_time DESC
            LIMIT $2
            "#,
        )
        .bind(harvest_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        rows.into_iter().map(HarvestInfo::try_from).collect()
    }
}

// =============================================================================
// Helper Types for Database Mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct HarvestInfoRow {
    harvest_id: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    status: String,
    count: i64,
    notes: Option<String>,
}

impl TryFrom<HarvestInfoRow> for HarvestInfo {
    type Error = AppError;

    fn try_from(row: HarvestInfoRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.harvest_id,
            start: row.start_time,
            end: row.end_time,
            status: row.status.parse()?,
            count: row.count,
            notes: row.notes,
        })
    }
}

// =============================================================================
// Trait Implementation: HarvestInfoStore
// =============================================================================

impl sos_core::traits::HarvestInfoStore for HarvestInfoRepository {
    async fn save(&self, info: &HarvestInfo) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO harvest_info (run_id, harvest_id, start_time, end_time, status, count, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&info.id)
        .bind(info.start)
        .bind(info.end)
        .bind(info.status.as_str())
        .bind(info.count)
        .bind(&info.notes)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }

    async fn get_latest(&self, id: &str) -> Result<Option<HarvestInfo>, AppError> {
        let row: Option<HarvestInfoRow> = sqlx::query_as(
            r#"
            SELECT harvest_id, start_time, end_time, status, count, notes
            FROM harvest_info
            WHERE harvest_id = $1
            ORDER BY start_time DESC
            LIMIT 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        row.map(HarvestInfo::try_from).transpose()
    }
}
