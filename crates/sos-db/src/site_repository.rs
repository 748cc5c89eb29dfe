//! Site, site area and site geometry queries.

use sqlx::{PgPool, Pool, Postgres};

use sos_core::error::AppError;
use sos_core::models::{SiteAreaEntity, SiteEntity, SiteGeometryEntity};

/// Sites referenced by at least this many sightings are primed into the cache.
pub const FREQUENT_SITE_THRESHOLD: i64 = 100;

#[derive(Clone)]
pub struct SiteRepository {
    pool: Pool<Postgres>,
    frequent_threshold: i64,
}

impl SiteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            frequent_threshold: FREQUENT_SITE_THRESHOLD,
        }
    }

    /// Overrides the number of sightings that makes a site frequently used.
    pub fn with_frequent_threshold(mut self, threshold: i64) -> Self {
        self.frequent_threshold = threshold.max(1);
        self
    }
}

impl sos_core::traits::SiteSource for SiteRepository {
    async fn get_by_ids(&self, ids: &[i32]) -> Result<Vec<SiteEntity>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, SiteEntity>(
            r#"
            SELECT
                s.id,
                s.name,
                s.presentation_name,
                s.external_id,
                s.accuracy,
                s.x_coord,
                s.y_coord,
                s.diffused_x_coord,
                s.diffused_y_coord,
                s.diffusion_id,
                s.parent_site_id,
                p.name AS parent_site_name,
                s.is_public
            FROM site s
            LEFT JOIN site p ON p.id = s.parent_site_id
            WHERE s.id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }

    async fn get_areas_by_ids(&self, ids: &[i32]) -> Result<Vec<SiteAreaEntity>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, SiteAreaEntity>(
            r#"
            SELECT site_id, area_dataset_id, feature_id, name
            FROM site_area
            WHERE site_id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }

    async fn get_geometries_by_ids(
        &self,
        ids: &[i32],
    ) -> Result<Vec<SiteGeometryEntity>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, SiteGeometryEntity>(
            r#"
            SELECT site_id, geometry_wkt
            FROM site_geometry
            WHERE site_id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }

    async fn get_frequently_used_ids(&self) -> Result<Vec<i32>, AppError> {
        let ids: Vec<(i32,)> = sqlx::query_as(
            r#"
            SELECT site_id
            FROM sighting
            WHERE site_id IS NOT NULL AND site_id <> 0 AND deleted_date IS NULL
            GROUP BY site_id
            HAVING COUNT(*) >= $1
            ORDER BY site_id
            "#,
        )
        .bind(self.frequent_threshold)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
