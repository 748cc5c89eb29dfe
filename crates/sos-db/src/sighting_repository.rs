//! Sighting and checklist queries against the Artportalen source database.
//!
//! Sightings can be read from two physical copies of the database. The
//! repository holds one pool per [`Replica`] and routes every query to the
//! pool the caller names.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};

use sos_core::chunking::IdChunk;
use sos_core::config::Replica;
use sos_core::error::AppError;
use sos_core::models::{ChecklistEntity, ChecklistTaxonEntity, SightingEntity};

/// Column list for sighting SELECT queries. Must remain a const literal to ensure
/// SQL safety since format!() bypasses sqlx compile-time validation.
const SIGHTING_COLUMNS: &str = "id, taxon_id, site_id, start_date, end_date, activity_id, \
    biotope_id, biotope_description, gender_id, stage_id, substrate_id, substrate_description, \
    unit_id, validation_status_id, discovery_method_id, determination_method_id, quantity, \
    quantity_of_substrate, length, weight, min_depth, max_depth, min_height, max_height, \
    comment, label, not_present, not_recovered, unsure_determination, unspontaneous, \
    protected_by_system, hidden_by_provider, owner_organization_id, rights_holder, \
    sighting_type_id, checklist_id, register_date, edit_date";

/// Sightings that are neither deleted nor rejected.
const HARVESTABLE: &str = "deleted_date IS NULL AND rejected_date IS NULL";

const CHECKLIST_COLUMNS: &str = "id, name, controlling_user_id, site_id, project_id, \
    start_date, end_date, register_date, edit_date";

/// Repository for Artportalen sightings.
///
/// # Examples
///
/// ```no_run
/// use sqlx::postgres::PgPoolOptions;
/// use sos_db::SightingRepository;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let live = PgPoolOptions::new()
///     .max_connections(5)
///     .connect("postgresql://localhost/artportalen")
///     .await?;
/// let backup = PgPoolOptions::new()
///     .max_connections(5)
///     .connect("postgresql://standby/artportalen")
///     .await?;
///
/// let repo = SightingRepository::new(live, backup);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SightingRepository {
    live: Pool<Postgres>,
    backup: Pool<Postgres>,
}

impl SightingRepository {
    pub fn new(live: PgPool, backup: PgPool) -> Self {
        Self { live, backup }
    }

    /// Uses one pool for both replicas.
    pub fn single(pool: PgPool) -> Self {
        Self::new(pool.clone(), pool)
    }

    fn pool(&self, replica: Replica) -> &PgPool {
        match replica {
            Replica::Live => &self.live,
            Replica::Backup => &self.backup,
        }
    }
}

#[derive(sqlx::FromRow)]
struct IdSpanRow {
    min_id: Option<i32>,
    max_id: Option<i32>,
}

impl IdSpanRow {
    fn span(self) -> Option<(i32, i32)> {
        self.min_id.zip(self.max_id)
    }
}

// =============================================================================
// Trait Implementation: SightingSource
// =============================================================================

impl sos_core::traits::SightingSource for SightingRepository {
    async fn get_id_span(&self, replica: Replica) -> Result<Option<(i32, i32)>, AppError> {
        let row: IdSpanRow = sqlx::query_as(&format!(
            "SELECT MIN(id) AS min_id, MAX(id) AS max_id FROM sighting WHERE {HARVESTABLE}"
        ))
        .fetch_one(self.pool(replica))
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row.span())
    }

    async fn get_chunk(
        &self,
        replica: Replica,
        chunk: IdChunk,
    ) -> Result<Vec<SightingEntity>, AppError> {
        let rows = sqlx::query_as::<_, SightingEntity>(&format!(
            "SELECT {SIGHTING_COLUMNS} FROM sighting \
             WHERE id BETWEEN $1 AND $2 AND {HARVESTABLE} \
             ORDER BY id"
        ))
        .bind(chunk.start)
        .bind(chunk.last_id())
        .fetch_all(self.pool(replica))
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }

    async fn get_by_ids(
        &self,
        replica: Replica,
        ids: &[i32],
    ) -> Result<Vec<SightingEntity>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, SightingEntity>(&format!(
            "SELECT {SIGHTING_COLUMNS} FROM sighting \
             WHERE id = ANY($1) AND {HARVESTABLE} \
             ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(self.pool(replica))
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }

    async fn get_modified_ids(
        &self,
        replica: Replica,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<i32>, AppError> {
        let ids: Vec<(i32,)> = sqlx::query_as(&format!(
            "SELECT id FROM sighting \
             WHERE edit_date >= $1 AND {HARVESTABLE} \
             ORDER BY edit_date, id \
             LIMIT $2"
        ))
        .bind(since)
        .bind(limit as i64)
        .fetch_all(self.pool(replica))
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn get_deleted_ids(
        &self,
        replica: Replica,
        since: DateTime<Utc>,
    ) -> Result<Vec<i32>, AppError> {
        let ids: Vec<(i32,)> = sqlx::query_as(
            r#"
            SELECT id FROM sighting
            WHERE deleted_date > $1
            ORDER BY id
            "#,
        )
        .bind(since)
        .fetch_all(self.pool(replica))
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn get_rejected_ids(
        &self,
        replica: Replica,
        since: DateTime<Utc>,
    ) -> Result<Vec<i32>, AppError> {
        let ids: Vec<(i32,)> = sqlx::query_as(
            r#"
            SELECT id FROM sighting
            WHERE rejected_date > $1 AND deleted_date IS NULL
            ORDER BY id
            "#,
        )
        .bind(since)
        .fetch_all(self.pool(replica))
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn get_last_modified_date(
        &self,
        replica: Replica,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let row: (Option<DateTime<Utc>>,) = sqlx::query_as("SELECT MAX(edit_date) FROM sighting")
            .fetch_one(self.pool(replica))
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(row.0)
    }
}

/// Repository for Artportalen checklists. Checklists are only read in full
/// harvests, so a single pool is enough.
#[derive(Clone)]
pub struct ChecklistRepository {
    pool: Pool<Postgres>,
}

impl ChecklistRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl sos_core::traits::ChecklistSource for ChecklistRepository {
    async fn get_id_span(&self) -> Result<Option<(i32, i32)>, AppError> {
        let row: IdSpanRow =
            sqlx::query_as("SELECT MIN(id) AS min_id, MAX(id) AS max_id FROM checklist")
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::DatabaseError)?;

        Ok(row.span())
    }

    async fn get_chunk(&self, chunk: IdChunk) -> Result<Vec<ChecklistEntity>, AppError> {
        let rows = sqlx::query_as::<_, ChecklistEntity>(&format!(
            "SELECT {CHECKLIST_COLUMNS} FROM checklist WHERE id BETWEEN $1 AND $2 ORDER BY id"
        ))
        .bind(chunk.start)
        .bind(chunk.last_id())
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }

    async fn get_checklist_taxa(
        &self,
        checklist_ids: &[i32],
    ) -> Result<Vec<ChecklistTaxonEntity>, AppError> {
        if checklist_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, ChecklistTaxonEntity>(
            r#"
            SELECT checklist_id, taxon_id, found
            FROM checklist_taxon
            WHERE checklist_id = ANY($1)
            ORDER BY checklist_id, taxon_id
            "#,
        )
        .bind(checklist_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }
}
