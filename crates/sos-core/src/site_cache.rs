//! Run-scoped cache of resolved sites.
//!
//! Sites are resolved in two tiers: a concurrent map lookup, then a single
//! demand load for the ids that were missing. Site queries run in fixed-size
//! id windows, each window holding a permit of the cache's semaphore for the
//! duration of its three queries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::AppError;
use crate::chunking::chunk_ids;
use crate::models::{Site, SiteAreaEntity};
use crate::traits::SiteSource;

pub struct SiteCache<S: SiteSource> {
    source: S,
    sites: DashMap<i32, Arc<Site>>,
    semaphore: Arc<Semaphore>,
    window_size: usize,
}

impl<S: SiteSource> SiteCache<S> {
    /// Creates an empty cache allowing `permits` concurrent site windows.
    pub fn new(source: S, permits: usize, window_size: usize) -> Self {
        Self {
            source,
            sites: DashMap::new(),
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
            window_size: window_size.max(1),
        }
    }

    pub fn is_loaded(&self, id: i32) -> bool {
        self.sites.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn get(&self, id: i32) -> Option<Arc<Site>> {
        self.sites.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Primes the cache with the sites most sightings refer to.
    ///
    /// Does nothing when the cache already holds sites. Returns the number of
    /// sites added.
    pub async fn cache_frequently_used_sites(&self) -> Result<usize, AppError> {
        if !self.sites.is_empty() {
            return Ok(0);
        }

        let ids = self.source.get_frequently_used_ids().await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let loaded = self.load_sites(&ids).await?;
        info!(count = loaded.len(), "Frequently used sites cached");
        Ok(loaded.len())
    }

    /// Resolves sites by id.
    ///
    /// Id `0` and duplicates are ignored. Ids with no site in the source are
    /// missing from the result. Queries are only issued for ids not cached.
    pub async fn get_batch_sites(&self, ids: &[i32]) -> Result<HashMap<i32, Arc<Site>>, AppError> {
        let mut found = HashMap::new();
        let mut missing = Vec::new();
        let mut seen = HashSet::new();

        for &id in ids {
            if id == 0 || !seen.insert(id) {
                continue;
            }
            match self.get(id) {
                Some(site) => {
                    found.insert(id, site);
                }
                None => missing.push(id),
            }
        }

        if missing.is_empty() {
            return Ok(found);
        }

        debug!(
            cached = found.len(),
            missing = missing.len(),
            "Loading sites on demand"
        );
        for site in self.load_sites(&missing).await? {
            found.insert(site.id, site);
        }
        Ok(found)
    }

    /// Loads sites window by window, backfills parent names and caches them.
    async fn load_sites(&self, ids: &[i32]) -> Result<Vec<Arc<Site>>, AppError> {
        let windows = chunk_ids(ids, self.window_size);
        let loaded = future::try_join_all(windows.into_iter().map(|w| self.load_window(w))).await?;
        let mut batch: HashMap<i32, Site> = loaded
            .into_iter()
            .flatten()
            .map(|site| (site.id, site))
            .collect();

        let backfill: Vec<(i32, String)> = batch
            .values()
            .filter(|site| site.needs_parent_name())
            .filter_map(|site| {
                let parent_id = site.parent_site_id?;
                let name = match batch.get(&parent_id) {
                    Some(parent) => parent.display_name().map(str::to_string),
                    None => self
                        .get(parent_id)
                        .and_then(|parent| parent.display_name().map(str::to_string)),
                }?;
                Some((site.id, name))
            })
            .collect();
        for (id, name) in backfill {
            if let Some(site) = batch.get_mut(&id) {
                site.parent_site_name = Some(name);
            }
        }

        Ok(batch
            .into_values()
            .map(|site| {
                let id = site.id;
                Arc::clone(self.sites.entry(id).or_insert_with(|| Arc::new(site)).value())
            })
            .collect())
    }

    async fn load_window(&self, ids: Vec<i32>) -> Result<Vec<Site>, AppError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| AppError::Generic("Site semaphore closed".to_string()))?;

        let (entities, areas, geometries) = tokio::try_join!(
            self.source.get_by_ids(&ids),
            self.source.get_areas_by_ids(&ids),
            self.source.get_geometries_by_ids(&ids),
        )?;

        let mut areas_by_site: HashMap<i32, Vec<SiteAreaEntity>> = HashMap::new();
        for area in areas {
            areas_by_site.entry(area.site_id).or_default().push(area);
        }
        let geometry_by_site: HashMap<i32, String> = geometries
            .into_iter()
            .map(|g| (g.site_id, g.geometry_wkt))
            .collect();

        Ok(entities
            .iter()
            .map(|entity| {
                Site::from_entity(
                    entity,
                    areas_by_site
                        .get(&entity.id)
                        .map(Vec::as_slice)
                        .unwrap_or_default(),
                    geometry_by_site.get(&entity.id).map(String::as_str),
                )
            })
            .collect())
    }
}
