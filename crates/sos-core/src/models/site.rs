//! Site aggregate built from a site row, its area memberships and its geometry.

use serde::{Deserialize, Serialize};

use crate::geometry::{self, Point, Polygon};
use crate::models::source::{SiteAreaEntity, SiteEntity};

/// Accuracy used when the source value is missing or non-positive.
pub const DEFAULT_ACCURACY: i32 = 100;

/// Administrative area datasets a site can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AreaType {
    Municipality,
    Province,
    CountryRegion,
    Parish,
    County,
}

impl AreaType {
    /// Maps an Artportalen area dataset id to an area type.
    pub fn from_dataset_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(Self::Municipality),
            16 => Some(Self::Province),
            18 => Some(Self::CountryRegion),
            19 => Some(Self::Parish),
            21 => Some(Self::County),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub feature_id: String,
    pub name: String,
}

impl From<&SiteAreaEntity> for Area {
    fn from(entity: &SiteAreaEntity) -> Self {
        Self {
            feature_id: entity.feature_id.clone(),
            name: entity.name.clone(),
        }
    }
}

/// A resolved site. Positions are WGS84.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: i32,
    pub name: Option<String>,
    pub presentation_name: Option<String>,
    pub external_id: Option<String>,
    /// Coordinate uncertainty in meters, always positive.
    pub accuracy: i32,
    /// Raw Web Mercator coordinates as stored in the source.
    pub x_coord: f64,
    pub y_coord: f64,
    pub point: Option<Point>,
    pub point_with_buffer: Option<Polygon>,
    pub diffused_point: Option<Point>,
    pub diffused_point_with_buffer: Option<Polygon>,
    /// True only when the site's own polygon is valid after transformation.
    pub has_geometry: bool,
    pub diffusion_id: i32,
    pub county: Option<Area>,
    pub municipality: Option<Area>,
    pub parish: Option<Area>,
    pub province: Option<Area>,
    pub country_region: Option<Area>,
    pub parent_site_id: Option<i32>,
    pub parent_site_name: Option<String>,
    pub is_public: bool,
}

impl PartialEq for Site {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Site {}

impl Site {
    /// Casts a site row with its areas and optional WKT geometry.
    ///
    /// Areas belonging to other sites are ignored. Geometry that fails to
    /// parse or is invalid after transformation is treated as absent.
    pub fn from_entity(
        entity: &SiteEntity,
        areas: &[SiteAreaEntity],
        geometry_wkt: Option<&str>,
    ) -> Self {
        let accuracy = if entity.accuracy > 0 {
            entity.accuracy
        } else {
            DEFAULT_ACCURACY
        };

        let point = projected_point(entity.x_coord, entity.y_coord);

        let polygon = geometry_wkt
            .and_then(geometry::parse_wkt_polygon)
            .map(|p| p.map_points(geometry::web_mercator_to_wgs84))
            .filter(Polygon::is_valid);
        let has_geometry = polygon.is_some();

        let point_with_buffer =
            polygon.or_else(|| point.map(|p| geometry::circle(p, f64::from(accuracy))));

        let diffused_point = match (entity.diffused_x_coord, entity.diffused_y_coord) {
            (Some(x), Some(y)) => projected_point(x, y),
            _ => None,
        };
        let diffused_point_with_buffer =
            diffused_point.map(|p| geometry::circle(p, f64::from(accuracy)));

        let mut site = Self {
            id: entity.id,
            name: entity.name.clone(),
            presentation_name: entity.presentation_name.clone(),
            external_id: entity.external_id.clone(),
            accuracy,
            x_coord: entity.x_coord,
            y_coord: entity.y_coord,
            point,
            point_with_buffer,
            diffused_point,
            diffused_point_with_buffer,
            has_geometry,
            diffusion_id: entity.diffusion_id,
            county: None,
            municipality: None,
            parish: None,
            province: None,
            country_region: None,
            parent_site_id: entity.parent_site_id.filter(|id| *id != 0),
            parent_site_name: entity.parent_site_name.clone(),
            is_public: entity.is_public,
        };

        for area in areas.iter().filter(|a| a.site_id == entity.id) {
            let Some(area_type) = AreaType::from_dataset_id(area.area_dataset_id) else {
                continue;
            };
            let slot = match area_type {
                AreaType::County => &mut site.county,
                AreaType::Municipality => &mut site.municipality,
                AreaType::Parish => &mut site.parish,
                AreaType::Province => &mut site.province,
                AreaType::CountryRegion => &mut site.country_region,
            };
            *slot = Some(Area::from(area));
        }

        site
    }

    /// True when the parent is known by id but its name is missing.
    pub fn needs_parent_name(&self) -> bool {
        self.parent_site_id.is_some()
            && self
                .parent_site_name
                .as_deref()
                .is_none_or(|n| n.trim().is_empty())
    }

    /// Name to display for the site, preferring the presentation name.
    pub fn display_name(&self) -> Option<&str> {
        self.presentation_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.name.as_deref())
    }

    /// True when sensitive sightings at this site are published diffused.
    pub fn supports_diffusion(&self) -> bool {
        self.diffusion_id > 0
    }
}

/// A source position only exists when both coordinates are positive.
fn projected_point(x: f64, y: f64) -> Option<Point> {
    if x > 0.0 && y > 0.0 {
        Some(geometry::web_mercator_to_wgs84(Point::new(x, y)))
    } else {
        None
    }
}
