//! Minimal planar geometry for site positions.
//!
//! Source coordinates are Web Mercator (EPSG:3857); everything stored on a
//! [`crate::models::Site`] is WGS84 (EPSG:4326) with `x` as longitude and
//! `y` as latitude.

use std::f64::consts::PI;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Semi-major axis of the WGS84 ellipsoid, used by Web Mercator.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Meters per degree of latitude, close enough for search buffers.
const METERS_PER_DEGREE: f64 = 111_320.0;

const CIRCLE_SEGMENTS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Returns the point in WKT.
    ///
    /// ```
    /// use sos_core::geometry::Point;
    /// assert_eq!(Point::new(18.07, 59.33).to_wkt(), "POINT(18.07 59.33)");
    /// ```
    pub fn to_wkt(&self) -> String {
        format!("POINT({} {})", self.x, self.y)
    }
}

/// A polygon described by its exterior ring. Holes are not kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<Point>,
}

impl Polygon {
    pub fn new(exterior: Vec<Point>) -> Self {
        Self { exterior }
    }

    pub fn map_points(&self, f: impl Fn(Point) -> Point) -> Self {
        Self {
            exterior: self.exterior.iter().copied().map(f).collect(),
        }
    }

    /// Signed area by the shoelace formula.
    pub fn signed_area(&self) -> f64 {
        self.exterior
            .windows(2)
            .map(|w| w[0].x * w[1].y - w[1].x * w[0].y)
            .sum::<f64>()
            / 2.0
    }

    /// True for a closed, finite, non-degenerate ring without self-intersections.
    pub fn is_valid(&self) -> bool {
        let ring = &self.exterior;
        if ring.len() < 4 {
            return false;
        }
        if ring.first() != ring.last() {
            return false;
        }
        if !ring.iter().all(Point::is_finite) {
            return false;
        }
        if self.signed_area().abs() <= f64::EPSILON {
            return false;
        }

        !self.has_self_intersection()
    }

    /// Sweeps the ring's segments by x, testing only pairs whose x ranges
    /// overlap. Segments sharing a vertex are not compared.
    fn has_self_intersection(&self) -> bool {
        let ring = &self.exterior;
        let segments = ring.len() - 1;
        let min_x = |i: usize| ring[i].x.min(ring[i + 1].x);
        let max_x = |i: usize| ring[i].x.max(ring[i + 1].x);

        let mut order: Vec<usize> = (0..segments).collect();
        order.sort_by(|&a, &b| min_x(a).total_cmp(&min_x(b)));

        let mut active: Vec<usize> = Vec::new();
        for i in order {
            let start = min_x(i);
            active.retain(|&j| max_x(j) >= start);
            for &j in &active {
                let (lo, hi) = (i.min(j), i.max(j));
                if hi == lo + 1 || (lo == 0 && hi == segments - 1) {
                    continue;
                }
                if segments_intersect(ring[i], ring[i + 1], ring[j], ring[j + 1]) {
                    return true;
                }
            }
            active.push(i);
        }
        false
    }

    pub fn to_wkt(&self) -> String {
        let mut wkt = String::from("POLYGON((");
        for (i, p) in self.exterior.iter().enumerate() {
            if i > 0 {
                wkt.push_str(", ");
            }
            let _ = write!(wkt, "{} {}", p.x, p.y);
        }
        wkt.push_str("))");
        wkt
    }
}

fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

fn segments_intersect(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(q1, q2, p1))
        || (d2 == 0.0 && on_segment(q1, q2, p2))
        || (d3 == 0.0 && on_segment(p1, p2, q1))
        || (d4 == 0.0 && on_segment(p1, p2, q2))
}

/// Converts Web Mercator meters to WGS84 degrees.
pub fn web_mercator_to_wgs84(point: Point) -> Point {
    let lon = point.x / EARTH_RADIUS_M * 180.0 / PI;
    let lat = (2.0 * (point.y / EARTH_RADIUS_M).exp().atan() - PI / 2.0) * 180.0 / PI;
    Point::new(lon, lat)
}

/// Approximates a circle of `radius_m` meters around a WGS84 point.
pub fn circle(center: Point, radius_m: f64) -> Polygon {
    let lat_offset = radius_m / METERS_PER_DEGREE;
    let lon_offset = radius_m / (METERS_PER_DEGREE * center.y.to_radians().cos().max(1e-6));

    let mut exterior: Vec<Point> = (0..CIRCLE_SEGMENTS)
        .map(|i| {
            let angle = 2.0 * PI * i as f64 / CIRCLE_SEGMENTS as f64;
            Point::new(
                center.x + lon_offset * angle.cos(),
                center.y + lat_offset * angle.sin(),
            )
        })
        .collect();
    exterior.push(exterior[0]);
    Polygon::new(exterior)
}

/// Parses the exterior ring of a `POLYGON` or the first polygon of a
/// `MULTIPOLYGON`. Returns `None` for other geometry types or malformed text.
///
/// ```
/// use sos_core::geometry::parse_wkt_polygon;
/// let polygon = parse_wkt_polygon("POLYGON ((0 0, 10 0, 10 10, 0 0))").unwrap();
/// assert_eq!(polygon.exterior.len(), 4);
/// ```
pub fn parse_wkt_polygon(wkt: &str) -> Option<Polygon> {
    let trimmed = wkt.trim();
    let upper = trimmed.to_ascii_uppercase();
    if !(upper.starts_with("POLYGON") || upper.starts_with("MULTIPOLYGON")) {
        return None;
    }

    let open = trimmed.find('(')?;
    let body = trimmed[open..].trim_start_matches(|c: char| c == '(' || c.is_whitespace());
    let close = body.find(')')?;
    let ring_text = &body[..close];

    let exterior = ring_text
        .split(',')
        .map(|pair| {
            let mut parts = pair.split_whitespace();
            let x = parts.next()?.parse::<f64>().ok()?;
            let y = parts.next()?.parse::<f64>().ok()?;
            Some(Point::new(x, y))
        })
        .collect::<Option<Vec<_>>>()?;

    if exterior.is_empty() {
        None
    } else {
        Some(Polygon::new(exterior))
    }
}
