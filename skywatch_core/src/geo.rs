//! The "GEO" utilities - points, bounding regions and spherical distance.
//!
//! Everything here is pure math. Positions are WGS84 degrees; distances are
//! great-circle (haversine, via the `geo` crate), never Euclidean on degrees.

use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};

/// Latitude limit of the web-mercator world view.
pub const MERCATOR_MAX_LAT: f64 = 85.0511;

// ============================================================================
// GEO POINT
// ============================================================================

/// A validated WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees [-90, 90]
    pub lat: f64,

    /// Longitude in degrees [-180, 180]
    pub lon: f64,
}

impl GeoPoint {
    /// Create a point, rejecting non-finite or out-of-range coordinates.
    pub fn new(lat: f64, lon: f64) -> Result<Self, GeoError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(GeoError::NonFinite);
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::InvalidLatitude(lat));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(GeoError::InvalidLongitude(lon));
        }
        Ok(Self { lat, lon })
    }

    /// Build a point from feed fields where either coordinate may be missing.
    ///
    /// Returns `None` when a coordinate is absent or invalid.
    pub fn from_options(lat: Option<f64>, lon: Option<f64>) -> Option<Self> {
        match (lat, lon) {
            (Some(lat), Some(lon)) => Self::new(lat, lon).ok(),
            _ => None,
        }
    }

    /// Great-circle distance to `other` in kilometres.
    pub fn haversine_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(*self, *other)
    }
}

impl From<GeoPoint> for Point<f64> {
    fn from(p: GeoPoint) -> Self {
        // geo uses (x, y) = (lon, lat)
        Point::new(p.lon, p.lat)
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lat, self.lon)
    }
}

/// Great-circle (haversine) distance in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let pa: Point<f64> = a.into();
    let pb: Point<f64> = b.into();
    pa.haversine_distance(&pb) / 1000.0
}

/// Midpoint of the straight segment between `a` and `b` as drawn on the map.
///
/// This is where the distance label of a route line is anchored.
pub fn midpoint(a: GeoPoint, b: GeoPoint) -> GeoPoint {
    GeoPoint {
        lat: (a.lat + b.lat) / 2.0,
        lon: (a.lon + b.lon) / 2.0,
    }
}

// ============================================================================
// BOUNDS
// ============================================================================

/// A rectangular region as min/max latitude and longitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl Bounds {
    /// The "whole world" fallback region.
    pub const WORLD: Bounds = Bounds {
        min_lat: -MERCATOR_MAX_LAT,
        min_lon: -180.0,
        max_lat: MERCATOR_MAX_LAT,
        max_lon: 180.0,
    };

    /// Zero-area bounds at a single point.
    pub fn from_point(p: GeoPoint) -> Self {
        Self {
            min_lat: p.lat,
            min_lon: p.lon,
            max_lat: p.lat,
            max_lon: p.lon,
        }
    }

    /// Smallest rectangle enclosing all points, or `None` for no points.
    pub fn enclosing<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = GeoPoint>,
    {
        let mut iter = points.into_iter();
        let mut bounds = Self::from_point(iter.next()?);
        for p in iter {
            bounds.expand_to(p);
        }
        Some(bounds)
    }

    /// A square region of `half_span_deg` around `center`, clamped to the world.
    pub fn around(center: GeoPoint, half_span_deg: f64) -> Self {
        Self {
            min_lat: center.lat - half_span_deg,
            min_lon: center.lon - half_span_deg,
            max_lat: center.lat + half_span_deg,
            max_lon: center.lon + half_span_deg,
        }
        .clamped()
    }

    /// Grow the rectangle so it contains `p`.
    pub fn expand_to(&mut self, p: GeoPoint) {
        self.min_lat = self.min_lat.min(p.lat);
        self.min_lon = self.min_lon.min(p.lon);
        self.max_lat = self.max_lat.max(p.lat);
        self.max_lon = self.max_lon.max(p.lon);
    }

    /// Grow the rectangle so it contains `other`.
    pub fn extend(&mut self, other: &Bounds) {
        self.min_lat = self.min_lat.min(other.min_lat);
        self.min_lon = self.min_lon.min(other.min_lon);
        self.max_lat = self.max_lat.max(other.max_lat);
        self.max_lon = self.max_lon.max(other.max_lon);
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: &GeoPoint) -> bool {
        p.lat >= self.min_lat
            && p.lat <= self.max_lat
            && p.lon >= self.min_lon
            && p.lon <= self.max_lon
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: (self.min_lat + self.max_lat) / 2.0,
            lon: (self.min_lon + self.max_lon) / 2.0,
        }
    }

    /// Expand each side by `fraction` of the span.
    ///
    /// Spans smaller than `min_span_deg` are treated as `min_span_deg` so a
    /// lone point still gets a visible region. The result is clamped to valid
    /// coordinates and always contains the original rectangle.
    pub fn padded(&self, fraction: f64, min_span_deg: f64) -> Self {
        let pad_lat = self.lat_span().max(min_span_deg) * fraction
            + (min_span_deg - self.lat_span()).max(0.0) / 2.0;
        let pad_lon = self.lon_span().max(min_span_deg) * fraction
            + (min_span_deg - self.lon_span()).max(0.0) / 2.0;

        Self {
            min_lat: self.min_lat - pad_lat,
            min_lon: self.min_lon - pad_lon,
            max_lat: self.max_lat + pad_lat,
            max_lon: self.max_lon + pad_lon,
        }
        .clamped()
    }

    /// Clamp to valid latitude/longitude ranges.
    pub fn clamped(&self) -> Self {
        Self {
            min_lat: self.min_lat.max(-90.0),
            min_lon: self.min_lon.max(-180.0),
            max_lat: self.max_lat.min(90.0),
            max_lon: self.max_lon.min(180.0),
        }
    }

    /// True when min <= max on both axes and all values are finite.
    pub fn is_valid(&self) -> bool {
        [self.min_lat, self.min_lon, self.max_lat, self.max_lon]
            .iter()
            .all(|v| v.is_finite())
            && self.min_lat <= self.max_lat
            && self.min_lon <= self.max_lon
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors from coordinate validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("Latitude out of range: {0}")]
    InvalidLatitude(f64),

    #[error("Longitude out of range: {0}")]
    InvalidLongitude(f64),

    #[error("Coordinate is not a finite number")]
    NonFinite,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pt(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn test_point_validation() {
        assert!(GeoPoint::new(27.7172, 85.324).is_ok());
        assert_eq!(GeoPoint::new(91.0, 0.0), Err(GeoError::InvalidLatitude(91.0)));
        assert_eq!(GeoPoint::new(0.0, -181.0), Err(GeoError::InvalidLongitude(-181.0)));
        assert_eq!(GeoPoint::new(f64::NAN, 0.0), Err(GeoError::NonFinite));
    }

    #[test]
    fn test_from_options_requires_both() {
        assert!(GeoPoint::from_options(Some(1.0), None).is_none());
        assert!(GeoPoint::from_options(None, Some(1.0)).is_none());
        assert!(GeoPoint::from_options(Some(1.0), Some(2.0)).is_some());
        assert!(GeoPoint::from_options(Some(100.0), Some(2.0)).is_none());
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        // One degree of latitude is ~111.2 km on the mean sphere
        let d = haversine_km(pt(0.0, 0.0), pt(1.0, 0.0));
        assert_relative_eq!(d, 111.19, epsilon = 0.1);
    }

    #[test]
    fn test_haversine_kathmandu_bangkok() {
        let d = haversine_km(pt(27.7172, 85.324), pt(13.7563, 100.5018));
        assert!(d > 2000.0 && d < 2400.0, "unexpected distance {}", d);
    }

    #[test]
    fn test_haversine_same_point_is_zero() {
        let p = pt(13.7563, 100.5018);
        assert_eq!(haversine_km(p, p), 0.0);
    }

    #[test]
    fn test_midpoint() {
        let m = midpoint(pt(10.0, 20.0), pt(20.0, 40.0));
        assert_relative_eq!(m.lat, 15.0);
        assert_relative_eq!(m.lon, 30.0);
    }

    #[test]
    fn test_enclosing_and_contains() {
        let b = Bounds::enclosing(vec![pt(10.0, 10.0), pt(-5.0, 30.0), pt(2.0, -4.0)]).unwrap();
        assert_eq!(b.min_lat, -5.0);
        assert_eq!(b.max_lat, 10.0);
        assert_eq!(b.min_lon, -4.0);
        assert_eq!(b.max_lon, 30.0);
        assert!(b.contains(&pt(0.0, 0.0)));
        assert!(b.contains(&pt(10.0, 30.0)));
        assert!(!b.contains(&pt(11.0, 0.0)));

        assert!(Bounds::enclosing(Vec::new()).is_none());
    }

    #[test]
    fn test_padded_keeps_original_inside() {
        let b = Bounds::enclosing(vec![pt(10.0, 10.0), pt(20.0, 30.0)]).unwrap();
        let p = b.padded(0.1, 0.5);
        assert_relative_eq!(p.min_lat, 9.0);
        assert_relative_eq!(p.max_lat, 21.0);
        assert_relative_eq!(p.min_lon, 8.0);
        assert_relative_eq!(p.max_lon, 32.0);
    }

    #[test]
    fn test_padded_single_point_gets_area() {
        let b = Bounds::from_point(pt(45.0, 7.0)).padded(0.08, 1.0);
        assert!(b.lat_span() >= 1.0);
        assert!(b.lon_span() >= 1.0);
        assert!(b.contains(&pt(45.0, 7.0)));
    }

    #[test]
    fn test_padded_clamps_to_world() {
        let b = Bounds::from_point(pt(89.9, 179.9)).padded(0.1, 2.0);
        assert!(b.max_lat <= 90.0);
        assert!(b.max_lon <= 180.0);
        assert!(b.is_valid());
    }

    #[test]
    fn test_around() {
        let b = Bounds::around(pt(0.0, 0.0), 5.0);
        assert_eq!(b.lat_span(), 10.0);
        assert!(b.contains(&pt(0.0, 0.0)));
        assert_eq!(b.center(), pt(0.0, 0.0));
    }
}
