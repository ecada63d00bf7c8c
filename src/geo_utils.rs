//! # Geographic Utilities
//!
//! Distance, length and bounds helpers for WGS84 polylines, plus the local
//! metric projection used for all buffer and intersection geometry.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`polyline_length`] | Total length of a polyline in meters |
//! | [`cumulative_lengths`] | Running haversine length at every vertex |
//! | [`compute_bounds`] | Bounding box of a polyline |
//! | [`LocalProjection`] | WGS84 to planar meters around an origin |
//!
//! ## Example
//!
//! ```rust
//! use street_coverage::{GpsPoint, geo_utils};
//!
//! let street = vec![
//!     GpsPoint::new(42.3876, -71.0995),
//!     GpsPoint::new(42.3880, -71.0990),
//!     GpsPoint::new(42.3885, -71.0982),
//! ];
//!
//! let length = geo_utils::polyline_length(&street);
//! println!("Street length: {:.0}m", length);
//! ```
//!
//! ## Coordinate System
//!
//! Inputs are WGS84 degrees. Buffering and intersection happen in the planar
//! frame of a [`LocalProjection`], an equirectangular projection centered on
//! the street network. Over a city-sized extent its distortion is well below
//! typical GPS error.

use geo::{Coord, Distance, Haversine, Point};

use crate::{Bounds, GpsPoint};

/// Mean Earth radius in meters (same value geo's haversine uses).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance between two GPS points in meters.
///
/// ```rust
/// use street_coverage::{GpsPoint, geo_utils};
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Total length of a polyline in meters. Empty or single-point input returns 0.0.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Cumulative haversine length at each vertex; the first entry is 0.0 and the
/// last equals [`polyline_length`].
pub fn cumulative_lengths(points: &[GpsPoint]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(points.len());
    let mut total = 0.0;
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            total += haversine_distance(&points[i - 1], p);
        }
        cumulative.push(total);
    }
    cumulative
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Bounding box of a polyline.
///
/// For empty input the result holds MIN/MAX sentinels and overlaps nothing;
/// use [`Bounds::from_points`] when emptiness matters.
pub fn compute_bounds(points: &[GpsPoint]) -> Bounds {
    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Bounds { min_lat, max_lat, min_lng, max_lng }
}

// =============================================================================
// Local Projection
// =============================================================================

/// Equirectangular projection of WGS84 coordinates to planar meters.
///
/// `x` grows east and `y` grows north from the origin. Segments and tracks of
/// one run must be projected with the same instance so buffer radii and
/// lengths share a coordinate system.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalProjection {
    origin: GpsPoint,
    meters_per_radian_lng: f64,
}

impl LocalProjection {
    /// Projection centered on `origin`.
    pub fn new(origin: GpsPoint) -> Self {
        // Clamp near the poles, where longitude stops carrying distance
        let cos_lat = origin.latitude.to_radians().cos().max(1e-6);
        Self {
            origin,
            meters_per_radian_lng: EARTH_RADIUS_M * cos_lat,
        }
    }

    /// Projection centered on the middle of `bounds`.
    pub fn from_bounds(bounds: &Bounds) -> Self {
        Self::new(bounds.center())
    }

    pub fn origin(&self) -> GpsPoint {
        self.origin
    }

    /// Project a GPS point to planar meters.
    #[inline]
    pub fn project(&self, p: &GpsPoint) -> Coord<f64> {
        Coord {
            x: (p.longitude - self.origin.longitude).to_radians() * self.meters_per_radian_lng,
            y: (p.latitude - self.origin.latitude).to_radians() * EARTH_RADIUS_M,
        }
    }

    /// Inverse of [`LocalProjection::project`].
    #[inline]
    pub fn unproject(&self, c: Coord<f64>) -> GpsPoint {
        GpsPoint::new(
            self.origin.latitude + (c.y / EARTH_RADIUS_M).to_degrees(),
            self.origin.longitude + (c.x / self.meters_per_radian_lng).to_degrees(),
        )
    }

    pub fn project_all(&self, points: &[GpsPoint]) -> Vec<Coord<f64>> {
        points.iter().map(|p| self.project(p)).collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
