use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod fixed;

pub use fixed::FixedPositionSource;

/// Mean radius of the earth in meters, as used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite and within [-90, 90] latitude / [-180, 180] longitude.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        distance_meters(self, other)
    }
}

/// Great-circle distance between `a` and `b` in meters.
///
/// Both points must be valid (see [`GeoPoint::is_valid`]); the result for
/// other inputs is unspecified.
#[allow(non_snake_case)]
pub fn distance_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    // https://en.wikipedia.org/wiki/Haversine_formula
    //
    // a = sin²(Δφ/2) + cos(φ1)*cos(φ2)*sin²(Δλ/2)
    // D = 2 * R * atan2(√a, √(1−a))
    //
    // where:
    // φ1, φ2 are the latitudes of the two points and
    // λ1, λ2 are the longitudes of the two points, all in radians,
    // R is the radius of the earth.
    //
    // The home zone radius assumes exactly this formula.

    let φ1 = a.latitude.to_radians();
    let φ2 = b.latitude.to_radians();
    let Δφ = (b.latitude - a.latitude).to_radians();
    let Δλ = (b.longitude - a.longitude).to_radians();

    let h = (Δφ / 2.).sin().powi(2) + φ1.cos() * φ2.cos() * (Δλ / 2.).sin().powi(2);
    // rounding can push h a hair past 1 for antipodal points
    let h = h.clamp(0., 1.);

    2. * EARTH_RADIUS_METERS * h.sqrt().atan2((1. - h).sqrt())
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    Unavailable(String),
}

/// Something that can tell where the device currently is.
///
/// Implementations report failures as [`PositionError`]; callers treat
/// any failure as "no sample this cycle".
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn current_position(&self) -> Result<GeoPoint, PositionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUCHAREST: GeoPoint = GeoPoint {
        latitude: 44.4268,
        longitude: 26.1025,
    };

    #[test]
    fn same_point_is_zero_meters() {
        assert!(distance_meters(&BUCHAREST, &BUCHAREST).abs() < 1e-6);
    }

    #[test]
    fn one_hundredth_degree_north_is_about_1112_meters() {
        let north = GeoPoint::new(44.4368, 26.1025);
        let d = distance_meters(&BUCHAREST, &north);
        assert!((d - 1111.95).abs() < 1.0, "distance was {d}");
        assert_eq!(d, distance_meters(&north, &BUCHAREST));
    }

    #[test]
    fn nearby_points() {
        let loc1 = GeoPoint::new(48.48870120526846, 9.218084635543407);
        let loc2 = GeoPoint::new(48.4901237487793, 9.21942138671875);
        let d = loc1.distance_to(&loc2);
        assert!(d > 150. && d < 200., "distance was {d}");
    }

    #[test]
    fn antipodes_are_half_the_circumference() {
        let d = distance_meters(&GeoPoint::new(0., 0.), &GeoPoint::new(0., 180.));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_METERS).abs() < 1e-3);
    }

    #[test]
    fn validity() {
        assert!(GeoPoint::new(0., 0.).is_valid());
        assert!(GeoPoint::new(-90., 180.).is_valid());
        assert!(!GeoPoint::new(90.5, 0.).is_valid());
        assert!(!GeoPoint::new(0., -180.1).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.).is_valid());
        assert!(!GeoPoint::new(0., f64::INFINITY).is_valid());
    }
}
