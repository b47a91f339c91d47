use serde::{Deserialize, Serialize};

/// Mean Earth radius (kilometers) used by the haversine distance.
pub const EARTH_MEAN_RADIUS_KM: f64 = 6371.0;

/// Geographic coordinates in degrees.
///
/// Latitude is in `[-90, 90]` and longitude in `[-180, 180]`. Use
/// [`Coordinate::new`] for values coming from outside the process.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum CoordinateError {
    NotFinite,
    LatitudeOutOfRange(f64),
    LongitudeOutOfRange(f64),
}

impl std::fmt::Display for CoordinateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinateError::NotFinite => write!(f, "coordinate is not finite"),
            CoordinateError::LatitudeOutOfRange(v) => {
                write!(f, "latitude out of range [-90, 90]: {v}")
            }
            CoordinateError::LongitudeOutOfRange(v) => {
                write!(f, "longitude out of range [-180, 180]: {v}")
            }
        }
    }
}

impl std::error::Error for CoordinateError {}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(CoordinateError::NotFinite);
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::LongitudeOutOfRange(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Builds a coordinate without range checks (constants, test fixtures).
    pub const fn new_unchecked(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        distance_km(*self, *other)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

#[inline]
fn to_radians(deg: f64) -> f64 {
    deg * (std::f64::consts::PI / 180.0)
}

/// Great-circle distance between two coordinates (kilometers), haversine formula.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = to_radians(a.latitude);
    let lat2 = to_radians(b.latitude);
    let d_lat = to_radians(b.latitude - a.latitude);
    let d_lon = to_radians(b.longitude - a.longitude);

    let sin_dlat = (d_lat / 2.0).sin();
    let sin_dlon = (d_lon / 2.0).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    // Rounding can push `h` a hair past 1.0 for antipodal points.
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_MEAN_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

pub fn distance_m(a: Coordinate, b: Coordinate) -> f64 {
    distance_km(a, b) * 1000.0
}
