use serde::{Deserialize, Serialize};
use crate::config::constants::{KM_PER_DEGREE_LAT, KM_PER_DEGREE_LON_EQUATOR};

/// Geographic position in degrees (x = longitude, y = latitude).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Equirectangular projection to km around a reference latitude.
    pub fn project(&self, projection: &KmProjection) -> PlanarPoint {
        PlanarPoint {
            x: self.x * KM_PER_DEGREE_LON_EQUATOR * projection.cos_lat,
            y: self.y * KM_PER_DEGREE_LAT,
        }
    }
}

/// Point in km on the local plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarPoint {
    pub x: f64,
    pub y: f64,
}

impl PlanarPoint {
    pub fn distance_to(&self, other: &PlanarPoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KmProjection {
    cos_lat: f64,
}

impl KmProjection {
    /// Projection centred on the mean latitude of `coordinates`.
    pub fn around<'a, I: IntoIterator<Item = &'a Coordinate>>(coordinates: I) -> Self {
        let (sum, count) = coordinates
            .into_iter()
            .fold((0.0, 0usize), |(s, n), c| (s + c.y, n + 1));
        let mean_lat = if count == 0 { 0.0 } else { sum / count as f64 };
        Self {
            cos_lat: mean_lat.to_radians().cos(),
        }
    }
}

pub trait POI {
    fn get_coordinate(&self) -> &Coordinate;
    fn get_id(&self) -> u64;
}
