//! Circular query region.

use crate::constants::selection::METERS_PER_DEGREE;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A circle on the ground: center in degrees, radius in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Center latitude in degrees.
    pub latitude: f64,
    /// Center longitude in degrees.
    pub longitude: f64,
    /// Radius in meters.
    pub radius_m: f64,
}

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Minimum longitude.
    pub west: f64,
    /// Minimum latitude.
    pub south: f64,
    /// Maximum longitude.
    pub east: f64,
    /// Maximum latitude.
    pub north: f64,
}

impl Region {
    /// Create a region, enforcing coordinate ranges and `0 < radius <= max_radius_m`.
    pub fn new(latitude: f64, longitude: f64, radius_m: f64, max_radius_m: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidLatitude { value: latitude });
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidLongitude { value: longitude });
        }
        if radius_m.is_nan() || radius_m <= 0.0 || radius_m > max_radius_m {
            return Err(Error::InvalidRadius {
                radius: radius_m,
                max: max_radius_m,
            });
        }

        Ok(Self {
            latitude,
            longitude,
            radius_m,
        })
    }

    /// Bounding box of the circle.
    ///
    /// Uses a spherical approximation; longitude extent widens with latitude
    /// and is clamped near the poles.
    pub fn bounds(&self) -> Bounds {
        let dlat = self.radius_m / METERS_PER_DEGREE;
        let cos_lat = self.latitude.to_radians().cos().max(1e-6);
        let dlon = (self.radius_m / (METERS_PER_DEGREE * cos_lat)).min(180.0);

        Bounds {
            west: (self.longitude - dlon).max(-180.0),
            south: (self.latitude - dlat).max(-90.0),
            east: (self.longitude + dlon).min(180.0),
            north: (self.latitude + dlat).min(90.0),
        }
    }
}

impl Bounds {
    /// Corner coordinates as `[west, south, east, north]`.
    pub fn to_array(self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lat={:.4}, lon={:.4}, radius={:.0}m",
            self.latitude, self.longitude, self.radius_m
        )
    }
}
