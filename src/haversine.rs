//! Haversine distance matrix provider (default, and fallback when OSRM is unavailable).
//!
//! Uses great-circle distance between stops.
//! Less accurate than OSRM (ignores roads) but always available.

use crate::model::Coordinates;
use crate::traits::DistanceMatrixProvider;

/// Earth radius in miles.
const EARTH_RADIUS_MILES: f64 = 3959.0;

/// Haversine-based distance matrix provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct HaversineMatrix;

impl HaversineMatrix {
    /// Great-circle distance between two points in miles.
    pub fn distance_miles(from: Coordinates, to: Coordinates) -> f64 {
        let lat1_rad = from.lat.to_radians();
        let lat2_rad = to.lat.to_radians();
        let delta_lat = (to.lat - from.lat).to_radians();
        let delta_lng = (to.lng - from.lng).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().min(1.0).asin();

        EARTH_RADIUS_MILES * c
    }
}

impl DistanceMatrixProvider for HaversineMatrix {
    fn matrix_for(&self, locations: &[Coordinates]) -> Vec<Vec<f64>> {
        let n = locations.len();
        let mut matrix = vec![vec![0.0; n]; n];

        for (i, from) in locations.iter().enumerate() {
            for (j, to) in locations.iter().enumerate() {
                if i != j {
                    matrix[i][j] = Self::distance_miles(*from, *to);
                }
            }
        }

        matrix
    }
}
