use async_trait::async_trait;

use super::{RiskZoneOracle, coords_valid};
use crate::kinematics::haversine_m;

/// Oracle for offline runs: no geospatial backend, no contextual risk.
pub struct NoFacilities;

#[async_trait]
impl RiskZoneOracle for NoFacilities {
    async fn query_nearby_facilities(&self, _: f64, _: f64, _: f64) -> Vec<(f64, f64)> {
        Vec::new()
    }
}

/// Deterministic oracle over a fixed facility set, filtered by true
/// haversine distance. Used by tests.
pub struct FixedFacilities(pub Vec<(f64, f64)>);

#[async_trait]
impl RiskZoneOracle for FixedFacilities {
    async fn query_nearby_facilities(&self, lat: f64, lon: f64, radius_m: f64) -> Vec<(f64, f64)> {
        if !coords_valid(lat, lon) {
            return Vec::new();
        }

        self.0
            .iter()
            .copied()
            .filter(|&(f_lat, f_lon)| haversine_m(lat, lon, f_lat, f_lon) <= radius_m)
            .collect()
    }
}
