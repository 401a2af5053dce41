//! Risk-zone lookups: sensitive facilities (schools, hospitals) near a point.
//!
//! The oracle is a collaborator, not part of the scoring core. Lookups never
//! fail: a backend error, timeout, or invalid coordinate degrades to an
//! empty facility list so the pipeline falls back to "no contextual risk".

mod cache;
mod fixed;
mod overpass;

pub use cache::CachedOracle;
pub use fixed::{FixedFacilities, NoFacilities};
pub use overpass::OverpassOracle;

use async_trait::async_trait;

/// Default lookup radius around a GPS point.
pub const DEFAULT_FACILITY_RADIUS_M: f64 = 300.0;

pub(crate) fn coords_valid(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

/// Geospatial backend returning sensitive-facility coordinates near a point.
#[async_trait]
pub trait RiskZoneOracle: Send + Sync {
    /// Returns `(latitude, longitude)` pairs of facilities within
    /// `radius_m` of the given point. Empty on any lookup failure.
    async fn query_nearby_facilities(&self, lat: f64, lon: f64, radius_m: f64) -> Vec<(f64, f64)>;
}
