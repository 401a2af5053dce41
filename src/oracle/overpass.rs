use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{RiskZoneOracle, coords_valid};

/// OpenStreetMap Overpass adapter. Queries school/hospital amenities around
/// a point and extracts node coordinates (or way/relation centers).
pub struct OverpassOracle {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
}

#[derive(Deserialize)]
struct OverpassElement {
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
}

#[derive(Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl OverpassOracle {
    /// `base_url` is the interpreter endpoint, e.g.
    /// `https://overpass-api.de/api/interpreter`.
    pub fn new(base_url: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self { client, base_url })
    }

    async fn lookup(&self, lat: f64, lon: f64, radius_m: f64) -> anyhow::Result<Vec<(f64, f64)>> {
        let query = format!(
            "[out:json][timeout:8];\
             (node[\"amenity\"~\"school|hospital\"](around:{radius_m},{lat},{lon});\
              way[\"amenity\"~\"school|hospital\"](around:{radius_m},{lat},{lon}););\
             out center;"
        );

        let response = self
            .client
            .post(&self.base_url)
            .form(&[("data", query)])
            .send()
            .await?
            .error_for_status()?;

        let parsed: OverpassResponse = response.json().await?;
        let facilities = parsed
            .elements
            .into_iter()
            .filter_map(|e| match (e.lat, e.lon, e.center) {
                (Some(lat), Some(lon), _) => Some((lat, lon)),
                (_, _, Some(c)) => Some((c.lat, c.lon)),
                _ => None,
            })
            .collect();

        Ok(facilities)
    }
}

#[async_trait]
impl RiskZoneOracle for OverpassOracle {
    async fn query_nearby_facilities(&self, lat: f64, lon: f64, radius_m: f64) -> Vec<(f64, f64)> {
        if !coords_valid(lat, lon) {
            warn!(lat, lon, "Rejecting facility lookup for invalid coordinates");
            return Vec::new();
        }

        match self.lookup(lat, lon, radius_m).await {
            Ok(facilities) => {
                debug!(lat, lon, count = facilities.len(), "Facility lookup complete");
                facilities
            }
            Err(e) => {
                warn!(lat, lon, error = %e, "Facility lookup failed, assuming no nearby facilities");
                Vec::new()
            }
        }
    }
}
