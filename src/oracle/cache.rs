use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::RiskZoneOracle;

/// Grid cell edge in degrees (~550 m at the equator). Points inside one
/// cell share a single backend lookup, which bounds the per-point cost of
/// the pipeline's hot spot.
const CELL_SIZE_DEG: f64 = 0.005;

/// Cap on cached cells. The map is cleared when it fills, so memory stays
/// bounded no matter how long the process lives.
const MAX_CACHED_CELLS: usize = 4096;

/// Caches an inner oracle's results per spatial grid cell.
pub struct CachedOracle<O> {
    inner: O,
    cells: Mutex<HashMap<(i64, i64), Arc<Vec<(f64, f64)>>>>,
}

impl<O> CachedOracle<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn cell_of(lat: f64, lon: f64) -> (i64, i64) {
        (
            (lat / CELL_SIZE_DEG).floor() as i64,
            (lon / CELL_SIZE_DEG).floor() as i64,
        )
    }
}

#[async_trait]
impl<O: RiskZoneOracle> RiskZoneOracle for CachedOracle<O> {
    async fn query_nearby_facilities(&self, lat: f64, lon: f64, radius_m: f64) -> Vec<(f64, f64)> {
        let key = Self::cell_of(lat, lon);

        if let Some(hit) = self.cells.lock().await.get(&key) {
            return hit.as_ref().clone();
        }

        let facilities = Arc::new(self.inner.query_nearby_facilities(lat, lon, radius_m).await);
        debug!(cell = ?key, count = facilities.len(), "Cached facility cell");

        let mut cells = self.cells.lock().await;
        if cells.len() >= MAX_CACHED_CELLS {
            debug!(cells = cells.len(), "Facility cache full, clearing");
            cells.clear();
        }
        cells.insert(key, facilities.clone());

        facilities.as_ref().clone()
    }
}
