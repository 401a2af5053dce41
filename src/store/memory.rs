use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::{PeriodRecord, PeriodStore, StoreError, TripRecord, TripStore};

/// In-memory store, keyed by driver. Used by tests and as the reference
/// semantics for other backends.
#[derive(Default)]
pub struct MemoryStore {
    trips: Mutex<HashMap<String, Vec<TripRecord>>>,
    periods: Mutex<HashMap<String, Vec<PeriodRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trips stored for a driver. Test helper.
    pub fn trip_count(&self, driver_id: &str) -> usize {
        self.trips
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(driver_id)
            .map_or(0, Vec::len)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl TripStore for MemoryStore {
    fn latest_trip(&self, driver_id: &str) -> Result<Option<TripRecord>, StoreError> {
        Ok(lock(&self.trips)
            .get(driver_id)
            .and_then(|trips| trips.iter().max_by_key(|t| t.created_at))
            .cloned())
    }

    fn insert_trip(&self, trip: &TripRecord) -> Result<(), StoreError> {
        let mut trips = lock(&self.trips);
        let driver_trips = trips.entry(trip.driver_id.clone()).or_default();

        if driver_trips.iter().any(|t| t.trip_id == trip.trip_id) {
            return Err(StoreError::Conflict(trip.trip_id.clone()));
        }
        driver_trips.push(trip.clone());
        Ok(())
    }

    fn replace_trip(&self, trip: &TripRecord) -> Result<(), StoreError> {
        let mut trips = lock(&self.trips);
        let driver_trips = trips
            .get_mut(&trip.driver_id)
            .ok_or_else(|| StoreError::NotFound(trip.trip_id.clone()))?;

        let slot = driver_trips
            .iter_mut()
            .find(|t| t.trip_id == trip.trip_id)
            .ok_or_else(|| StoreError::NotFound(trip.trip_id.clone()))?;
        *slot = trip.clone();
        Ok(())
    }

    fn trips_in_window(
        &self,
        driver_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TripRecord>, StoreError> {
        Ok(lock(&self.trips)
            .get(driver_id)
            .map(|trips| {
                trips
                    .iter()
                    .filter(|t| t.created_at >= start && t.created_at < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl PeriodStore for MemoryStore {
    fn upsert_period(&self, record: &PeriodRecord) -> Result<(), StoreError> {
        let mut periods = lock(&self.periods);
        let driver_periods = periods.entry(record.driver_id.clone()).or_default();

        match driver_periods
            .iter_mut()
            .find(|p| p.period == record.period && p.date == record.date)
        {
            Some(slot) => *slot = record.clone(),
            None => driver_periods.push(record.clone()),
        }
        Ok(())
    }

    fn periods_for(&self, driver_id: &str) -> Result<Vec<PeriodRecord>, StoreError> {
        let mut result: Vec<PeriodRecord> = lock(&self.periods)
            .get(driver_id)
            .cloned()
            .unwrap_or_default();
        result.sort_by_key(|p| p.date);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::Category;

    fn trip(id: &str, driver: &str, minutes_ago: i64) -> TripRecord {
        TripRecord {
            trip_id: id.to_string(),
            driver_id: driver.to_string(),
            created_at: Utc::now() - chrono::Duration::minutes(minutes_ago),
            score: 70.0,
            category: Category::Moderate,
            gps_payload: "[]".to_string(),
            features_json: "{}".to_string(),
        }
    }

    #[test]
    fn test_latest_trip_picks_newest() {
        let store = MemoryStore::new();
        store.insert_trip(&trip("a", "d1", 30)).unwrap();
        store.insert_trip(&trip("b", "d1", 5)).unwrap();

        let latest = store.latest_trip("d1").unwrap().unwrap();
        assert_eq!(latest.trip_id, "b");
        assert!(store.latest_trip("d2").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_insert_conflicts() {
        let store = MemoryStore::new();
        store.insert_trip(&trip("a", "d1", 0)).unwrap();

        let err = store.insert_trip(&trip("a", "d1", 0)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_replace_requires_existing() {
        let store = MemoryStore::new();
        let err = store.replace_trip(&trip("a", "d1", 0)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        store.insert_trip(&trip("a", "d1", 0)).unwrap();
        let mut updated = trip("a", "d1", 0);
        updated.score = 90.0;
        store.replace_trip(&updated).unwrap();
        assert_eq!(store.latest_trip("d1").unwrap().unwrap().score, 90.0);
    }

    #[test]
    fn test_window_is_half_open() {
        let store = MemoryStore::new();
        store.insert_trip(&trip("a", "d1", 0)).unwrap();

        let created = store.latest_trip("d1").unwrap().unwrap().created_at;
        let hour = chrono::Duration::hours(1);

        assert_eq!(store.trips_in_window("d1", created, created + hour).unwrap().len(), 1);
        assert_eq!(store.trips_in_window("d1", created - hour, created).unwrap().len(), 0);
    }

    #[test]
    fn test_period_upsert_replaces_same_day() {
        let store = MemoryStore::new();
        let date = chrono::NaiveDate::from_ymd_opt(2026, 8, 27).unwrap();

        let mut record = PeriodRecord {
            driver_id: "d1".to_string(),
            period: "daily".to_string(),
            date,
            features_json: "{}".to_string(),
            total_observations: 10,
            driving_score: 70.0,
            driving_category: Category::Moderate,
            created_at: Utc::now(),
        };
        store.upsert_period(&record).unwrap();

        record.driving_score = 88.0;
        store.upsert_period(&record).unwrap();

        let periods = store.periods_for("d1").unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].driving_score, 88.0);
    }
}
