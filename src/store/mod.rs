//! Trip and aggregate persistence contracts.
//!
//! The core consumes these as collaborators. Two backends ship: an
//! in-memory store for tests and a partitioned-CSV store
//! (`driver_id=<id>/trips.csv`) for the CLI.

mod csv_store;
mod memory;

pub use csv_store::CsvStore;
pub use memory::MemoryStore;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scoring::Category;

/// A scored, persisted trip. Immutable once written except for the
/// continue-appending path, which atomically replaces the whole record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripRecord {
    pub trip_id: String,
    pub driver_id: String,
    pub created_at: DateTime<Utc>,
    pub score: f64,
    pub category: Category,
    /// JSON-serialized ordered GPS samples.
    pub gps_payload: String,
    /// JSON-serialized [`crate::features::TripFeatureSummary`].
    pub features_json: String,
}

/// One aggregated record per driver per period. Derived and recomputable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub driver_id: String,
    /// Period label, e.g. "daily".
    pub period: String,
    pub date: NaiveDate,
    /// JSON-serialized [`crate::features::AggregatedFeatures`].
    pub features_json: String,
    pub total_observations: u32,
    pub driving_score: f64,
    pub driving_category: Category,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("trip id '{0}' already exists")]
    Conflict(String),
    #[error("trip '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub trait TripStore: Send + Sync {
    /// Most recent trip for a driver, by `created_at`.
    fn latest_trip(&self, driver_id: &str) -> Result<Option<TripRecord>, StoreError>;

    /// Inserts a new trip. [`StoreError::Conflict`] if the trip id is taken.
    fn insert_trip(&self, trip: &TripRecord) -> Result<(), StoreError>;

    /// Replaces an existing trip atomically (continue-appending path).
    fn replace_trip(&self, trip: &TripRecord) -> Result<(), StoreError>;

    /// Trips with `created_at` in `[start, end)`.
    fn trips_in_window(
        &self,
        driver_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TripRecord>, StoreError>;
}

pub trait PeriodStore: Send + Sync {
    /// Inserts or replaces the record for `(driver_id, period, date)`.
    fn upsert_period(&self, record: &PeriodRecord) -> Result<(), StoreError>;

    /// All periods for a driver, ordered by date.
    fn periods_for(&self, driver_id: &str) -> Result<Vec<PeriodRecord>, StoreError>;
}
