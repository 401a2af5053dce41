use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use tracing::debug;

use super::{PeriodRecord, PeriodStore, StoreError, TripRecord, TripStore};

/// File-backed store partitioned per driver:
/// `<root>/driver_id=<id>/trips.csv` and `periods.csv`.
///
/// Inserts append a row (writing headers on first use); replacements
/// rewrite the file through a temp file + rename so a crash never leaves a
/// half-written record visible.
pub struct CsvStore {
    root: PathBuf,
}

impl CsvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn driver_dir(&self, driver_id: &str) -> PathBuf {
        self.root.join(format!("driver_id={driver_id}"))
    }

    fn trips_path(&self, driver_id: &str) -> PathBuf {
        self.driver_dir(driver_id).join("trips.csv")
    }

    fn periods_path(&self, driver_id: &str) -> PathBuf {
        self.driver_dir(driver_id).join("periods.csv")
    }

    fn read_trips(&self, driver_id: &str) -> Result<Vec<TripRecord>, StoreError> {
        read_all(&self.trips_path(driver_id))
    }

    fn read_periods(&self, driver_id: &str) -> Result<Vec<PeriodRecord>, StoreError> {
        read_all(&self.periods_path(driver_id))
    }
}

fn read_all<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_reader(File::open(path)?);
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        rows.push(result?);
    }
    Ok(rows)
}

fn append_row<T: serde::Serialize>(path: &Path, row: &T) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let file_exists = path.exists();
    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);
    writer.serialize(row)?;
    writer.flush()?;
    Ok(())
}

fn rewrite_all<T: serde::Serialize>(path: &Path, rows: &[T]) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_writer(File::create(&tmp)?);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

impl TripStore for CsvStore {
    fn latest_trip(&self, driver_id: &str) -> Result<Option<TripRecord>, StoreError> {
        let trips = self.read_trips(driver_id)?;
        Ok(trips.into_iter().max_by_key(|t| t.created_at))
    }

    fn insert_trip(&self, trip: &TripRecord) -> Result<(), StoreError> {
        let existing = self.read_trips(&trip.driver_id)?;
        if existing.iter().any(|t| t.trip_id == trip.trip_id) {
            return Err(StoreError::Conflict(trip.trip_id.clone()));
        }

        debug!(driver_id = %trip.driver_id, trip_id = %trip.trip_id, "Appending trip record");
        append_row(&self.trips_path(&trip.driver_id), trip)
    }

    fn replace_trip(&self, trip: &TripRecord) -> Result<(), StoreError> {
        let mut trips = self.read_trips(&trip.driver_id)?;
        let slot = trips
            .iter_mut()
            .find(|t| t.trip_id == trip.trip_id)
            .ok_or_else(|| StoreError::NotFound(trip.trip_id.clone()))?;
        *slot = trip.clone();

        rewrite_all(&self.trips_path(&trip.driver_id), &trips)
    }

    fn trips_in_window(
        &self,
        driver_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TripRecord>, StoreError> {
        Ok(self
            .read_trips(driver_id)?
            .into_iter()
            .filter(|t| t.created_at >= start && t.created_at < end)
            .collect())
    }
}

impl PeriodStore for CsvStore {
    fn upsert_period(&self, record: &PeriodRecord) -> Result<(), StoreError> {
        let mut periods = self.read_periods(&record.driver_id)?;

        match periods
            .iter_mut()
            .find(|p| p.period == record.period && p.date == record.date)
        {
            Some(slot) => {
                *slot = record.clone();
                rewrite_all(&self.periods_path(&record.driver_id), &periods)
            }
            None => append_row(&self.periods_path(&record.driver_id), record),
        }
    }

    fn periods_for(&self, driver_id: &str) -> Result<Vec<PeriodRecord>, StoreError> {
        let mut periods = self.read_periods(driver_id)?;
        periods.sort_by_key(|p| p.date);
        Ok(periods)
    }
}
