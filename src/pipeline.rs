//! The telematics pipeline: raw samples in, scored trips and rollups out.
//!
//! Holds the collaborator handles (stores, risk-zone oracle, model
//! registry) and serializes the trip-segmentation critical section per
//! driver. Everything else is stateless transforms over the inputs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::{ConsolidatedAggregate, DailyAggregate, aggregate_daily, consolidate};
use crate::classifier::ModelRegistry;
use crate::error::PipelineError;
use crate::features::TripFeatureSummary;
use crate::kinematics::{GpsSample, KinematicFrame, derive_kinematics};
use crate::oracle::RiskZoneOracle;
use crate::scoring::{Category, PenaltyBreakdown, score_trip, suggestions};
use crate::segmenter::{MAX_MINT_ATTEMPTS, TripDecision, decide, mint_trip_id};
use crate::store::{PeriodRecord, PeriodStore, StoreError, TripRecord, TripStore};
use crate::violations::annotate_frames;

/// Result of scoring one telemetry batch.
#[derive(Debug, Clone, Serialize)]
pub struct TripVerdict {
    pub trip_id: String,
    pub driver_id: String,
    pub score: f64,
    pub category: Category,
    /// Present only for Risky trips.
    pub penalties: Option<PenaltyBreakdown>,
    pub suggestions: Vec<&'static str>,
}

pub struct Pipeline {
    trips: Arc<dyn TripStore>,
    periods: Arc<dyn PeriodStore>,
    oracle: Arc<dyn RiskZoneOracle>,
    models: Arc<ModelRegistry>,
    /// Per-driver locks serializing the segmentation read-decide-write.
    /// Entries live for the process: evicting one could hand two
    /// in-flight batches for the same driver different mutexes.
    driver_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Pipeline {
    pub fn new(
        trips: Arc<dyn TripStore>,
        periods: Arc<dyn PeriodStore>,
        oracle: Arc<dyn RiskZoneOracle>,
        models: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            trips,
            periods,
            oracle,
            models,
            driver_locks: Mutex::new(HashMap::new()),
        }
    }

    fn driver_lock(&self, driver_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.driver_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(driver_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Ingests one ordered batch of GPS samples for a driver: derives
    /// kinematics, evaluates contextual violations, decides trip identity,
    /// scores, and persists the trip.
    #[tracing::instrument(skip(self, samples), fields(driver_id, batch = samples.len()))]
    pub async fn record_telematics(
        &self,
        driver_id: &str,
        samples: Vec<GpsSample>,
    ) -> Result<TripVerdict, PipelineError> {
        if driver_id.is_empty() {
            return Err(PipelineError::Validation("driver_id is required".into()));
        }
        if samples.is_empty() {
            return Err(PipelineError::Validation("gps samples are required".into()));
        }

        let mut frames = derive_kinematics(&samples)?;
        annotate_frames(&mut frames, self.oracle.as_ref()).await;

        let batch_avg_speed =
            frames.iter().map(|f| f.speed_mps).sum::<f64>() / frames.len() as f64;

        // Critical section: latest-trip read through persisted write must
        // not interleave with another batch for the same driver.
        let lock = self.driver_lock(driver_id);
        let _guard = lock.lock().await;

        let now = Utc::now();
        let latest = self.trips.latest_trip(driver_id)?;

        match decide(latest.as_ref(), now, batch_avg_speed) {
            TripDecision::StartNew => {
                self.persist_new_trip(driver_id, now, &samples, frames).await
            }
            TripDecision::Continue(trip_id) => {
                // `decide` only returns Continue when a latest trip exists.
                let Some(previous) = latest else {
                    return Err(PipelineError::Validation(format!(
                        "trip '{trip_id}' vanished mid-decision"
                    )));
                };
                self.extend_trip(previous, now, samples).await
            }
        }
    }

    async fn persist_new_trip(
        &self,
        driver_id: &str,
        now: DateTime<Utc>,
        samples: &[GpsSample],
        frames: Vec<KinematicFrame>,
    ) -> Result<TripVerdict, PipelineError> {
        let summary = TripFeatureSummary::from_frames(&frames);
        let (score, category, penalties) = score_trip(&frames, self.models.trip.as_ref());

        let mut record = TripRecord {
            trip_id: String::new(),
            driver_id: driver_id.to_string(),
            created_at: now,
            score,
            category,
            gps_payload: serde_json::to_string(samples).map_err(StoreError::Json)?,
            features_json: serde_json::to_string(&summary).map_err(StoreError::Json)?,
        };

        for attempt in 1..=MAX_MINT_ATTEMPTS {
            record.trip_id = mint_trip_id(driver_id);
            match self.trips.insert_trip(&record) {
                Ok(()) => {
                    info!(trip_id = %record.trip_id, score, %category, "New trip recorded");
                    return Ok(self.verdict(record.trip_id, driver_id, score, category, penalties));
                }
                Err(StoreError::Conflict(id)) => {
                    warn!(trip_id = %id, attempt, "Trip id conflict, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(PipelineError::Conflict {
            driver_id: driver_id.to_string(),
            attempts: MAX_MINT_ATTEMPTS,
        })
    }

    async fn extend_trip(
        &self,
        previous: TripRecord,
        now: DateTime<Utc>,
        new_samples: Vec<GpsSample>,
    ) -> Result<TripVerdict, PipelineError> {
        let driver_id = previous.driver_id.clone();

        // Re-derive and re-score over the merged sample sequence. A stored
        // payload that no longer parses starts a fresh trip rather than
        // poisoning the batch.
        let mut merged: Vec<GpsSample> = match serde_json::from_str(&previous.gps_payload) {
            Ok(samples) => samples,
            Err(e) => {
                warn!(trip_id = %previous.trip_id, error = %e, "Stored trip payload unparseable, starting new trip");
                let mut frames = derive_kinematics(&new_samples)?;
                annotate_frames(&mut frames, self.oracle.as_ref()).await;
                return self.persist_new_trip(&driver_id, now, &new_samples, frames).await;
            }
        };
        merged.extend(new_samples);

        let mut frames = derive_kinematics(&merged)?;
        annotate_frames(&mut frames, self.oracle.as_ref()).await;

        let summary = TripFeatureSummary::from_frames(&frames);
        let (score, category, penalties) = score_trip(&frames, self.models.trip.as_ref());

        let record = TripRecord {
            trip_id: previous.trip_id,
            driver_id: driver_id.clone(),
            // Last-activity timestamp: keeps long trips from being split
            // by the idle check while the vehicle is still reporting.
            created_at: now,
            score,
            category,
            gps_payload: serde_json::to_string(&merged).map_err(StoreError::Json)?,
            features_json: serde_json::to_string(&summary).map_err(StoreError::Json)?,
        };
        self.trips.replace_trip(&record)?;

        info!(trip_id = %record.trip_id, score, %category, samples = merged.len(), "Trip extended");
        Ok(self.verdict(record.trip_id, &driver_id, score, category, penalties))
    }

    fn verdict(
        &self,
        trip_id: String,
        driver_id: &str,
        score: f64,
        category: Category,
        penalties: Option<PenaltyBreakdown>,
    ) -> TripVerdict {
        TripVerdict {
            trip_id,
            driver_id: driver_id.to_string(),
            score,
            category,
            penalties,
            suggestions: suggestions(category).to_vec(),
        }
    }

    /// Rolls a driver's trips within `[window_start, window_end)` into a
    /// daily aggregate, persists it, and returns it.
    #[tracing::instrument(skip(self), fields(driver_id))]
    pub fn compute_daily_aggregate(
        &self,
        driver_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<DailyAggregate, PipelineError> {
        let trips = self.trips.trips_in_window(driver_id, window_start, window_end)?;
        if trips.is_empty() {
            return Err(PipelineError::NoData {
                driver_id: driver_id.to_string(),
            });
        }

        let date = window_start.date_naive();
        let daily = aggregate_daily(driver_id, date, &trips, self.models.bulk.as_ref())?;

        self.periods.upsert_period(&PeriodRecord {
            driver_id: driver_id.to_string(),
            period: "daily".to_string(),
            date,
            features_json: serde_json::to_string(&daily.features).map_err(StoreError::Json)?,
            total_observations: daily.features.total_observations,
            driving_score: daily.score,
            driving_category: daily.category,
            created_at: Utc::now(),
        })?;

        info!(
            date = %date,
            trips = daily.trip_count,
            skipped = daily.skipped_trips,
            score = daily.score,
            "Daily aggregate computed"
        );
        Ok(daily)
    }

    /// Consolidates all of a driver's persisted daily aggregates.
    #[tracing::instrument(skip(self), fields(driver_id))]
    pub fn compute_consolidated_aggregate(
        &self,
        driver_id: &str,
    ) -> Result<ConsolidatedAggregate, PipelineError> {
        let periods = self.periods.periods_for(driver_id)?;
        if periods.is_empty() {
            return Err(PipelineError::NoData {
                driver_id: driver_id.to_string(),
            });
        }

        consolidate(driver_id, &periods, self.models.bulk.as_ref())
    }

    /// Convenience: the UTC day window for a calendar date.
    pub fn day_window(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        (start, start + chrono::Duration::days(1))
    }
}
