//! Aggregation engine: folds a driver's trips into a daily aggregate, and
//! daily aggregates into a consolidated multi-day verdict, re-scoring each
//! with the bulk classifier.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use crate::classifier::BulkClassifier;
use crate::error::PipelineError;
use crate::features::{AggregatedFeatures, TripFeatureSummary};
use crate::scoring::{CLASS_WEIGHTS, Category, categorize};
use crate::store::{PeriodRecord, TripRecord};

#[derive(Debug, Clone, Serialize)]
pub struct DailyAggregate {
    pub driver_id: String,
    pub date: NaiveDate,
    /// Mean of the constituent trips' scores.
    pub score: f64,
    /// Category from the bulk classifier's re-scoring.
    pub category: Category,
    pub features: AggregatedFeatures,
    pub trip_count: usize,
    /// Trips whose stored payload failed to parse; skipped, not fatal.
    pub skipped_trips: usize,
    pub total_distance_km: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsolidatedAggregate {
    pub driver_id: String,
    pub features: AggregatedFeatures,
    pub category: Category,
    /// Observation-weighted mean of the daily driving scores.
    pub average_score: f64,
    /// Nominal score of the bulk classifier's predicted class.
    pub model_score: f64,
    pub day_count: usize,
    pub skipped_periods: usize,
}

/// The bulk classifier's class index mapped to that class's nominal score.
fn model_score_for(index: usize) -> f64 {
    match CLASS_WEIGHTS.get(index) {
        Some(&weight) => weight,
        None => {
            warn!(index, "Bulk classifier returned out-of-range class index");
            CLASS_WEIGHTS[0]
        }
    }
}

/// Folds one window of trips into a [`DailyAggregate`].
///
/// Malformed trips are skipped and counted; the window fails with
/// [`PipelineError::NoData`] only when no trip parses at all.
pub fn aggregate_daily(
    driver_id: &str,
    date: NaiveDate,
    trips: &[TripRecord],
    bulk: &dyn BulkClassifier,
) -> Result<DailyAggregate, PipelineError> {
    let mut summaries = Vec::with_capacity(trips.len());
    let mut scores = Vec::with_capacity(trips.len());
    let mut skipped = 0usize;

    for trip in trips {
        match serde_json::from_str::<TripFeatureSummary>(&trip.features_json) {
            Ok(summary) => {
                summaries.push(summary);
                scores.push(trip.score);
            }
            Err(e) => {
                warn!(trip_id = %trip.trip_id, error = %e, "Skipping trip with unparseable payload");
                skipped += 1;
            }
        }
    }

    if summaries.is_empty() {
        return Err(PipelineError::NoData {
            driver_id: driver_id.to_string(),
        });
    }

    let features = AggregatedFeatures::from_summaries(&summaries);
    let class_index = bulk.predict(&features.bulk_vector());
    let model_score = model_score_for(class_index);

    Ok(DailyAggregate {
        driver_id: driver_id.to_string(),
        date,
        score: scores.iter().sum::<f64>() / scores.len() as f64,
        category: categorize(model_score),
        total_distance_km: features.total_distance_m / 1000.0,
        trip_count: summaries.len(),
        skipped_trips: skipped,
        features,
    })
}

/// Consolidates a driver's daily aggregates, weighting each day by its
/// observation count, and re-scores with the bulk classifier.
pub fn consolidate(
    driver_id: &str,
    periods: &[PeriodRecord],
    bulk: &dyn BulkClassifier,
) -> Result<ConsolidatedAggregate, PipelineError> {
    let mut daily_features = Vec::with_capacity(periods.len());
    let mut weighted_scores = 0.0f64;
    let mut total_obs = 0u64;
    let mut skipped = 0usize;

    for period in periods {
        match serde_json::from_str::<AggregatedFeatures>(&period.features_json) {
            Ok(features) => {
                weighted_scores += period.driving_score * f64::from(period.total_observations);
                total_obs += u64::from(period.total_observations);
                daily_features.push(features);
            }
            Err(e) => {
                warn!(driver_id, date = %period.date, error = %e, "Skipping unparseable daily aggregate");
                skipped += 1;
            }
        }
    }

    if daily_features.is_empty() || total_obs == 0 {
        return Err(PipelineError::NoData {
            driver_id: driver_id.to_string(),
        });
    }

    let features = AggregatedFeatures::weighted_across(&daily_features);
    let class_index = bulk.predict(&features.bulk_vector());
    let model_score = model_score_for(class_index);

    Ok(ConsolidatedAggregate {
        driver_id: driver_id.to_string(),
        category: categorize(model_score),
        average_score: weighted_scores / total_obs as f64,
        model_score,
        day_count: daily_features.len(),
        skipped_periods: skipped,
        features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::features::BULK_FEATURES;

    struct ConstBulk(usize);

    impl BulkClassifier for ConstBulk {
        fn version(&self) -> &str {
            "bulk-test"
        }
        fn predict(&self, _: &[f64; BULK_FEATURES.len()]) -> usize {
            self.0
        }
    }

    fn stored_trip(id: &str, score: f64, summary_json: &str) -> TripRecord {
        TripRecord {
            trip_id: id.to_string(),
            driver_id: "d1".to_string(),
            created_at: Utc::now(),
            score,
            category: Category::Moderate,
            gps_payload: "[]".to_string(),
            features_json: summary_json.to_string(),
        }
    }

    fn summary_json(speed: f64, obs: u32) -> String {
        let summary = TripFeatureSummary {
            speed_mean: speed,
            acceleration_mean: 0.1,
            heading_change_mean: 5.0,
            jerk_mean: 0.0,
            braking_intensity_mean: 0.1,
            sasv_mean: 0.0,
            speed_violation_mean: 0.0,
            total_distance_m: 2000.0,
            sasv_total: 0,
            speed_violation_total: 0,
            observations: obs,
        };
        serde_json::to_string(&summary).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 27).unwrap()
    }

    #[test]
    fn test_daily_aggregate_skips_and_counts_corrupt_trips() {
        let trips = vec![
            stored_trip("a", 70.0, &summary_json(8.0, 20)),
            stored_trip("b", 90.0, "not json at all"),
            stored_trip("c", 80.0, &summary_json(12.0, 30)),
        ];

        let daily = aggregate_daily("d1", date(), &trips, &ConstBulk(2)).unwrap();
        assert_eq!(daily.trip_count, 2);
        assert_eq!(daily.skipped_trips, 1);
        assert_eq!(daily.score, 75.0); // mean of 70 and 80; corrupt trip excluded
        assert_eq!(daily.category, Category::Safe); // class 2 → 100 → Safe
        assert!((daily.total_distance_km - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_daily_aggregate_empty_window_is_no_data() {
        let err = aggregate_daily("d1", date(), &[], &ConstBulk(0)).unwrap_err();
        assert!(matches!(err, PipelineError::NoData { .. }));

        // All-corrupt windows degrade to NoData as well.
        let trips = vec![stored_trip("a", 70.0, "{broken")];
        let err = aggregate_daily("d1", date(), &trips, &ConstBulk(0)).unwrap_err();
        assert!(matches!(err, PipelineError::NoData { .. }));
    }

    #[test]
    fn test_daily_category_follows_bulk_class() {
        let trips = vec![stored_trip("a", 70.0, &summary_json(8.0, 20))];

        let risky = aggregate_daily("d1", date(), &trips, &ConstBulk(0)).unwrap();
        assert_eq!(risky.category, Category::Risky); // class 0 → 20

        // Class 1's nominal score (50) sits below the Moderate cutoff, so
        // the threshold policy still lands on Risky.
        let middle = aggregate_daily("d1", date(), &trips, &ConstBulk(1)).unwrap();
        assert_eq!(middle.category, Category::Risky);

        let safe = aggregate_daily("d1", date(), &trips, &ConstBulk(2)).unwrap();
        assert_eq!(safe.category, Category::Safe);
    }

    #[test]
    fn test_consolidation_weights_days_by_observations() {
        let period = |score: f64, obs: u32| {
            let features = AggregatedFeatures::from_summaries(&[
                serde_json::from_str(&summary_json(10.0, obs)).unwrap(),
            ]);
            PeriodRecord {
                driver_id: "d1".to_string(),
                period: "daily".to_string(),
                date: date(),
                features_json: serde_json::to_string(&features).unwrap(),
                total_observations: obs,
                driving_score: score,
                driving_category: Category::Moderate,
                created_at: Utc::now(),
            }
        };

        let consolidated =
            consolidate("d1", &[period(90.0, 10), period(60.0, 90)], &ConstBulk(2)).unwrap();

        assert_eq!(consolidated.day_count, 2);
        assert!((consolidated.average_score - 63.0).abs() < 1e-12);
        assert_eq!(consolidated.model_score, 100.0);
        assert_eq!(consolidated.category, Category::Safe);
    }

    #[test]
    fn test_consolidation_with_no_periods_is_no_data() {
        let err = consolidate("d1", &[], &ConstBulk(0)).unwrap_err();
        assert!(matches!(err, PipelineError::NoData { .. }));
    }
}
