//! Typed feature records for the two classifier tiers.
//!
//! Feature order and count are part of each classifier's version contract;
//! the names below are validated against model files at load time so a
//! renamed or missing feature fails fast instead of at a late lookup.

use serde::{Deserialize, Serialize};

use crate::kinematics::KinematicFrame;

/// Per-frame feature order for the trip-level classifier.
pub const TRIP_FEATURES: [&str; 7] = [
    "speed_mps",
    "acceleration",
    "heading_change",
    "jerk",
    "braking_intensity",
    "sasv",
    "speed_violation",
];

/// Feature order for the bulk/aggregate classifier.
pub const BULK_FEATURES: [&str; 12] = [
    "speed_mean",
    "speed_max",
    "speed_std",
    "acceleration_mean",
    "acceleration_max",
    "acceleration_std",
    "heading_change_mean",
    "jerk_mean",
    "braking_intensity_mean",
    "sasv_mean",
    "speed_violation_mean",
    "total_observations",
];

/// Builds the trip-level classifier input for one frame, in
/// [`TRIP_FEATURES`] order.
pub fn trip_vector(frame: &KinematicFrame) -> [f64; TRIP_FEATURES.len()] {
    [
        frame.speed_mps,
        frame.acceleration,
        frame.heading_change,
        frame.jerk,
        frame.braking_intensity,
        f64::from(frame.sasv),
        f64::from(frame.speed_violation),
    ]
}

/// Per-trip means of the derived kinematic fields plus totals. Owned by
/// exactly one trip; stored alongside it as a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripFeatureSummary {
    pub speed_mean: f64,
    pub acceleration_mean: f64,
    pub heading_change_mean: f64,
    pub jerk_mean: f64,
    pub braking_intensity_mean: f64,
    pub sasv_mean: f64,
    pub speed_violation_mean: f64,
    pub total_distance_m: f64,
    pub sasv_total: u32,
    pub speed_violation_total: u32,
    pub observations: u32,
}

impl TripFeatureSummary {
    pub fn from_frames(frames: &[KinematicFrame]) -> Self {
        let sasv_total: u32 = frames.iter().map(|f| u32::from(f.sasv)).sum();
        let violation_total: u32 = frames.iter().map(|f| u32::from(f.speed_violation)).sum();
        let n = frames.len() as f64;

        Self {
            speed_mean: mean(frames.iter().map(|f| f.speed_mps)),
            acceleration_mean: mean(frames.iter().map(|f| f.acceleration)),
            heading_change_mean: mean(frames.iter().map(|f| f.heading_change)),
            jerk_mean: mean(frames.iter().map(|f| f.jerk)),
            braking_intensity_mean: mean(frames.iter().map(|f| f.braking_intensity)),
            sasv_mean: if frames.is_empty() { 0.0 } else { f64::from(sasv_total) / n },
            speed_violation_mean: if frames.is_empty() {
                0.0
            } else {
                f64::from(violation_total) / n
            },
            total_distance_m: frames.iter().map(|f| f.distance_m).sum(),
            sasv_total,
            speed_violation_total: violation_total,
            observations: frames.len() as u32,
        }
    }
}

/// Cross-trip (or cross-period) aggregate: arithmetic means of each trip's
/// already-averaged metrics, spread statistics across those means, and
/// summed totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedFeatures {
    pub speed_mean: f64,
    pub speed_max: f64,
    pub speed_std: f64,
    pub acceleration_mean: f64,
    pub acceleration_max: f64,
    pub acceleration_std: f64,
    pub heading_change_mean: f64,
    pub jerk_mean: f64,
    pub braking_intensity_mean: f64,
    pub sasv_mean: f64,
    pub speed_violation_mean: f64,
    pub sasv_total: u32,
    pub speed_violation_total: u32,
    pub total_observations: u32,
    pub total_distance_m: f64,
}

impl AggregatedFeatures {
    /// Mean-of-means across one period's trips. Max and standard deviation
    /// are taken across the per-trip means.
    pub fn from_summaries(summaries: &[TripFeatureSummary]) -> Self {
        let speeds: Vec<f64> = summaries.iter().map(|s| s.speed_mean).collect();
        let accels: Vec<f64> = summaries.iter().map(|s| s.acceleration_mean).collect();

        let speed_mean = mean(speeds.iter().copied());
        let accel_mean = mean(accels.iter().copied());

        Self {
            speed_mean,
            speed_max: max(&speeds),
            speed_std: stddev(&speeds, speed_mean),
            acceleration_mean: accel_mean,
            acceleration_max: max(&accels),
            acceleration_std: stddev(&accels, accel_mean),
            heading_change_mean: mean(summaries.iter().map(|s| s.heading_change_mean)),
            jerk_mean: mean(summaries.iter().map(|s| s.jerk_mean)),
            braking_intensity_mean: mean(summaries.iter().map(|s| s.braking_intensity_mean)),
            sasv_mean: mean(summaries.iter().map(|s| s.sasv_mean)),
            speed_violation_mean: mean(summaries.iter().map(|s| s.speed_violation_mean)),
            sasv_total: summaries.iter().map(|s| s.sasv_total).sum(),
            speed_violation_total: summaries.iter().map(|s| s.speed_violation_total).sum(),
            total_observations: summaries.iter().map(|s| s.observations).sum(),
            total_distance_m: summaries.iter().map(|s| s.total_distance_m).sum(),
        }
    }

    /// Consolidates daily aggregates, weighting each day's means by its
    /// observation count so sparse days do not dominate.
    pub fn weighted_across(daily: &[AggregatedFeatures]) -> Self {
        let total_obs: u32 = daily.iter().map(|d| d.total_observations).sum();
        let w = |f: &dyn Fn(&AggregatedFeatures) -> f64| -> f64 {
            if total_obs == 0 {
                return 0.0;
            }
            daily
                .iter()
                .map(|d| f(d) * f64::from(d.total_observations))
                .sum::<f64>()
                / f64::from(total_obs)
        };

        Self {
            speed_mean: w(&|d| d.speed_mean),
            speed_max: max(&daily.iter().map(|d| d.speed_max).collect::<Vec<_>>()),
            speed_std: w(&|d| d.speed_std),
            acceleration_mean: w(&|d| d.acceleration_mean),
            acceleration_max: max(&daily.iter().map(|d| d.acceleration_max).collect::<Vec<_>>()),
            acceleration_std: w(&|d| d.acceleration_std),
            heading_change_mean: w(&|d| d.heading_change_mean),
            jerk_mean: w(&|d| d.jerk_mean),
            braking_intensity_mean: w(&|d| d.braking_intensity_mean),
            sasv_mean: w(&|d| d.sasv_mean),
            speed_violation_mean: w(&|d| d.speed_violation_mean),
            sasv_total: daily.iter().map(|d| d.sasv_total).sum(),
            speed_violation_total: daily.iter().map(|d| d.speed_violation_total).sum(),
            total_observations: total_obs,
            total_distance_m: daily.iter().map(|d| d.total_distance_m).sum(),
        }
    }

    /// Builds the bulk classifier input in [`BULK_FEATURES`] order.
    pub fn bulk_vector(&self) -> [f64; BULK_FEATURES.len()] {
        [
            self.speed_mean,
            self.speed_max,
            self.speed_std,
            self.acceleration_mean,
            self.acceleration_max,
            self.acceleration_std,
            self.heading_change_mean,
            self.jerk_mean,
            self.braking_intensity_mean,
            self.sasv_mean,
            self.speed_violation_mean,
            f64::from(self.total_observations),
        ]
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn max(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::{GpsSample, derive_kinematics};

    fn summary(speed: f64, obs: u32) -> TripFeatureSummary {
        TripFeatureSummary {
            speed_mean: speed,
            acceleration_mean: 0.5,
            heading_change_mean: 10.0,
            jerk_mean: 0.1,
            braking_intensity_mean: 0.2,
            sasv_mean: 0.0,
            speed_violation_mean: 0.25,
            total_distance_m: 1000.0,
            sasv_total: 0,
            speed_violation_total: 1,
            observations: obs,
        }
    }

    #[test]
    fn test_summary_from_frames() {
        let samples = vec![
            GpsSample { latitude: 12.9716, longitude: 77.5946, time_step: 0.0 },
            GpsSample { latitude: 12.9720, longitude: 77.5950, time_step: 10.0 },
            GpsSample { latitude: 12.9726, longitude: 77.5955, time_step: 20.0 },
        ];
        let frames = derive_kinematics(&samples).unwrap();

        let summary = TripFeatureSummary::from_frames(&frames);
        assert_eq!(summary.observations, 2);
        assert_eq!(summary.sasv_total, 0);
        assert!(summary.total_distance_m > 0.0);
        assert!(
            (summary.speed_mean - (frames[0].speed_mps + frames[1].speed_mps) / 2.0).abs() < 1e-12
        );
    }

    #[test]
    fn test_single_trip_aggregation_is_identity() {
        let s = summary(9.0, 40);
        let agg = AggregatedFeatures::from_summaries(std::slice::from_ref(&s));

        assert_eq!(agg.speed_mean, s.speed_mean);
        assert_eq!(agg.speed_max, s.speed_mean);
        assert_eq!(agg.speed_std, 0.0);
        assert_eq!(agg.acceleration_mean, s.acceleration_mean);
        assert_eq!(agg.total_observations, s.observations);
        assert_eq!(agg.total_distance_m, s.total_distance_m);
    }

    #[test]
    fn test_mean_of_means_across_trips() {
        let agg = AggregatedFeatures::from_summaries(&[summary(6.0, 10), summary(12.0, 90)]);

        // Trip→daily is a plain mean of per-trip means, regardless of size.
        assert_eq!(agg.speed_mean, 9.0);
        assert_eq!(agg.speed_max, 12.0);
        assert_eq!(agg.total_observations, 100);
    }

    #[test]
    fn test_consolidation_weights_by_observations() {
        let light = AggregatedFeatures::from_summaries(&[summary(20.0, 10)]);
        let heavy = AggregatedFeatures::from_summaries(&[summary(10.0, 90)]);

        let merged = AggregatedFeatures::weighted_across(&[light, heavy]);
        assert!((merged.speed_mean - 11.0).abs() < 1e-12);
        assert_eq!(merged.total_observations, 100);
    }

    #[test]
    fn test_bulk_vector_matches_schema_len() {
        let agg = AggregatedFeatures::from_summaries(&[summary(9.0, 40)]);
        assert_eq!(agg.bulk_vector().len(), BULK_FEATURES.len());
    }
}
