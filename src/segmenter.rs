//! Trip boundary detection.
//!
//! A small per-driver state machine: the first telemetry batch opens a
//! trip; later batches either continue it or, after an idle gap with a
//! slow batch, start a new one. The read-decide-write around this decision
//! is the pipeline's only critical section and is serialized per driver by
//! the caller.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::store::TripRecord;

/// Minimum elapsed time since the last trip before a slow batch ends it.
pub const IDLE_THRESHOLD_SECS: i64 = 5 * 60;

/// Batch-average speed below which an idle gap counts as a trip end.
pub const SPEED_THRESHOLD_MPS: f64 = 5.0;

/// Bound on trip-id regenerate-and-retry at persistence time.
pub const MAX_MINT_ATTEMPTS: u32 = 5;

const ID_SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripDecision {
    /// Mint a fresh trip id for this batch.
    StartNew,
    /// Append to the driver's current trip.
    Continue(String),
}

/// Decides whether a batch belongs to the driver's current trip.
pub fn decide(
    latest: Option<&TripRecord>,
    now: DateTime<Utc>,
    batch_avg_speed_mps: f64,
) -> TripDecision {
    let Some(last) = latest else {
        return TripDecision::StartNew;
    };

    let idle_secs = (now - last.created_at).num_seconds();
    if idle_secs > IDLE_THRESHOLD_SECS && batch_avg_speed_mps < SPEED_THRESHOLD_MPS {
        TripDecision::StartNew
    } else {
        TripDecision::Continue(last.trip_id.clone())
    }
}

/// Collision-resistant trip id: driver id plus a random opaque suffix.
/// Uniqueness is still enforced at persistence time; on conflict the
/// caller regenerates, bounded by [`MAX_MINT_ATTEMPTS`].
pub fn mint_trip_id(driver_id: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_SUFFIX_LEN)
        .map(char::from)
        .collect();

    format!("{driver_id}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::Category;

    fn trip_created(minutes_ago: i64) -> TripRecord {
        TripRecord {
            trip_id: "d1-s1".to_string(),
            driver_id: "d1".to_string(),
            created_at: Utc::now() - chrono::Duration::minutes(minutes_ago),
            score: 80.0,
            category: Category::Moderate,
            gps_payload: "[]".to_string(),
            features_json: "{}".to_string(),
        }
    }

    #[test]
    fn test_first_telemetry_starts_a_trip() {
        assert_eq!(decide(None, Utc::now(), 0.0), TripDecision::StartNew);
    }

    #[test]
    fn test_recent_trip_continues_regardless_of_speed() {
        let last = trip_created(2);
        assert_eq!(
            decide(Some(&last), Utc::now(), 0.5),
            TripDecision::Continue("d1-s1".to_string())
        );
    }

    #[test]
    fn test_idle_gap_with_slow_batch_starts_new_trip() {
        let last = trip_created(10);
        assert_eq!(decide(Some(&last), Utc::now(), 2.0), TripDecision::StartNew);
    }

    #[test]
    fn test_idle_gap_with_fast_batch_continues() {
        // Long gap but the vehicle is clearly still moving.
        let last = trip_created(10);
        assert_eq!(
            decide(Some(&last), Utc::now(), 12.0),
            TripDecision::Continue("d1-s1".to_string())
        );
    }

    #[test]
    fn test_minted_ids_carry_driver_prefix_and_differ() {
        let a = mint_trip_id("d1");
        let b = mint_trip_id("d1");

        assert!(a.starts_with("d1-"));
        assert_eq!(a.len(), "d1-".len() + ID_SUFFIX_LEN);
        assert_ne!(a, b);
    }
}
