//! Contextual violation flags: sensitive-area speed violations (SASV) and
//! general speed-limit violations, per kinematic frame.

use crate::kinematics::{KinematicFrame, haversine_m};
use crate::oracle::{DEFAULT_FACILITY_RADIUS_M, RiskZoneOracle};

/// Speeding threshold inside a sensitive area (~30 km/h).
pub const SENSITIVE_SPEED_LIMIT_MPS: f64 = 8.33;

/// General speed limit (~50 km/h).
pub const GENERAL_SPEED_LIMIT_MPS: f64 = 13.89;

/// 1 iff any facility lies within [`DEFAULT_FACILITY_RADIUS_M`] of the
/// point and the point's speed exceeds [`SENSITIVE_SPEED_LIMIT_MPS`].
pub fn flag_sasv(lat: f64, lon: f64, speed_mps: f64, facilities: &[(f64, f64)]) -> u8 {
    if speed_mps <= SENSITIVE_SPEED_LIMIT_MPS {
        return 0;
    }

    let near_facility = facilities
        .iter()
        .any(|&(f_lat, f_lon)| haversine_m(lat, lon, f_lat, f_lon) < DEFAULT_FACILITY_RADIUS_M);

    u8::from(near_facility)
}

/// 1 iff the point's speed exceeds [`GENERAL_SPEED_LIMIT_MPS`].
pub fn flag_speed_violation(speed_mps: f64) -> u8 {
    u8::from(speed_mps > GENERAL_SPEED_LIMIT_MPS)
}

/// Sets `sasv` and `speed_violation` on every frame, querying the oracle
/// at each frame's endpoint. This is the pipeline's latency hot spot;
/// callers wrap the oracle in [`crate::oracle::CachedOracle`] to bound it.
pub async fn annotate_frames(frames: &mut [KinematicFrame], oracle: &dyn RiskZoneOracle) {
    for frame in frames {
        let facilities = oracle
            .query_nearby_facilities(frame.latitude, frame.longitude, DEFAULT_FACILITY_RADIUS_M)
            .await;

        frame.sasv = flag_sasv(frame.latitude, frame.longitude, frame.speed_mps, &facilities);
        frame.speed_violation = flag_speed_violation(frame.speed_mps);
    }
}
