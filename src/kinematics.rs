//! Kinematic derivation from raw GPS traces.
//!
//! Cleans a timestamped latitude/longitude sequence and derives per-segment
//! distance, speed, acceleration, jerk, heading change, and braking
//! intensity. Pure and deterministic: identical input ordering yields
//! identical output.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Mean Earth radius in meters, used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Segments slower than this (5 km/h) are treated as stationary/idle noise
/// and dropped before acceleration and jerk are derived.
pub const IDLE_SPEED_MPS: f64 = 5.0 / 3.6;

/// Floor for consecutive-sample time deltas, so shared timestamps cannot
/// blow up the speed division.
const MIN_TIME_DELTA_S: f64 = 1.0;

/// A single raw positional sample: ordered (latitude, longitude, time_step).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsSample {
    pub latitude: f64,
    pub longitude: f64,
    pub time_step: f64,
}

impl GpsSample {
    /// Finite values with latitude in [-90, 90] and longitude in [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.time_step.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// One derived row per consecutive pair of moving samples. Position fields
/// are the segment endpoint, which is what the risk-zone lookup uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KinematicFrame {
    pub latitude: f64,
    pub longitude: f64,
    pub distance_m: f64,
    pub time_delta_s: f64,
    pub speed_mps: f64,
    pub acceleration: f64,
    pub jerk: f64,
    /// Initial bearing of the segment, normalized to [0, 360).
    pub heading: f64,
    /// Heading delta from the previous frame, normalized to [0, 360).
    /// The first frame's value is 0.
    pub heading_change: f64,
    /// |acceleration| when decelerating, else 0.
    pub braking_intensity: f64,
    pub sasv: u8,
    pub speed_violation: u8,
}

/// Great-circle distance in meters between two points.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial bearing in degrees from the first point to the second,
/// normalized to [0, 360).
pub fn initial_bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lambda = (lon2 - lon1).to_radians();
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());

    let x = phi2.cos() * d_lambda.sin();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();

    x.atan2(y).to_degrees().rem_euclid(360.0)
}

/// Derives per-segment kinematics for one trip-candidate window.
///
/// Invalid samples are discarded first; segments implying less than
/// [`IDLE_SPEED_MPS`] are then dropped, and acceleration/jerk are taken as
/// first differences over the surviving moving-only subsequence.
///
/// # Errors
///
/// [`PipelineError::InsufficientData`] if fewer than 2 valid samples remain
/// after cleaning, or if no segment survives the idle filter.
pub fn derive_kinematics(samples: &[GpsSample]) -> Result<Vec<KinematicFrame>, PipelineError> {
    let valid: Vec<&GpsSample> = samples.iter().filter(|s| s.is_valid()).collect();
    if valid.len() < 2 {
        return Err(PipelineError::InsufficientData {
            got: valid.len(),
            need: 2,
        });
    }

    // First pass: distance, time delta, speed, heading per consecutive pair,
    // keeping only moving segments.
    let mut frames = Vec::with_capacity(valid.len() - 1);
    for pair in valid.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);

        let distance_m = haversine_m(prev.latitude, prev.longitude, cur.latitude, cur.longitude);
        let time_delta_s = (cur.time_step - prev.time_step).max(MIN_TIME_DELTA_S);
        let speed_mps = distance_m / time_delta_s;

        if speed_mps < IDLE_SPEED_MPS {
            continue;
        }

        frames.push(KinematicFrame {
            latitude: cur.latitude,
            longitude: cur.longitude,
            distance_m,
            time_delta_s,
            speed_mps,
            acceleration: 0.0,
            jerk: 0.0,
            heading: initial_bearing_deg(prev.latitude, prev.longitude, cur.latitude, cur.longitude),
            heading_change: 0.0,
            braking_intensity: 0.0,
            sasv: 0,
            speed_violation: 0,
        });
    }

    if frames.is_empty() {
        return Err(PipelineError::InsufficientData { got: 0, need: 1 });
    }

    // Second pass: first differences over the filtered subsequence.
    for i in 1..frames.len() {
        let dt = frames[i].time_delta_s;
        frames[i].acceleration = (frames[i].speed_mps - frames[i - 1].speed_mps) / dt;
        frames[i].jerk = (frames[i].acceleration - frames[i - 1].acceleration) / dt;
        frames[i].heading_change = (frames[i].heading - frames[i - 1].heading).rem_euclid(360.0);
    }
    for frame in &mut frames {
        frame.braking_intensity = (-frame.acceleration).max(0.0);
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(lat: f64, lon: f64, t: f64) -> GpsSample {
        GpsSample {
            latitude: lat,
            longitude: lon,
            time_step: t,
        }
    }

    #[test]
    fn test_haversine_identity_and_symmetry() {
        let (lat, lon) = (12.9716, 77.5946);
        assert_eq!(haversine_m(lat, lon, lat, lon), 0.0);

        let d_ab = haversine_m(12.9716, 77.5946, 12.9726, 77.5955);
        let d_ba = haversine_m(12.9726, 77.5955, 12.9716, 77.5946);
        assert!((d_ab - d_ba).abs() < 1e-9);
    }

    #[test]
    fn test_haversine_known_segment() {
        // Roughly 62 m between these two Bangalore points.
        let d = haversine_m(12.9716, 77.5946, 12.9720, 77.5950);
        assert!(d > 55.0 && d < 70.0, "got {d}");
    }

    #[test]
    fn test_constant_speed_has_zero_acceleration_and_jerk() {
        // Equal-spaced points along the equator at equal time deltas.
        let samples: Vec<GpsSample> = (0..6)
            .map(|i| sample(0.0, 0.001 * i as f64, 10.0 * i as f64))
            .collect();

        let frames = derive_kinematics(&samples).unwrap();
        assert_eq!(frames.len(), 5);
        for frame in &frames {
            assert!(frame.acceleration.abs() < 1e-9);
            assert!(frame.jerk.abs() < 1e-9);
            assert_eq!(frame.braking_intensity, 0.0);
        }
    }

    #[test]
    fn test_heading_change_normalized() {
        // Zigzag course crossing bearings on both sides of north.
        let samples = vec![
            sample(0.0, 0.0, 0.0),
            sample(0.001, 0.001, 10.0),
            sample(0.002, 0.000, 20.0),
            sample(0.001, -0.001, 30.0),
            sample(0.002, -0.002, 40.0),
        ];

        let frames = derive_kinematics(&samples).unwrap();
        for frame in &frames {
            assert!((0.0..360.0).contains(&frame.heading));
            assert!((0.0..360.0).contains(&frame.heading_change));
        }
    }

    #[test]
    fn test_all_idle_batch_is_insufficient() {
        // ~1.1 m over 10 s per segment, well under 5 km/h.
        let samples: Vec<GpsSample> = (0..5)
            .map(|i| sample(0.00001 * i as f64, 0.0, 10.0 * i as f64))
            .collect();

        let err = derive_kinematics(&samples).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { .. }));
    }

    #[test]
    fn test_fewer_than_two_valid_samples() {
        let err = derive_kinematics(&[sample(1.0, 1.0, 0.0)]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientData { got: 1, need: 2 }
        ));

        // Out-of-range samples are discarded before the count check.
        let err = derive_kinematics(&[
            sample(91.0, 0.0, 0.0),
            sample(0.0, 200.0, 10.0),
            sample(f64::NAN, 0.0, 20.0),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientData { got: 0, need: 2 }
        ));
    }

    #[test]
    fn test_shared_timestamp_floors_time_delta() {
        let samples = vec![
            sample(0.0, 0.0, 5.0),
            sample(0.001, 0.0, 5.0), // same time_step, ~111 m apart
        ];

        let frames = derive_kinematics(&samples).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].time_delta_s, 1.0);
        assert!(frames[0].speed_mps.is_finite());
    }

    #[test]
    fn test_first_frame_differences_are_zero() {
        let samples = vec![
            sample(12.9716, 77.5946, 0.0),
            sample(12.9720, 77.5950, 10.0),
            sample(12.9726, 77.5955, 20.0),
        ];

        let frames = derive_kinematics(&samples).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].acceleration, 0.0);
        assert_eq!(frames[0].jerk, 0.0);
        assert_eq!(frames[0].heading_change, 0.0);

        let expected_speed = haversine_m(12.9716, 77.5946, 12.9720, 77.5950) / 10.0;
        assert!((frames[0].speed_mps - expected_speed).abs() < 1e-9);
    }
}
