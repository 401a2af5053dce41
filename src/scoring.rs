//! Trip scoring: classifier probabilities → 0–100 score, risk category,
//! and a deterministic penalty breakdown for risky trips.

use serde::{Deserialize, Serialize};

use crate::classifier::TripClassifier;
use crate::features::trip_vector;
use crate::kinematics::KinematicFrame;

/// Nominal score of each class, in classifier class order
/// (Risky, Moderate, Safe).
pub const CLASS_WEIGHTS: [f64; 3] = [20.0, 50.0, 100.0];

/// Canonical class labels. Part of the trip model's version contract.
pub const CLASS_LABELS: [&str; 3] = ["Risky", "Moderate", "Safe"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Risky,
    Moderate,
    Safe,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Risky => "Risky",
            Category::Moderate => "Moderate",
            Category::Safe => "Safe",
        };
        f.write_str(s)
    }
}

/// Maps a driving score onto its risk category.
///
/// | Range    | Category |
/// |----------|----------|
/// | >= 85    | Safe     |
/// | >= 60    | Moderate |
/// | < 60     | Risky    |
pub fn categorize(score: f64) -> Category {
    match score {
        s if s >= 85.0 => Category::Safe,
        s if s >= 60.0 => Category::Moderate,
        _ => Category::Risky,
    }
}

/// Dot product of class probabilities with [`CLASS_WEIGHTS`].
pub fn weighted_score(probabilities: &[f64]) -> f64 {
    probabilities
        .iter()
        .zip(CLASS_WEIGHTS.iter())
        .map(|(p, w)| p * w)
        .sum()
}

/// Per-factor penalties computed when a trip scores Risky. Rounded to
/// whole points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyBreakdown {
    pub speed: i64,
    pub acceleration: i64,
    pub heading_change: i64,
    pub sensitive_area: i64,
    pub speed_violation: i64,
}

impl PenaltyBreakdown {
    pub fn from_frames(frames: &[KinematicFrame]) -> Self {
        let n = frames.len().max(1) as f64;
        let mean_speed = frames.iter().map(|f| f.speed_mps).sum::<f64>() / n;
        let mean_abs_accel = frames.iter().map(|f| f.acceleration.abs()).sum::<f64>() / n;
        let mean_abs_heading = frames.iter().map(|f| f.heading_change.abs()).sum::<f64>() / n;
        let sasv_total: u32 = frames.iter().map(|f| u32::from(f.sasv)).sum();
        let violation_total: u32 = frames.iter().map(|f| u32::from(f.speed_violation)).sum();

        Self {
            speed: (mean_speed * 2.0).round() as i64,
            acceleration: (mean_abs_accel * 5.0).round() as i64,
            heading_change: (mean_abs_heading * 3.0).round() as i64,
            sensitive_area: i64::from(sasv_total) * 10,
            speed_violation: i64::from(violation_total) * 15,
        }
    }
}

/// Scores a trip: per-frame class probabilities are weighted by
/// [`CLASS_WEIGHTS`] and averaged; risky trips get a penalty breakdown.
pub fn score_trip(
    frames: &[KinematicFrame],
    classifier: &dyn TripClassifier,
) -> (f64, Category, Option<PenaltyBreakdown>) {
    let score = frames
        .iter()
        .map(|f| weighted_score(&classifier.predict_proba(&trip_vector(f))))
        .sum::<f64>()
        / frames.len().max(1) as f64;

    let category = categorize(score);
    let penalties = match category {
        Category::Risky => Some(PenaltyBreakdown::from_frames(frames)),
        _ => None,
    };

    (score, category, penalties)
}

/// Coaching strings per category, surfaced alongside the verdict.
pub fn suggestions(category: Category) -> &'static [&'static str] {
    match category {
        Category::Risky => &[
            "Reduce sudden accelerations",
            "Avoid sharp turns and quick lane changes",
            "Slow down near schools and hospitals",
        ],
        Category::Moderate => &[
            "Try to smooth out accelerations",
            "Maintain a steady speed to improve your score",
        ],
        Category::Safe => &[
            "Excellent driving! Continue following traffic rules",
            "Maintain safe speeds and smooth driving",
        ],
    }
}
