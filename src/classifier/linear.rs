use std::path::Path;

use serde::Deserialize;

use crate::error::PipelineError;
use crate::features::{BULK_FEATURES, TRIP_FEATURES};

use super::{BulkClassifier, TripClassifier};

/// On-disk model description: a standardizing scaler plus per-class linear
/// weights, exported from the training pipeline as JSON.
///
/// ```json
/// {
///   "version": "trip-v3",
///   "classes": ["Risky", "Moderate", "Safe"],
///   "features": ["speed_mps", "..."],
///   "scaler_mean": [...],
///   "scaler_std": [...],
///   "weights": [[...], [...], [...]],
///   "bias": [...]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSpec {
    pub version: String,
    pub classes: Vec<String>,
    pub features: Vec<String>,
    pub scaler_mean: Vec<f64>,
    pub scaler_std: Vec<f64>,
    /// Row per class, column per feature.
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

/// Multinomial linear model with softmax probabilities. Immutable once
/// constructed; safe to share across concurrent invocations.
#[derive(Debug)]
pub struct LinearSoftmaxModel {
    spec: ModelSpec,
}

impl LinearSoftmaxModel {
    /// Validates the spec against the pipeline's expected feature schema.
    /// Any mismatch fails before a single numeric call is attempted.
    pub fn from_spec(spec: ModelSpec, expected_features: &[&str]) -> Result<Self, PipelineError> {
        let schema_err = |detail: String| PipelineError::FeatureSchema {
            model: spec.version.clone(),
            detail,
        };

        if spec.features.len() != expected_features.len() {
            return Err(schema_err(format!(
                "expected {} features, model declares {}",
                expected_features.len(),
                spec.features.len()
            )));
        }
        for (i, (expected, got)) in expected_features.iter().zip(&spec.features).enumerate() {
            if expected != got {
                return Err(schema_err(format!(
                    "feature {i}: expected '{expected}', model declares '{got}'"
                )));
            }
        }

        let n = spec.features.len();
        if spec.scaler_mean.len() != n || spec.scaler_std.len() != n {
            return Err(schema_err("scaler dimensions do not match features".into()));
        }
        if spec.classes.is_empty()
            || spec.weights.len() != spec.classes.len()
            || spec.bias.len() != spec.classes.len()
            || spec.weights.iter().any(|row| row.len() != n)
        {
            return Err(schema_err("weight matrix dimensions do not match".into()));
        }

        Ok(Self { spec })
    }

    /// Reads and validates a model file. Used at startup only.
    pub fn load(path: &Path, expected_features: &[&str]) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let spec: ModelSpec = serde_json::from_str(&content)?;
        Ok(Self::from_spec(spec, expected_features)?)
    }

    pub fn classes(&self) -> &[String] {
        &self.spec.classes
    }

    fn logits(&self, features: &[f64]) -> Vec<f64> {
        let scaled: Vec<f64> = features
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let std = self.spec.scaler_std[i];
                if std == 0.0 {
                    0.0
                } else {
                    (x - self.spec.scaler_mean[i]) / std
                }
            })
            .collect();

        self.spec
            .weights
            .iter()
            .zip(&self.spec.bias)
            .map(|(row, b)| row.iter().zip(&scaled).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect()
    }

    fn proba(&self, features: &[f64]) -> Vec<f64> {
        let logits = self.logits(features);
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let sum: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / sum).collect()
    }

    fn argmax(&self, features: &[f64]) -> usize {
        self.logits(features)
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

impl TripClassifier for LinearSoftmaxModel {
    fn version(&self) -> &str {
        &self.spec.version
    }

    fn predict_proba(&self, features: &[f64; TRIP_FEATURES.len()]) -> Vec<f64> {
        self.proba(features)
    }
}

impl BulkClassifier for LinearSoftmaxModel {
    fn version(&self) -> &str {
        &self.spec.version
    }

    fn predict(&self, features: &[f64; BULK_FEATURES.len()]) -> usize {
        self.argmax(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip_spec() -> ModelSpec {
        ModelSpec {
            version: "trip-test".into(),
            classes: vec!["Risky".into(), "Moderate".into(), "Safe".into()],
            features: TRIP_FEATURES.iter().map(|f| f.to_string()).collect(),
            scaler_mean: vec![0.0; 7],
            scaler_std: vec![1.0; 7],
            // Favors Safe when speed is low, Risky when speed is high.
            weights: vec![
                vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                vec![0.0; 7],
                vec![-1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            ],
            bias: vec![0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let model = LinearSoftmaxModel::from_spec(trip_spec(), &TRIP_FEATURES).unwrap();
        let probs = model.predict_proba(&[2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(probs[0] > probs[2]); // high speed leans Risky here
    }

    #[test]
    fn test_renamed_feature_fails_schema_check() {
        let mut spec = trip_spec();
        spec.features[2] = "heading".into();

        let err = LinearSoftmaxModel::from_spec(spec, &TRIP_FEATURES).unwrap_err();
        assert!(matches!(err, PipelineError::FeatureSchema { .. }));
    }

    #[test]
    fn test_wrong_feature_count_fails_schema_check() {
        let mut spec = trip_spec();
        spec.features.pop();

        let err = LinearSoftmaxModel::from_spec(spec, &TRIP_FEATURES).unwrap_err();
        assert!(matches!(err, PipelineError::FeatureSchema { .. }));
    }

    #[test]
    fn test_bad_weight_dimensions_fail_schema_check() {
        let mut spec = trip_spec();
        spec.weights[1] = vec![0.0; 3];

        let err = LinearSoftmaxModel::from_spec(spec, &TRIP_FEATURES).unwrap_err();
        assert!(matches!(err, PipelineError::FeatureSchema { .. }));
    }

    #[test]
    fn test_zero_std_does_not_divide_by_zero() {
        let mut spec = trip_spec();
        spec.scaler_std[0] = 0.0;

        let model = LinearSoftmaxModel::from_spec(spec, &TRIP_FEATURES).unwrap();
        let probs = model.predict_proba(&[5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(probs.iter().all(|p| p.is_finite()));
    }
}
