//! Behavior classifier adapters.
//!
//! Both classifiers are trained, opaque, versioned oracles: feature vector
//! in, class probabilities (trip tier) or class index (bulk tier) out.
//! Models are loaded exactly once at process start into an immutable
//! [`ModelRegistry`] and shared read-only across concurrent invocations.

mod linear;

pub use linear::{LinearSoftmaxModel, ModelSpec};

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::features::{BULK_FEATURES, TRIP_FEATURES};
use crate::scoring::CLASS_LABELS;

/// Trip-level classifier: one per-frame feature vector → class
/// probabilities over the ordered class list.
pub trait TripClassifier: Send + Sync {
    fn version(&self) -> &str;
    fn predict_proba(&self, features: &[f64; TRIP_FEATURES.len()]) -> Vec<f64>;
}

/// Bulk/aggregate classifier: one aggregated feature vector → class index.
pub trait BulkClassifier: Send + Sync {
    fn version(&self) -> &str;
    fn predict(&self, features: &[f64; BULK_FEATURES.len()]) -> usize;
}

/// The two models the pipeline scores with. Constructed once at startup;
/// a load failure is fatal and must prevent the service from accepting
/// traffic.
pub struct ModelRegistry {
    pub trip: Arc<dyn TripClassifier>,
    pub bulk: Arc<dyn BulkClassifier>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("trip_version", &self.trip.version())
            .field("bulk_version", &self.bulk.version())
            .finish()
    }
}

impl ModelRegistry {
    pub fn new(trip: Arc<dyn TripClassifier>, bulk: Arc<dyn BulkClassifier>) -> Self {
        Self { trip, bulk }
    }

    /// Loads `trip_model.json` and `bulk_model.json` from `dir`, validating
    /// each model's feature schema and class ordering against the
    /// pipeline's.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let trip = LinearSoftmaxModel::load(&dir.join("trip_model.json"), &TRIP_FEATURES)
            .context("loading trip model")?;
        ensure_class_order(trip.classes(), "trip_model.json")?;

        let bulk = LinearSoftmaxModel::load(&dir.join("bulk_model.json"), &BULK_FEATURES)
            .context("loading bulk model")?;
        ensure_class_order(bulk.classes(), "bulk_model.json")?;

        tracing::info!(
            trip_version = TripClassifier::version(&trip),
            bulk_version = BulkClassifier::version(&bulk),
            "Models loaded"
        );

        Ok(Self {
            trip: Arc::new(trip),
            bulk: Arc::new(bulk),
        })
    }
}

/// Class order is part of the scoring contract: the score weights and the
/// category labels are indexed by class position.
fn ensure_class_order(classes: &[String], file: &str) -> anyhow::Result<()> {
    anyhow::ensure!(
        classes == CLASS_LABELS,
        "{file}: classes {classes:?} do not match {CLASS_LABELS:?}"
    );
    Ok(())
}
