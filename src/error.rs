//! Typed error taxonomy for the scoring pipeline.
//!
//! Recoverable conditions (oracle lookup failures, malformed stored trips)
//! are not errors here: the oracle degrades to an empty facility list and
//! the aggregation engine skips and counts corrupt trips explicitly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed or missing input fields. Caller-visible, not retried.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Too few valid samples remain after cleaning and the idle filter.
    #[error("insufficient GPS data: {got} usable samples, {need} required")]
    InsufficientData { got: usize, need: usize },

    /// Classifier feature schema does not match the pipeline's. Indicates
    /// version skew between pipeline and model; fatal per request.
    #[error("feature schema mismatch in model '{model}': {detail}")]
    FeatureSchema { model: String, detail: String },

    /// Trip id collision persisted past the bounded regenerate-and-retry.
    #[error("trip id conflict for driver '{driver_id}' after {attempts} attempts")]
    Conflict { driver_id: String, attempts: u32 },

    /// Aggregation window contains no usable trips or periods.
    #[error("no data for driver '{driver_id}' in the requested window")]
    NoData { driver_id: String },

    #[error("storage failure: {0}")]
    Store(#[from] crate::store::StoreError),
}
