//! Output formatting and persistence for trip verdicts.
//!
//! Supports pretty-printing, JSON serialization, and CSV append.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::pipeline::TripVerdict;
use crate::scoring::Category;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// Flat verdict row for the CSV journey log.
#[derive(Debug, Serialize)]
pub struct VerdictRow {
    pub timestamp: DateTime<Utc>,
    pub driver_id: String,
    pub trip_id: String,
    pub score: f64,
    pub category: Category,
    pub speed_penalty: Option<i64>,
    pub acceleration_penalty: Option<i64>,
    pub heading_change_penalty: Option<i64>,
    pub sensitive_area_penalty: Option<i64>,
    pub speed_violation_penalty: Option<i64>,
}

impl VerdictRow {
    pub fn from_verdict(verdict: &TripVerdict) -> Self {
        let p = verdict.penalties.as_ref();
        Self {
            timestamp: Utc::now(),
            driver_id: verdict.driver_id.clone(),
            trip_id: verdict.trip_id.clone(),
            score: verdict.score,
            category: verdict.category,
            speed_penalty: p.map(|p| p.speed),
            acceleration_penalty: p.map(|p| p.acceleration),
            heading_change_penalty: p.map(|p| p.heading_change),
            sensitive_area_penalty: p.map(|p| p.sensitive_area),
            speed_violation_penalty: p.map(|p| p.speed_violation),
        }
    }
}

/// Logs a verdict using Rust's debug pretty-print format.
pub fn print_pretty(verdict: &TripVerdict) {
    debug!("{:#?}", verdict);
}

/// Logs a verdict as pretty-printed JSON.
pub fn print_json(verdict: &TripVerdict) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(verdict)?);
    Ok(())
}

/// Appends a verdict as a row to a CSV journey log.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &str, verdict: &TripVerdict) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(VerdictRow::from_verdict(verdict))?;
    writer.flush()?;

    Ok(())
}
