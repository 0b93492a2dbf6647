//! Pipeline orchestration
//!
//! One-shot processing of a raw daily payload, for callers that do not run the
//! refresh loop: extraction followed by projection and a state read.

use crate::error::ComputeError;
use crate::extractor::{extract, parse_date};
use crate::projector::Projector;
use crate::types::{CanonicalMapping, EntityDescriptor, EntityState};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything derived from one payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    /// Day the mapping was extracted for
    pub date: NaiveDate,
    pub mapping: CanonicalMapping,
    pub entities: Vec<EntityDescriptor>,
    pub states: Vec<EntityState>,
}

/// Run extraction and projection on an already parsed payload
pub fn process_daily_value(raw: &Value, date: NaiveDate, entry_id: &str) -> DailySnapshot {
    let mapping = extract(raw, date);
    let entities = Projector::new(entry_id).project(&mapping);
    let states = entities.iter().map(|e| e.state(&mapping)).collect();

    DailySnapshot {
        date,
        mapping,
        entities,
        states,
    }
}

/// Convert a raw daily metrics JSON payload into a snapshot.
///
/// # Arguments
/// * `raw_json` - Raw daily metrics API response
/// * `date` - Day to extract (YYYY-MM-DD)
/// * `entry_id` - Identifier used to build entity unique ids
///
/// # Example
/// ```ignore
/// let snapshot = process_daily_payload(body, "2024-01-15", "home")?;
/// ```
pub fn process_daily_payload(
    raw_json: &str,
    date: &str,
    entry_id: &str,
) -> Result<DailySnapshot, ComputeError> {
    let date = parse_date(date)?;
    let raw: Value = serde_json::from_str(raw_json)?;
    Ok(process_daily_value(&raw, date, entry_id))
}
