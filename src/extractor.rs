//! Metric extraction
//!
//! Flattens the daily metrics payload returned by the Ultrahuman API into a
//! [`CanonicalMapping`]. The payload is treated as untrusted: every level may be
//! missing or of the wrong type, and each missing piece only removes the keys
//! derived from it.
//!
//! ```text
//! {"data": {"metrics": {"2024-01-15": [{"type": "hr", "object": {...}}, ...]}}}
//! ```

use crate::error::ComputeError;
use crate::types::CanonicalMapping;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, warn};

/// Date format used as the key of the per-day metric lists
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Metric record types understood by the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    HeartRate,
    NightRestingHeartRate,
    AverageSleepHrv,
    Sleep,
    Steps,
    ActiveMinutes,
    Motion,
    ActivityIndex,
    RecoveryIndex,
    MetabolicScore,
    BodyTemperature,
    Vo2Max,
}

type Rule = fn(&Value, &mut CanonicalMapping);

impl MetricType {
    pub const ALL: [MetricType; 12] = [
        MetricType::HeartRate,
        MetricType::NightRestingHeartRate,
        MetricType::AverageSleepHrv,
        MetricType::Sleep,
        MetricType::Steps,
        MetricType::ActiveMinutes,
        MetricType::Motion,
        MetricType::ActivityIndex,
        MetricType::RecoveryIndex,
        MetricType::MetabolicScore,
        MetricType::BodyTemperature,
        MetricType::Vo2Max,
    ];

    /// Tag used in the `type` field of a record
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::HeartRate => "hr",
            MetricType::NightRestingHeartRate => "night_rhr",
            MetricType::AverageSleepHrv => "avg_sleep_hrv",
            MetricType::Sleep => "sleep",
            MetricType::Steps => "steps",
            MetricType::ActiveMinutes => "active_minutes",
            MetricType::Motion => "motion",
            MetricType::ActivityIndex => "activity_index",
            MetricType::RecoveryIndex => "recovery_index",
            MetricType::MetabolicScore => "metabolic_score",
            MetricType::BodyTemperature => "body_temperature",
            MetricType::Vo2Max => "vo2_max",
        }
    }

    /// Unknown tags yield `None` and the record is ignored
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    fn rule(&self) -> Rule {
        match self {
            MetricType::HeartRate => extract_heart_rate,
            MetricType::NightRestingHeartRate => extract_resting_heart_rate,
            MetricType::AverageSleepHrv => |obj, out| copy_value(obj, out, "hrv"),
            MetricType::Sleep => extract_sleep,
            MetricType::Steps => |obj, out| copy_value(obj, out, "steps"),
            MetricType::ActiveMinutes => extract_active_minutes,
            MetricType::Motion => extract_motion,
            MetricType::ActivityIndex => extract_activity_index,
            MetricType::RecoveryIndex => |obj, out| copy_value(obj, out, "recovery_index"),
            MetricType::MetabolicScore => |obj, out| copy_value(obj, out, "metabolic_score"),
            MetricType::BodyTemperature => |obj, out| copy_value(obj, out, "body_temperature"),
            MetricType::Vo2Max => |obj, out| copy_value(obj, out, "vo2_max"),
        }
    }
}

/// Extract the canonical mapping for `date` from a raw payload.
///
/// Never fails: a payload without metrics for `date` gives an empty mapping.
pub fn extract(raw: &Value, date: NaiveDate) -> CanonicalMapping {
    let mut mapping = CanonicalMapping::new();

    if let Some(error) = raw.get("error").filter(|e| !e.is_null()) {
        warn!(error = %error, "Ultrahuman API reported an error alongside the payload");
    }

    let date_key = date.format(DATE_FORMAT).to_string();
    let Some(records) = raw
        .get("data")
        .and_then(|d| d.get("metrics"))
        .and_then(|m| m.get(&date_key))
        .and_then(Value::as_array)
    else {
        debug!(date = %date_key, "No metrics for date");
        return mapping;
    };

    for record in records {
        let Some(tag) = record.get("type").and_then(Value::as_str) else {
            debug!("Skipping metric record without a type tag");
            continue;
        };
        let Some(metric_type) = MetricType::from_tag(tag) else {
            debug!(tag, "Ignoring unknown metric type");
            continue;
        };
        let Some(object) = record.get("object").filter(|o| o.is_object()) else {
            debug!(tag, "Skipping metric record without an object");
            continue;
        };
        (metric_type.rule())(object, &mut mapping);
    }

    debug!(date = %date_key, metrics = mapping.len(), "Extracted metrics");
    mapping
}

/// Parse a JSON document and extract it. Only malformed JSON is an error.
pub fn extract_str(raw_json: &str, date: NaiveDate) -> Result<CanonicalMapping, ComputeError> {
    let raw: Value = serde_json::from_str(raw_json)?;
    Ok(extract(&raw, date))
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(date: &str) -> Result<NaiveDate, ComputeError> {
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|e| ComputeError::DateParseError(format!("{date}: {e}")))
}

// Field helpers

/// Numeric view of a field, accepting numbers and numeric strings
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Field as a JSON number. Numbers pass through unchanged, numeric strings
/// are stored as their parsed value.
fn numeric(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        other => number(other).map(Value::from),
    }
}

/// Scalar view of a field: numbers and strings pass through as-is
fn scalar(value: &Value) -> Option<&Value> {
    match value {
        Value::Number(_) | Value::String(_) => Some(value),
        _ => None,
    }
}

fn array<'a>(object: &'a Value, field: &str) -> &'a [Value] {
    object
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Value of the first quick metric whose type is one of `types`
fn quick_metric<'a>(object: &'a Value, types: &[&str]) -> Option<&'a Value> {
    array(object, "quick_metrics")
        .iter()
        .filter(|qm| {
            qm.get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| types.contains(&t))
        })
        .find_map(|qm| qm.get("value").and_then(scalar))
}

fn copy_value(object: &Value, out: &mut CanonicalMapping, key: &str) {
    if let Some(value) = object.get("value").and_then(scalar) {
        out.insert(key, value.clone());
    }
}

fn insert_minutes_and_hours(out: &mut CanonicalMapping, minutes: &Value) {
    let (Some(stored), Some(m)) = (numeric(minutes), number(minutes)) else {
        return;
    };
    out.insert("activity_minutes", stored);
    out.insert_float("activity_hours", m / 60.0);
}

fn insert_calories(object: &Value, out: &mut CanonicalMapping) {
    if let Some(calories) = quick_metric(object, &["calories", "total_calories"]) {
        out.insert("total_calories", calories.clone());
    }
}

// Rules

fn extract_heart_rate(object: &Value, out: &mut CanonicalMapping) {
    let readings: Vec<&Value> = array(object, "values")
        .iter()
        .filter_map(|v| v.get("value"))
        .filter(|v| number(v).is_some())
        .collect();

    if readings.is_empty() {
        return;
    }

    let mut sum = 0.0;
    let mut min = readings[0];
    let mut max = readings[0];
    for &reading in &readings {
        let n = number(reading).unwrap_or_default();
        sum += n;
        if n < number(min).unwrap_or_default() {
            min = reading;
        }
        if n > number(max).unwrap_or_default() {
            max = reading;
        }
    }

    out.insert_float("heart_rate_avg", sum / readings.len() as f64);
    if let Some(min) = numeric(min) {
        out.insert("heart_rate_min", min);
    }
    if let Some(max) = numeric(max) {
        out.insert("heart_rate_max", max);
    }
}

fn extract_resting_heart_rate(object: &Value, out: &mut CanonicalMapping) {
    let resting = object.get("avg").and_then(scalar).or_else(|| {
        array(object, "values")
            .last()
            .and_then(|last| last.get("value"))
            .and_then(scalar)
    });
    if let Some(value) = resting {
        out.insert("heart_rate_resting", value.clone());
    }
}

fn extract_sleep(object: &Value, out: &mut CanonicalMapping) {
    if let Some(seconds) = quick_metric(object, &["total_sleep"]).and_then(number) {
        out.insert_float("sleep_duration", seconds / 60.0);
    }
    if let Some(quality) = quick_metric(object, &["sleep_index"]) {
        out.insert("sleep_quality", quality.clone());
    }
    if let Some(seconds) = quick_metric(object, &["time_in_bed"]).and_then(number) {
        out.insert_float("time_in_bed", seconds / 60.0);
    }
}

fn extract_active_minutes(object: &Value, out: &mut CanonicalMapping) {
    if let Some(minutes) = object.get("value").and_then(scalar) {
        insert_minutes_and_hours(out, minutes);
    }
}

fn extract_motion(object: &Value, out: &mut CanonicalMapping) {
    copy_value(object, out, "movement_index");
    insert_calories(object, out);
}

fn extract_activity_index(object: &Value, out: &mut CanonicalMapping) {
    copy_value(object, out, "activity_index");
    insert_calories(object, out);
    if let Some(minutes) = quick_metric(object, &["active_minutes", "activity_minutes"]) {
        insert_minutes_and_hours(out, minutes);
    }
}
