//! Schema inference for metric names without a static schema
//!
//! Class, unit and aggregation kind are guessed from substrings of the
//! lower-cased name. Rules are checked in order and the first match wins, so
//! `sleep_heart_rate` is a duration, not a frequency.

use crate::types::{title_case, AggregationKind, DeviceClass, MetricSchema};

/// Inferred semantics, before a name is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inferred {
    pub device_class: Option<DeviceClass>,
    pub unit: Option<&'static str>,
    pub aggregation: AggregationKind,
}

impl Inferred {
    const fn new(
        device_class: Option<DeviceClass>,
        unit: Option<&'static str>,
        aggregation: AggregationKind,
    ) -> Self {
        Self {
            device_class,
            unit,
            aggregation,
        }
    }
}

fn contains_any(name: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| name.contains(needle))
}

/// Classify a metric name
pub fn classify(name: &str) -> Inferred {
    use AggregationKind::{Measurement, TotalIncreasing};

    let name = name.to_lowercase();

    if contains_any(&name, &["temperature", "temp"]) {
        return Inferred::new(Some(DeviceClass::Temperature), Some("°C"), Measurement);
    }

    if contains_any(&name, &["duration", "time", "sleep"]) {
        let unit = if name.contains("sleep") { "min" } else { "s" };
        return Inferred::new(Some(DeviceClass::Duration), Some(unit), Measurement);
    }

    if contains_any(&name, &["heart_rate", "hrv", "pulse"]) {
        if name.contains("hrv") {
            return Inferred::new(None, Some("ms"), Measurement);
        }
        return Inferred::new(Some(DeviceClass::Frequency), Some("bpm"), Measurement);
    }

    if name.contains("step") {
        return Inferred::new(None, Some("steps"), TotalIncreasing);
    }

    if contains_any(&name, &["energy", "calorie"]) {
        return Inferred::new(Some(DeviceClass::Energy), Some("kcal"), TotalIncreasing);
    }

    if name.contains("distance") {
        return Inferred::new(Some(DeviceClass::Distance), Some("m"), TotalIncreasing);
    }

    if name.contains("weight") {
        return Inferred::new(Some(DeviceClass::Weight), Some("kg"), Measurement);
    }

    Inferred::new(None, None, Measurement)
}

/// Build a full schema for `key`
pub fn infer(key: &str) -> MetricSchema {
    let inferred = classify(key);
    MetricSchema {
        key: key.to_string(),
        name: title_case(key),
        device_class: inferred.device_class,
        unit: inferred.unit.map(str::to_string),
        aggregation: Some(inferred.aggregation),
        icon: None,
    }
}

/// Schema for a text reading: no class, unit or aggregation
pub fn text_schema(key: &str) -> MetricSchema {
    MetricSchema {
        key: key.to_string(),
        name: title_case(key),
        device_class: None,
        unit: None,
        aggregation: None,
        icon: None,
    }
}

/// Schema for the `_count` / `_sum` companions of a numeric array
pub fn aggregate_schema(key: &str, suffix: &str) -> MetricSchema {
    MetricSchema {
        key: format!("{key}_{suffix}"),
        name: format!("{} {}", title_case(key), title_case(suffix)),
        device_class: None,
        unit: None,
        aggregation: Some(AggregationKind::Measurement),
        icon: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_body_temperature() {
        let schema = infer("body_temperature");
        assert_eq!(schema.device_class, Some(DeviceClass::Temperature));
        assert_eq!(schema.unit.as_deref(), Some("°C"));
        assert_eq!(schema.aggregation, Some(AggregationKind::Measurement));
        assert_eq!(schema.name, "Body Temperature");
    }

    #[test]
    fn test_total_distance() {
        let schema = infer("total_distance");
        assert_eq!(schema.device_class, Some(DeviceClass::Distance));
        assert_eq!(schema.unit.as_deref(), Some("m"));
        assert_eq!(schema.aggregation, Some(AggregationKind::TotalIncreasing));
    }

    #[test]
    fn test_duration_units() {
        assert_eq!(classify("deep_sleep").unit, Some("min"));
        assert_eq!(classify("recovery_time").unit, Some("s"));
        assert_eq!(classify("workout_duration").device_class, Some(DeviceClass::Duration));
    }

    #[test]
    fn test_first_match_wins() {
        // Duration rule precedes heart rate
        let sleep_hr = classify("sleep_heart_rate");
        assert_eq!(sleep_hr.device_class, Some(DeviceClass::Duration));
        assert_eq!(sleep_hr.unit, Some("min"));

        // Temperature precedes everything, including "time"
        assert_eq!(classify("skin_temp_time").device_class, Some(DeviceClass::Temperature));
    }

    #[test]
    fn test_heart_rate_and_hrv() {
        let pulse = classify("pulse_peak");
        assert_eq!(pulse.device_class, Some(DeviceClass::Frequency));
        assert_eq!(pulse.unit, Some("bpm"));

        let hrv = classify("night_hrv");
        assert_eq!(hrv.device_class, None);
        assert_eq!(hrv.unit, Some("ms"));
    }

    #[test]
    fn test_accumulating_kinds() {
        assert_eq!(
            classify("daily_steps"),
            Inferred::new(None, Some("steps"), AggregationKind::TotalIncreasing)
        );
        assert_eq!(
            classify("Active_Calories"),
            Inferred::new(Some(DeviceClass::Energy), Some("kcal"), AggregationKind::TotalIncreasing)
        );
        assert_eq!(classify("body_weight").unit, Some("kg"));
    }

    #[test]
    fn test_default() {
        assert_eq!(
            classify("readiness"),
            Inferred::new(None, None, AggregationKind::Measurement)
        );
    }

    #[test]
    fn test_aggregate_schema() {
        let schema = aggregate_schema("splits", "count");
        assert_eq!(schema.key, "splits_count");
        assert_eq!(schema.name, "Splits Count");
    }
}
