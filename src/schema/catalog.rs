//! Static schema table for the metrics the Ultrahuman API is known to produce

use crate::types::{AggregationKind, DeviceClass, MetricSchema};

/// A schema known ahead of time
#[derive(Debug, Clone, Copy)]
pub struct StaticSchema {
    pub key: &'static str,
    pub name: &'static str,
    pub device_class: Option<DeviceClass>,
    pub unit: Option<&'static str>,
    pub aggregation: AggregationKind,
    pub icon: &'static str,
}

impl StaticSchema {
    pub fn to_schema(&self) -> MetricSchema {
        MetricSchema {
            key: self.key.to_string(),
            name: self.name.to_string(),
            device_class: self.device_class,
            unit: self.unit.map(str::to_string),
            aggregation: Some(self.aggregation),
            icon: Some(self.icon.to_string()),
        }
    }
}

const fn measurement(
    key: &'static str,
    name: &'static str,
    device_class: Option<DeviceClass>,
    unit: Option<&'static str>,
    icon: &'static str,
) -> StaticSchema {
    StaticSchema {
        key,
        name,
        device_class,
        unit,
        aggregation: AggregationKind::Measurement,
        icon,
    }
}

const fn total(
    key: &'static str,
    name: &'static str,
    device_class: Option<DeviceClass>,
    unit: Option<&'static str>,
    icon: &'static str,
) -> StaticSchema {
    StaticSchema {
        key,
        name,
        device_class,
        unit,
        aggregation: AggregationKind::TotalIncreasing,
        icon,
    }
}

/// Fixed schemas, in the order their entities are created
pub const STATIC_SCHEMAS: &[StaticSchema] = &[
    // Heart rate
    measurement(
        "heart_rate_resting",
        "Heart Rate Resting",
        Some(DeviceClass::Frequency),
        Some("bpm"),
        "mdi:heart-pulse",
    ),
    measurement(
        "heart_rate_avg",
        "Heart Rate Average",
        Some(DeviceClass::Frequency),
        Some("bpm"),
        "mdi:heart-pulse",
    ),
    measurement(
        "heart_rate_min",
        "Heart Rate Min",
        Some(DeviceClass::Frequency),
        Some("bpm"),
        "mdi:heart-pulse",
    ),
    measurement(
        "heart_rate_max",
        "Heart Rate Max",
        Some(DeviceClass::Frequency),
        Some("bpm"),
        "mdi:heart-pulse",
    ),
    measurement(
        "hrv",
        "Heart Rate Variability",
        None,
        Some("ms"),
        "mdi:heart-flash",
    ),
    // Sleep
    measurement(
        "sleep_duration",
        "Sleep Duration",
        Some(DeviceClass::Duration),
        Some("min"),
        "mdi:sleep",
    ),
    measurement(
        "time_in_bed",
        "Time in Bed",
        Some(DeviceClass::Duration),
        Some("min"),
        "mdi:sleep",
    ),
    measurement("sleep_quality", "Sleep Quality", None, None, "mdi:sleep"),
    // Activity
    total("steps", "Steps", None, Some("steps"), "mdi:walk"),
    measurement("activity_index", "Activity Index", None, None, "mdi:run"),
    measurement(
        "activity_minutes",
        "Activity Minutes",
        Some(DeviceClass::Duration),
        Some("min"),
        "mdi:timer",
    ),
    measurement(
        "activity_hours",
        "Activity Hours",
        Some(DeviceClass::Duration),
        Some("h"),
        "mdi:timer",
    ),
    measurement("movement_index", "Movement Index", None, None, "mdi:motion"),
    total(
        "total_calories",
        "Total Calories",
        Some(DeviceClass::Energy),
        Some("kcal"),
        "mdi:fire",
    ),
    // Recovery
    measurement("recovery_index", "Recovery Index", None, None, "mdi:heart-plus"),
    measurement("metabolic_score", "Metabolic Score", None, None, "mdi:chart-line"),
    measurement(
        "body_temperature",
        "Body Temperature",
        Some(DeviceClass::Temperature),
        Some("°C"),
        "mdi:thermometer",
    ),
    measurement("vo2_max", "VO2 Max", None, Some("ml/kg/min"), "mdi:run-fast"),
];

/// Static schema for `key`, if there is one
pub fn find_static(key: &str) -> Option<&'static StaticSchema> {
    STATIC_SCHEMAS.iter().find(|schema| schema.key == key)
}

pub fn is_static_key(key: &str) -> bool {
    find_static(key).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_static_keys_unique() {
        let keys: HashSet<_> = STATIC_SCHEMAS.iter().map(|s| s.key).collect();
        assert_eq!(keys.len(), STATIC_SCHEMAS.len());
    }

    #[test]
    fn test_find_static() {
        let temp = find_static("body_temperature").unwrap();
        assert_eq!(temp.unit, Some("°C"));
        assert_eq!(temp.device_class, Some(DeviceClass::Temperature));
        assert!(find_static("splits").is_none());
    }

    #[test]
    fn test_to_schema() {
        let schema = find_static("steps").unwrap().to_schema();
        assert_eq!(schema.key, "steps");
        assert_eq!(schema.aggregation, Some(AggregationKind::TotalIncreasing));
        assert_eq!(schema.icon.as_deref(), Some("mdi:walk"));
    }
}
