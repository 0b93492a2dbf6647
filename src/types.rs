//! Core types for the Ultrahuman Flux pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: the canonical mapping produced by extraction, metric schemas, and
//! the entity descriptors a host reads the mapping through.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Prefix applied to every entity display name
pub const ENTITY_NAME_PREFIX: &str = "Ultrahuman";

/// A single scalar reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetricValue {
    /// Read a scalar out of a JSON value. Objects, arrays, booleans and null
    /// are not scalars.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(MetricValue::Integer(i))
                } else {
                    n.as_f64().map(MetricValue::Float)
                }
            }
            Value::String(s) => Some(MetricValue::Text(s.clone())),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, MetricValue::Text(_))
    }
}

/// Flat mapping from canonical metric name to value.
///
/// The extractor only ever writes scalars. Mappings handed in by a host may
/// carry nested objects and arrays, which the projector walks recursively.
/// Iteration order is the sorted key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalMapping {
    entries: BTreeMap<String, Value>,
}

impl CanonicalMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping from a JSON object. Any other JSON shape yields `None`.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self {
                entries: map.into_iter().collect(),
            }),
            _ => None,
        }
    }

    /// Insert or overwrite a value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Insert a computed float. Non-finite results are dropped, since JSON
    /// cannot carry them.
    pub fn insert_float(&mut self, key: impl Into<String>, value: f64) {
        if value.is_finite() {
            self.entries.insert(key.into(), Value::from(value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Scalar reading stored directly under `key`
    pub fn scalar(&self, key: &str) -> Option<MetricValue> {
        self.get(key).and_then(MetricValue::from_json)
    }

    /// Resolve a path whose first segment is a top-level key and whose
    /// remaining segments walk nested objects.
    pub fn lookup(&self, path: &[String]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.entries.get(first)?;
        for segment in rest {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}

/// Semantic category of a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Temperature,
    Duration,
    Frequency,
    Energy,
    Distance,
    Weight,
}

/// How a reading evolves within a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    /// Point-in-time value that can go up or down
    Measurement,
    /// Accumulates upward through the day (steps, calories)
    TotalIncreasing,
}

/// Where a schema came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    Static,
    Inferred,
}

/// Semantics attached to one canonical metric name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSchema {
    /// Canonical metric name
    pub key: String,
    /// Human-readable name
    pub name: String,
    pub device_class: Option<DeviceClass>,
    /// Unit of measurement
    pub unit: Option<String>,
    /// `None` for text readings
    pub aggregation: Option<AggregationKind>,
    pub icon: Option<String>,
}

/// How an accessor turns the value found at its path into a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadKind {
    /// Number or string as stored
    Scalar,
    /// String holding a number, parsed on every read
    NumericText,
    /// Length of an array
    Count,
    /// Sum of an array whose elements are all numeric
    Sum,
}

/// Self-contained recipe for reading one entity's value out of a mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accessor {
    pub path: Vec<String>,
    pub read: ReadKind,
}

impl Accessor {
    pub fn scalar(key: impl Into<String>) -> Self {
        Self {
            path: vec![key.into()],
            read: ReadKind::Scalar,
        }
    }

    pub fn at(path: Vec<String>, read: ReadKind) -> Self {
        Self { path, read }
    }

    /// Read the current value. Anything that does not fit the read kind is
    /// absent.
    pub fn read(&self, mapping: &CanonicalMapping) -> Option<MetricValue> {
        let value = mapping.lookup(&self.path)?;
        match self.read {
            ReadKind::Scalar => MetricValue::from_json(value),
            ReadKind::NumericText => match value {
                Value::String(s) => parse_numeric_text(s),
                other => MetricValue::from_json(other).filter(MetricValue::is_numeric),
            },
            ReadKind::Count => value
                .as_array()
                .map(|items| MetricValue::Integer(items.len() as i64)),
            ReadKind::Sum => value.as_array().and_then(|items| sum_numeric(items)),
        }
    }
}

/// Parse strings like `"72"`, `"-3"` or `"36.6"`. At most one leading minus
/// and one decimal point are accepted.
pub fn parse_numeric_text(text: &str) -> Option<MetricValue> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let mut seen_point = false;
    let mut seen_digit = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_point => seen_point = true,
            _ => return None,
        }
    }
    if !seen_digit {
        return None;
    }
    if !seen_point {
        if let Ok(i) = text.parse::<i64>() {
            return Some(MetricValue::Integer(i));
        }
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(MetricValue::Float)
}

fn sum_numeric(items: &[Value]) -> Option<MetricValue> {
    let mut int_sum: Option<i64> = Some(0);
    let mut float_sum = 0.0;
    for item in items {
        let Value::Number(n) = item else {
            return None;
        };
        float_sum += n.as_f64()?;
        int_sum = match (int_sum, n.as_i64()) {
            (Some(acc), Some(i)) => acc.checked_add(i),
            _ => None,
        };
    }
    match int_sum {
        Some(i) => Some(MetricValue::Integer(i)),
        None => Some(MetricValue::Float(float_sum)),
    }
}

/// One entity exposed to the host platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Stable id: `<entry id>_<key>`
    pub unique_id: String,
    /// Canonical metric name
    pub key: String,
    /// Name shown to users
    pub display_name: String,
    pub schema: MetricSchema,
    pub source: SchemaSource,
    pub accessor: Accessor,
}

impl EntityDescriptor {
    pub fn new(
        entry_id: &str,
        schema: MetricSchema,
        source: SchemaSource,
        accessor: Accessor,
    ) -> Self {
        Self {
            unique_id: format!("{}_{}", entry_id, schema.key),
            key: schema.key.clone(),
            display_name: format!("{} {}", ENTITY_NAME_PREFIX, schema.name),
            schema,
            source,
            accessor,
        }
    }

    /// Current value, or `None` when the entity is unknown for this mapping
    pub fn value(&self, mapping: &CanonicalMapping) -> Option<MetricValue> {
        self.accessor.read(mapping)
    }

    /// Snapshot of the entity as a host would render it
    pub fn state(&self, mapping: &CanonicalMapping) -> EntityState {
        EntityState {
            unique_id: self.unique_id.clone(),
            name: self.display_name.clone(),
            value: self.value(mapping),
            unit: self.schema.unit.clone(),
            device_class: self.schema.device_class,
            aggregation: self.schema.aggregation,
            icon: self.schema.icon.clone(),
        }
    }
}

/// Rendered state of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub unique_id: String,
    pub name: String,
    pub value: Option<MetricValue>,
    pub unit: Option<String>,
    pub device_class: Option<DeviceClass>,
    pub aggregation: Option<AggregationKind>,
    pub icon: Option<String>,
}

/// Turn `total_distance` into `Total Distance`
pub fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metric_value_from_json() {
        assert_eq!(MetricValue::from_json(&json!(60)), Some(MetricValue::Integer(60)));
        assert_eq!(MetricValue::from_json(&json!(70.5)), Some(MetricValue::Float(70.5)));
        assert_eq!(
            MetricValue::from_json(&json!("good")),
            Some(MetricValue::Text("good".to_string()))
        );
        assert_eq!(MetricValue::from_json(&json!(null)), None);
        assert_eq!(MetricValue::from_json(&json!([1, 2])), None);
        assert_eq!(MetricValue::from_json(&json!(true)), None);
    }

    #[test]
    fn test_insert_float_drops_non_finite() {
        let mut mapping = CanonicalMapping::new();
        mapping.insert_float("a", f64::NAN);
        mapping.insert_float("b", f64::INFINITY);
        mapping.insert_float("c", 1.5);
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.scalar("c"), Some(MetricValue::Float(1.5)));
    }

    #[test]
    fn test_lookup_nested_path() {
        let mapping = CanonicalMapping::from_json(json!({
            "sleep": { "stages": { "deep": 62 } }
        }))
        .unwrap();
        let path = vec!["sleep".to_string(), "stages".to_string(), "deep".to_string()];
        assert_eq!(mapping.lookup(&path), Some(&json!(62)));
        assert_eq!(mapping.lookup(&["sleep".to_string(), "missing".to_string()]), None);
        assert_eq!(mapping.lookup(&[]), None);
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        assert!(CanonicalMapping::from_json(json!([1, 2, 3])).is_none());
        assert!(CanonicalMapping::from_json(json!("text")).is_none());
    }

    #[test]
    fn test_parse_numeric_text() {
        assert_eq!(parse_numeric_text("72"), Some(MetricValue::Integer(72)));
        assert_eq!(parse_numeric_text("-3"), Some(MetricValue::Integer(-3)));
        assert_eq!(parse_numeric_text("36.6"), Some(MetricValue::Float(36.6)));
        assert_eq!(parse_numeric_text("1.2.3"), None);
        assert_eq!(parse_numeric_text("--1"), None);
        assert_eq!(parse_numeric_text("-"), None);
        assert_eq!(parse_numeric_text("1e5"), None);
        assert_eq!(parse_numeric_text("abc"), None);
    }

    #[test]
    fn test_accessor_count_and_sum() {
        let mapping = CanonicalMapping::from_json(json!({
            "splits": [1, 2, 3],
            "mixed": [1, "two", 3],
            "floats": [0.5, 1.5]
        }))
        .unwrap();

        let count = Accessor::at(vec!["splits".to_string()], ReadKind::Count);
        let sum = Accessor::at(vec!["splits".to_string()], ReadKind::Sum);
        assert_eq!(count.read(&mapping), Some(MetricValue::Integer(3)));
        assert_eq!(sum.read(&mapping), Some(MetricValue::Integer(6)));

        let mixed_sum = Accessor::at(vec!["mixed".to_string()], ReadKind::Sum);
        assert_eq!(mixed_sum.read(&mapping), None);

        let float_sum = Accessor::at(vec!["floats".to_string()], ReadKind::Sum);
        assert_eq!(float_sum.read(&mapping), Some(MetricValue::Float(2.0)));
    }

    #[test]
    fn test_accessor_numeric_text() {
        let mapping = CanonicalMapping::from_json(json!({ "weight": "72.5", "note": "n/a" })).unwrap();
        let weight = Accessor::at(vec!["weight".to_string()], ReadKind::NumericText);
        let note = Accessor::at(vec!["note".to_string()], ReadKind::NumericText);
        assert_eq!(weight.read(&mapping), Some(MetricValue::Float(72.5)));
        assert_eq!(note.read(&mapping), None);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("total_distance"), "Total Distance");
        assert_eq!(title_case("hrv"), "Hrv");
        assert_eq!(title_case("sleep__stages_deep"), "Sleep Stages Deep");
    }

    #[test]
    fn test_entity_state_unknown_when_absent() {
        let schema = MetricSchema {
            key: "steps".to_string(),
            name: "Steps".to_string(),
            device_class: None,
            unit: Some("steps".to_string()),
            aggregation: Some(AggregationKind::TotalIncreasing),
            icon: Some("mdi:walk".to_string()),
        };
        let entity = EntityDescriptor::new(
            "entry",
            schema,
            SchemaSource::Static,
            Accessor::scalar("steps"),
        );
        assert_eq!(entity.unique_id, "entry_steps");
        assert_eq!(entity.display_name, "Ultrahuman Steps");

        let state = entity.state(&CanonicalMapping::new());
        assert_eq!(state.value, None);
        assert_eq!(state.unit.as_deref(), Some("steps"));
    }
}
