//! Entity projection
//!
//! Turns a canonical mapping into the list of entities a host exposes. Static
//! schemas are placed first and win any name collision; every other key gets an
//! inferred schema. Nested objects are walked recursively, with underscore
//! joined names, and numeric arrays get `_count` / `_sum` companions.

use crate::inference::{aggregate_schema, infer, text_schema};
use crate::schema::{is_static_key, STATIC_SCHEMAS};
use crate::types::{
    parse_numeric_text, Accessor, CanonicalMapping, EntityDescriptor, MetricSchema, ReadKind,
    SchemaSource,
};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Nesting depth past which nested objects are ignored
pub const MAX_DEPTH: usize = 10;

/// Builds entity descriptors for one config entry
#[derive(Debug, Clone)]
pub struct Projector {
    entry_id: String,
    max_depth: usize,
}

impl Projector {
    pub fn new(entry_id: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
            max_depth: MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Project `mapping` into descriptors: static schemas first, in table
    /// order, then inferred ones in traversal order.
    ///
    /// Traversal follows the mapping's sorted key order (and sorted child keys
    /// for nested objects), not the order keys appeared in the payload, so the
    /// same data always yields the same entity list.
    pub fn project(&self, mapping: &CanonicalMapping) -> Vec<EntityDescriptor> {
        let mut projection = Projection {
            entry_id: &self.entry_id,
            max_depth: self.max_depth,
            seen: HashSet::new(),
            entities: Vec::new(),
        };

        for schema in STATIC_SCHEMAS {
            let accessor = Accessor::scalar(schema.key);
            if accessor.read(mapping).is_some() {
                projection.push(schema.to_schema(), SchemaSource::Static, accessor);
            }
        }
        let static_count = projection.entities.len();

        for (key, value) in mapping.iter() {
            projection.visit(vec![key.clone()], value, 0);
        }

        let entities = projection.entities;
        info!(
            total = entities.len(),
            inferred = entities.len() - static_count,
            "Created Ultrahuman entities"
        );
        if entities.is_empty() {
            warn!("No entities created from the current data");
        }
        entities
    }
}

/// Build entities for `mapping` with the default projector
pub fn build_entities(entry_id: &str, mapping: &CanonicalMapping) -> Vec<EntityDescriptor> {
    Projector::new(entry_id).project(mapping)
}

/// Traversal state for one projection run
struct Projection<'a> {
    entry_id: &'a str,
    max_depth: usize,
    /// Keys that already have an entity
    seen: HashSet<String>,
    entities: Vec<EntityDescriptor>,
}

impl Projection<'_> {
    /// Static names are reserved even when their own entity was not created
    fn is_claimed(&self, key: &str) -> bool {
        self.seen.contains(key) || is_static_key(key)
    }

    fn push(&mut self, schema: MetricSchema, source: SchemaSource, accessor: Accessor) {
        debug!(key = %schema.key, ?source, "Added entity");
        self.seen.insert(schema.key.clone());
        self.entities
            .push(EntityDescriptor::new(self.entry_id, schema, source, accessor));
    }

    fn push_inferred(&mut self, schema: MetricSchema, accessor: Accessor) {
        if self.is_claimed(&schema.key) {
            debug!(key = %schema.key, "Skipping already claimed key");
            return;
        }
        self.push(schema, SchemaSource::Inferred, accessor);
    }

    fn visit(&mut self, path: Vec<String>, value: &Value, depth: usize) {
        let key = path.join("_");
        if self.is_claimed(&key) {
            return;
        }

        match value {
            Value::Number(_) => {
                self.push_inferred(infer(&key), Accessor::at(path, ReadKind::Scalar));
            }
            Value::String(text) => {
                if parse_numeric_text(text).is_some() {
                    self.push_inferred(infer(&key), Accessor::at(path, ReadKind::NumericText));
                } else {
                    self.push_inferred(text_schema(&key), Accessor::at(path, ReadKind::Scalar));
                }
            }
            Value::Object(children) => {
                if depth >= self.max_depth {
                    debug!(key = %key, "Nested data too deep, skipping");
                    return;
                }
                for (child_key, child) in children {
                    let mut child_path = path.clone();
                    child_path.push(child_key.clone());
                    self.visit(child_path, child, depth + 1);
                }
            }
            Value::Array(items) => {
                if !items.first().is_some_and(Value::is_number) {
                    return;
                }
                self.push_inferred(
                    aggregate_schema(&key, "count"),
                    Accessor::at(path.clone(), ReadKind::Count),
                );
                if items.iter().all(Value::is_number) {
                    self.push_inferred(
                        aggregate_schema(&key, "sum"),
                        Accessor::at(path, ReadKind::Sum),
                    );
                }
            }
            Value::Bool(_) | Value::Null => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AggregationKind, DeviceClass, MetricValue};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mapping(value: Value) -> CanonicalMapping {
        CanonicalMapping::from_json(value).unwrap()
    }

    fn keys(entities: &[EntityDescriptor]) -> Vec<&str> {
        entities.iter().map(|e| e.key.as_str()).collect()
    }

    #[test]
    fn test_static_first_in_table_order() {
        let data = mapping(json!({
            "vo2_max": 44.5,
            "total_distance": 5200,
            "heart_rate_avg": 70.0,
            "steps": 8500
        }));
        let entities = build_entities("entry", &data);

        assert_eq!(
            keys(&entities),
            vec!["heart_rate_avg", "steps", "vo2_max", "total_distance"]
        );
        assert_eq!(entities[0].source, SchemaSource::Static);
        assert_eq!(entities[3].source, SchemaSource::Inferred);
        assert_eq!(entities[3].schema.device_class, Some(DeviceClass::Distance));
        assert_eq!(entities[3].unique_id, "entry_total_distance");
    }

    #[test]
    fn test_static_absent_values_not_projected() {
        let data = mapping(json!({ "hrv": null, "steps": 10 }));
        let entities = build_entities("entry", &data);
        // hrv is reserved for its static schema, so no inferred twin either
        assert_eq!(keys(&entities), vec!["steps"]);
    }

    #[test]
    fn test_numeric_array_companions() {
        let data = mapping(json!({ "splits": [1, 2, 3] }));
        let entities = build_entities("entry", &data);

        assert_eq!(keys(&entities), vec!["splits_count", "splits_sum"]);
        assert_eq!(entities[0].value(&data), Some(MetricValue::Integer(3)));
        assert_eq!(entities[1].value(&data), Some(MetricValue::Integer(6)));
    }

    #[test]
    fn test_mixed_array_gets_count_only() {
        let data = mapping(json!({ "laps": [1, "a", 3] }));
        let entities = build_entities("entry", &data);

        assert_eq!(keys(&entities), vec!["laps_count"]);
        assert_eq!(entities[0].value(&data), Some(MetricValue::Integer(3)));
    }

    #[test]
    fn test_non_numeric_arrays_skipped() {
        let data = mapping(json!({ "tags": ["a", "b"], "empty": [], "flag": true }));
        assert!(build_entities("entry", &data).is_empty());
    }

    #[test]
    fn test_nested_objects_use_joined_names() {
        let data = mapping(json!({
            "sleep_stages": { "deep": 62, "rem": { "minutes": 95 } },
            "readiness": { "label": "good" }
        }));
        let entities = build_entities("entry", &data);

        assert_eq!(
            keys(&entities),
            vec!["readiness_label", "sleep_stages_deep", "sleep_stages_rem_minutes"]
        );

        let deep = &entities[1];
        assert_eq!(deep.schema.unit.as_deref(), Some("min"));
        assert_eq!(deep.value(&data), Some(MetricValue::Integer(62)));

        let label = &entities[0];
        assert_eq!(label.schema.aggregation, None);
        assert_eq!(label.value(&data), Some(MetricValue::Text("good".to_string())));
    }

    #[test]
    fn test_no_duplicate_keys() {
        // "a_b" at top level and a.b nested produce the same joined name
        let data = mapping(json!({
            "a": { "b": 1 },
            "a_b": 2,
            "x": [1, 2],
            "x_count": 7
        }));
        let entities = build_entities("entry", &data);
        let all = keys(&entities);
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), unique.len());
        assert_eq!(all, vec!["a_b", "x_count", "x_sum"]);
        // First encounter wins: the nested value
        assert_eq!(entities[0].accessor.path, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_nested_static_name_not_inferred() {
        let data = mapping(json!({ "body": { "temperature": 36.5 }, "body_temperature": 36.6 }));
        let entities = build_entities("entry", &data);

        assert_eq!(keys(&entities), vec!["body_temperature"]);
        assert_eq!(entities[0].source, SchemaSource::Static);
        assert_eq!(entities[0].value(&data), Some(MetricValue::Float(36.6)));
    }

    #[test]
    fn test_numeric_strings() {
        let data = mapping(json!({ "body_weight": "72.5", "note": "rested" }));
        let entities = build_entities("entry", &data);

        assert_eq!(keys(&entities), vec!["body_weight", "note"]);
        assert_eq!(entities[0].schema.aggregation, Some(AggregationKind::Measurement));
        assert_eq!(entities[0].value(&data), Some(MetricValue::Float(72.5)));
        assert_eq!(entities[1].schema.unit, None);
    }

    #[test]
    fn test_stable_order() {
        let data = mapping(json!({
            "zeta": 1, "alpha": 2, "steps": 3, "mid": { "b": 1, "a": 2 }
        }));
        let first = keys(&build_entities("entry", &data)).join(",");
        for _ in 0..5 {
            assert_eq!(keys(&build_entities("entry", &data)).join(","), first);
        }
        assert_eq!(first, "steps,alpha,mid_a,mid_b,zeta");
    }

    #[test]
    fn test_descriptors_keep_reading_later_mappings() {
        let first = mapping(json!({ "steps": 100, "extra": 1 }));
        let entities = build_entities("entry", &first);

        let later = mapping(json!({ "steps": 250 }));
        assert_eq!(entities[0].value(&later), Some(MetricValue::Integer(250)));
        assert_eq!(entities[1].value(&later), None);
    }

    #[test]
    fn test_max_depth() {
        let data = mapping(json!({ "a": { "b": { "c": 1 } } }));
        let shallow = Projector::new("entry").with_max_depth(1).project(&data);
        assert!(shallow.is_empty());
        let deep = Projector::new("entry").project(&data);
        assert_eq!(keys(&deep), vec!["a_b_c"]);
    }

    #[test]
    fn test_empty_mapping() {
        assert!(build_entities("entry", &CanonicalMapping::new()).is_empty());
    }
}
