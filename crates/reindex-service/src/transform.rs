//! Settings and mappings transformation for the destination index.
//!
//! The destination is created from the source's flat settings and mappings
//! with everything that must not transfer stripped out: the write block the
//! orchestrator itself installed, index-identity settings the cluster
//! assigns on creation, allocation pins from the old topology, and the
//! retired per-type mapping wrapper and `_all` meta field.

use serde_json::{json, Map, Value};

use reindex_cluster::types::{FlatSettings, IndexState};

use crate::error::ReindexError;

/// Exact flat-settings keys that never transfer to the destination.
const REMOVED_SETTINGS: &[&str] = &[
    "index.uuid",
    "index.blocks.write",
    "index.creation_date",
    "index.provided_name",
    "index.legacy",
    "index.mapping.single_type",
    "index.version.created",
    "index.version.upgraded",
];

/// Flat-settings prefixes that never transfer (allocation/routing pins).
const REMOVED_SETTING_PREFIXES: &[&str] = &[
    "index.allocation.",
    "index.routing.allocation.initial_recovery",
];

/// Top-level mapping keys legal on a typeless mapping. A single key outside
/// this set is a legacy type wrapper to unwrap.
const TYPELESS_KEYS: &[&str] = &[
    "properties",
    "dynamic",
    "dynamic_templates",
    "dynamic_date_formats",
    "date_detection",
    "numeric_detection",
    "_source",
    "_meta",
    "_routing",
    "_field_names",
    "_size",
];

/// Filter the source's flat settings down to what the destination keeps.
///
/// The replica count is forced to zero for the duration of the copy; the
/// source's own value is restored before the alias switch.
pub fn transform_flat_settings(settings: &FlatSettings) -> FlatSettings {
    let mut out: FlatSettings = settings
        .iter()
        .filter(|(key, _)| {
            !REMOVED_SETTINGS.contains(&key.as_str())
                && !REMOVED_SETTING_PREFIXES
                    .iter()
                    .any(|prefix| key.starts_with(prefix))
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    out.insert("index.number_of_replicas".to_string(), json!(0));
    out
}

/// Migrate a possibly per-type mapping to its typeless form.
///
/// A mapping whose single top-level key is a legacy type name is unwrapped
/// to that type's body; `_all` is dropped either way. More than one type
/// cannot be migrated.
pub fn transform_mappings(index_name: &str, mappings: &Value) -> Result<Value, ReindexError> {
    let Some(map) = mappings.as_object() else {
        return Ok(json!({}));
    };

    let mut map = map.clone();
    map.remove("_all");

    let type_keys: Vec<String> = map
        .keys()
        .filter(|key| !TYPELESS_KEYS.contains(&key.as_str()))
        .cloned()
        .collect();

    match type_keys.len() {
        0 => Ok(Value::Object(map)),
        1 if map.len() == 1 => {
            let body = map.remove(&type_keys[0]).unwrap_or(Value::Null);
            let mut body = body.as_object().cloned().unwrap_or_else(Map::new);
            body.remove("_all");
            Ok(Value::Object(body))
        }
        _ => Err(ReindexError::MultipleMappingTypes(index_name.to_string())),
    }
}

/// Build the `PUT /{new_index}` body from the source's state.
pub fn new_index_body(index_name: &str, state: &IndexState) -> Result<Value, ReindexError> {
    let settings = transform_flat_settings(&state.settings);
    let mappings = transform_mappings(index_name, &state.mappings)?;
    Ok(json!({
        "settings": settings,
        "mappings": mappings,
    }))
}

/// The source's replica count, to restore on the destination after the copy.
pub fn source_replica_count(settings: &FlatSettings) -> Value {
    settings
        .get("index.number_of_replicas")
        .cloned()
        .unwrap_or_else(|| json!("1"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(value: Value) -> FlatSettings {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_settings_strip_write_block_and_identity() {
        let settings = flat(json!({
            "index.number_of_shards": "5",
            "index.blocks.write": "true",
            "index.uuid": "Ag8yP",
            "index.provided_name": "logs-2019",
            "index.creation_date": "1560000000000",
            "index.version.created": "6050099",
            "index.version.upgraded": "6080299",
        }));

        let out = transform_flat_settings(&settings);
        assert_eq!(out["index.number_of_shards"], "5");
        assert!(!out.contains_key("index.blocks.write"));
        assert!(!out.contains_key("index.uuid"));
        assert!(!out.contains_key("index.provided_name"));
        assert!(!out.contains_key("index.creation_date"));
        assert!(!out.contains_key("index.version.created"));
        assert!(!out.contains_key("index.version.upgraded"));
    }

    #[test]
    fn test_settings_strip_allocation_pins() {
        let settings = flat(json!({
            "index.routing.allocation.initial_recovery._id": "node-1",
            "index.allocation.max_retries": "5",
            "index.routing.allocation.total_shards_per_node": "2",
        }));

        let out = transform_flat_settings(&settings);
        assert!(!out.contains_key("index.routing.allocation.initial_recovery._id"));
        assert!(!out.contains_key("index.allocation.max_retries"));
        // Topology-independent routing settings still transfer.
        assert_eq!(out["index.routing.allocation.total_shards_per_node"], "2");
    }

    #[test]
    fn test_settings_zero_replicas_for_copy() {
        let settings = flat(json!({"index.number_of_replicas": "2"}));
        let out = transform_flat_settings(&settings);
        assert_eq!(out["index.number_of_replicas"], 0);
        assert_eq!(source_replica_count(&settings), json!("2"));
        assert_eq!(source_replica_count(&flat(json!({}))), json!("1"));
    }

    #[test]
    fn test_mappings_unwrap_single_type() {
        let mappings = json!({
            "doc": {"properties": {"value": {"type": "boolean"}}}
        });
        let out = transform_mappings("logs-2019", &mappings).unwrap();
        assert_eq!(out, json!({"properties": {"value": {"type": "boolean"}}}));
    }

    #[test]
    fn test_mappings_typeless_passthrough() {
        let mappings = json!({
            "properties": {"value": {"type": "keyword"}},
            "dynamic": "strict"
        });
        let out = transform_mappings("logs-2019", &mappings).unwrap();
        assert_eq!(out, mappings);
    }

    #[test]
    fn test_mappings_drop_all_field() {
        let mappings = json!({
            "doc": {
                "_all": {"enabled": true},
                "properties": {"value": {"type": "text"}}
            }
        });
        let out = transform_mappings("logs-2019", &mappings).unwrap();
        assert!(out.get("_all").is_none());
        assert_eq!(out["properties"]["value"]["type"], "text");

        let top_level = json!({"_all": {"enabled": true}, "properties": {}});
        let out = transform_mappings("logs-2019", &top_level).unwrap();
        assert!(out.get("_all").is_none());
    }

    #[test]
    fn test_mappings_multiple_types_rejected() {
        let mappings = json!({
            "doc": {"properties": {}},
            "other": {"properties": {}}
        });
        let err = transform_mappings("logs-2019", &mappings).unwrap_err();
        assert!(matches!(err, ReindexError::MultipleMappingTypes(_)));
    }

    #[test]
    fn test_mappings_empty_and_null() {
        assert_eq!(transform_mappings("a", &json!({})).unwrap(), json!({}));
        assert_eq!(transform_mappings("a", &Value::Null).unwrap(), json!({}));
    }

    #[test]
    fn test_new_index_body_shape() {
        let state = IndexState {
            settings: flat(json!({
                "index.number_of_shards": "1",
                "index.blocks.write": "true"
            })),
            mappings: json!({"doc": {"properties": {"ok": {"type": "boolean"}}}}),
            aliases: Default::default(),
        };
        let body = new_index_body("logs-2019", &state).unwrap();
        assert_eq!(body["settings"]["index.number_of_shards"], "1");
        assert!(body["settings"].get("index.blocks.write").is_none());
        assert_eq!(body["settings"]["index.number_of_replicas"], 0);
        assert_eq!(body["mappings"]["properties"]["ok"]["type"], "boolean");
    }
}
