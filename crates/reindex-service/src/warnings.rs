//! Warning detection over source-index settings and mappings.
//!
//! Rules are pure predicates over the index state; no cluster calls happen
//! here. Warnings are advisory and never block operation creation.

use serde_json::Value;

use reindex_cluster::types::IndexState;
use reindex_types::ReindexWarning;

use crate::script::boolean_field_paths;
use crate::transform::transform_mappings;

/// Detect every applicable warning for the given index state.
pub fn detect_warnings(index_name: &str, state: &IndexState) -> Vec<ReindexWarning> {
    let mut warnings = Vec::new();
    if has_all_field(&state.mappings) {
        warnings.push(ReindexWarning::AllField);
    }
    if !boolean_field_paths(index_name, &state.mappings).is_empty() {
        warnings.push(ReindexWarning::BooleanFields);
    }
    if is_legacy_apm_index(index_name, &state.mappings) {
        warnings.push(ReindexWarning::ApmReindex);
    }
    warnings
}

/// Whether the mapping enables the removed `_all` meta field, at the top
/// level or inside a legacy type wrapper.
fn has_all_field(mappings: &Value) -> bool {
    let Some(map) = mappings.as_object() else {
        return false;
    };
    all_field_enabled(mappings) || map.values().any(all_field_enabled)
}

fn all_field_enabled(value: &Value) -> bool {
    value
        .get("_all")
        .and_then(|all| all.get("enabled"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Whether this is a legacy APM index: it matches the APM index pattern and
/// its mapping predates the current schema (no `observer` field).
fn is_legacy_apm_index(index_name: &str, mappings: &Value) -> bool {
    if !index_name.starts_with("apm-") {
        return false;
    }
    let typeless = match transform_mappings(index_name, mappings) {
        Ok(m) => m,
        Err(_) => return true,
    };
    typeless
        .get("properties")
        .and_then(|props| props.get("observer"))
        .is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(mappings: Value) -> IndexState {
        IndexState {
            settings: Default::default(),
            mappings,
            aliases: Default::default(),
        }
    }

    #[test]
    fn test_all_field_warning() {
        let warnings = detect_warnings(
            "logs-2019",
            &state(json!({"_all": {"enabled": true}, "properties": {}})),
        );
        assert!(warnings.contains(&ReindexWarning::AllField));

        // Inside a type wrapper.
        let warnings = detect_warnings(
            "logs-2019",
            &state(json!({"doc": {"_all": {"enabled": true}, "properties": {}}})),
        );
        assert!(warnings.contains(&ReindexWarning::AllField));

        // Disabled is not a warning.
        let warnings = detect_warnings(
            "logs-2019",
            &state(json!({"_all": {"enabled": false}, "properties": {}})),
        );
        assert!(!warnings.contains(&ReindexWarning::AllField));
    }

    #[test]
    fn test_boolean_fields_warning() {
        let warnings = detect_warnings(
            "logs-2019",
            &state(json!({"doc": {"properties": {"value": {"type": "boolean"}}}})),
        );
        assert_eq!(warnings, vec![ReindexWarning::BooleanFields]);

        let warnings = detect_warnings(
            "logs-2019",
            &state(json!({"doc": {"properties": {"value": {"type": "keyword"}}}})),
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_apm_warning_only_for_apm_pattern() {
        let legacy = state(json!({"doc": {"properties": {"trace_id": {"type": "keyword"}}}}));
        assert_eq!(
            detect_warnings("apm-6.5.0-span", &legacy),
            vec![ReindexWarning::ApmReindex]
        );
        assert!(detect_warnings("logs-2019", &legacy).is_empty());

        // A current APM mapping carries the observer field.
        let current = state(json!({"properties": {"observer": {"properties": {}}}}));
        assert!(detect_warnings("apm-7.0.0-span", &current).is_empty());
    }

    #[test]
    fn test_multiple_warnings_accumulate() {
        let warnings = detect_warnings(
            "apm-6.5.0-span",
            &state(json!({
                "doc": {
                    "_all": {"enabled": true},
                    "properties": {"sampled": {"type": "boolean"}}
                }
            })),
        );
        assert_eq!(
            warnings,
            vec![
                ReindexWarning::AllField,
                ReindexWarning::BooleanFields,
                ReindexWarning::ApmReindex
            ]
        );
    }
}
