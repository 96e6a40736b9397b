//! Boolean-coercion script for the reindex request.
//!
//! Pre-typeless clusters accepted loosely-typed boolean values (`"yes"`,
//! `"1"`, `1`, `"on"`); the new major rejects them. When the source mapping
//! contains boolean fields, the reindex carries a server-side script that
//! rewrites those values in each copied document. The script body is data:
//! an opaque blob sent verbatim, parameterised by the boolean field paths.

use serde_json::{json, Map, Value};

use reindex_cluster::types::ReindexScript;

use crate::transform::transform_mappings;

/// The coercion script, sent verbatim as `painless` source.
///
/// For every path in `params.booleanFieldPaths`, string and integer
/// renderings of booleans are rewritten: `"yes"`, `"1"`, `"on"` and `1`
/// become `true`; `"no"`, `"0"`, `"off"` and `0` become `false`.
pub const BOOLEAN_COERCION_SCRIPT: &str = r#"
void coerce(def parent, def leaf) {
  if (parent == null || !(parent instanceof Map) || !parent.containsKey(leaf)) {
    return;
  }
  def value = parent[leaf];
  if (value == "yes" || value == "1" || value == "on" || value == 1) {
    parent[leaf] = true;
  } else if (value == "no" || value == "0" || value == "off" || value == 0) {
    parent[leaf] = false;
  }
}
for (def path : params.booleanFieldPaths) {
  def parent = ctx._source;
  for (int i = 0; i < path.size() - 1; i++) {
    if (parent == null) {
      break;
    }
    parent = parent[path[i]];
  }
  if (parent != null && path.size() > 0) {
    coerce(parent, path[path.size() - 1]);
  }
}
"#;

/// Paths of every boolean-typed field in the source mapping, as segment
/// lists matching the document structure (the legacy type wrapper is not
/// part of documents and is unwrapped first).
pub fn boolean_field_paths(index_name: &str, mappings: &Value) -> Vec<Vec<String>> {
    let typeless = match transform_mappings(index_name, mappings) {
        Ok(m) => m,
        Err(_) => return Vec::new(),
    };
    let mut paths = Vec::new();
    if let Some(properties) = typeless.get("properties").and_then(Value::as_object) {
        walk_properties(properties, &[], &mut paths);
    }
    paths
}

fn walk_properties(properties: &Map<String, Value>, prefix: &[String], out: &mut Vec<Vec<String>>) {
    for (name, field) in properties {
        let mut path = prefix.to_vec();
        path.push(name.clone());

        if field.get("type").and_then(Value::as_str) == Some("boolean") {
            out.push(path.clone());
        }
        if let Some(nested) = field.get("properties").and_then(Value::as_object) {
            walk_properties(nested, &path, out);
        }
    }
}

/// Build the script attached to the reindex request for the given paths.
pub fn boolean_coercion_script(paths: &[Vec<String>]) -> ReindexScript {
    ReindexScript {
        lang: "painless".to_string(),
        source: BOOLEAN_COERCION_SCRIPT.to_string(),
        params: json!({ "booleanFieldPaths": paths }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_in_wrapped_mapping() {
        let mappings = serde_json::json!({
            "doc": {
                "properties": {
                    "value": {"type": "boolean"},
                    "name": {"type": "keyword"}
                }
            }
        });
        let paths = boolean_field_paths("logs-2019", &mappings);
        assert_eq!(paths, vec![vec!["value".to_string()]]);
    }

    #[test]
    fn test_paths_nested_objects() {
        let mappings = serde_json::json!({
            "properties": {
                "flags": {
                    "properties": {
                        "active": {"type": "boolean"},
                        "meta": {
                            "properties": {
                                "verified": {"type": "boolean"}
                            }
                        }
                    }
                },
                "enabled": {"type": "boolean"}
            }
        });
        let mut paths = boolean_field_paths("logs", &mappings);
        paths.sort();
        assert_eq!(
            paths,
            vec![
                vec!["enabled".to_string()],
                vec!["flags".to_string(), "active".to_string()],
                vec![
                    "flags".to_string(),
                    "meta".to_string(),
                    "verified".to_string()
                ],
            ]
        );
    }

    #[test]
    fn test_no_boolean_fields() {
        let mappings = serde_json::json!({
            "properties": {"name": {"type": "keyword"}}
        });
        assert!(boolean_field_paths("logs", &mappings).is_empty());
        assert!(boolean_field_paths("logs", &serde_json::Value::Null).is_empty());
    }

    #[test]
    fn test_script_carries_paths_as_params() {
        let paths = vec![vec!["value".to_string()]];
        let script = boolean_coercion_script(&paths);
        assert_eq!(script.lang, "painless");
        assert_eq!(script.source, BOOLEAN_COERCION_SCRIPT);
        assert_eq!(
            script.params["booleanFieldPaths"],
            serde_json::json!([["value"]])
        );
    }
}
