//! OpenSearch index settings and mappings.
//!
//! Index bodies are built from the process-wide default settings, the
//! per-index settings overriding them, and the mappings derived from the
//! document fields.

use serde_json::{json, Map, Value};

/// Merge per-index settings over the defaults.
///
/// Nested objects are merged key by key; any other value in `overrides`
/// replaces the default.
pub fn merge_settings(defaults: &Value, overrides: &Value) -> Value {
    match (defaults, overrides) {
        (Value::Object(base), Value::Object(over)) => {
            let mut merged: Map<String, Value> = base.clone();
            for (key, value) in over {
                let entry = match merged.get(key) {
                    Some(existing) => merge_settings(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), entry);
            }
            Value::Object(merged)
        }
        (base, Value::Null) => base.clone(),
        (_, over) => over.clone(),
    }
}

/// Body of an index creation request.
pub fn index_body(settings: &Value, mappings: &Value) -> Value {
    json!({
        "settings": settings,
        "mappings": mappings,
    })
}
